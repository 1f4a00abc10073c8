//! Shared test utilities and fixtures
//!
//! A scripted checker plus an editor-side client that talks to `serve`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{DuplexStream, duplex};
use tokio::task::JoinHandle;
use tokio::time;
use url::Url;
use trellis_config::ProjectSettings;
use trellis_core::{
    CheckerDiagnostic, CheckerError, CheckerFactory, CheckerHover, CheckerLocation, TypeChecker,
};
use trellis_lsp::codec::{FrameReader, FrameWriter};
use trellis_types::{CompletionItem, Span};

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

// ── Scripted checker ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeState {
    pub files: HashMap<PathBuf, String>,
    /// `(needle, code, message)`: report `code` at every `needle`.
    pub reports: Vec<(String, u32, String)>,
    pub closed: Vec<PathBuf>,
    pub shut_down: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeChecker {
    state: Arc<Mutex<FakeState>>,
}

impl FakeChecker {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn report(&self, needle: &str, code: u32, message: &str) {
        self.state()
            .reports
            .push((needle.to_string(), code, message.to_string()));
    }
}

impl TypeChecker for FakeChecker {
    async fn sync_file(&mut self, path: &Path, text: &str) -> Result<(), CheckerError> {
        self.state()
            .files
            .insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    async fn check_file(
        &mut self,
        _path: &Path,
        text: &str,
    ) -> Result<Vec<CheckerDiagnostic>, CheckerError> {
        let state = self.state();
        Ok(state
            .reports
            .iter()
            .filter_map(|(needle, code, message)| {
                let start = text.find(needle.as_str())?;
                let span = Span::new(start, start + needle.len());
                Some(CheckerDiagnostic::error(span, *code, message))
            })
            .collect())
    }

    async fn hover_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Option<CheckerHover>, CheckerError> {
        let state = self.state();
        let Some(text) = state.files.get(path) else {
            return Ok(None);
        };
        let is_word = |c: char| c.is_alphanumeric() || c == '_';
        let start = text[..offset]
            .rfind(|c: char| !is_word(c))
            .map_or(0, |i| i + 1);
        let end = text[offset..]
            .find(|c: char| !is_word(c))
            .map_or(text.len(), |i| offset + i);
        if start >= end {
            return Ok(None);
        }
        Ok(Some(CheckerHover {
            contents: format!("(property) {}", &text[start..end]),
            span: Some(Span::new(start, end)),
        }))
    }

    async fn completions_at(
        &mut self,
        _path: &Path,
        _offset: usize,
    ) -> Result<Vec<CompletionItem>, CheckerError> {
        Ok(Vec::new())
    }

    async fn definitions_at(
        &mut self,
        _path: &Path,
        _offset: usize,
    ) -> Result<Vec<CheckerLocation>, CheckerError> {
        Ok(Vec::new())
    }

    async fn close_file(&mut self, path: &Path) -> Result<(), CheckerError> {
        let mut state = self.state();
        state.files.remove(path);
        state.closed.push(path.to_path_buf());
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.state().shut_down = true;
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    pub checker: FakeChecker,
    pub created: Arc<Mutex<Vec<PathBuf>>>,
    pub fail: bool,
}

impl CheckerFactory for FakeFactory {
    type Checker = FakeChecker;

    async fn create(&self, settings: &ProjectSettings) -> Result<FakeChecker, CheckerError> {
        if self.fail {
            return Err(CheckerError::Start("typescript-language-server not found".into()));
        }
        self.created
            .lock()
            .unwrap()
            .push(settings.root().to_path_buf());
        Ok(self.checker.clone())
    }
}

// ── Editor client ───────────────────────────────────────────────────────

pub struct Client {
    reader: FrameReader<DuplexStream>,
    writer: FrameWriter<DuplexStream>,
    /// Notifications read while waiting for a response.
    pending: VecDeque<Value>,
    next_id: u64,
    server: JoinHandle<anyhow::Result<()>>,
}

impl Client {
    pub fn start(factory: FakeFactory) -> Self {
        let (client_out, server_in) = duplex(64 * 1024);
        let (server_out, client_in) = duplex(64 * 1024);
        let server = tokio::spawn(trellis_lsp::serve(server_in, server_out, factory));
        Self {
            reader: FrameReader::new(client_in),
            writer: FrameWriter::new(client_out),
            pending: VecDeque::new(),
            next_id: 1,
            server,
        }
    }

    /// Start a session and complete the initialize handshake for `root`.
    pub async fn initialized(factory: FakeFactory, root: &Path) -> Self {
        let mut client = Self::start(factory);
        let result = client
            .request("initialize", json!({ "rootUri": uri(root), "capabilities": {} }))
            .await;
        assert!(result.get("result").is_some(), "initialize failed: {result}");
        client.notify("initialized", json!({})).await;
        client
    }

    async fn read(&mut self) -> Value {
        time::timeout(FRAME_TIMEOUT, self.reader.read_frame())
            .await
            .expect("timed out waiting for the server")
            .unwrap()
            .expect("server closed its output")
    }

    /// Send a request and return its whole response frame.
    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.writer
            .write_frame(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await
            .unwrap();
        loop {
            let frame = self.read().await;
            if frame.get("id") == Some(&json!(id)) {
                return frame;
            }
            self.pending.push_back(frame);
        }
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.writer
            .write_frame(&json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await
            .unwrap();
    }

    /// The next notification named `method`, skipping others.
    pub async fn notification(&mut self, method: &str) -> Value {
        loop {
            let frame = match self.pending.pop_front() {
                Some(frame) => frame,
                None => self.read().await,
            };
            if frame["method"] == method {
                return frame["params"].clone();
            }
        }
    }

    /// The next diagnostics published for `path`.
    pub async fn diagnostics(&mut self, path: &Path) -> Vec<Value> {
        let uri = uri(path);
        loop {
            let params = self.notification("textDocument/publishDiagnostics").await;
            if params["uri"] == uri {
                return params["diagnostics"].as_array().cloned().unwrap_or_default();
            }
        }
    }

    pub async fn open(&mut self, path: &Path, text: &str) {
        self.notify(
            "textDocument/didOpen",
            json!({ "textDocument": {
                "uri": uri(path), "languageId": "handlebars", "version": 1, "text": text
            }}),
        )
        .await;
    }

    /// Shut down cleanly and wait for `serve` to return.
    pub async fn finish(mut self) -> anyhow::Result<()> {
        let response = self.request("shutdown", Value::Null).await;
        assert_eq!(response["result"], Value::Null);
        self.notify("exit", Value::Null).await;
        time::timeout(FRAME_TIMEOUT, self.server)
            .await
            .expect("server did not exit")
            .unwrap()
    }

    /// Close the client's side of the pipe without a shutdown request.
    pub async fn disconnect(self) -> anyhow::Result<()> {
        drop(self.writer);
        time::timeout(FRAME_TIMEOUT, self.server)
            .await
            .expect("server did not exit")
            .unwrap()
    }
}

pub fn uri(path: &Path) -> String {
    Url::from_file_path(path).unwrap().to_string()
}

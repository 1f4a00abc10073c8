//! Proxy checker: an external TypeScript language server driven as the
//! bridge's [`TypeChecker`].
//!
//! Backing modules are pushed with `didOpen`/`didChange` under their virtual
//! paths. Diagnostics come from `textDocument/diagnostic` when the server
//! advertises it, otherwise from the server's `publishDiagnostics` stream.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use trellis_config::{CheckerConfig, ProjectSettings};
use trellis_core::{
    CheckerDiagnostic, CheckerError, CheckerFactory, CheckerHover, CheckerLocation, TypeChecker,
};
use trellis_types::{CompletionItem, LineIndex};

use crate::codec::{FrameReader, FrameWriter};
use crate::diagnostics::DiagnosticsStore;
use crate::protocol::{
    Incoming, Notification, Request, ResponseError, classify, path_to_uri, response, uri_to_path,
};
use crate::types::{
    LspDiagnostic, PublishDiagnosticsParams, did_change_params, did_open_params,
    initialize_params, language_id, parse_completions, parse_hover, parse_locations,
    parse_pull_diagnostics, position_params, text_document_params,
};

const INIT_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Quiet period after a fresh publish before diagnostics are read; servers
/// may publish syntactic and semantic results separately.
const SETTLE: Duration = Duration::from_millis(150);

const WRITER_CHANNEL_CAPACITY: usize = 64;

type ResponseResult = Result<Value, ResponseError>;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

/// Requests awaiting a response. Closed once the server's stdout ends, so
/// later requests fail immediately.
#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<ResponseResult>>,
    closed: bool,
}

type PendingMap = Arc<Mutex<Pending>>;

/// A backing module as last sent to the server.
struct OpenFile {
    uri: String,
    version: i32,
    lines: LineIndex,
    /// Diagnostics store sequence when this version was sent.
    synced_at: u64,
}

pub struct ProxyChecker {
    timeout: Duration,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: u64,
    /// Versions are unique across files and reopenings, so a late publish
    /// for an old document can never pass for a fresh one.
    next_version: i32,
    pending: PendingMap,
    published: watch::Receiver<DiagnosticsStore>,
    pull_diagnostics: bool,
    files: HashMap<PathBuf, OpenFile>,
    child: Option<Child>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

impl ProxyChecker {
    /// Spawn the configured server in `root` and complete the handshake.
    pub async fn start(config: &CheckerConfig, root: &Path) -> Result<Self> {
        let command = which::which(&config.command)
            .with_context(|| format!("{} not found in PATH", config.command))?;
        let mut child = Command::new(&command)
            .args(&config.args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", config.command))?;

        let stdout = child.stdout.take().context("no stdout from checker")?;
        let stdin = child.stdin.take().context("no stdin from checker")?;
        tracing::info!(
            command = %command.display(),
            root = %root.display(),
            "Started type checker"
        );

        let timeout = Duration::from_millis(config.timeout_ms);
        Self::connect(stdout, stdin, root, timeout, Some(child)).await
    }

    /// Run the protocol over an already-connected server.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        root: &Path,
        timeout: Duration,
        child: Option<Child>,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = PendingMap::default();
        let (published_tx, published) = watch::channel(DiagnosticsStore::default());

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(command) = writer_rx.recv().await {
                match command {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("Type checker write error: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader_writer_tx = writer_tx.clone();
        let reader_root = normalize_path(root);
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::dispatch_frame(
                            frame,
                            &reader_pending,
                            &published_tx,
                            &reader_writer_tx,
                            &reader_root,
                        )
                        .await;
                    }
                    Ok(None) => {
                        tracing::info!("Type checker closed its output");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Type checker read error: {e:#}");
                        break;
                    }
                }
            }
            let mut pending = reader_pending.lock().await;
            pending.closed = true;
            pending.waiters.clear();
        });

        let mut checker = Self {
            timeout,
            writer_tx,
            next_id: 1,
            next_version: 1,
            pending,
            published,
            pull_diagnostics: false,
            files: HashMap::new(),
            child,
            reader_handle,
            writer_handle,
        };
        checker.initialize(root).await?;
        Ok(checker)
    }

    async fn dispatch_frame(
        frame: Value,
        pending: &Mutex<Pending>,
        published: &watch::Sender<DiagnosticsStore>,
        writer_tx: &mpsc::Sender<WriterCommand>,
        root: &Path,
    ) {
        let Some(incoming) = classify(frame) else {
            tracing::trace!("Ignoring malformed frame from type checker");
            return;
        };

        match incoming {
            Incoming::Response {
                id: Some(id),
                result,
            } => {
                let waiter = pending.lock().await.waiters.remove(&id);
                if let Some(tx) = waiter {
                    let _ = tx.send(result);
                }
            }
            Incoming::Response { id: None, .. } => {
                tracing::trace!("Ignoring response with a non-numeric id");
            }
            Incoming::Request { id, method, params } => {
                tracing::debug!(%method, "Type checker sent a request");
                let reply = response(id, Self::answer(&method, &params));
                let _ = writer_tx.send(WriterCommand::Send(reply)).await;
            }
            Incoming::Notification { method, params } => {
                Self::handle_notification(&method, params, published, root);
            }
        }
    }

    /// Replies to server-initiated requests. Servers block on some of these,
    /// so every request is answered.
    fn answer(method: &str, params: &Value) -> ResponseResult {
        match method {
            "workspace/configuration" => {
                let count = params
                    .get("items")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Ok(Value::Array(vec![Value::Null; count]))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => Ok(Value::Null),
            _ => Err(ResponseError::method_not_found(method)),
        }
    }

    fn handle_notification(
        method: &str,
        params: Value,
        published: &watch::Sender<DiagnosticsStore>,
        root: &Path,
    ) {
        match method {
            "textDocument/publishDiagnostics" => {
                let params = match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(params) => params,
                    Err(e) => {
                        tracing::debug!("Failed to parse publishDiagnostics: {e}");
                        return;
                    }
                };
                let Some(path) = uri_to_path(&params.uri) else {
                    return;
                };
                let path = normalize_path(&path);
                if !path.starts_with(root) {
                    tracing::warn!(
                        path = %path.display(),
                        "Type checker reported diagnostics outside the project"
                    );
                    return;
                }
                tracing::trace!(
                    path = %path.display(),
                    version = ?params.version,
                    count = params.diagnostics.len(),
                    "Diagnostics published"
                );
                published.send_modify(|store| {
                    store.update(path, params.version, params.diagnostics);
                });
            }
            "window/logMessage" | "window/showMessage" => {
                let message = params.get("message").and_then(Value::as_str).unwrap_or("");
                tracing::debug!("Type checker: {message}");
            }
            _ => {
                tracing::trace!(%method, "Ignoring notification from type checker");
            }
        }
    }

    async fn initialize(&mut self, root: &Path) -> Result<()> {
        let root_uri = path_to_uri(root).context("converting project root to URI")?;
        let result = match self
            .send_request(
                "initialize",
                Some(initialize_params(root_uri.as_str())),
                INIT_TIMEOUT,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => bail!("initialize failed: {e}"),
        };
        self.pull_diagnostics = result
            .pointer("/capabilities/diagnosticProvider")
            .is_some_and(|provider| !provider.is_null() && provider != &Value::Bool(false));

        self.send_notification("initialized", Some(json!({})))
            .await
            .context("sending initialized")?;
        Ok(())
    }

    async fn send_request(
        &mut self,
        method: &'static str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, CheckerError> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(CheckerError::Unavailable);
            }
            pending.waiters.insert(id, tx);
        }

        let frame = serde_json::to_value(Request::new(id, method, params))
            .map_err(|e| CheckerError::Protocol(e.to_string()))?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.waiters.remove(&id);
            return Err(CheckerError::Unavailable);
        }

        match time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(CheckerError::Request {
                method,
                message: error.message,
            }),
            Ok(Err(_)) => Err(CheckerError::Unavailable),
            Err(_) => {
                self.pending.lock().await.waiters.remove(&id);
                let _ = self
                    .send_notification("$/cancelRequest", Some(json!({ "id": id })))
                    .await;
                tracing::warn!(%method, id, "Type checker request timed out");
                Err(CheckerError::Timeout { method })
            }
        }
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<(), CheckerError> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .map_err(|e| CheckerError::Protocol(e.to_string()))?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| CheckerError::Unavailable)
    }

    fn file(&self, path: &Path) -> Result<&OpenFile, CheckerError> {
        self.files.get(path).ok_or_else(|| {
            CheckerError::Protocol(format!("{} was never synced", path.display()))
        })
    }

    /// Wait for a publish covering the current version of `path`, then for
    /// the stream to go quiet.
    async fn wait_for_published(
        &self,
        path: &Path,
        version: i32,
        since: u64,
    ) -> Result<Vec<LspDiagnostic>, CheckerError> {
        let mut rx = self.published.clone();
        let path = path.to_path_buf();
        let wait = async move {
            loop {
                let ready = rx
                    .borrow_and_update()
                    .fresh(&path, version, since)
                    .is_some();
                if ready {
                    break;
                }
                rx.changed().await.map_err(|_| CheckerError::Unavailable)?;
            }
            while let Ok(Ok(())) = time::timeout(SETTLE, rx.changed()).await {}
            let items = rx
                .borrow()
                .fresh(&path, version, since)
                .map(<[LspDiagnostic]>::to_vec)
                .unwrap_or_default();
            Ok(items)
        };
        time::timeout(self.timeout, wait)
            .await
            .map_err(|_| CheckerError::Timeout {
                method: "textDocument/publishDiagnostics",
            })?
    }
}

impl TypeChecker for ProxyChecker {
    async fn sync_file(&mut self, path: &Path, text: &str) -> Result<(), CheckerError> {
        let since = self.published.borrow().sequence();
        let version = self.next_version;

        let (method, params) = match self.files.get_mut(path) {
            Some(file) if file.lines.text() == text => return Ok(()),
            Some(file) => {
                file.version = version;
                file.lines = LineIndex::new(text);
                file.synced_at = since;
                (
                    "textDocument/didChange",
                    did_change_params(&file.uri, version, text),
                )
            }
            None => {
                let uri = path_to_uri(path)
                    .map_err(|e| CheckerError::Protocol(e.to_string()))?
                    .to_string();
                let params = did_open_params(&uri, language_id(path), version, text);
                self.files.insert(
                    path.to_path_buf(),
                    OpenFile {
                        uri,
                        version,
                        lines: LineIndex::new(text),
                        synced_at: since,
                    },
                );
                ("textDocument/didOpen", params)
            }
        };
        self.next_version += 1;

        tracing::trace!(path = %path.display(), version, %method, "Syncing file");
        self.send_notification(method, Some(params)).await
    }

    async fn check_file(
        &mut self,
        path: &Path,
        text: &str,
    ) -> Result<Vec<CheckerDiagnostic>, CheckerError> {
        self.sync_file(path, text).await?;
        let file = self.file(path)?;
        let (uri, version, since) = (file.uri.clone(), file.version, file.synced_at);

        let items = if self.pull_diagnostics {
            let result = self
                .send_request(
                    "textDocument/diagnostic",
                    Some(text_document_params(&uri)),
                    self.timeout,
                )
                .await?;
            parse_pull_diagnostics(result)
        } else {
            self.wait_for_published(path, version, since).await?
        };

        let lines = &self.file(path)?.lines;
        Ok(items.iter().map(|item| item.to_checker(lines)).collect())
    }

    async fn hover_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Option<CheckerHover>, CheckerError> {
        let file = self.file(path)?;
        let params = position_params(&file.uri, file.lines.position(offset));
        let result = self
            .send_request("textDocument/hover", Some(params), self.timeout)
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(parse_hover(&result, &self.file(path)?.lines))
    }

    async fn completions_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Vec<CompletionItem>, CheckerError> {
        let file = self.file(path)?;
        let params = position_params(&file.uri, file.lines.position(offset));
        let result = self
            .send_request("textDocument/completion", Some(params), self.timeout)
            .await?;
        Ok(parse_completions(&result))
    }

    async fn definitions_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> Result<Vec<CheckerLocation>, CheckerError> {
        let file = self.file(path)?;
        let params = position_params(&file.uri, file.lines.position(offset));
        let result = self
            .send_request("textDocument/definition", Some(params), self.timeout)
            .await?;
        Ok(parse_locations(&result))
    }

    async fn close_file(&mut self, path: &Path) -> Result<(), CheckerError> {
        let Some(file) = self.files.remove(path) else {
            return Ok(());
        };
        self.send_notification("textDocument/didClose", Some(text_document_params(&file.uri)))
            .await
    }

    async fn shutdown(&mut self) {
        if let Ok(result) = self.send_request("shutdown", None, SHUTDOWN_TIMEOUT).await {
            tracing::trace!(?result, "Type checker acknowledged shutdown");
            let _ = self.send_notification("exit", None).await;
        }
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        if let Some(mut child) = self.child.take() {
            if time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await.is_err() {
                tracing::debug!("Type checker didn't exit in time, killing");
                let _ = child.kill().await;
            }
        }
        self.reader_handle.abort();
        let _ = time::timeout(SHUTDOWN_TIMEOUT, &mut self.writer_handle).await;
    }
}

/// Starts a [`ProxyChecker`] from each project's `[checker]` settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyFactory;

impl CheckerFactory for ProxyFactory {
    type Checker = ProxyChecker;

    async fn create(&self, settings: &ProjectSettings) -> Result<ProxyChecker, CheckerError> {
        ProxyChecker::start(settings.checker(), settings.root())
            .await
            .map_err(|e| {
                tracing::warn!(
                    root = %settings.root().display(),
                    "Failed to start type checker: {e:#}"
                );
                CheckerError::Start(format!("{e:#}"))
            })
    }
}

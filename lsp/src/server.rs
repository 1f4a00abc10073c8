//! The editor-facing language server.
//!
//! Frames are handled one at a time in arrival order, so document edits
//! reach each project's queue in the order the editor sent them.
//! Diagnostics are computed and pushed by a single publisher task that
//! takes requests in the same order, so an older set never overwrites a
//! newer one.

use std::collections::BTreeSet;
use std::mem;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use trellis_core::{CheckerFactory, ProjectError, ProjectHandle, TextEdit, Workspace};
use trellis_types::DocumentVersion;

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{
    INVALID_REQUEST, Incoming, REQUEST_FAILED, ResponseError, SERVER_NOT_INITIALIZED, classify,
    notification, path_to_uri, response, uri_to_path,
};
use crate::types::{
    DidChangeParams, DidCloseParams, DidOpenParams, GetIrParams, InitializeParams,
    TextDocumentPositionParams, completion_to_lsp, diagnostic_to_lsp, hover_to_lsp,
    location_to_lsp, server_capabilities,
};

const OUTGOING_CHANNEL_CAPACITY: usize = 256;

/// LSP `MessageType.Error`.
const MESSAGE_TYPE_ERROR: u8 = 1;

enum Phase<F> {
    Uninitialized(F),
    Running(Workspace<F>),
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// A diagnostics push, queued for the publisher.
enum Publication {
    /// Fresh diagnostics for these documents and every document sharing
    /// their backing modules.
    Refresh(ProjectHandle, Vec<PathBuf>),
    /// An empty set for a document the editor closed.
    Clear(PathBuf),
}

struct Server<F> {
    phase: Phase<F>,
    out: mpsc::Sender<Value>,
    publications: mpsc::Sender<Publication>,
    /// Documents the editor has open, republished after a config reload.
    open: BTreeSet<PathBuf>,
    shutdown_requested: bool,
}

/// Serve one editor session over `input`/`output` until `exit` or EOF.
/// Every project checker is started through `factory`.
pub async fn serve<R, W, F>(input: R, output: W, factory: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: CheckerFactory,
{
    let (out, out_rx) = mpsc::channel(OUTGOING_CHANNEL_CAPACITY);
    let writer = tokio::spawn(write_frames(output, out_rx));
    let (publications, publication_rx) = mpsc::channel(OUTGOING_CHANNEL_CAPACITY);
    let publisher = tokio::spawn(publish_in_order(publication_rx, out.clone()));
    let mut server = Server {
        phase: Phase::Uninitialized(factory),
        out,
        publications,
        open: BTreeSet::new(),
        shutdown_requested: false,
    };

    let mut reader = FrameReader::new(input);
    let result = loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => {
                if server.handle(frame).await == Flow::Exit {
                    break Ok(());
                }
            }
            Ok(None) => {
                tracing::info!("Client closed the connection");
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    if !server.shutdown_requested {
        tracing::warn!("Exiting without a shutdown request");
    }
    server.stop().await;
    drop(server);
    publisher.await.context("joining publisher task")?;
    writer.await.context("joining writer task")??;
    result
}

async fn write_frames<W: AsyncWrite + Unpin>(output: W, mut rx: mpsc::Receiver<Value>) -> Result<()> {
    let mut writer = FrameWriter::new(output);
    while let Some(frame) = rx.recv().await {
        writer.write_frame(&frame).await?;
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, ResponseError> {
    serde_json::from_value(params).map_err(|e| ResponseError::invalid_params(&e))
}

/// Project errors that only mean "not ours" become an empty result.
fn found<T>(result: Result<T, ProjectError>) -> Result<Option<T>, ResponseError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(
            e @ (ProjectError::NotOpen(_) | ProjectError::Unsupported(_) | ProjectError::Excluded(_)),
        ) => {
            tracing::debug!("Skipping request: {e}");
            Ok(None)
        }
        Err(e) => Err(ResponseError::new(REQUEST_FAILED, e.to_string())),
    }
}

/// The project serving `uri` and the document's path.
fn routed<F: CheckerFactory>(
    workspace: &Workspace<F>,
    uri: &str,
) -> Option<(ProjectHandle, PathBuf)> {
    let path = uri_to_path(uri)?;
    let handle = workspace.route(&path)?;
    Some((handle, path))
}

impl<F: CheckerFactory> Server<F> {
    async fn handle(&mut self, frame: Value) -> Flow {
        match classify(frame) {
            Some(Incoming::Request { id, method, params }) => {
                tracing::debug!(%method, "Client request");
                let result = self.request(&method, params).await;
                self.send(response(id, result)).await;
            }
            Some(Incoming::Notification { method, params }) => {
                if method == "exit" {
                    return Flow::Exit;
                }
                tracing::debug!(%method, "Client notification");
                self.notify(&method, params).await;
            }
            Some(Incoming::Response { .. }) => {
                tracing::trace!("Ignoring response from client");
            }
            None => tracing::warn!("Ignoring malformed frame from client"),
        }
        Flow::Continue
    }

    async fn send(&self, frame: Value) {
        if self.out.send(frame).await.is_err() {
            tracing::warn!("Client writer has stopped");
        }
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ResponseError> {
        match method {
            "initialize" => return self.initialize(params),
            "shutdown" => {
                self.shutdown_requested = true;
                self.stop().await;
                return Ok(Value::Null);
            }
            _ => {}
        }
        let workspace = match &self.phase {
            Phase::Running(workspace) => workspace,
            Phase::Uninitialized(_) => {
                return Err(ResponseError::new(
                    SERVER_NOT_INITIALIZED,
                    "server is not initialized",
                ));
            }
            Phase::ShutDown => {
                return Err(ResponseError::new(INVALID_REQUEST, "server is shutting down"));
            }
        };
        match method {
            "textDocument/hover" => hover(workspace, parse(params)?).await,
            "textDocument/completion" => completion(workspace, parse(params)?).await,
            "textDocument/definition" => definition(workspace, parse(params)?).await,
            "trellis/getIR" => debug_ir(workspace, parse(params)?).await,
            _ => Err(ResponseError::method_not_found(method)),
        }
    }

    fn initialize(&mut self, params: Value) -> Result<Value, ResponseError> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            parse(params)?
        };
        let phase = mem::replace(&mut self.phase, Phase::ShutDown);
        let Phase::Uninitialized(factory) = phase else {
            self.phase = phase;
            return Err(ResponseError::new(INVALID_REQUEST, "server is already initialized"));
        };

        let mut folders: Vec<PathBuf> = params
            .workspace_folders
            .unwrap_or_default()
            .iter()
            .filter_map(|folder| uri_to_path(&folder.uri))
            .collect();
        if folders.is_empty() {
            folders.extend(params.root_uri.as_deref().and_then(uri_to_path));
        }
        tracing::info!(?folders, "Initializing workspace");
        self.phase = Phase::Running(Workspace::new(factory, folders));
        Ok(server_capabilities())
    }

    /// Stop every project. Idempotent.
    async fn stop(&mut self) {
        if let Phase::Running(workspace) = &mut self.phase {
            workspace.shutdown().await;
        }
        self.phase = Phase::ShutDown;
        self.open.clear();
    }

    async fn notify(&mut self, method: &str, params: Value) {
        if !matches!(self.phase, Phase::Running(_)) {
            tracing::debug!(%method, "Dropping notification outside a running session");
            return;
        }
        let result = match method {
            "textDocument/didOpen" => match parse(params) {
                Ok(params) => self.did_open(params).await,
                Err(e) => Err(e),
            },
            "textDocument/didChange" => match parse(params) {
                Ok(params) => self.did_change(params).await,
                Err(e) => Err(e),
            },
            "textDocument/didClose" => match parse(params) {
                Ok(params) => self.did_close(params).await,
                Err(e) => Err(e),
            },
            "workspace/didChangeConfiguration" | "workspace/didChangeWatchedFiles" => {
                self.reload().await;
                Ok(())
            }
            _ => {
                tracing::trace!(%method, "Ignoring notification");
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(%method, "Failed to handle notification: {}", e.message);
        }
    }

    fn workspace(&mut self) -> Option<&mut Workspace<F>> {
        match &mut self.phase {
            Phase::Running(workspace) => Some(workspace),
            _ => None,
        }
    }

    async fn did_open(&mut self, params: DidOpenParams) -> Result<(), ResponseError> {
        let document = params.text_document;
        let Some(path) = uri_to_path(&document.uri) else {
            return Ok(());
        };
        let Some(workspace) = self.workspace() else {
            return Ok(());
        };
        let handle = match workspace.project_for(&path).await {
            Ok(handle) => handle,
            Err(e) => {
                let message = format!("Trellis could not start a project for {}: {e}", path.display());
                self.send(notification(
                    "window/showMessage",
                    json!({ "type": MESSAGE_TYPE_ERROR, "message": message }),
                ))
                .await;
                return Err(ResponseError::new(REQUEST_FAILED, e.to_string()));
            }
        };
        let opened = handle
            .open(path.clone(), DocumentVersion::new(document.version), document.text)
            .await;
        if found(opened)?.is_none() {
            return Ok(());
        }
        self.open.insert(path.clone());
        self.publish(handle, vec![path]).await;
        Ok(())
    }

    async fn did_change(&mut self, params: DidChangeParams) -> Result<(), ResponseError> {
        let Some(workspace) = self.workspace() else {
            return Ok(());
        };
        let Some((handle, path)) = routed(workspace, &params.text_document.uri) else {
            return Ok(());
        };
        let edits = params
            .content_changes
            .into_iter()
            .map(|change| match change.range {
                Some(range) => TextEdit::ranged(range, change.text),
                None => TextEdit::full(change.text),
            })
            .collect();
        let changed = handle
            .change(
                path.clone(),
                DocumentVersion::new(params.text_document.version),
                edits,
            )
            .await;
        if found(changed)?.is_some() {
            self.publish(handle, vec![path]).await;
        }
        Ok(())
    }

    async fn did_close(&mut self, params: DidCloseParams) -> Result<(), ResponseError> {
        let Some(workspace) = self.workspace() else {
            return Ok(());
        };
        let Some((handle, path)) = routed(workspace, &params.text_document.uri) else {
            return Ok(());
        };
        let related = handle
            .related_documents(path.clone())
            .await
            .unwrap_or_default();
        found(handle.close(path.clone()).await)?;
        self.open.remove(&path);

        self.enqueue(Publication::Clear(path)).await;
        // Documents that shared the closed one's backing module changed too.
        self.publish(handle, related).await;
        Ok(())
    }

    async fn reload(&mut self) {
        let Some(workspace) = self.workspace() else {
            return;
        };
        workspace.reload().await;
        let open: Vec<PathBuf> = self.open.iter().cloned().collect();
        for path in open {
            if let Some(handle) = self.workspace().and_then(|workspace| workspace.route(&path)) {
                self.publish(handle, vec![path]).await;
            }
        }
    }

    async fn publish(&self, handle: ProjectHandle, paths: Vec<PathBuf>) {
        if !paths.is_empty() {
            self.enqueue(Publication::Refresh(handle, paths)).await;
        }
    }

    async fn enqueue(&self, publication: Publication) {
        if self.publications.send(publication).await.is_err() {
            tracing::debug!("Publisher has stopped; dropping diagnostics");
        }
    }
}

/// Push diagnostics one publication at a time, in request order.
async fn publish_in_order(mut rx: mpsc::Receiver<Publication>, out: mpsc::Sender<Value>) {
    while let Some(publication) = rx.recv().await {
        let frames = match publication {
            Publication::Refresh(handle, paths) => refreshed(&handle, paths).await,
            Publication::Clear(path) => diagnostics_frame(&path, Vec::new()).into_iter().collect(),
        };
        for frame in frames {
            if out.send(frame).await.is_err() {
                return;
            }
        }
    }
}

async fn refreshed(handle: &ProjectHandle, paths: Vec<PathBuf>) -> Vec<Value> {
    let mut targets = BTreeSet::new();
    for path in paths {
        let related = handle
            .related_documents(path.clone())
            .await
            .unwrap_or_default();
        targets.insert(path);
        targets.extend(related);
    }
    let mut frames = Vec::new();
    for path in targets {
        let diagnostics = match handle.diagnostics(path.clone()).await {
            Ok(diagnostics) => diagnostics,
            Err(ProjectError::NotOpen(_) | ProjectError::Closed) => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to compute diagnostics: {e}");
                continue;
            }
        };
        let items = diagnostics.iter().map(diagnostic_to_lsp).collect();
        frames.extend(diagnostics_frame(&path, items));
    }
    frames
}

fn diagnostics_frame(path: &Path, items: Vec<Value>) -> Option<Value> {
    let uri = path_to_uri(path).ok()?;
    Some(notification(
        "textDocument/publishDiagnostics",
        json!({ "uri": uri.as_str(), "diagnostics": items }),
    ))
}

// ── Queries ─────────────────────────────────────────────────────────────

async fn hover<F: CheckerFactory>(
    workspace: &Workspace<F>,
    params: TextDocumentPositionParams,
) -> Result<Value, ResponseError> {
    let Some((handle, path)) = routed(workspace, &params.text_document.uri) else {
        return Ok(Value::Null);
    };
    let hover = found(handle.hover(path, params.position).await)?.flatten();
    Ok(hover.map_or(Value::Null, |hover| hover_to_lsp(&hover)))
}

async fn completion<F: CheckerFactory>(
    workspace: &Workspace<F>,
    params: TextDocumentPositionParams,
) -> Result<Value, ResponseError> {
    let Some((handle, path)) = routed(workspace, &params.text_document.uri) else {
        return Ok(Value::Null);
    };
    let items = found(handle.completions(path, params.position).await)?.unwrap_or_default();
    Ok(Value::Array(items.iter().map(completion_to_lsp).collect()))
}

async fn definition<F: CheckerFactory>(
    workspace: &Workspace<F>,
    params: TextDocumentPositionParams,
) -> Result<Value, ResponseError> {
    let Some((handle, path)) = routed(workspace, &params.text_document.uri) else {
        return Ok(Value::Null);
    };
    let locations = found(handle.definitions(path, params.position).await)?.unwrap_or_default();
    Ok(Value::Array(
        locations.iter().filter_map(location_to_lsp).collect(),
    ))
}

/// `trellis/getIR`: the backing module of a document and where it lives.
async fn debug_ir<F: CheckerFactory>(
    workspace: &Workspace<F>,
    params: GetIrParams,
) -> Result<Value, ResponseError> {
    let Some((handle, path)) = routed(workspace, &params.uri) else {
        return Ok(Value::Null);
    };
    let Some(ir) = found(handle.debug_ir(path).await)? else {
        return Ok(Value::Null);
    };
    let uri = path_to_uri(&ir.virtual_path)
        .map_err(|e| ResponseError::new(REQUEST_FAILED, e.to_string()))?;
    Ok(json!({ "contents": ir.contents, "uri": uri.as_str() }))
}

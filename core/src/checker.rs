//! The external type checker, as the orchestrator sees it.
//!
//! Everything crossing this boundary is in synthetic coordinates: paths are
//! virtual paths of backing modules and spans are byte offsets into the text
//! last synced for that path.

use std::future::Future;
use std::path::{Path, PathBuf};

use trellis_types::{CompletionItem, DiagnosticTag, Range, Severity, Span};

/// A diagnostic as the checker reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerDiagnostic {
    pub span: Span,
    pub severity: Severity,
    pub code: Option<u32>,
    pub message: String,
    pub tags: Vec<DiagnosticTag>,
}

impl CheckerDiagnostic {
    #[must_use]
    pub fn error(span: Span, code: u32, message: impl Into<String>) -> Self {
        Self {
            span,
            severity: Severity::Error,
            code: Some(code),
            message: message.into(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerHover {
    pub contents: String,
    pub span: Option<Span>,
}

/// A definition target. The file may be a backing module or any other file
/// the checker knows about, so it is addressed in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerLocation {
    pub path: PathBuf,
    pub range: Range,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("type checker is not running")]
    Unavailable,
    #[error("failed to start type checker: {0}")]
    Start(String),
    #[error("type checker timed out on {method}")]
    Timeout { method: &'static str },
    #[error("type checker failed {method}: {message}")]
    Request {
        method: &'static str,
        message: String,
    },
    #[error("type checker protocol error: {0}")]
    Protocol(String),
}

/// An external TypeScript checker.
///
/// One instance serves one project and is only ever called from that
/// project's request queue, so implementations may keep per-file state
/// without locking.
pub trait TypeChecker: Send + 'static {
    /// Make `text` the current contents of `path`.
    fn sync_file(
        &mut self,
        path: &Path,
        text: &str,
    ) -> impl Future<Output = Result<(), CheckerError>> + Send;

    /// Diagnostics for `path`, whose contents are `text`.
    fn check_file(
        &mut self,
        path: &Path,
        text: &str,
    ) -> impl Future<Output = Result<Vec<CheckerDiagnostic>, CheckerError>> + Send;

    fn hover_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> impl Future<Output = Result<Option<CheckerHover>, CheckerError>> + Send;

    fn completions_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<CompletionItem>, CheckerError>> + Send;

    fn definitions_at(
        &mut self,
        path: &Path,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<CheckerLocation>, CheckerError>> + Send;

    /// Forget `path`; it is no longer backed by any open document.
    fn close_file(&mut self, path: &Path) -> impl Future<Output = Result<(), CheckerError>> + Send;

    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

//! Shared test utilities and fixtures
//!
//! A scripted [`TypeChecker`] that reports diagnostics by locating text in
//! the backing module it was given.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use trellis_config::ProjectSettings;
use trellis_core::{
    CheckerDiagnostic, CheckerError, CheckerFactory, CheckerHover, CheckerLocation, Project,
    TypeChecker,
};
use trellis_types::{CompletionItem, CompletionKind, LineIndex, Range, Span};

/// Report `code` at `target`, found inside the first occurrence of
/// `context` in the backing module.
#[derive(Debug, Clone)]
pub struct Report {
    pub context: String,
    pub target: String,
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Definition {
    /// A location inside a synced file, found by text.
    InFile { path: PathBuf, needle: String },
    /// A location in a file the bridge knows nothing about.
    External { path: PathBuf, range: Range },
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub files: HashMap<PathBuf, String>,
    pub sync_count: usize,
    pub check_count: usize,
    pub closed: Vec<PathBuf>,
    pub reports: Vec<Report>,
    pub definitions: Vec<Definition>,
    pub completions: Vec<CompletionItem>,
    pub fail_checks: bool,
    pub shut_down: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeChecker {
    state: Arc<Mutex<FakeState>>,
}

impl FakeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn report(&self, context: &str, target: &str, code: u32, message: &str) {
        self.state().reports.push(Report {
            context: context.to_string(),
            target: target.to_string(),
            code,
            message: message.to_string(),
        });
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.state().files.get(path).cloned()
    }
}

fn locate(text: &str, context: &str, target: &str) -> Option<Span> {
    let start = text.find(context)?;
    let offset = text[start..start + context.len()].find(target)?;
    Some(Span::new(start + offset, start + offset + target.len()))
}

/// The identifier around `offset`, as a span.
fn word_at(text: &str, offset: usize) -> Option<Span> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let start = text[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map_or(offset, |(i, _)| i);
    let end = text[offset..]
        .char_indices()
        .find(|(_, c)| !is_word(*c))
        .map_or(text.len(), |(i, _)| offset + i);
    (start < end).then(|| Span::new(start, end))
}

impl TypeChecker for FakeChecker {
    async fn sync_file(&mut self, path: &Path, text: &str) -> Result<(), CheckerError> {
        let mut state = self.state();
        state.sync_count += 1;
        state.files.insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    async fn check_file(
        &mut self,
        path: &Path,
        text: &str,
    ) -> Result<Vec<CheckerDiagnostic>, CheckerError> {
        let mut state = self.state();
        state.check_count += 1;
        if state.fail_checks {
            return Err(CheckerError::Timeout {
                method: "textDocument/diagnostic",
            });
        }
        assert_eq!(
            state.files.get(path).map(String::as_str),
            Some(text),
            "checked text must match the last sync"
        );
        Ok(state
            .reports
            .iter()
            .filter_map(|report| {
                let span = locate(text, &report.context, &report.target)?;
                Some(CheckerDiagnostic::error(span, report.code, &report.message))
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
        Ok(word_at(text, offset).map(|span| CheckerHover {
            contents: format!("(property) {}", span.slice(text)),
            span: Some(span),
        }))
    }

    async fn completions_at(
        &mut self,
        _path: &Path,
        _offset: usize,
    ) -> Result<Vec<CompletionItem>, CheckerError> {
        Ok(self.state().completions.clone())
    }

    async fn definitions_at(
        &mut self,
        _path: &Path,
        _offset: usize,
    ) -> Result<Vec<CheckerLocation>, CheckerError> {
        let state = self.state();
        Ok(state
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::InFile { path, needle } => {
                    let text = state.files.get(path)?;
                    let start = text.find(needle.as_str())?;
                    let range = LineIndex::new(text).range(Span::new(start, start + needle.len()));
                    Some(CheckerLocation {
                        path: path.clone(),
                        range,
                    })
                }
                Definition::External { path, range } => Some(CheckerLocation {
                    path: path.clone(),
                    range: *range,
                }),
            })
            .collect())
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

/// Hands out clones of one fake so tests can script and inspect it.
#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    pub checker: FakeChecker,
    pub created: Arc<Mutex<Vec<PathBuf>>>,
}

impl CheckerFactory for FakeFactory {
    type Checker = FakeChecker;

    async fn create(&self, settings: &ProjectSettings) -> Result<FakeChecker, CheckerError> {
        self.created
            .lock()
            .unwrap()
            .push(settings.root().to_path_buf());
        Ok(self.checker.clone())
    }
}

pub fn project(checker: &FakeChecker) -> Project<FakeChecker> {
    Project::new(ProjectSettings::defaults("/work/app"), checker.clone())
}

pub fn completion(label: &str) -> CompletionItem {
    CompletionItem::new(label, CompletionKind::Property)
}

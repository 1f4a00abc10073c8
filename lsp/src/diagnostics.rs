//! Diagnostics store: the latest `publishDiagnostics` per file from the
//! external checker.
//!
//! The proxy waits on this store (through a `watch` channel) for a publish
//! newer than its last sync of a file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::LspDiagnostic;

#[derive(Debug, Clone)]
struct Published {
    /// Document version the server says it checked, when it says.
    version: Option<i32>,
    /// Store-wide sequence number of this publish.
    sequence: u64,
    items: Vec<LspDiagnostic>,
}

#[derive(Debug, Default)]
pub(crate) struct DiagnosticsStore {
    files: HashMap<PathBuf, Published>,
    sequence: u64,
}

impl DiagnosticsStore {
    pub fn update(&mut self, path: PathBuf, version: Option<i32>, items: Vec<LspDiagnostic>) {
        self.sequence += 1;
        self.files.insert(
            path,
            Published {
                version,
                sequence: self.sequence,
                items,
            },
        );
    }

    /// Sequence number of the most recent publish for any file.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Diagnostics for `path` computed after the state described by
    /// `version` and `since` (the store sequence when that version was sent).
    ///
    /// A versioned publish is fresh when it matches `version`; an
    /// unversioned one when it arrived after `since`.
    pub fn fresh(&self, path: &Path, version: i32, since: u64) -> Option<&[LspDiagnostic]> {
        let published = self.files.get(path)?;
        let fresh = match published.version {
            Some(published_version) => published_version >= version,
            None => published.sequence > since,
        };
        fresh.then_some(published.items.as_slice())
    }
}

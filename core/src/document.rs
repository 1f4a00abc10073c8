//! Open documents and the edits applied to them.

use std::path::{Path, PathBuf};

use trellis_types::{DocumentVersion, LineIndex, Range};

/// A change to a document's text. Without a range, `text` replaces the whole
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Option<Range>,
    pub text: String,
}

impl TextEdit {
    #[must_use]
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn ranged(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    version: DocumentVersion,
    lines: LineIndex,
}

impl Document {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, version: DocumentVersion, text: &str) -> Self {
        Self {
            path: path.into(),
            version,
            lines: LineIndex::new(text),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn version(&self) -> DocumentVersion {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.lines.text()
    }

    #[must_use]
    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    /// Apply `edits` in order, each against the text left by the previous
    /// one.
    pub fn apply(&mut self, version: DocumentVersion, edits: &[TextEdit]) {
        for edit in edits {
            let text = match edit.range {
                None => edit.text.clone(),
                Some(range) => {
                    let span = self.lines.span(range);
                    let current = self.lines.text();
                    let mut text =
                        String::with_capacity(current.len() - span.len() + edit.text.len());
                    text.push_str(&current[..span.start]);
                    text.push_str(&edit.text);
                    text.push_str(&current[span.end..]);
                    text
                }
            };
            self.lines = LineIndex::new(&text);
        }
        self.version = version;
    }
}

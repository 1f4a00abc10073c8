//! Results of position queries (hover, completion, definition).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Range, Span};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hover {
    pub contents: String,
    /// Original span the hover applies to, when the checker reported one.
    pub span: Option<Span>,
    pub range: Option<Range>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionKind {
    Variable,
    Property,
    Function,
    Method,
    Class,
    Keyword,
    Module,
    Other,
}

impl CompletionKind {
    /// Map an LSP `CompletionItemKind` number.
    #[must_use]
    pub fn from_lsp(value: u64) -> Self {
        match value {
            2 => Self::Method,
            3 => Self::Function,
            5 | 10 => Self::Property,
            6 | 21 => Self::Variable,
            7 => Self::Class,
            9 => Self::Module,
            14 => Self::Keyword,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn to_lsp(self) -> u8 {
        match self {
            Self::Method => 2,
            Self::Function => 3,
            Self::Property => 10,
            Self::Variable => 6,
            Self::Class => 7,
            Self::Module => 9,
            Self::Keyword => 14,
            Self::Other => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
}

impl CompletionItem {
    #[must_use]
    pub fn new(label: impl Into<String>, kind: CompletionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
        }
    }
}

/// A location in some file on disk, in that file's own coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: PathBuf,
    /// Byte span, known only when the bridge holds the file's text.
    pub span: Option<Span>,
    pub range: Range,
}

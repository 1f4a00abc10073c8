//! Core domain types for Trellis.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the bridge: the parser, the
//! generator, the orchestrator and the protocol front end.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod diagnostic;
mod ids;
mod query;
mod text;

pub use diagnostic::{Diagnostic, DiagnosticTag, Severity};
pub use ids::{DocumentVersion, SourceId};
pub use query::{CompletionItem, CompletionKind, Hover, Location};
pub use text::{LineIndex, Position, Range};

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Spans
// ============================================================================

/// A half-open byte range `[start, end)` into some text.
///
/// Which text a span refers to (an original document or a synthetic backing
/// module) is decided by the value that owns it; the span itself is just
/// offsets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "span start must not exceed end");
        Self { start, end }
    }

    /// A zero-width span at `offset`.
    #[must_use]
    pub const fn empty(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Whether `other` lies entirely inside this span.
    #[must_use]
    pub const fn contains(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[must_use]
    pub const fn contains_offset(self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether the two spans share at least one byte.
    ///
    /// A zero-width span overlaps a span that strictly contains its offset.
    #[must_use]
    pub const fn overlaps(self, other: Span) -> bool {
        if other.is_empty() {
            return self.start < other.start && other.start < self.end;
        }
        if self.is_empty() {
            return other.start < self.start && self.start < other.end;
        }
        self.start < other.end && other.start < self.end
    }

    /// The smallest span covering both.
    #[must_use]
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    #[must_use]
    pub const fn shifted(self, delta: usize) -> Span {
        Span {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    /// The text this span selects, or `""` when it does not fit `text`.
    #[must_use]
    pub fn slice(self, text: &str) -> &str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

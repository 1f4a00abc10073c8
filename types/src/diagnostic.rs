//! Client-facing diagnostics.
//!
//! A [`Diagnostic`] is always expressed in original-document coordinates.
//! Checker output in synthetic coordinates never reaches this type.

use serde::{Deserialize, Serialize};

use crate::{Range, Span};

/// Severity level for a diagnostic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl Severity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range.
    /// Callers decide the fallback policy.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_lsp(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// Classification tags. Empty unless a checker supplies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticTag {
    Unnecessary = 1,
    Deprecated = 2,
}

impl DiagnosticTag {
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Unnecessary),
            2 => Some(Self::Deprecated),
            _ => None,
        }
    }
}

/// A diagnostic in original-document coordinates.
///
/// Fields are private; [`Diagnostic::new`] is the single construction path and
/// the `with_*` builders fill the optional parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    span: Span,
    range: Range,
    severity: Severity,
    message: String,
    /// Checker error code (e.g. 2554). `None` for bridge-originated problems.
    code: Option<u32>,
    /// Id of the augmentation rule that rewrote this diagnostic, if any.
    rule: Option<&'static str>,
    tags: Vec<DiagnosticTag>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(span: Span, range: Range, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            span,
            range,
            severity,
            message: message.into(),
            code: None,
            rule: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: &'static str) -> Self {
        self.rule = Some(rule);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<DiagnosticTag>) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// First line of the message.
    #[must_use]
    pub fn primary_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    #[must_use]
    pub fn code(&self) -> Option<u32> {
        self.code
    }

    #[must_use]
    pub fn rule(&self) -> Option<&'static str> {
        self.rule
    }

    #[must_use]
    pub fn is_augmented(&self) -> bool {
        self.rule.is_some()
    }

    #[must_use]
    pub fn tags(&self) -> &[DiagnosticTag] {
        &self.tags
    }

    /// `trellis:ts(<code>)` for checker diagnostics, `trellis` otherwise.
    #[must_use]
    pub fn source(&self) -> String {
        match self.code {
            Some(code) => format!("trellis:ts({code})"),
            None => String::from("trellis"),
        }
    }
}

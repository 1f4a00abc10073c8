use trellis_types::Span;

/// A template grammar violation at `span` (original-document coordinates).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
}

impl ParseError {
    #[must_use]
    pub fn new(span: Span, kind: ParseErrorKind) -> Self {
        Self { span, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Unterminated mustache")]
    UnterminatedMustache,
    #[error("Unterminated comment")]
    UnterminatedComment,
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unterminated tag <{0}>")]
    UnterminatedTag(String),
    #[error("Unterminated <template> region")]
    UnterminatedTemplate,
    #[error("Block '{expected}' was closed by '{found}'")]
    MismatchedBlockClose { expected: String, found: String },
    #[error("Element <{expected}> was closed by </{found}>")]
    MismatchedElementClose { expected: String, found: String },
    #[error("Unclosed block '{0}'")]
    UnclosedBlock(String),
    #[error("Unclosed element <{0}>")]
    UnclosedElement(String),
    #[error("Invalid path '{0}'")]
    InvalidPath(String),
    #[error("Malformed block params")]
    MalformedBlockParams,
    #[error("Unexpected {0}")]
    UnexpectedToken(String),
}

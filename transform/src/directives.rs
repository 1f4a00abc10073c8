//! `{{! @trellis-... }}` comments that control diagnostic reporting.

use trellis_syntax::Template;
use trellis_syntax::ast::{CommentKind, Node};
use trellis_types::{SourceId, Span};

use crate::module::GenerationIssue;

const PREFIX: &str = "@trellis-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    /// Suppress diagnostics on the next node.
    Ignore,
    /// Like `Ignore`, but it is itself an error when nothing is suppressed.
    ExpectError,
    /// Suppress every diagnostic in the region.
    NoCheck,
}

impl DirectiveKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ignore" => Some(Self::Ignore),
            "expect-error" => Some(Self::ExpectError),
            "nocheck" => Some(Self::NoCheck),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ignore => "@trellis-ignore",
            Self::ExpectError => "@trellis-expect-error",
            Self::NoCheck => "@trellis-nocheck",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub source: SourceId,
    /// The comment itself.
    pub comment: Span,
    /// Original text whose diagnostics the directive applies to.
    pub target: Span,
}

impl Directive {
    /// Whether a diagnostic at `span` of `source` falls under this directive.
    #[must_use]
    pub fn covers(&self, source: SourceId, span: Span) -> bool {
        source == self.source
            && !self.target.is_empty()
            && (self.target.contains(span) || self.target.overlaps(span))
    }
}

pub(crate) fn collect(
    template: &Template,
    region: Span,
    source: SourceId,
    directives: &mut Vec<Directive>,
    issues: &mut Vec<GenerationIssue>,
) {
    let mut collector = Collector {
        region,
        source,
        directives,
        issues,
    };
    collector.nodes(&template.body);
}

struct Collector<'a> {
    region: Span,
    source: SourceId,
    directives: &'a mut Vec<Directive>,
    issues: &'a mut Vec<GenerationIssue>,
}

impl Collector<'_> {
    fn nodes(&mut self, nodes: &[Node]) {
        for (i, node) in nodes.iter().enumerate() {
            match node {
                Node::Comment(comment) if comment.kind == CommentKind::Mustache => {
                    let Some(name) = directive_name(&comment.value) else {
                        continue;
                    };
                    let Some(kind) = DirectiveKind::from_name(name) else {
                        self.issues.push(GenerationIssue::new(
                            self.source,
                            comment.span,
                            format!("Unknown directive '{PREFIX}{name}'."),
                        ));
                        continue;
                    };
                    let target = match kind {
                        DirectiveKind::NoCheck => self.region,
                        DirectiveKind::Ignore | DirectiveKind::ExpectError => nodes[i + 1..]
                            .iter()
                            .find(|next| !next.is_trivia())
                            .map_or(Span::empty(comment.span.end), Node::span),
                    };
                    self.directives.push(Directive {
                        kind,
                        source: self.source,
                        comment: comment.span,
                        target,
                    });
                }
                Node::Block(block) => {
                    self.nodes(&block.program.body);
                    if let Some(inverse) = &block.inverse {
                        self.nodes(&inverse.body);
                    }
                }
                Node::Element(element) => self.nodes(&element.children),
                _ => {}
            }
        }
    }
}

fn directive_name(comment: &str) -> Option<&str> {
    let rest = comment.trim().strip_prefix(PREFIX)?;
    Some(rest.split_whitespace().next().unwrap_or_default())
}

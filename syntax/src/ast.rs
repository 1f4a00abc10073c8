//! Template AST.
//!
//! Every node carries its span in original-document coordinates (the parser's
//! `base_offset` is already applied). Trees are built fresh per parse and are
//! never mutated afterwards.

use trellis_types::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub span: Span,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Comment(CommentNode),
    Mustache(MustacheNode),
    Block(BlockNode),
    Element(ElementNode),
    Partial(PartialNode),
}

impl Node {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Node::Text(n) => n.span,
            Node::Comment(n) => n.span,
            Node::Mustache(n) => n.span,
            Node::Block(n) => n.span,
            Node::Element(n) => n.span,
            Node::Partial(n) => n.span,
        }
    }

    /// Whitespace-only text and comments produce no code.
    #[must_use]
    pub fn is_trivia(&self) -> bool {
        match self {
            Node::Text(text) => text.value.trim().is_empty(),
            Node::Comment(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub span: Span,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// `<!-- ... -->`
    Html,
    /// `{{! ... }}` or `{{!-- ... --}}`
    Mustache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentNode {
    pub span: Span,
    pub kind: CommentKind,
    /// Comment text without its delimiters.
    pub value: String,
}

/// `{{callee params... key=value...}}` or `{{{ ... }}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MustacheNode {
    pub span: Span,
    pub call: Call,
    /// Triple-stash: output is not HTML-escaped.
    pub trusted: bool,
}

/// A callee with its arguments, shared by mustaches, blocks, sub-expressions
/// and element modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// From the start of the callee to the end of the last argument.
    pub span: Span,
    pub callee: Expression,
    pub params: Vec<Expression>,
    pub hash: Hash,
}

impl Call {
    #[must_use]
    pub fn has_arguments(&self) -> bool {
        !self.params.is_empty() || !self.hash.pairs.is_empty()
    }

    /// Span covering every positional and named argument, if any.
    #[must_use]
    pub fn arguments_span(&self) -> Option<Span> {
        let first = self
            .params
            .first()
            .map(Expression::span)
            .or_else(|| self.hash.pairs.first().map(|p| p.span))?;
        let last = self
            .hash
            .pairs
            .last()
            .map(|p| p.span)
            .or_else(|| self.params.last().map(Expression::span))?;
        Some(first.cover(last))
    }

    /// The callee as a bare identifier, when it is one (`if`, `yield`, ...).
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        match &self.callee {
            Expression::Path(path) => path.as_simple_name(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hash {
    pub span: Span,
    pub pairs: Vec<HashPair>,
}

impl Hash {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.pairs.iter().find(|p| p.key == key).map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub span: Span,
    pub key: String,
    pub key_span: Span,
    pub value: Expression,
}

/// `{{#callee ... as |a b|}} program {{else}} inverse {{/callee}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub span: Span,
    pub call: Call,
    pub program: Block,
    pub inverse: Option<Block>,
    /// Produced by `{{else callee ...}}`; closed by the enclosing block.
    pub chained: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub span: Span,
    pub params: Vec<BlockParam>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockParam {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub span: Span,
    pub tag: String,
    pub tag_span: Span,
    pub attributes: Vec<Attribute>,
    /// `@name=...` arguments, in source order.
    pub args: Vec<Attribute>,
    pub modifiers: Vec<ElementModifier>,
    /// Span of `...attributes`, when present.
    pub splattributes: Option<Span>,
    pub block_params: Vec<BlockParam>,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

impl ElementNode {
    /// `<:name>` named block inside a component invocation.
    #[must_use]
    pub fn is_named_block(&self) -> bool {
        self.tag.starts_with(':')
    }

    /// Tags that start with an uppercase letter, `@`, `this.` or contain a
    /// dot refer to values rather than HTML elements.
    #[must_use]
    pub fn is_component(&self) -> bool {
        let first = self.tag.chars().next();
        first.is_some_and(|c| c.is_ascii_uppercase() || c == '@')
            || self.tag.starts_with("this.")
            || (self.tag.contains('.') && !self.is_named_block())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub span: Span,
    /// Attribute name; for arguments, without the leading `@`.
    pub name: String,
    pub name_span: Span,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// `<input disabled>`
    Valueless,
    /// `class="static"` or `type=text`
    Text(TextNode),
    /// `value={{this.x}}`
    Mustache(MustacheNode),
    /// `class="a {{b}} c"`
    Concat(ConcatValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatValue {
    pub span: Span,
    pub parts: Vec<ConcatPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConcatPart {
    Text(TextNode),
    Mustache(MustacheNode),
}

/// `{{on "click" this.go}}` in element position.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementModifier {
    pub span: Span,
    pub call: Call,
}

/// `{{> name}}`. Parsed so the error is precise; never lowered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialNode {
    pub span: Span,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Path(PathExpression),
    Literal(Literal),
    SubExpression(Box<SubExpression>),
}

impl Expression {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Expression::Path(p) => p.span,
            Expression::Literal(l) => l.span,
            Expression::SubExpression(s) => s.span,
        }
    }

    #[must_use]
    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Expression::Literal(Literal {
                value: LiteralValue::String(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }
}

/// `(callee params... key=value...)`
#[derive(Debug, Clone, PartialEq)]
pub struct SubExpression {
    pub span: Span,
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    pub span: Span,
    pub head: PathHead,
    pub tail: Vec<PathSegment>,
}

impl PathExpression {
    /// The head name when the path is a single plain variable.
    #[must_use]
    pub fn as_simple_name(&self) -> Option<&str> {
        match &self.head {
            PathHead::Var { name, .. } if self.tail.is_empty() => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathHead {
    /// `this`
    This { span: Span },
    /// `@name`; `name` excludes the `@`.
    Arg { name: String, span: Span },
    /// A free variable, later classified as local or global.
    Var { name: String, span: Span },
}

impl PathHead {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            PathHead::This { span } | PathHead::Arg { span, .. } | PathHead::Var { span, .. } => {
                *span
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub span: Span,
    pub value: LiteralValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    String(String),
    /// Source text of the number, e.g. `-1.5`.
    Number(String),
    Boolean(bool),
    Null,
    Undefined,
}

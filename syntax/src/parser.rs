//! Recursive-descent parser for the template DSL.
//!
//! The parser works on one region's text and offsets every span by
//! `base_offset`, so the tree is expressed in the coordinates of the document
//! the region came from. There is no state shared between calls.

use trellis_types::Span;

use crate::ast::{
    AttrValue, Attribute, Block, BlockNode, BlockParam, Call, CommentKind, CommentNode,
    ConcatPart, ConcatValue, ElementModifier, ElementNode, Expression, Hash, HashPair, Literal,
    LiteralValue, MustacheNode, Node, PartialNode, PathExpression, PathHead, PathSegment,
    SubExpression, Template, TextNode,
};
use crate::error::{ParseError, ParseErrorKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Parse template text that starts at `base_offset` in its document.
pub fn parse(source: &str, base_offset: usize) -> Result<Template, ParseError> {
    let mut parser = Parser {
        src: source,
        pos: 0,
        base: base_offset,
    };
    let (body, stop) = parser.parse_children()?;
    match stop {
        Stop::Eof => Ok(Template {
            span: parser.span(0, source.len()),
            body,
        }),
        Stop::Else => Err(parser.error_here(ParseErrorKind::UnexpectedToken(
            "'else' outside of a block".into(),
        ))),
        Stop::BlockClose => Err(parser.error_here(ParseErrorKind::UnexpectedToken(
            "block close without a matching block".into(),
        ))),
        Stop::ElementClose => Err(parser.error_here(ParseErrorKind::UnexpectedToken(
            "closing tag without a matching element".into(),
        ))),
    }
}

/// Why a run of children ended. The parser is left at the start of the
/// token that caused the stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    Else,
    BlockClose,
    ElementClose,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    base: usize,
}

fn is_id_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-')
}

impl<'a> Parser<'a> {
    // ── Cursor ──────────────────────────────────────────────────────────

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance_char();
        }
        &self.src[start..self.pos]
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.base + start, self.base + end)
    }

    fn error(&self, start: usize, end: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.span(start, end), kind)
    }

    fn error_here(&self, kind: ParseErrorKind) -> ParseError {
        let width = self.peek().map_or(0, char::len_utf8);
        self.error(self.pos, self.pos + width, kind)
    }

    fn unexpected_here(&self) -> ParseError {
        let what = match self.peek() {
            Some(c) => format!("'{c}'"),
            None => String::from("end of input"),
        };
        self.error_here(ParseErrorKind::UnexpectedToken(what))
    }

    /// Local offset of an already-built span.
    fn local(&self, span: Span) -> (usize, usize) {
        (span.start - self.base, span.end - self.base)
    }

    // ── Content ─────────────────────────────────────────────────────────

    fn parse_children(&mut self) -> Result<(Vec<Node>, Stop), ParseError> {
        let mut nodes = Vec::new();
        loop {
            if self.at_eof() {
                return Ok((nodes, Stop::Eof));
            }
            if self.starts_with("{{") {
                if let Some(stop) = self.peek_mustache_stop() {
                    return Ok((nodes, stop));
                }
                nodes.push(self.parse_mustache_statement()?);
            } else if self.starts_with("</") {
                return Ok((nodes, Stop::ElementClose));
            } else if self.starts_with("<!--") {
                nodes.push(self.parse_html_comment()?);
            } else if self.at_element_start() {
                nodes.push(Node::Element(self.parse_element()?));
            } else {
                nodes.push(Node::Text(self.parse_text()));
            }
        }
    }

    /// `{{/...}}`, `{{else ...}}` and `{{^}}` end the current run of children.
    fn peek_mustache_stop(&self) -> Option<Stop> {
        let inner = self.rest().strip_prefix("{{")?;
        let inner = inner.strip_prefix('~').unwrap_or(inner).trim_start();
        if inner.starts_with('/') {
            return Some(Stop::BlockClose);
        }
        if let Some(after) = inner.strip_prefix("else")
            && !after.chars().next().is_some_and(is_id_char)
        {
            return Some(Stop::Else);
        }
        if let Some(after) = inner.strip_prefix('^') {
            let after = after.trim_start();
            let after = after.strip_prefix('~').unwrap_or(after);
            if after.starts_with("}}") {
                return Some(Stop::Else);
            }
        }
        None
    }

    fn at_element_start(&self) -> bool {
        let mut chars = self.rest().chars();
        chars.next() == Some('<')
            && chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == ':' || c == '@' || c == '_')
    }

    fn parse_text(&mut self) -> TextNode {
        let start = self.pos;
        while !self.at_eof() {
            if self.starts_with("\\{{") {
                self.pos += 3;
                match self.rest().find("}}") {
                    Some(i) => self.pos += i + 2,
                    None => self.pos = self.src.len(),
                }
                continue;
            }
            if self.starts_with("{{")
                || self.starts_with("</")
                || self.starts_with("<!--")
                || self.at_element_start()
            {
                break;
            }
            self.advance_char();
        }
        TextNode {
            span: self.span(start, self.pos),
            value: self.src[start..self.pos].to_string(),
        }
    }

    fn parse_html_comment(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.pos += "<!--".len();
        let Some(len) = self.rest().find("-->") else {
            return Err(self.error(start, self.src.len(), ParseErrorKind::UnterminatedComment));
        };
        let value = self.rest()[..len].to_string();
        self.pos += len + "-->".len();
        Ok(Node::Comment(CommentNode {
            span: self.span(start, self.pos),
            kind: CommentKind::Html,
            value,
        }))
    }

    fn parse_mustache_comment(&mut self) -> Result<CommentNode, ParseError> {
        let start = self.pos;
        let (open, close) = if self.starts_with("{{!--") {
            ("{{!--", "--}}")
        } else {
            ("{{!", "}}")
        };
        self.pos += open.len();
        let Some(len) = self.rest().find(close) else {
            return Err(self.error(start, self.src.len(), ParseErrorKind::UnterminatedComment));
        };
        let value = self.rest()[..len].to_string();
        self.pos += len + close.len();
        Ok(CommentNode {
            span: self.span(start, self.pos),
            kind: CommentKind::Mustache,
            value,
        })
    }

    // ── Mustaches ───────────────────────────────────────────────────────

    fn parse_mustache_statement(&mut self) -> Result<Node, ParseError> {
        if self.starts_with("{{!") {
            return Ok(Node::Comment(self.parse_mustache_comment()?));
        }
        if self.starts_with("{{{") {
            return Ok(Node::Mustache(self.parse_value_mustache()?));
        }

        let start = self.pos;
        let mut cursor = self.pos + 2;
        if self.src[cursor..].starts_with('~') {
            cursor += 1;
        }
        let after = self.src[cursor..].trim_start();
        if after.starts_with('#') {
            self.pos = self.src.len() - after.len() + 1;
            return Ok(Node::Block(self.parse_block(start)?));
        }
        if after.starts_with('>') {
            self.pos = self.src.len() - after.len() + 1;
            return Ok(Node::Partial(self.parse_partial(start)?));
        }
        Ok(Node::Mustache(self.parse_value_mustache()?))
    }

    /// `{{call}}` or `{{{call}}}` in content or attribute position.
    fn parse_value_mustache(&mut self) -> Result<MustacheNode, ParseError> {
        let start = self.pos;
        let trusted = self.starts_with("{{{");
        self.pos += if trusted { 3 } else { 2 };
        self.eat("~");
        self.skip_ws();
        let call = self.parse_call(start)?;
        self.expect_close(start, if trusted { "}}}" } else { "}}" })?;
        Ok(MustacheNode {
            span: self.span(start, self.pos),
            call,
            trusted,
        })
    }

    fn parse_partial(&mut self, start: usize) -> Result<PartialNode, ParseError> {
        self.skip_ws();
        let name = self
            .take_while(|c| !c.is_whitespace() && c != '}' && c != '~')
            .to_string();
        if name.is_empty() {
            return Err(self.unexpected_here());
        }
        let Some(len) = self.rest().find("}}") else {
            return Err(self.error(
                start,
                self.src.len(),
                ParseErrorKind::UnterminatedMustache,
            ));
        };
        self.pos += len + 2;
        Ok(PartialNode {
            span: self.span(start, self.pos),
            name,
        })
    }

    fn expect_close(&mut self, start: usize, closer: &str) -> Result<(), ParseError> {
        self.skip_ws();
        self.eat("~");
        if self.eat(closer) {
            return Ok(());
        }
        if self.at_eof() {
            return Err(self.error(
                start,
                self.src.len(),
                ParseErrorKind::UnterminatedMustache,
            ));
        }
        Err(self.unexpected_here())
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Entered just after `{{#`.
    fn parse_block(&mut self, start: usize) -> Result<BlockNode, ParseError> {
        self.skip_ws();
        let call = self.parse_call(start)?;
        let name = self.block_name(&call)?;
        self.skip_ws();
        let params = if self.at_block_params() {
            self.parse_block_params()?
        } else {
            Vec::new()
        };
        self.expect_close(start, "}}")?;
        self.parse_block_rest(start, call, params, &name, false)
    }

    fn block_name(&self, call: &Call) -> Result<String, ParseError> {
        match &call.callee {
            Expression::Path(path) => {
                let (s, e) = self.local(path.span);
                Ok(self.src[s..e].to_string())
            }
            other => {
                let (s, e) = self.local(other.span());
                Err(self.error(
                    s,
                    e,
                    ParseErrorKind::UnexpectedToken("block callee that is not a path".into()),
                ))
            }
        }
    }

    fn parse_block_rest(
        &mut self,
        start: usize,
        call: Call,
        params: Vec<BlockParam>,
        name: &str,
        chained: bool,
    ) -> Result<BlockNode, ParseError> {
        let open_end = self.pos;
        let (body, stop) = self.parse_children()?;
        let program = Block {
            span: self.span(open_end, self.pos),
            params,
            body,
        };
        let inverse = match stop {
            Stop::BlockClose => None,
            Stop::Else => Some(self.parse_inverse(name)?),
            Stop::Eof | Stop::ElementClose => {
                return Err(self.error(
                    start,
                    open_end,
                    ParseErrorKind::UnclosedBlock(name.to_string()),
                ));
            }
        };
        if !chained {
            self.parse_block_close(name)?;
        }
        Ok(BlockNode {
            span: self.span(start, self.pos),
            call,
            program,
            inverse,
            chained,
        })
    }

    /// Entered at `{{else ...}}` or `{{^}}`. Leaves the parser at the
    /// enclosing block's close.
    fn parse_inverse(&mut self, name: &str) -> Result<Block, ParseError> {
        let else_start = self.pos;
        self.pos += 2;
        self.eat("~");
        self.skip_ws();
        let caret = self.eat("^");
        if !caret {
            self.eat("else");
        }
        self.skip_ws();

        let plain = caret || self.starts_with("}}") || self.starts_with("~}}");
        if plain {
            self.expect_close(else_start, "}}")?;
            let inverse_start = self.pos;
            let (body, stop) = self.parse_children()?;
            return match stop {
                Stop::BlockClose => Ok(Block {
                    span: self.span(inverse_start, self.pos),
                    params: Vec::new(),
                    body,
                }),
                Stop::Else => Err(self.error_here(ParseErrorKind::UnexpectedToken(
                    format!("'else' after the final inverse of '{name}'"),
                ))),
                Stop::Eof | Stop::ElementClose => Err(self.error(
                    else_start,
                    inverse_start,
                    ParseErrorKind::UnclosedBlock(name.to_string()),
                )),
            };
        }

        // `{{else if cond}}` chains a nested block into the inverse.
        let call = self.parse_call(else_start)?;
        self.block_name(&call)?;
        self.skip_ws();
        let params = if self.at_block_params() {
            self.parse_block_params()?
        } else {
            Vec::new()
        };
        self.expect_close(else_start, "}}")?;
        let inner = self.parse_block_rest(else_start, call, params, name, true)?;
        Ok(Block {
            span: self.span(else_start, self.pos),
            params: Vec::new(),
            body: vec![Node::Block(inner)],
        })
    }

    fn parse_block_close(&mut self, name: &str) -> Result<(), ParseError> {
        let close_start = self.pos;
        self.pos += 2;
        self.eat("~");
        self.skip_ws();
        self.eat("/");
        self.skip_ws();
        let found = self
            .take_while(|c| is_id_char(c) || c == '.' || c == '@')
            .to_string();
        self.expect_close(close_start, "}}")?;
        if found != name {
            return Err(self.error(
                close_start,
                self.pos,
                ParseErrorKind::MismatchedBlockClose {
                    expected: name.to_string(),
                    found,
                },
            ));
        }
        Ok(())
    }

    fn at_block_params(&self) -> bool {
        let Some(after) = self.rest().strip_prefix("as") else {
            return false;
        };
        let starts_clean = after.starts_with('|') || after.starts_with(char::is_whitespace);
        starts_clean && after.trim_start().starts_with('|')
    }

    fn parse_block_params(&mut self) -> Result<Vec<BlockParam>, ParseError> {
        let start = self.pos;
        self.pos += 2;
        self.skip_ws();
        if !self.eat("|") {
            return Err(self.error(start, self.pos, ParseErrorKind::MalformedBlockParams));
        }
        let mut params = Vec::new();
        loop {
            self.skip_ws();
            if self.eat("|") {
                break;
            }
            match self.peek() {
                Some(c) if is_id_start(c) => {
                    let param_start = self.pos;
                    let name = self.take_while(is_id_char).to_string();
                    params.push(BlockParam {
                        name,
                        span: self.span(param_start, self.pos),
                    });
                }
                _ => {
                    let end = (self.pos + self.peek().map_or(0, char::len_utf8)).max(start);
                    return Err(self.error(start, end, ParseErrorKind::MalformedBlockParams));
                }
            }
        }
        if params.is_empty() {
            return Err(self.error(start, self.pos, ParseErrorKind::MalformedBlockParams));
        }
        Ok(params)
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Callee, positional params and hash pairs up to (not including) the
    /// closing delimiter. `ctx_start` is where the enclosing mustache began.
    fn parse_call(&mut self, ctx_start: usize) -> Result<Call, ParseError> {
        let callee = self.parse_expression(ctx_start)?;
        let mut params = Vec::new();
        let mut pairs: Vec<HashPair> = Vec::new();

        loop {
            self.skip_ws();
            if self.at_eof() {
                return Err(self.error(
                    ctx_start,
                    self.src.len(),
                    ParseErrorKind::UnterminatedMustache,
                ));
            }
            if matches!(self.peek(), Some('}' | ')' | '~' | '|')) || self.at_block_params() {
                break;
            }
            if let Some(key_len) = self.peek_hash_key() {
                pairs.push(self.parse_hash_pair(ctx_start, key_len)?);
                continue;
            }
            if !pairs.is_empty() {
                return Err(self.error_here(ParseErrorKind::UnexpectedToken(
                    "positional argument after named arguments".into(),
                )));
            }
            params.push(self.parse_expression(ctx_start)?);
        }

        let hash_span = match (pairs.first(), pairs.last()) {
            (Some(first), Some(last)) => first.span.cover(last.span),
            _ => Span::empty(self.base + self.pos),
        };
        let end = pairs
            .last()
            .map(|p| p.span.end)
            .or_else(|| params.last().map(|p: &Expression| p.span().end))
            .unwrap_or(callee.span().end);
        Ok(Call {
            span: Span::new(callee.span().start, end),
            callee,
            params,
            hash: Hash {
                span: hash_span,
                pairs,
            },
        })
    }

    fn peek_hash_key(&self) -> Option<usize> {
        let rest = self.rest();
        if !rest.chars().next().is_some_and(is_id_start) {
            return None;
        }
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_id_char(c))
            .map_or(rest.len(), |(i, _)| i);
        rest[len..].starts_with('=').then_some(len)
    }

    fn parse_hash_pair(&mut self, ctx_start: usize, key_len: usize) -> Result<HashPair, ParseError> {
        let start = self.pos;
        let key = self.src[start..start + key_len].to_string();
        let key_span = self.span(start, start + key_len);
        self.pos += key_len + 1;
        self.skip_ws();
        let value = self.parse_expression(ctx_start)?;
        Ok(HashPair {
            span: Span::new(key_span.start, value.span().end),
            key,
            key_span,
            value,
        })
    }

    fn parse_expression(&mut self, ctx_start: usize) -> Result<Expression, ParseError> {
        let Some(c) = self.peek() else {
            return Err(self.error(
                ctx_start,
                self.src.len(),
                ParseErrorKind::UnterminatedMustache,
            ));
        };
        match c {
            '(' => self.parse_sub_expression(ctx_start),
            '"' | '\'' => self.parse_string(c),
            '-' if self.rest()[1..].starts_with(|d: char| d.is_ascii_digit()) => {
                Ok(self.parse_number())
            }
            d if d.is_ascii_digit() => Ok(self.parse_number()),
            '@' => self.parse_path(),
            c if is_id_start(c) => self.parse_path(),
            _ => Err(self.unexpected_here()),
        }
    }

    fn parse_sub_expression(&mut self, ctx_start: usize) -> Result<Expression, ParseError> {
        let start = self.pos;
        self.pos += 1;
        self.skip_ws();
        let call = self.parse_call(ctx_start)?;
        self.skip_ws();
        if !self.eat(")") {
            if self.at_eof() {
                return Err(self.error(
                    ctx_start,
                    self.src.len(),
                    ParseErrorKind::UnterminatedMustache,
                ));
            }
            return Err(self.unexpected_here());
        }
        Ok(Expression::SubExpression(Box::new(SubExpression {
            span: self.span(start, self.pos),
            call,
        })))
    }

    fn parse_string(&mut self, quote: char) -> Result<Expression, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(
                        start,
                        self.src.len(),
                        ParseErrorKind::UnterminatedString,
                    ));
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        value.push(escaped);
                        self.advance_char();
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance_char();
                }
            }
        }
        Ok(Expression::Literal(Literal {
            span: self.span(start, self.pos),
            value: LiteralValue::String(value),
        }))
    }

    fn parse_number(&mut self) -> Expression {
        let start = self.pos;
        self.eat("-");
        self.take_while(|c| c.is_ascii_digit() || c == '.');
        Expression::Literal(Literal {
            span: self.span(start, self.pos),
            value: LiteralValue::Number(self.src[start..self.pos].to_string()),
        })
    }

    fn parse_path(&mut self) -> Result<Expression, ParseError> {
        let start = self.pos;
        let is_arg = self.eat("@");
        let body_start = self.pos;
        self.take_while(|c| is_id_char(c) || c == '.');
        let raw = &self.src[start..self.pos];
        let invalid = |p: &Self| p.error(start, p.pos, ParseErrorKind::InvalidPath(raw.to_string()));

        let mut segments = Vec::new();
        let mut offset = body_start;
        for part in self.src[body_start..self.pos].split('.') {
            if part.is_empty() {
                return Err(invalid(self));
            }
            segments.push(PathSegment {
                name: part.to_string(),
                span: self.span(offset, offset + part.len()),
            });
            offset += part.len() + 1;
        }
        let mut segments = segments.into_iter();
        let Some(first) = segments.next() else {
            return Err(invalid(self));
        };
        let tail: Vec<PathSegment> = segments.collect();
        if tail.iter().any(|seg| seg.name == "this") {
            return Err(invalid(self));
        }

        let span = self.span(start, self.pos);
        if !is_arg && tail.is_empty() {
            let literal = match first.name.as_str() {
                "true" => Some(LiteralValue::Boolean(true)),
                "false" => Some(LiteralValue::Boolean(false)),
                "null" => Some(LiteralValue::Null),
                "undefined" => Some(LiteralValue::Undefined),
                _ => None,
            };
            if let Some(value) = literal {
                return Ok(Expression::Literal(Literal { span, value }));
            }
        }

        let head = if is_arg {
            PathHead::Arg {
                name: first.name,
                span: Span::new(span.start, first.span.end),
            }
        } else if first.name == "this" {
            PathHead::This { span: first.span }
        } else {
            PathHead::Var {
                name: first.name,
                span: first.span,
            }
        };
        Ok(Expression::Path(PathExpression { span, head, tail }))
    }

    // ── Elements ────────────────────────────────────────────────────────

    fn parse_element(&mut self) -> Result<ElementNode, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let tag_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '/' || c == '>' || self.starts_with("{{") {
                break;
            }
            self.advance_char();
        }
        let tag = self.src[tag_start..self.pos].to_string();
        let tag_span = self.span(tag_start, self.pos);

        let mut element = ElementNode {
            span: tag_span,
            tag,
            tag_span,
            attributes: Vec::new(),
            args: Vec::new(),
            modifiers: Vec::new(),
            splattributes: None,
            block_params: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        };

        loop {
            self.skip_ws();
            if self.at_eof() {
                return Err(self.error(
                    start,
                    self.src.len(),
                    ParseErrorKind::UnterminatedTag(element.tag),
                ));
            }
            if self.eat("/>") {
                element.self_closing = true;
                break;
            }
            if self.eat(">") {
                break;
            }
            if self.starts_with("{{!") {
                self.parse_mustache_comment()?;
                continue;
            }
            if self.starts_with("{{") {
                let modifier_start = self.pos;
                self.pos += 2;
                self.eat("~");
                self.skip_ws();
                let call = self.parse_call(modifier_start)?;
                self.expect_close(modifier_start, "}}")?;
                element.modifiers.push(ElementModifier {
                    span: self.span(modifier_start, self.pos),
                    call,
                });
                continue;
            }
            if self.starts_with("...attributes") {
                let splat_start = self.pos;
                self.pos += "...attributes".len();
                element.splattributes = Some(self.span(splat_start, self.pos));
                continue;
            }
            if self.at_block_params() {
                element.block_params = self.parse_block_params()?;
                continue;
            }
            let attribute = self.parse_attribute(&element.tag)?;
            if let Some(name) = attribute.name.strip_prefix('@') {
                element.args.push(Attribute {
                    name: name.to_string(),
                    ..attribute
                });
            } else {
                element.attributes.push(attribute);
            }
        }
        let open_end = self.pos;

        if !element.self_closing && !VOID_ELEMENTS.contains(&element.tag.as_str()) {
            let (children, stop) = self.parse_children()?;
            element.children = children;
            if stop != Stop::ElementClose {
                return Err(self.error(
                    start,
                    open_end,
                    ParseErrorKind::UnclosedElement(element.tag),
                ));
            }
            self.parse_element_close(&element.tag)?;
        }

        element.span = self.span(start, self.pos);
        Ok(element)
    }

    fn parse_element_close(&mut self, tag: &str) -> Result<(), ParseError> {
        let close_start = self.pos;
        self.pos += 2;
        let found = self
            .take_while(|c| !c.is_whitespace() && c != '>')
            .to_string();
        self.skip_ws();
        if !self.eat(">") {
            return Err(self.error(
                close_start,
                self.pos,
                ParseErrorKind::UnterminatedTag(found),
            ));
        }
        if found != tag {
            return Err(self.error(
                close_start,
                self.pos,
                ParseErrorKind::MismatchedElementClose {
                    expected: tag.to_string(),
                    found,
                },
            ));
        }
        Ok(())
    }

    fn parse_attribute(&mut self, tag: &str) -> Result<Attribute, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\'') || self.starts_with("{{")
            {
                break;
            }
            self.advance_char();
        }
        if self.pos == start {
            return Err(self.unexpected_here());
        }
        let name = self.src[start..self.pos].to_string();
        let name_span = self.span(start, self.pos);

        let before_eq = self.pos;
        self.skip_ws();
        if !self.eat("=") {
            self.pos = before_eq;
            return Ok(Attribute {
                span: name_span,
                name,
                name_span,
                value: AttrValue::Valueless,
            });
        }
        self.skip_ws();

        let value = match self.peek() {
            None => {
                return Err(self.error(
                    start,
                    self.src.len(),
                    ParseErrorKind::UnterminatedTag(tag.to_string()),
                ));
            }
            Some(q @ ('"' | '\'')) => self.parse_quoted_attr_value(q)?,
            Some(_) if self.starts_with("{{") => AttrValue::Mustache(self.parse_value_mustache()?),
            Some(_) => {
                let value_start = self.pos;
                let value = self
                    .take_while(|c| !c.is_whitespace() && c != '>' && c != '/')
                    .to_string();
                AttrValue::Text(TextNode {
                    span: self.span(value_start, self.pos),
                    value,
                })
            }
        };

        Ok(Attribute {
            span: self.span(start, self.pos),
            name,
            name_span,
            value,
        })
    }

    fn parse_quoted_attr_value(&mut self, quote: char) -> Result<AttrValue, ParseError> {
        let quote_start = self.pos;
        self.pos += 1;
        let mut parts = Vec::new();
        let mut text_start = self.pos;

        loop {
            match self.peek() {
                None => {
                    return Err(self.error(
                        quote_start,
                        self.src.len(),
                        ParseErrorKind::UnterminatedString,
                    ));
                }
                Some(c) if c == quote => {
                    self.flush_text(&mut parts, text_start);
                    self.pos += 1;
                    break;
                }
                Some(_) if self.starts_with("{{") => {
                    self.flush_text(&mut parts, text_start);
                    parts.push(ConcatPart::Mustache(self.parse_value_mustache()?));
                    text_start = self.pos;
                }
                Some(_) => self.advance_char(),
            }
        }

        let has_mustache = parts.iter().any(|p| matches!(p, ConcatPart::Mustache(_)));
        if has_mustache {
            return Ok(AttrValue::Concat(ConcatValue {
                span: self.span(quote_start, self.pos),
                parts,
            }));
        }
        let text = match parts.pop() {
            Some(ConcatPart::Text(text)) => text,
            _ => TextNode {
                span: self.span(quote_start + 1, quote_start + 1),
                value: String::new(),
            },
        };
        Ok(AttrValue::Text(text))
    }

    fn flush_text(&self, parts: &mut Vec<ConcatPart>, text_start: usize) {
        if self.pos > text_start {
            parts.push(ConcatPart::Text(TextNode {
                span: self.span(text_start, self.pos),
                value: self.src[text_start..self.pos].to_string(),
            }));
        }
    }
}

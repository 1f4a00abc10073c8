//! Locating `<template>` regions inside host TypeScript/JavaScript.
//!
//! The scanner is a light tokenizer: it skips strings, template literals and
//! comments, tracks brace nesting, and remembers enough about the last
//! significant token to classify where each region sits.

use trellis_types::Span;

use crate::error::{ParseError, ParseErrorKind};

const OPEN_TAG: &str = "<template";
const CLOSE_TAG: &str = "</template>";

/// Where a template region sits in its host, which decides the wrapper the
/// generator emits around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Directly inside a class body.
    ClassMember,
    /// In expression position (`const X = <template>...`).
    Expression,
    /// A bare statement at module top level; becomes the default export.
    ModuleDefault,
    /// The whole file is a template paired with a companion script.
    Companion,
}

/// One template region of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRegion {
    /// The region including its `<template>` tags.
    pub outer: Span,
    /// The DSL text between the tags.
    pub inner: Span,
    pub placement: Placement,
}

impl TemplateRegion {
    /// A region covering a whole template-only file.
    #[must_use]
    pub fn whole_file(len: usize) -> Self {
        let span = Span::new(0, len);
        Self {
            outer: span,
            inner: span,
            placement: Placement::Companion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Class,
    Braces,
    Paren,
}

/// Find every `<template>` region in `host`.
pub fn scan_regions(host: &str) -> Result<Vec<TemplateRegion>, ParseError> {
    let bytes = host.as_bytes();
    let mut regions = Vec::new();
    let mut stack: Vec<Scope> = Vec::new();
    let mut last_significant: Option<u8> = None;
    let mut class_pending = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = host[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = host[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                last_significant = Some(b);
                continue;
            }
            b'`' => {
                i = skip_template_literal(bytes, i);
                last_significant = Some(b);
                continue;
            }
            b'<' if host[i..].starts_with(OPEN_TAG)
                && is_tag_boundary(bytes, i + OPEN_TAG.len()) =>
            {
                let open_end = match host[i..].find('>') {
                    Some(n) => i + n + 1,
                    None => {
                        return Err(ParseError::new(
                            Span::new(i, bytes.len()),
                            ParseErrorKind::UnterminatedTemplate,
                        ));
                    }
                };
                let Some(close_rel) = host[open_end..].find(CLOSE_TAG) else {
                    return Err(ParseError::new(
                        Span::new(i, open_end),
                        ParseErrorKind::UnterminatedTemplate,
                    ));
                };
                let close_start = open_end + close_rel;
                let close_end = close_start + CLOSE_TAG.len();
                let placement = classify(stack.last().copied(), last_significant);
                regions.push(TemplateRegion {
                    outer: Span::new(i, close_end),
                    inner: Span::new(open_end, close_start),
                    placement,
                });
                i = close_end;
                last_significant = Some(b'>');
                continue;
            }
            b'{' => {
                let scope = if class_pending {
                    Scope::Class
                } else {
                    Scope::Braces
                };
                class_pending = false;
                stack.push(scope);
            }
            b'}' => {
                stack.pop();
            }
            b'(' | b'[' => stack.push(Scope::Paren),
            b')' | b']' => {
                if stack.last() == Some(&Scope::Paren) {
                    stack.pop();
                }
            }
            _ => {}
        }

        if is_word_byte(b) {
            let start = i;
            while i < bytes.len() && is_word_byte(bytes[i]) {
                i += 1;
            }
            let word = &host[start..i];
            if word == "class" {
                class_pending = true;
            }
            last_significant = Some(bytes[i - 1]);
            continue;
        }
        if !b.is_ascii_whitespace() {
            last_significant = Some(b);
        }
        i += 1;
    }

    Ok(regions)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn is_tag_boundary(bytes: &[u8], at: usize) -> bool {
    bytes
        .get(at)
        .is_some_and(|&b| b == b'>' || b.is_ascii_whitespace())
}

/// Class bodies hold members; a region at module top level that starts a
/// statement is the module's default export; anything else is an expression.
fn classify(scope: Option<Scope>, last: Option<u8>) -> Placement {
    match scope {
        Some(Scope::Class) => Placement::ClassMember,
        None if matches!(last, None | Some(b';' | b'}' | b'>')) => Placement::ModuleDefault,
        _ => Placement::Expression,
    }
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_template_literal(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut depth = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'`' if depth == 0 => return i + 1,
            b'$' if depth == 0 && bytes.get(i + 1) == Some(&b'{') => {
                depth = 1;
                i += 2;
                continue;
            }
            b'{' if depth > 0 => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

//! Synthetic text writer that records mapping segments as it goes.

use trellis_types::{SourceId, Span};

use crate::mapping::{Direction, MappingBuilder, MappingTable, Segment};

const INDENT: &str = "  ";

#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    text: String,
    mapping: MappingBuilder,
    depth: usize,
    at_line_start: bool,
}

impl CodeWriter {
    pub(crate) fn new() -> Self {
        Self {
            at_line_start: true,
            ..Self::default()
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.text.len()
    }

    /// Offset where the next written text will start, after any indentation.
    pub(crate) fn mark(&mut self) -> usize {
        self.pad();
        self.offset()
    }

    /// Unmapped scaffolding.
    pub(crate) fn write(&mut self, text: &str) {
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.text.push('\n');
                self.at_line_start = true;
            }
            if !line.is_empty() {
                self.pad();
                self.text.push_str(line);
            }
        }
    }

    /// Text that stands for `original` in both directions.
    pub(crate) fn mapped(&mut self, source: SourceId, original: Span, text: &str) -> Span {
        self.record(source, original, text, Direction::Both)
    }

    /// Text that reports back to `original` but is never a lookup target.
    pub(crate) fn anchored(&mut self, source: SourceId, original: Span, text: &str) -> Span {
        self.record(source, original, text, Direction::ToOriginal)
    }

    /// Host text copied verbatim, without indentation.
    pub(crate) fn verbatim(&mut self, source: SourceId, original: Span, text: &str) -> Span {
        let start = self.offset();
        self.text.push_str(text);
        self.at_line_start = text.ends_with('\n');
        let span = Span::new(start, self.offset());
        self.push_segment(source, original, span, Direction::Both);
        span
    }

    pub(crate) fn line(&mut self, text: &str) {
        self.write(text);
        self.newline();
    }

    pub(crate) fn newline(&mut self) {
        self.text.push('\n');
        self.at_line_start = true;
    }

    pub(crate) fn indent(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Open a `{` scope on its own line.
    pub(crate) fn open_brace(&mut self, prefix: &str) {
        self.write(prefix);
        self.line("{");
        self.indent();
    }

    pub(crate) fn close_brace(&mut self, suffix: &str) {
        self.dedent();
        self.write("}");
        self.line(suffix);
    }

    pub(crate) fn finish(self) -> (String, MappingTable) {
        (self.text, self.mapping.finish())
    }

    fn record(&mut self, source: SourceId, original: Span, text: &str, direction: Direction) -> Span {
        self.pad();
        let start = self.offset();
        self.text.push_str(text);
        let span = Span::new(start, self.offset());
        self.push_segment(source, original, span, direction);
        span
    }

    fn push_segment(&mut self, source: SourceId, original: Span, synthetic: Span, direction: Direction) {
        self.mapping.push(Segment {
            source,
            original,
            synthetic,
            direction,
        });
    }

    fn pad(&mut self) {
        if self.at_line_start {
            for _ in 0..self.depth {
                self.text.push_str(INDENT);
            }
            self.at_line_start = false;
        }
    }
}

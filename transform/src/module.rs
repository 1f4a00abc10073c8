use std::path::{Path, PathBuf};

use trellis_types::{LineIndex, SourceId, Span};

use crate::context::ConstructRecord;
use crate::directives::Directive;
use crate::mapping::{Direction, MappingBuilder, MappingTable, Segment};

/// An original document that a backing module maps back to.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    lines: LineIndex,
}

impl SourceFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: LineIndex::new(text),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.lines.text()
    }

    #[must_use]
    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }
}

/// A problem the generator found itself: a parse error or a construct with
/// no lowering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationIssue {
    source: SourceId,
    span: Span,
    message: String,
}

impl GenerationIssue {
    #[must_use]
    pub fn new(source: SourceId, span: Span, message: impl Into<String>) -> Self {
        Self {
            source,
            span,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn source(&self) -> SourceId {
        self.source
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Generated code for one virtual path plus everything needed to translate
/// checker results back. Immutable once built.
#[derive(Debug, Clone)]
pub struct BackingModule {
    pub(crate) virtual_path: PathBuf,
    /// The synthetic text.
    pub(crate) lines: LineIndex,
    pub(crate) mapping: MappingTable,
    /// Sorted by extent start.
    pub(crate) records: Vec<ConstructRecord>,
    pub(crate) directives: Vec<Directive>,
    pub(crate) issues: Vec<GenerationIssue>,
    /// Indexed by `SourceId`.
    pub(crate) sources: Vec<SourceFile>,
}

impl BackingModule {
    /// A script with no template: the synthetic text is the script itself.
    #[must_use]
    pub fn identity(path: impl Into<PathBuf>, text: &str) -> Self {
        let path = path.into();
        let mut mapping = MappingBuilder::default();
        let whole = Span::new(0, text.len());
        mapping.push(Segment {
            source: SourceId::PRIMARY,
            original: whole,
            synthetic: whole,
            direction: Direction::Both,
        });
        Self {
            lines: LineIndex::new(text),
            mapping: mapping.finish(),
            records: Vec::new(),
            directives: Vec::new(),
            issues: Vec::new(),
            sources: vec![SourceFile::new(path.clone(), text)],
            virtual_path: path,
        }
    }

    #[must_use]
    pub fn virtual_path(&self) -> &Path {
        &self.virtual_path
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.lines.text()
    }

    /// Line table of the synthetic text.
    #[must_use]
    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    #[must_use]
    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    #[must_use]
    pub fn records(&self) -> &[ConstructRecord] {
        &self.records
    }

    /// Records whose extent contains `span`, innermost first.
    pub fn records_containing(&self, span: Span) -> impl Iterator<Item = &ConstructRecord> {
        let end = self
            .records
            .partition_point(|record| record.extent.start <= span.start);
        self.records[..end]
            .iter()
            .rev()
            .filter(move |record| record.extent.contains(span))
    }

    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    #[must_use]
    pub fn issues(&self) -> &[GenerationIssue] {
        &self.issues
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    #[must_use]
    pub fn source(&self, id: SourceId) -> Option<&SourceFile> {
        self.sources.get(id.index())
    }

    #[must_use]
    pub fn source_id(&self, path: &Path) -> Option<SourceId> {
        self.sources
            .iter()
            .position(|source| source.path == path)
            .and_then(|i| u32::try_from(i).ok())
            .map(SourceId::new)
    }
}

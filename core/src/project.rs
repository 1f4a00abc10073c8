//! Request orchestration for one project.
//!
//! A [`Project`] owns the open documents, their backing modules and the
//! checker. Backing modules are regenerated lazily after an edit and replaced
//! wholesale, so a module handed out as an `Arc` never changes underneath
//! its holder.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use trellis_config::{ConfigError, DocumentKind, ProjectSettings};
use trellis_transform::{
    BackingModule, Bias, Companion, DirectiveKind, GenerateInput, SourceFile, generate,
    is_synthetic_name,
};
use trellis_types::{
    CompletionItem, Diagnostic, DocumentVersion, Hover, Location, Position, Severity, SourceId,
};

use crate::augment::augment;
use crate::checker::{CheckerError, CheckerLocation, TypeChecker};
use crate::document::{Document, TextEdit};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("document is not open: {}", .0.display())]
    NotOpen(PathBuf),
    #[error("unsupported document type: {}", .0.display())]
    Unsupported(PathBuf),
    #[error("document is excluded by the project config: {}", .0.display())]
    Excluded(PathBuf),
    #[error(transparent)]
    Checker(#[from] CheckerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("project has shut down")]
    Closed,
}

/// The verbatim backing module of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugIr {
    pub contents: String,
    pub virtual_path: PathBuf,
}

/// How the backing module for a virtual path is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    /// A plain script checked as itself.
    Identity { path: PathBuf },
    Generated {
        document: PathBuf,
        kind: DocumentKind,
        companion: Option<PathBuf>,
    },
}

pub struct Project<C> {
    settings: ProjectSettings,
    documents: HashMap<PathBuf, Document>,
    /// Keyed by virtual path.
    modules: HashMap<PathBuf, Arc<BackingModule>>,
    /// Virtual paths whose current module text the checker holds.
    synced: HashSet<PathBuf>,
    checker: C,
}

impl<C: TypeChecker> Project<C> {
    pub fn new(settings: ProjectSettings, checker: C) -> Self {
        Self {
            settings,
            documents: HashMap::new(),
            modules: HashMap::new(),
            synced: HashSet::new(),
            checker,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    #[must_use]
    pub fn document(&self, path: &Path) -> Option<&Document> {
        self.documents.get(path)
    }

    // ── Document lifecycle ──────────────────────────────────────────────

    pub async fn open(
        &mut self,
        path: &Path,
        version: DocumentVersion,
        text: &str,
    ) -> Result<(), ProjectError> {
        if self.settings.environment().document_kind(path).is_none() {
            return Err(ProjectError::Unsupported(path.to_path_buf()));
        }
        if self.settings.is_excluded(path) {
            return Err(ProjectError::Excluded(path.to_path_buf()));
        }
        self.documents
            .insert(path.to_path_buf(), Document::new(path, version, text));
        self.invalidate(path);
        tracing::debug!(path = %path.display(), %version, "Opened document");
        self.refresh(path).await
    }

    pub async fn change(
        &mut self,
        path: &Path,
        version: DocumentVersion,
        edits: &[TextEdit],
    ) -> Result<(), ProjectError> {
        let document = self
            .documents
            .get_mut(path)
            .ok_or_else(|| ProjectError::NotOpen(path.to_path_buf()))?;
        if version <= document.version() {
            tracing::warn!(
                path = %path.display(),
                current = %document.version(),
                %version,
                "Ignoring out-of-order document change"
            );
            return Ok(());
        }
        document.apply(version, edits);
        self.invalidate(path);
        self.refresh(path).await
    }

    pub async fn close(&mut self, path: &Path) -> Result<(), ProjectError> {
        let virtual_path = self.plan(path).map(|(virtual_path, _)| virtual_path);
        if self.documents.remove(path).is_none() {
            return Err(ProjectError::NotOpen(path.to_path_buf()));
        }
        self.invalidate(path);
        let Ok(virtual_path) = virtual_path else {
            return Ok(());
        };
        tracing::debug!(path = %path.display(), "Closed document");
        match self.owner_of(&virtual_path) {
            Some(owner) => self.refresh(&owner).await,
            None => {
                self.modules.remove(&virtual_path);
                self.synced.remove(&virtual_path);
                self.checker.close_file(&virtual_path).await?;
                Ok(())
            }
        }
    }

    /// Replace the project's settings and regenerate every open document.
    pub async fn reload_environment(
        &mut self,
        settings: ProjectSettings,
    ) -> Result<(), ProjectError> {
        tracing::info!(
            root = %settings.root().display(),
            presets = ?settings.environment().presets(),
            "Reloading project environment"
        );
        self.settings = settings;
        self.modules.clear();
        self.synced.clear();
        let mut paths: Vec<PathBuf> = self.documents.keys().cloned().collect();
        paths.sort();
        for path in paths {
            if let Err(e) = self.refresh(&path).await {
                tracing::warn!(path = %path.display(), "Failed to refresh after reload: {e}");
            }
        }
        Ok(())
    }

    /// Other open documents that share `path`'s backing module.
    #[must_use]
    pub fn related_documents(&self, path: &Path) -> Vec<PathBuf> {
        let Ok((virtual_path, _)) = self.plan(path) else {
            return Vec::new();
        };
        let mut related: Vec<PathBuf> = self
            .documents
            .keys()
            .filter(|other| other.as_path() != path)
            .filter(|other| {
                self.plan(other)
                    .is_ok_and(|(other_virtual, _)| other_virtual == virtual_path)
            })
            .cloned()
            .collect();
        related.sort();
        related
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub async fn diagnostics(&mut self, path: &Path) -> Result<Vec<Diagnostic>, ProjectError> {
        let module = self.module(path)?;
        let source = source_of(&module, path)?;
        self.sync(&module).await?;
        let raw = self
            .checker
            .check_file(module.virtual_path(), module.text())
            .await?;

        let augmented = raw
            .iter()
            .filter_map(|diagnostic| augment(diagnostic, &module))
            .filter(|(diagnostic_source, _)| *diagnostic_source == source)
            .map(|(_, diagnostic)| diagnostic)
            .collect();
        let mut diagnostics = apply_directives(&module, source, augmented);
        diagnostics.extend(generation_issues(&module, source));

        let mut seen = HashSet::new();
        diagnostics.retain(|d| seen.insert((d.span(), d.message().to_string())));
        diagnostics.sort_by_key(|d| (d.span().start, d.span().end));
        tracing::debug!(
            path = %path.display(),
            raw = raw.len(),
            reported = diagnostics.len(),
            "Computed diagnostics"
        );
        Ok(diagnostics)
    }

    pub async fn hover(
        &mut self,
        path: &Path,
        position: Position,
    ) -> Result<Option<Hover>, ProjectError> {
        let module = self.module(path)?;
        let source = source_of(&module, path)?;
        let Some(offset) = synthetic_offset(&module, source, position, Bias::Right) else {
            return Ok(None);
        };
        self.sync(&module).await?;
        let Some(hover) = self.checker.hover_at(module.virtual_path(), offset).await? else {
            return Ok(None);
        };
        let span = hover
            .span
            .and_then(|span| module.mapping().synthetic_to_original(span))
            .filter(|(hover_source, _)| *hover_source == source)
            .map(|(_, span)| span);
        let lines = module.source(source).map(SourceFile::lines);
        Ok(Some(Hover {
            contents: hover.contents,
            range: span.zip(lines).map(|(span, lines)| lines.range(span)),
            span,
        }))
    }

    pub async fn completions(
        &mut self,
        path: &Path,
        position: Position,
    ) -> Result<Vec<CompletionItem>, ProjectError> {
        let module = self.module(path)?;
        let source = source_of(&module, path)?;
        let Some(offset) = synthetic_offset(&module, source, position, Bias::Left) else {
            return Ok(Vec::new());
        };
        self.sync(&module).await?;
        let mut items = self
            .checker
            .completions_at(module.virtual_path(), offset)
            .await?;
        items.retain(|item| !is_synthetic_name(&item.label));
        Ok(items)
    }

    pub async fn definitions(
        &mut self,
        path: &Path,
        position: Position,
    ) -> Result<Vec<Location>, ProjectError> {
        let module = self.module(path)?;
        let source = source_of(&module, path)?;
        let Some(offset) = synthetic_offset(&module, source, position, Bias::Right) else {
            return Ok(Vec::new());
        };
        self.sync(&module).await?;
        let targets = self
            .checker
            .definitions_at(module.virtual_path(), offset)
            .await?;
        let mut locations = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(location) = self.translate_location(target) {
                locations.push(location);
            }
        }
        Ok(locations)
    }

    pub fn debug_ir(&mut self, path: &Path) -> Result<DebugIr, ProjectError> {
        let module = self.module(path)?;
        Ok(DebugIr {
            contents: module.text().to_string(),
            virtual_path: module.virtual_path().to_path_buf(),
        })
    }

    pub async fn shutdown(&mut self) {
        tracing::info!(root = %self.settings.root().display(), "Shutting down project");
        self.checker.shutdown().await;
    }

    // ── Backing modules ─────────────────────────────────────────────────

    /// The current backing module for an open document.
    pub fn module(&mut self, path: &Path) -> Result<Arc<BackingModule>, ProjectError> {
        if !self.documents.contains_key(path) {
            return Err(ProjectError::NotOpen(path.to_path_buf()));
        }
        let (virtual_path, plan) = self.plan(path)?;
        if let Some(module) = self.modules.get(&virtual_path) {
            return Ok(Arc::clone(module));
        }
        let module = Arc::new(self.build(&virtual_path, &plan)?);
        self.modules.insert(virtual_path.clone(), Arc::clone(&module));
        self.synced.remove(&virtual_path);
        Ok(module)
    }

    fn build(&self, virtual_path: &Path, plan: &Plan) -> Result<BackingModule, ProjectError> {
        match plan {
            Plan::Identity { path } => {
                let document = self.open_document(path)?;
                Ok(BackingModule::identity(virtual_path, document.text()))
            }
            Plan::Generated {
                document,
                kind,
                companion,
            } => {
                let open = self.open_document(document)?;
                let profile = self
                    .settings
                    .environment()
                    .profile(*kind)
                    .ok_or_else(|| ProjectError::Unsupported(document.clone()))?;
                let companion_text = companion
                    .as_deref()
                    .and_then(|companion| self.companion_text(companion));
                let companion = companion
                    .as_deref()
                    .zip(companion_text.as_deref())
                    .map(|(path, text)| Companion { path, text });
                Ok(generate(
                    &GenerateInput {
                        virtual_path,
                        path: document,
                        text: open.text(),
                        kind: *kind,
                        companion,
                    },
                    profile,
                ))
            }
        }
    }

    /// Where `path`'s backing module lives and how to build it.
    fn plan(&self, path: &Path) -> Result<(PathBuf, Plan), ProjectError> {
        let environment = self.settings.environment();
        let kind = environment
            .document_kind(path)
            .ok_or_else(|| ProjectError::Unsupported(path.to_path_buf()))?;
        match kind {
            DocumentKind::Embedded => Ok((
                path.with_extension("ts"),
                Plan::Generated {
                    document: path.to_path_buf(),
                    kind,
                    companion: None,
                },
            )),
            DocumentKind::Template => {
                let companion = self.companion_of(path);
                let virtual_path = companion
                    .clone()
                    .unwrap_or_else(|| path.with_extension("ts"));
                Ok((
                    virtual_path,
                    Plan::Generated {
                        document: path.to_path_buf(),
                        kind,
                        companion,
                    },
                ))
            }
            DocumentKind::Script => {
                let template = environment
                    .companion_template(path)
                    .filter(|template| self.documents.contains_key(template))
                    .filter(|template| self.companion_of(template).as_deref() == Some(path));
                match template {
                    Some(template) => Ok((
                        path.to_path_buf(),
                        Plan::Generated {
                            document: template,
                            kind: DocumentKind::Template,
                            companion: Some(path.to_path_buf()),
                        },
                    )),
                    None => Ok((
                        path.to_path_buf(),
                        Plan::Identity {
                            path: path.to_path_buf(),
                        },
                    )),
                }
            }
        }
    }

    /// The first companion script candidate that is open or on disk.
    fn companion_of(&self, template: &Path) -> Option<PathBuf> {
        self.settings
            .environment()
            .companion_scripts(template)
            .into_iter()
            .find(|candidate| self.documents.contains_key(candidate) || candidate.is_file())
    }

    fn companion_text(&self, path: &Path) -> Option<String> {
        if let Some(document) = self.documents.get(path) {
            return Some(document.text().to_string());
        }
        match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read companion script: {e}");
                None
            }
        }
    }

    /// An open document whose backing module lives at `virtual_path`.
    fn owner_of(&self, virtual_path: &Path) -> Option<PathBuf> {
        let mut owners: Vec<&PathBuf> = self
            .documents
            .keys()
            .filter(|path| {
                self.plan(path)
                    .is_ok_and(|(candidate, _)| candidate == virtual_path)
            })
            .collect();
        owners.sort();
        owners.first().map(|path| (*path).clone())
    }

    fn open_document(&self, path: &Path) -> Result<&Document, ProjectError> {
        self.documents
            .get(path)
            .ok_or_else(|| ProjectError::NotOpen(path.to_path_buf()))
    }

    /// Drop every cached module that `path` contributes to.
    fn invalidate(&mut self, path: &Path) {
        let virtual_path = self.plan(path).ok().map(|(virtual_path, _)| virtual_path);
        self.modules.retain(|cached, module| {
            Some(cached) != virtual_path.as_ref() && module.source_id(path).is_none()
        });
    }

    /// Regenerate `path`'s module and push it to the checker.
    async fn refresh(&mut self, path: &Path) -> Result<(), ProjectError> {
        let module = self.module(path)?;
        self.sync(&module).await
    }

    async fn sync(&mut self, module: &BackingModule) -> Result<(), ProjectError> {
        let virtual_path = module.virtual_path();
        if self.synced.contains(virtual_path) {
            return Ok(());
        }
        tracing::debug!(
            path = %virtual_path.display(),
            bytes = module.text().len(),
            "Syncing backing module"
        );
        self.checker.sync_file(virtual_path, module.text()).await?;
        self.synced.insert(virtual_path.to_path_buf());
        Ok(())
    }

    /// Map a checker location into the original document when it points
    /// into a backing module; other files pass through.
    fn translate_location(&mut self, target: CheckerLocation) -> Option<Location> {
        let owner = self.owner_of(&target.path);
        let Some(module) = owner.and_then(|owner| self.module(&owner).ok()) else {
            return Some(Location {
                path: target.path,
                span: None,
                range: target.range,
            });
        };
        let synthetic = module.lines().span(target.range);
        let Some((source, span)) = module.mapping().synthetic_to_original(synthetic) else {
            tracing::debug!(
                path = %target.path.display(),
                span = %synthetic,
                "Dropping definition inside generated scaffolding"
            );
            return None;
        };
        let file = module.source(source)?;
        Some(Location {
            path: file.path().to_path_buf(),
            span: Some(span),
            range: file.lines().range(span),
        })
    }
}

fn source_of(module: &BackingModule, path: &Path) -> Result<SourceId, ProjectError> {
    module
        .source_id(path)
        .ok_or_else(|| ProjectError::NotOpen(path.to_path_buf()))
}

fn synthetic_offset(
    module: &BackingModule,
    source: SourceId,
    position: Position,
    bias: Bias,
) -> Option<usize> {
    let offset = module.source(source)?.lines().offset(position);
    module.mapping().original_to_synthetic(source, offset, bias)
}

/// Drop diagnostics under `ignore`, `expect-error` and `nocheck` comments,
/// and report `expect-error` comments that suppressed nothing.
fn apply_directives(
    module: &BackingModule,
    source: SourceId,
    diagnostics: Vec<Diagnostic>,
) -> Vec<Diagnostic> {
    let directives: Vec<_> = module
        .directives()
        .iter()
        .filter(|directive| directive.source == source)
        .collect();
    if directives.is_empty() {
        return diagnostics;
    }
    let mut used = vec![false; directives.len()];
    let mut kept = Vec::with_capacity(diagnostics.len());
    for diagnostic in diagnostics {
        let mut suppressed = false;
        for (i, directive) in directives.iter().enumerate() {
            if directive.covers(source, diagnostic.span()) {
                used[i] = true;
                suppressed = true;
            }
        }
        if !suppressed {
            kept.push(diagnostic);
        }
    }
    let Some(file) = module.source(source) else {
        return kept;
    };
    for (directive, used) in directives.iter().zip(used) {
        if directive.kind == DirectiveKind::ExpectError && !used {
            kept.push(Diagnostic::new(
                directive.comment,
                file.lines().range(directive.comment),
                Severity::Error,
                format!("Unused '{}' directive.", directive.kind.name()),
            ));
        }
    }
    kept
}

fn generation_issues(module: &BackingModule, source: SourceId) -> Vec<Diagnostic> {
    let Some(file) = module.source(source) else {
        return Vec::new();
    };
    module
        .issues()
        .iter()
        .filter(|issue| issue.source() == source)
        .map(|issue| {
            Diagnostic::new(
                issue.span(),
                file.lines().range(issue.span()),
                Severity::Error,
                issue.message(),
            )
        })
        .collect()
}

//! Environment presets and the per-project environment built from them.
//!
//! A preset decides which files are templates, which module provides the
//! template DSL types, and which globals exist without configuration. The
//! [`Environment`] is immutable once built; a configuration reload builds a
//! new one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ConfigError;
use crate::registry::{Registry, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// `.hbs` templates paired with a `.ts`/`.js` backing module of the same
    /// stem; globals resolve through the registry.
    Loose,
    /// `<template>` regions embedded in `.gts`/`.gjs` files; names resolve
    /// through host-module scope.
    TemplateImports,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Loose, Preset::TemplateImports];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "loose" => Some(Self::Loose),
            "template-imports" => Some(Self::TemplateImports),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Loose => "loose",
            Self::TemplateImports => "template-imports",
        }
    }

    /// Module whose declarations type the generated code.
    #[must_use]
    pub const fn dsl_module(self) -> &'static str {
        match self {
            Self::Loose => "@trellis/environment-loose",
            Self::TemplateImports => "@trellis/environment-template-imports",
        }
    }

    /// Globals available without any registry configuration.
    #[must_use]
    pub const fn builtins(self) -> &'static [&'static str] {
        match self {
            Self::Loose => &[
                "action", "array", "concat", "fn", "get", "hash", "Input", "LinkTo", "log", "mut",
                "on", "outlet", "Textarea", "unique-id",
            ],
            Self::TemplateImports => &["array", "concat", "fn", "get", "hash", "log", "on", "unique-id"],
        }
    }

    /// Whether user `[registry]` entries apply to this preset.
    #[must_use]
    pub const fn extensible(self) -> bool {
        matches!(self, Self::Loose)
    }

    /// Strict presets see host-module bindings as locals.
    #[must_use]
    pub const fn strict(self) -> bool {
        matches!(self, Self::TemplateImports)
    }

    fn registry(self, user: &Registry) -> Registry {
        let dsl = self.dsl_module();
        let mut registry: Registry = self
            .builtins()
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    TypeRef::new(format!("import(\"{dsl}\").Globals[\"{name}\"]")),
                )
            })
            .collect();
        if self.extensible() {
            registry.extend(user);
        }
        registry
    }
}

/// How a document participates in checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Host code with embedded `<template>` regions.
    Embedded,
    /// A template-only file; the whole file is one region.
    Template,
    /// Plain host code, possibly the companion of a template.
    Script,
}

/// Settings that drive generation for one kind of document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    preset: Preset,
    registry: Arc<Registry>,
}

impl Profile {
    #[must_use]
    pub fn preset(&self) -> Preset {
        self.preset
    }

    #[must_use]
    pub fn dsl_module(&self) -> &'static str {
        self.preset.dsl_module()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn strict(&self) -> bool {
        self.preset.strict()
    }
}

const TEMPLATE_EXTENSIONS: &[&str] = &["hbs"];
const EMBEDDED_EXTENSIONS: &[&str] = &["gts", "gjs"];
const SCRIPT_EXTENSIONS: &[&str] = &["ts", "js", "mts", "mjs", "cts", "cjs"];
/// Companion scripts of a template, in lookup order.
const COMPANION_EXTENSIONS: &[&str] = &["ts", "js"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    presets: Vec<Preset>,
    loose: Option<Profile>,
    embedded: Option<Profile>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(&Preset::ALL, &Registry::new())
    }
}

impl Environment {
    /// Build from an ordered preset list and the user's registry entries.
    #[must_use]
    pub fn new(presets: &[Preset], user_registry: &Registry) -> Self {
        let mut ordered: Vec<Preset> = Vec::new();
        for preset in presets {
            if !ordered.contains(preset) {
                ordered.push(*preset);
            }
        }
        let profile = |preset: Preset| Profile {
            preset,
            registry: Arc::new(preset.registry(user_registry)),
        };
        Self {
            loose: ordered.contains(&Preset::Loose).then(|| profile(Preset::Loose)),
            embedded: ordered
                .contains(&Preset::TemplateImports)
                .then(|| profile(Preset::TemplateImports)),
            presets: ordered,
        }
    }

    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        user_registry: &Registry,
    ) -> Result<Self, ConfigError> {
        let presets = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Preset::from_name(name).ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(&presets, user_registry))
    }

    #[must_use]
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    #[must_use]
    pub fn document_kind(&self, path: &Path) -> Option<DocumentKind> {
        let ext = path.extension()?.to_str()?;
        if self.loose.is_some() && TEMPLATE_EXTENSIONS.contains(&ext) {
            return Some(DocumentKind::Template);
        }
        if self.embedded.is_some() && EMBEDDED_EXTENSIONS.contains(&ext) {
            return Some(DocumentKind::Embedded);
        }
        if SCRIPT_EXTENSIONS.contains(&ext) {
            return Some(DocumentKind::Script);
        }
        None
    }

    /// Generation settings for a document kind; `None` for plain scripts.
    #[must_use]
    pub fn profile(&self, kind: DocumentKind) -> Option<&Profile> {
        match kind {
            DocumentKind::Template => self.loose.as_ref(),
            DocumentKind::Embedded => self.embedded.as_ref(),
            DocumentKind::Script => None,
        }
    }

    /// Candidate companion scripts of a template, in lookup order.
    #[must_use]
    pub fn companion_scripts(&self, template: &Path) -> Vec<PathBuf> {
        if self.document_kind(template) != Some(DocumentKind::Template) {
            return Vec::new();
        }
        COMPANION_EXTENSIONS
            .iter()
            .map(|ext| template.with_extension(ext))
            .collect()
    }

    /// The template a script would be the companion of.
    #[must_use]
    pub fn companion_template(&self, script: &Path) -> Option<PathBuf> {
        self.loose.as_ref()?;
        let ext = script.extension()?.to_str()?;
        COMPANION_EXTENSIONS
            .contains(&ext)
            .then(|| script.with_extension(TEMPLATE_EXTENSIONS[0]))
    }
}

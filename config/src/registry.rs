use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// An opaque host-language type expression, e.g.
/// `typeof import("./components/card").default`.
///
/// The bridge never interprets it; it is pasted into generated code as the
/// type of the registry entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(String);

impl TypeRef {
    #[must_use]
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Global names (components, helpers, modifiers) visible to templates.
///
/// Ordered so generated code that enumerates the registry is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<String, TypeRef>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.insert(name, ty);
        self
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, ty: TypeRef) {
        self.entries.insert(name.into(), ty);
    }

    /// Add every entry of `other`, replacing entries with the same name.
    pub fn extend(&mut self, other: &Registry) {
        for (name, ty) in &other.entries {
            self.entries.insert(name.clone(), ty.clone());
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeRef> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeRef)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, TypeRef)> for Registry {
    fn from_iter<I: IntoIterator<Item = (String, TypeRef)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

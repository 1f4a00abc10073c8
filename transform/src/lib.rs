//! Backing-code generation for Trellis.
//!
//! [`generate`] turns a template document into a [`BackingModule`]: TypeScript
//! that an ordinary checker can type, plus the [`MappingTable`] and context
//! records needed to translate the checker's answers back into template
//! terms.

mod context;
mod directives;
mod generator;
mod mapping;
mod module;
mod writer;

pub use context::{ConstructKind, ConstructRecord, DirectForm, Invocation, InvocationForm};
pub use directives::{Directive, DirectiveKind};
pub use generator::{Companion, GenerateInput, generate};
pub use mapping::{Bias, Direction, MappingBuilder, MappingTable, Segment};
pub use module::{BackingModule, GenerationIssue, SourceFile};

/// Declarations of the DSL the generated code calls into. Environment
/// packages ship this file as their module's type declarations.
pub const DSL_DECLARATIONS: &str = include_str!("../assets/dsl.d.ts");

/// Whether `name` was introduced by the generator.
#[must_use]
pub fn is_synthetic_name(name: &str) -> bool {
    matches!(name, "__ctx" | "__dsl" | "__reg")
        || ["__el", "__blk"].iter().any(|prefix| {
            name.strip_prefix(prefix)
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        })
}

//! Template DSL syntax for Trellis.
//!
//! - [`parse`] turns one region of template text into a [`Template`] tree.
//! - [`scan_regions`] finds `<template>` regions inside host code.
//! - [`collect_host_bindings`] lists the names a host module declares.
//!
//! Nothing here classifies path heads as local or global; that depends on
//! enclosing scope and is left to the generator.

pub mod ast;
mod error;
mod parser;
mod regions;
mod scope;

pub use ast::Template;
pub use error::{ParseError, ParseErrorKind};
pub use parser::parse;
pub use regions::{Placement, TemplateRegion, scan_regions};
pub use scope::collect_host_bindings;

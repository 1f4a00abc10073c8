//! Diagnostic augmentation and request orchestration for Trellis.
//!
//! This crate sits between the generator and an external type checker:
//! - [`augment`] rewrites raw checker diagnostics into template terms
//! - [`Project`] keeps documents and backing modules current and routes
//!   queries through the [`TypeChecker`]
//! - [`ProjectHandle`] and [`Workspace`] serialize requests per project

mod augment;
mod checker;
mod document;
mod handle;
mod project;

pub use augment::augment;
pub use checker::{CheckerDiagnostic, CheckerError, CheckerHover, CheckerLocation, TypeChecker};
pub use document::{Document, TextEdit};
pub use handle::{CheckerFactory, ProjectHandle, Workspace};
pub use project::{DebugIr, Project, ProjectError};

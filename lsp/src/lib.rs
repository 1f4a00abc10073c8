//! Language server front end for Trellis.
//!
//! [`serve`] speaks LSP to the editor over stdio and routes documents to
//! per-project orchestrators. Each project type-checks its backing modules
//! through a [`ProxyChecker`], which drives an external TypeScript
//! language server as a child process.

pub mod codec;

mod diagnostics;
mod protocol;
mod proxy;
mod server;
mod types;

pub use proxy::{ProxyChecker, ProxyFactory};
pub use server::serve;

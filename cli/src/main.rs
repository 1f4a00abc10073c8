//! Trellis language server binary.
//!
//! Speaks LSP on stdin/stdout and starts one external TypeScript language
//! server per project. Logs go to stderr, filtered by `TRELLIS_LOG`.
//!
//! ```text
//! trellis-language-server [--stdio]   serve an editor session
//! trellis-language-server --print-dsl print the template DSL declarations
//! ```

use std::env;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use tokio::io::{stdin, stdout};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use trellis_lsp::{ProxyFactory, serve};
use trellis_transform::DSL_DECLARATIONS;

const LOG_ENV: &str = "TRELLIS_LOG";

const USAGE: &str = "\
Usage: trellis-language-server [OPTIONS]

Options:
      --stdio      Serve LSP over stdin/stdout (the default)
      --print-dsl  Print the template DSL type declarations and exit
  -V, --version    Print version and exit
  -h, --help       Print this help and exit

Environment:
  TRELLIS_LOG      Log filter, e.g. `debug` or `trellis_core=trace` (default: info)
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    PrintDsl,
    Version,
    Help,
}

fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut command = Command::Serve;
    for arg in args {
        command = match arg.as_str() {
            // Editors pass this by convention.
            "--stdio" => continue,
            "--print-dsl" => Command::PrintDsl,
            "-V" | "--version" => Command::Version,
            "-h" | "--help" => Command::Help,
            other => bail!("unknown argument `{other}`\n\n{USAGE}"),
        };
    }
    Ok(command)
}

/// Install the stderr subscriber. Stdout carries the protocol.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(io::stderr),
        )
        .with(env_filter)
        .init();
}

fn print(text: &str) -> Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .context("failed to write to stdout")
}

#[tokio::main]
async fn main() -> Result<()> {
    match parse_args(env::args().skip(1))? {
        Command::PrintDsl => return print(DSL_DECLARATIONS),
        Command::Version => {
            return print(&format!("trellis-language-server {}\n", env!("CARGO_PKG_VERSION")));
        }
        Command::Help => return print(USAGE),
        Command::Serve => {}
    }

    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Trellis language server");

    serve(stdin(), stdout(), ProxyFactory)
        .await
        .context("language server session failed")?;

    tracing::info!("Trellis language server stopped");
    Ok(())
}

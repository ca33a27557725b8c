//! `esc-lsp` entrypoint: the language server on stdio.

use std::io::{BufReader, stdin, stdout};
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use esc_lsp::LspServer;

/// Logging goes to a file; stdout belongs to the protocol.
fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(Path::new("."), "esc-lsp.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    info!(target: "lsp", "esc-lsp starting on stdio");

    let mut server = LspServer::new();
    let mut input = BufReader::new(stdin().lock());
    let mut output = stdout().lock();
    let exit_code = server.run(&mut input, &mut output)?;
    info!(target: "lsp", exit_code, "esc-lsp stopping");
    std::process::exit(exit_code);
}

use thiserror::Error;

/// Import-library reader failures.
///
/// A short read while parsing a *trailing* archive member is not an error
/// at the API boundary: the walk stops and the entries collected so far
/// form a degraded but valid library. `Io` therefore only escapes when the
/// archive cannot be opened or read at all.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("i/o error reading import library: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed import library: {0}")]
    Format(String),

    #[error("symbol not found: {0}")]
    NotFound(String),
}

/// Link session failures. Each variant also lands in the session's error
/// slot so drivers can report it after the fact.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required symbol: {0}")]
    MissingSymbol(String),

    #[error("unresolved external symbol: {0}")]
    Unresolved(String),

    #[error("object {path} does not match link target {target}")]
    TargetMismatch { path: String, target: String },

    #[error("malformed object file {path}: {detail}")]
    BadObject { path: String, detail: String },

    #[error("no output path configured")]
    NoOutput,
}

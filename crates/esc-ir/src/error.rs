use thiserror::Error;

/// Errors surfaced by the IR subsystem.
///
/// `Malformed` always indicates a compiler bug rather than bad user input:
/// the front-end is expected to reject programs before they reach the
/// builder, so a malformed module is treated as fatal by every caller.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("malformed IR: {0}")]
    Malformed(String),

    #[error("allocation failure in {0} pool")]
    Memory(&'static str),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

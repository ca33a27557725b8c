use thiserror::Error;

#[derive(Debug, Error)]
pub enum LspError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("malformed JSON-RPC payload: {0}")]
    Json(#[from] serde_json::Error),
}

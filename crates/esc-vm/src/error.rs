use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bytecode: {0}")]
    Format(String),

    #[error("unsupported opcode 0x{0:02x}")]
    Unsupported(u8),

    /// Runtime failure; the VM has already printed the offending line and
    /// cleared its stack and frames by the time this escapes.
    #[error("runtime error: {0}")]
    Runtime(String),
}

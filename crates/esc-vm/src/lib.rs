//! The E# bytecode virtual machine: an alternative backend target that
//! executes `.esbc` chunks on a single-threaded stack machine with a
//! mark-sweep heap for strings.

pub mod chunk;
pub mod debug;
pub mod error;
pub mod vm;

pub use chunk::{Chunk, Constant, ESBC_MAGIC, ESBC_VERSION, OpCode};
pub use error::VmError;
pub use vm::{Value, Vm};

//! The E# language server.
//!
//! A single-threaded cooperative server: one reader loop takes framed
//! JSON-RPC messages off the input, dispatches them through a static
//! method table and writes responses (and any diagnostics produced along
//! the way) before reading the next message. Document state is per-URI
//! and every didOpen/didChange runs the front-end analyser synchronously,
//! so diagnostics are always published in notification order.

pub mod analysis;
pub mod documents;
pub mod error;
pub mod rpc;
pub mod server;
pub mod transport;

pub use documents::{DocumentStore, TextChange};
pub use error::LspError;
pub use server::{LspServer, ServerState};

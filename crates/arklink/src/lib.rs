//! ArkLink: the E# linker library.
//!
//! Two public surfaces: [`ImportLibrary`] parses Unix AR archives holding
//! PE short-import records and MinGW-style import-descriptor objects into a
//! symbol table the linker resolves dynamic imports against, and
//! [`LinkSession`] turns a configured set of object files into an
//! executable (or reports exactly why it cannot).

pub mod ar;
pub mod error;
pub mod import;
pub mod object;
pub mod session;

pub use error::{ImportError, LinkError};
pub use import::{ImportEntry, ImportKind, ImportLibrary};
pub use session::{LinkSession, LinkTarget, LogLevel, OutputKind, Subsystem};

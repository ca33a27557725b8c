//! E# intermediate representation: arena storage, typed object pools, the
//! interned type pool, the instruction/block/function/module model, the SSA
//! constructor, and the middle-end bookkeeping (profiler, stack-frame
//! analyser).
//!
//! Storage discipline
//! ------------------
//! Every IR node (instruction, basic block, variable-version, phi, type) is
//! addressed by a dense `u32` handle into a per-kind [`pool::Pool`]. The
//! pools never hand out references that outlive a borrow of the module, so
//! freeing a slot can never invalidate caller-held handles; a recycled slot
//! is reset to its default value before reuse and is only ever reused for
//! the same kind.
//!
//! Core invariants (checked by `ssa::verify` and the builder):
//! * A block holds exactly one terminator and it is the last instruction.
//! * After SSA construction every load references the most recent dominating
//!   version of its variable, `(name, version)` pairs are unique per
//!   function, and every phi has exactly as many operands as its block has
//!   predecessors.
//! * Interned string data lives in the module arena and never moves.

pub mod arena;
pub mod builder;
pub mod error;
pub mod module;
pub mod pool;
pub mod profile;
pub mod ssa;
pub mod stack_frame;
pub mod types;

pub use builder::IrBuilder;
pub use error::IrError;
pub use module::{
    Block, BlockId, Function, FuncId, Inst, InstId, Module, Opcode, Phi, PhiId, Sym, Value, VarId,
    VarVersion,
};
pub use types::{TypeId, TypeModifiers, TypePool};

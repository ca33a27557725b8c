//! The IR object model: values, instructions, basic blocks, functions and
//! the module that owns them.
//!
//! All cross-references are pool handles (`InstId`, `BlockId`, `VarId`,
//! `PhiId`) rather than pointers; the module owns one pool per object kind
//! plus the byte arena that holds interned name data. Successor edges are
//! not stored: they are derived from a block's terminator on demand, which
//! keeps the one-terminator invariant the single source of truth for
//! control flow.

use std::collections::HashMap;

use crate::arena::{Arena, ArenaStr};
use crate::pool::{Handle, Pool, PoolStats};
use crate::types::{TypeId, TypePool};

/// Interned name handle. Symbols are module-wide: the same spelling always
/// maps to the same `Sym`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sym(pub u32);

/// Function index inside a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

pub type InstId = Handle<Inst>;
pub type BlockId = Handle<Block>;
pub type VarId = Handle<VarVersion>;
pub type PhiId = Handle<Phi>;

/// IR opcodes. Comparison opcodes are kept contiguous in spirit via
/// [`Opcode::is_comparison`] rather than discriminant arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Opcode {
    #[default]
    Nop,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    BitNot,
    // Comparison
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    // Logical
    LogicalAnd,
    LogicalOr,
    LogicalNot,
    // Memory
    Load,
    Store,
    // Control flow
    Br,
    BrCond,
    Call,
    Ret,
    // SSA
    Phi,
    // Conversion
    Cast,
}

impl Opcode {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge | Opcode::Eq | Opcode::Ne
        )
    }

    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Br | Opcode::BrCond | Opcode::Ret)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Neg => "neg",
            Opcode::BitAnd => "and",
            Opcode::BitOr => "or",
            Opcode::BitXor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::BitNot => "bnot",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Le => "le",
            Opcode::Ge => "ge",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::LogicalAnd => "land",
            Opcode::LogicalOr => "lor",
            Opcode::LogicalNot => "lnot",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Br => "br",
            Opcode::BrCond => "br_cond",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Phi => "phi",
            Opcode::Cast => "cast",
        }
    }
}

/// A small copyable operand. Values never own storage: variable references
/// point at pool slots, labels at blocks, constants into the module table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    ImmInt(i64),
    ImmFloat(f64),
    Var(VarId),
    Label(BlockId),
    Const(u32),
}

impl Default for Value {
    fn default() -> Self {
        Value::ImmInt(0)
    }
}

/// One instruction. `result` is the variable-version the instruction
/// defines, when it defines one.
#[derive(Debug, Clone, Default)]
pub struct Inst {
    pub opcode: Opcode,
    pub operands: Vec<Value>,
    pub result: Option<VarId>,
    pub block: Option<BlockId>,
    pub line: u32,
}

/// Ordered instruction sequence plus the predecessor list SSA construction
/// relies on. Phi nodes are pinned to block entry, ahead of `insts`.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub label: Option<Sym>,
    pub insts: Vec<InstId>,
    pub preds: Vec<BlockId>,
    pub phis: Vec<PhiId>,
    pub terminated: bool,
}

/// An SSA name `<var>#<n>` with its defining site.
#[derive(Debug, Clone, Default)]
pub struct VarVersion {
    pub name: Option<Sym>,
    pub version: u32,
    pub ty: Option<TypeId>,
    pub def_inst: Option<InstId>,
    pub def_block: Option<BlockId>,
}

/// Phi node. `args` is indexed by the owning block's predecessor order and
/// is fully populated once renaming finishes.
#[derive(Debug, Clone, Default)]
pub struct Phi {
    pub name: Option<Sym>,
    pub ty: Option<TypeId>,
    pub block: Option<BlockId>,
    pub args: Vec<Option<(BlockId, VarId)>>,
    pub result: Option<VarId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(Sym, TypeId)>,
    pub ret: TypeId,
    pub entry: BlockId,
    /// Blocks in allocation order; index 0 is the entry.
    pub blocks: Vec<BlockId>,
    /// Pre-SSA name to current-version map; SSA renaming rebuilds it.
    pub symbols: HashMap<Sym, VarId>,
    pub next_temp: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Global {
    pub name: Sym,
    pub ty: TypeId,
    pub value: Handle<Value>,
}

/// Module: the unit of compilation. Owns the arena, the six object pools
/// and the type pool; everything else is handles.
pub struct Module {
    pub name: String,
    arena: Arena,
    sym_map: HashMap<String, Sym>,
    sym_data: Vec<ArenaStr>,
    pub insts: Pool<Inst>,
    pub blocks: Pool<Block>,
    pub values: Pool<Value>,
    pub vars: Pool<VarVersion>,
    pub phis: Pool<Phi>,
    pub types: TypePool,
    functions: Vec<Function>,
    func_index: HashMap<String, FuncId>,
    globals: Vec<Global>,
    constants: Vec<Sym>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arena: Arena::new(),
            sym_map: HashMap::new(),
            sym_data: Vec::new(),
            insts: Pool::new("instruction"),
            blocks: Pool::new("basic-block"),
            values: Pool::new("value"),
            vars: Pool::new("var-version"),
            phis: Pool::new("phi"),
            types: TypePool::new(),
            functions: Vec::new(),
            func_index: HashMap::new(),
            globals: Vec::new(),
            constants: Vec::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Symbols
    // ---------------------------------------------------------------------

    pub fn intern(&mut self, name: &str) -> Sym {
        if let Some(&sym) = self.sym_map.get(name) {
            return sym;
        }
        let handle = self.arena.strdup(name);
        let sym = Sym(self.sym_data.len() as u32);
        self.sym_data.push(handle);
        self.sym_map.insert(name.to_string(), sym);
        sym
    }

    pub fn sym_name(&self, sym: Sym) -> &str {
        self.arena.str(self.sym_data[sym.0 as usize])
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    // ---------------------------------------------------------------------
    // Functions & globals
    // ---------------------------------------------------------------------

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.func_index.insert(func.name.clone(), id);
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.func_index.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn add_global(&mut self, name: &str, ty: TypeId, initial: Value) -> Global {
        let name = self.intern(name);
        let slot = self.values.alloc();
        *self.values.get_mut(slot) = initial;
        let global = Global {
            name,
            ty,
            value: slot,
        };
        self.globals.push(global);
        global
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Intern a string literal into the module constant table and return
    /// its index for `Value::Const` operands.
    pub fn add_string_constant(&mut self, text: &str) -> u32 {
        let sym = self.intern(text);
        self.constants.push(sym);
        (self.constants.len() - 1) as u32
    }

    pub fn string_constant(&self, index: u32) -> &str {
        self.sym_name(self.constants[index as usize])
    }

    pub fn string_constants(&self) -> impl Iterator<Item = &str> {
        self.constants.iter().map(|&sym| self.sym_name(sym))
    }

    // ---------------------------------------------------------------------
    // Control-flow queries
    // ---------------------------------------------------------------------

    /// Successor edges, derived from the block's terminator.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let b = self.blocks.get(block);
        let Some(&last) = b.insts.last() else {
            return Vec::new();
        };
        let inst = self.insts.get(last);
        match inst.opcode {
            Opcode::Br | Opcode::BrCond => inst
                .operands
                .iter()
                .filter_map(|v| match v {
                    Value::Label(target) => Some(*target),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let b = self.blocks.get(block);
        b.insts.last().copied().filter(|&id| {
            self.insts.get(id).opcode.is_terminator()
        })
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    pub fn display_value(&self, value: &Value) -> String {
        match value {
            Value::ImmInt(v) => v.to_string(),
            Value::ImmFloat(v) => format!("{v:?}"),
            Value::Var(id) => {
                let var = self.vars.get(*id);
                match var.name {
                    Some(sym) => format!("%{}#{}", self.sym_name(sym), var.version),
                    None => format!("%v{}", id.index()),
                }
            }
            Value::Label(id) => self.block_label(*id),
            Value::Const(idx) => format!("const[{idx}]"),
        }
    }

    pub fn block_label(&self, id: BlockId) -> String {
        match self.blocks.get(id).label {
            Some(sym) => self.sym_name(sym).to_string(),
            None => format!("bb{}", id.index()),
        }
    }

    pub fn render_function(&self, id: FuncId) -> String {
        let func = self.function(id);
        let mut out = String::new();
        let params = func
            .params
            .iter()
            .map(|(sym, ty)| format!("{} %{}", self.types.display(*ty), self.sym_name(*sym)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "function @{}({}) -> {} {{\n",
            func.name,
            params,
            self.types.display(func.ret)
        ));
        for &block_id in &func.blocks {
            let block = self.blocks.get(block_id);
            out.push_str(&format!("{}:\n", self.block_label(block_id)));
            for &phi_id in &block.phis {
                let phi = self.phis.get(phi_id);
                let args = phi
                    .args
                    .iter()
                    .map(|arg| match arg {
                        Some((pred, var)) => format!(
                            "[{}, {}]",
                            self.block_label(*pred),
                            self.display_value(&Value::Var(*var))
                        ),
                        None => "[?]".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let result = phi
                    .result
                    .map(|r| self.display_value(&Value::Var(r)))
                    .unwrap_or_else(|| "%?".into());
                out.push_str(&format!("  {result} = phi {args}\n"));
            }
            for &inst_id in &block.insts {
                let inst = self.insts.get(inst_id);
                let operands = inst
                    .operands
                    .iter()
                    .map(|v| self.display_value(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                match inst.result {
                    Some(result) => out.push_str(&format!(
                        "  {} = {} {}\n",
                        self.display_value(&Value::Var(result)),
                        inst.opcode.mnemonic(),
                        operands
                    )),
                    None => {
                        out.push_str(&format!("  {} {}\n", inst.opcode.mnemonic(), operands))
                    }
                }
            }
        }
        out.push_str("}\n");
        out
    }

    pub fn render(&self) -> String {
        let mut out = format!("; module {}\n", self.name);
        for global in &self.globals {
            out.push_str(&format!(
                "@{} : {} = {}\n",
                self.sym_name(global.name),
                self.types.display(global.ty),
                self.display_value(self.values.get(global.value)),
            ));
        }
        for (id, _) in self.functions() {
            out.push('\n');
            out.push_str(&self.render_function(id));
        }
        out
    }

    /// Per-kind pool statistics, in the fixed kind order.
    pub fn pool_report(&self) -> Vec<(&'static str, PoolStats)> {
        vec![
            ("instruction", self.insts.stats()),
            ("basic-block", self.blocks.stats()),
            ("value", self.values.stats()),
            ("type", self.types.stats()),
            ("var-version", self.vars.stats()),
            ("phi", self.phis.stats()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut module = Module::new("t");
        let a = module.intern("x");
        let b = module.intern("x");
        let c = module.intern("y");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.sym_name(a), "x");
    }

    #[test]
    fn pool_report_covers_all_six_kinds() {
        let module = Module::new("t");
        let report = module.pool_report();
        let names: Vec<_> = report.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            [
                "instruction",
                "basic-block",
                "value",
                "type",
                "var-version",
                "phi"
            ]
        );
    }
}

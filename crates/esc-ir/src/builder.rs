//! Cursor-based IR construction.
//!
//! The builder keeps a current-function / current-block cursor. Emitting
//! appends to the current block; creating a block never moves the cursor;
//! emitting into a block that already holds its terminator is
//! [`IrError::Malformed`]. Moving the cursor onto any existing block of the
//! current function is legal, terminated or not (useful when filling in
//! predecessors out of order). Backward branch edges are legal.
//!
//! Variable access before SSA construction goes through named
//! variable-versions: each name gets one version-0 record per function, and
//! `ssa::construct` later rewrites loads and stores into proper versions.

use crate::error::IrError;
use crate::module::{
    Block, BlockId, FuncId, Function, Inst, InstId, Module, Opcode, Sym, Value, VarId,
};
use crate::types::TypeId;

pub struct IrBuilder {
    module: Module,
    cur_func: Option<FuncId>,
    cur_block: Option<BlockId>,
}

impl IrBuilder {
    pub fn new(module_name: &str) -> Self {
        Self {
            module: Module::new(module_name),
            cur_func: None,
            cur_block: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// Consume the builder, yielding the finished module.
    pub fn finish(self) -> Module {
        self.module
    }

    // ---------------------------------------------------------------------
    // Cursor management
    // ---------------------------------------------------------------------

    /// Start a function; creates its entry block and moves the cursor there.
    pub fn begin_function(
        &mut self,
        name: &str,
        params: &[(&str, TypeId)],
        ret: TypeId,
    ) -> FuncId {
        let params: Vec<(Sym, TypeId)> = params
            .iter()
            .map(|(n, t)| (self.module.intern(n), *t))
            .collect();
        let entry_label = self.module.intern("entry");
        let entry = self.module.blocks.alloc();
        *self.module.blocks.get_mut(entry) = Block {
            label: Some(entry_label),
            ..Block::default()
        };
        let func = Function {
            name: name.to_string(),
            params,
            ret,
            entry,
            blocks: vec![entry],
            symbols: Default::default(),
            next_temp: 0,
        };
        let id = self.module.add_function(func);
        self.cur_func = Some(id);
        self.cur_block = Some(entry);
        id
    }

    /// Create a block in the current function without moving the cursor.
    pub fn create_block(&mut self, label: &str) -> Result<BlockId, IrError> {
        let func = self.require_function()?;
        let label = self.module.intern(label);
        let id = self.module.blocks.alloc();
        *self.module.blocks.get_mut(id) = Block {
            label: Some(label),
            ..Block::default()
        };
        self.module.function_mut(func).blocks.push(id);
        Ok(id)
    }

    pub fn set_block(&mut self, block: BlockId) {
        self.cur_block = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.cur_block
    }

    fn require_function(&self) -> Result<FuncId, IrError> {
        self.cur_func
            .ok_or_else(|| IrError::Malformed("no current function".into()))
    }

    fn require_block(&self) -> Result<BlockId, IrError> {
        self.cur_block
            .ok_or_else(|| IrError::Malformed("no current block".into()))
    }

    // ---------------------------------------------------------------------
    // Instruction emission
    // ---------------------------------------------------------------------

    pub fn emit(
        &mut self,
        opcode: Opcode,
        operands: Vec<Value>,
        result: Option<VarId>,
        line: u32,
    ) -> Result<InstId, IrError> {
        let block_id = self.require_block()?;
        {
            let block = self.module.blocks.get(block_id);
            if block.terminated {
                return Err(IrError::Malformed(format!(
                    "emit {} into terminated block {}",
                    opcode.mnemonic(),
                    self.module.block_label(block_id)
                )));
            }
        }
        // Record predecessor edges for branch targets before appending.
        if matches!(opcode, Opcode::Br | Opcode::BrCond) {
            for value in &operands {
                if let Value::Label(target) = value {
                    let preds = &mut self.module.blocks.get_mut(*target).preds;
                    if !preds.contains(&block_id) {
                        preds.push(block_id);
                    }
                }
            }
        }
        let id = self.module.insts.alloc();
        *self.module.insts.get_mut(id) = Inst {
            opcode,
            operands,
            result,
            block: Some(block_id),
            line,
        };
        let block = self.module.blocks.get_mut(block_id);
        block.insts.push(id);
        if opcode.is_terminator() {
            block.terminated = true;
        }
        Ok(id)
    }

    /// Version-0 record for `name`, created on first use.
    fn pre_ssa_var(&mut self, name: &str) -> Result<VarId, IrError> {
        let func = self.require_function()?;
        let sym = self.module.intern(name);
        if let Some(&var) = self.module.function(func).symbols.get(&sym) {
            return Ok(var);
        }
        let var = self.module.vars.alloc();
        let block = self.cur_block;
        let slot = self.module.vars.get_mut(var);
        slot.name = Some(sym);
        slot.version = 0;
        slot.def_block = block;
        self.module.function_mut(func).symbols.insert(sym, var);
        Ok(var)
    }

    /// Fresh unnamed temporary for instruction results.
    pub fn fresh_temp(&mut self, ty: TypeId) -> Result<VarId, IrError> {
        let func = self.require_function()?;
        let n = {
            let f = self.module.function_mut(func);
            let n = f.next_temp;
            f.next_temp += 1;
            n
        };
        let sym = self.module.intern(&format!("t{n}"));
        let var = self.module.vars.alloc();
        let block = self.cur_block;
        let slot = self.module.vars.get_mut(var);
        slot.name = Some(sym);
        slot.version = 0;
        slot.ty = Some(ty);
        slot.def_block = block;
        Ok(var)
    }

    /// `store name, value` in pre-SSA form.
    pub fn store(&mut self, name: &str, value: Value, line: u32) -> Result<InstId, IrError> {
        let var = self.pre_ssa_var(name)?;
        self.emit(Opcode::Store, vec![Value::Var(var), value], None, line)
    }

    /// `load name` in pre-SSA form; yields the temporary holding the value.
    pub fn load(&mut self, name: &str, ty: TypeId, line: u32) -> Result<(InstId, VarId), IrError> {
        let var = self.pre_ssa_var(name)?;
        let temp = self.fresh_temp(ty)?;
        let inst = self.emit(Opcode::Load, vec![Value::Var(var)], Some(temp), line)?;
        let slot = self.module.vars.get_mut(temp);
        slot.def_inst = Some(inst);
        Ok((inst, temp))
    }

    /// Binary instruction with the result type of the type-pool rule.
    pub fn binary(
        &mut self,
        opcode: Opcode,
        lhs: Value,
        rhs: Value,
        ty: TypeId,
        line: u32,
    ) -> Result<(InstId, VarId), IrError> {
        let temp = self.fresh_temp(ty)?;
        let inst = self.emit(opcode, vec![lhs, rhs], Some(temp), line)?;
        let slot = self.module.vars.get_mut(temp);
        slot.def_inst = Some(inst);
        Ok((inst, temp))
    }

    pub fn br(&mut self, target: BlockId, line: u32) -> Result<InstId, IrError> {
        self.emit(Opcode::Br, vec![Value::Label(target)], None, line)
    }

    pub fn br_cond(
        &mut self,
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
        line: u32,
    ) -> Result<InstId, IrError> {
        self.emit(
            Opcode::BrCond,
            vec![cond, Value::Label(then_block), Value::Label(else_block)],
            None,
            line,
        )
    }

    pub fn ret(&mut self, value: Option<Value>, line: u32) -> Result<InstId, IrError> {
        let operands = value.into_iter().collect();
        self.emit(Opcode::Ret, operands, None, line)
    }

    pub fn call(
        &mut self,
        callee: &str,
        args: Vec<Value>,
        result_ty: Option<TypeId>,
        line: u32,
    ) -> Result<(InstId, Option<VarId>), IrError> {
        let callee_sym = self.module.intern(callee);
        let callee_var = self.module.vars.alloc();
        {
            let slot = self.module.vars.get_mut(callee_var);
            slot.name = Some(callee_sym);
        }
        let mut operands = vec![Value::Var(callee_var)];
        operands.extend(args);
        let result = match result_ty {
            Some(ty) => Some(self.fresh_temp(ty)?),
            None => None,
        };
        let inst = self.emit(Opcode::Call, operands, result, line)?;
        if let Some(var) = result {
            self.module.vars.get_mut(var).def_inst = Some(inst);
        }
        Ok((inst, result))
    }
}

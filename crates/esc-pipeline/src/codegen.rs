//! Back-end dispatch: AST to IR lowering, SSA, and the per-target
//! emitters (IR text, x86-64 assembly text, VM bytecode, EO object).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use esc_front::ast::{BinaryOp, Block, Expr, Function, Item, Program, Stmt, UnaryOp};
use esc_ir::module::{Opcode, Value};
use esc_ir::profile::{Phase, PhaseScope};
use esc_ir::types::TypeId;
use esc_ir::{IrBuilder, Module, ssa, stack_frame};
use esc_vm::{Chunk, Constant, OpCode};

use crate::error::PipelineError;

/// Compilation target of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// NASM-syntax x86-64 assembly text.
    #[default]
    Asm,
    /// Rendered IR text.
    Ir,
    /// Assembly that the driver then assembles and links natively.
    Exe,
    /// `.esbc` bytecode for the VM backend.
    Vm,
    /// EO object consumed directly by the ArkLink session.
    Eo,
}

impl Target {
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "asm" => Target::Asm,
            "ir" => Target::Ir,
            "exe" => Target::Exe,
            "vm" => Target::Vm,
            "eo" => Target::Eo,
            _ => return None,
        })
    }

    pub fn artifact_extension(self) -> &'static str {
        match self {
            Target::Asm | Target::Exe => "asm",
            Target::Ir => "ir",
            Target::Vm => "esbc",
            Target::Eo => "eo",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Asm => "asm",
            Target::Ir => "ir",
            Target::Exe => "exe",
            Target::Vm => "vm",
            Target::Eo => "eo",
        })
    }
}

/// Runtime symbols backing the console intrinsics in native targets.
const RUNTIME_SYMBOLS: &[(&str, &str)] = &[
    ("Console.WriteLine", "es_console_write_line"),
    ("Console.Write", "es_console_write"),
    ("Console.WriteLineInt", "es_console_write_line_int"),
    ("Console.WriteInt", "es_console_write_int"),
];

pub struct CodeGenerator {
    target: Target,
    file: String,
}

impl CodeGenerator {
    pub fn new(target: Target, file: &str) -> Self {
        Self {
            target,
            file: file.to_string(),
        }
    }

    fn err(&self, detail: impl Into<String>) -> PipelineError {
        PipelineError::Codegen {
            file: self.file.clone(),
            detail: detail.into(),
        }
    }

    /// Lower, transform and emit `program` into `output`.
    pub fn generate(&self, program: &Program, output: &Path) -> Result<(), PipelineError> {
        let _scope = PhaseScope::enter(Phase::Codegen);
        match self.target {
            Target::Ir => {
                let lowered = self.lower(program)?;
                std::fs::write(output, lowered.module.render())?;
            }
            Target::Asm | Target::Exe => {
                let lowered = self.lower(program)?;
                let asm = emit_asm(&lowered);
                std::fs::write(output, asm)?;
            }
            Target::Vm => {
                let chunk = BytecodeCompiler::new(&self.file).compile(program)?;
                chunk
                    .save(output)
                    .map_err(|e| self.err(e.to_string()))?;
            }
            Target::Eo => {
                let lowered = self.lower(program)?;
                let defined: Vec<&str> = lowered
                    .module
                    .functions()
                    .map(|(_, f)| f.name.as_str())
                    .collect();
                let undefined: Vec<&str> = lowered
                    .runtime_refs
                    .iter()
                    .map(String::as_str)
                    .collect();
                // The object container follows the host link target.
                let object = if cfg!(windows) {
                    arklink::object::write_minimal_coff(
                        arklink::import::COFF_MACHINE_AMD64,
                        &defined,
                        &undefined,
                    )
                } else {
                    arklink::object::write_minimal_elf(&defined, &undefined)
                };
                std::fs::write(output, object)?;
            }
        }
        Ok(())
    }

    /// Lower every function to IR and promote it to SSA.
    fn lower(&self, program: &Program) -> Result<Lowered, PipelineError> {
        let _scope = PhaseScope::enter(Phase::IrGen);
        let mut lowering = Lowering::new(&self.file);
        for item in &program.items {
            if let Item::Function(func) = item {
                lowering.lower_function(func).map_err(|d| self.err(d))?;
            }
        }
        let mut module = lowering.builder.finish();
        for id in module
            .functions()
            .map(|(id, _)| id)
            .collect::<Vec<_>>()
        {
            ssa::construct(&mut module, id).map_err(|e| self.err(e.to_string()))?;
        }
        Ok(Lowered {
            module,
            runtime_refs: lowering.runtime_refs,
        })
    }
}

struct Lowered {
    module: Module,
    runtime_refs: Vec<String>,
}

// -------------------------------------------------------------------------
// AST -> IR
// -------------------------------------------------------------------------

struct Lowering {
    builder: IrBuilder,
    runtime_refs: Vec<String>,
    block_counter: u32,
}

impl Lowering {
    fn new(module_name: &str) -> Self {
        Self {
            builder: IrBuilder::new(module_name),
            runtime_refs: Vec::new(),
            block_counter: 0,
        }
    }

    fn resolve(&mut self, name: &str) -> TypeId {
        let types = &mut self.builder.module_mut().types;
        match name {
            "void" => types.void(),
            "int8" => types.int8(),
            "int16" => types.int16(),
            "int32" => types.int32(),
            "int64" => types.int64(),
            "uint8" => types.uint8(),
            "uint16" => types.uint16(),
            "uint32" => types.uint32(),
            "uint64" => types.uint64(),
            "float32" => types.float32(),
            "float64" => types.float64(),
            "bool" => types.bool(),
            "char" => types.char(),
            "string" => types.string(),
            _ => types.any(),
        }
    }

    fn fresh_label(&mut self, base: &str) -> String {
        self.block_counter += 1;
        format!("{base}{}", self.block_counter)
    }

    fn lower_function(&mut self, func: &Function) -> Result<(), String> {
        let params: Vec<(String, TypeId)> = func
            .params
            .iter()
            .map(|p| (p.name.clone(), self.resolve(&p.ty.name)))
            .collect();
        let param_refs: Vec<(&str, TypeId)> = params
            .iter()
            .map(|(name, ty)| (name.as_str(), *ty))
            .collect();
        let ret = self.resolve(&func.ret.name);
        self.builder.begin_function(&func.name, &param_refs, ret);
        self.lower_block(&func.body)?;

        // Fall-through: close the open block with a default return.
        if let Some(block) = self.builder.current_block()
            && !self.builder.module().blocks.get(block).terminated
        {
            let line = func.body.line;
            self.builder
                .ret(Some(Value::ImmInt(0)), line)
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn lower_block(&mut self, block: &Block) -> Result<(), String> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), String> {
        match stmt {
            Stmt::Let {
                name, init, line, ..
            } => {
                let value = match init {
                    Some(expr) => self.lower_expr(expr)?,
                    None => Value::ImmInt(0),
                };
                self.builder
                    .store(name, value, *line)
                    .map_err(|e| e.to_string())?;
                Ok(())
            }
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                let value = self.lower_expr(value)?;
                self.builder
                    .store(target, value, *line)
                    .map_err(|e| e.to_string())?;
                Ok(())
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                line,
            } => {
                let cond_value = self.lower_expr(cond)?;
                let then_label = self.fresh_label("then");
                let else_label = self.fresh_label("else");
                let merge_label = self.fresh_label("merge");
                let then_id = self.builder.create_block(&then_label).map_err(|e| e.to_string())?;
                let merge_id = self
                    .builder
                    .create_block(&merge_label)
                    .map_err(|e| e.to_string())?;
                let else_id = if else_block.is_some() {
                    self.builder.create_block(&else_label).map_err(|e| e.to_string())?
                } else {
                    merge_id
                };
                self.builder
                    .br_cond(cond_value, then_id, else_id, *line)
                    .map_err(|e| e.to_string())?;

                self.builder.set_block(then_id);
                self.lower_block(then_block)?;
                self.branch_to_if_open(merge_id, *line)?;

                if let Some(else_block) = else_block {
                    self.builder.set_block(else_id);
                    self.lower_block(else_block)?;
                    self.branch_to_if_open(merge_id, *line)?;
                }

                self.builder.set_block(merge_id);
                Ok(())
            }
            Stmt::While { cond, body, line } => {
                let header_label = self.fresh_label("header");
                let body_label = self.fresh_label("body");
                let exit_label = self.fresh_label("exit");
                let header = self
                    .builder
                    .create_block(&header_label)
                    .map_err(|e| e.to_string())?;
                let body_id = self.builder.create_block(&body_label).map_err(|e| e.to_string())?;
                let exit = self.builder.create_block(&exit_label).map_err(|e| e.to_string())?;

                self.builder.br(header, *line).map_err(|e| e.to_string())?;
                self.builder.set_block(header);
                let cond_value = self.lower_expr(cond)?;
                self.builder
                    .br_cond(cond_value, body_id, exit, *line)
                    .map_err(|e| e.to_string())?;

                self.builder.set_block(body_id);
                self.lower_block(body)?;
                self.branch_to_if_open(header, *line)?;

                self.builder.set_block(exit);
                Ok(())
            }
            Stmt::Return { value, line } => {
                let value = match value {
                    Some(expr) => Some(self.lower_expr(expr)?),
                    None => None,
                };
                self.builder.ret(value, *line).map_err(|e| e.to_string())?;
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            Stmt::Block(block) => self.lower_block(block),
        }
    }

    fn branch_to_if_open(&mut self, target: esc_ir::BlockId, line: u32) -> Result<(), String> {
        if let Some(block) = self.builder.current_block()
            && !self.builder.module().blocks.get(block).terminated
        {
            self.builder.br(target, line).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Value, String> {
        match expr {
            Expr::IntLiteral { value, .. } => Ok(Value::ImmInt(*value)),
            Expr::FloatLiteral { value, .. } => Ok(Value::ImmFloat(*value)),
            Expr::BoolLiteral { value, .. } => Ok(Value::ImmInt(i64::from(*value))),
            Expr::CharLiteral { value, .. } => Ok(Value::ImmInt(*value as i64)),
            Expr::NullLiteral { .. } => Ok(Value::ImmInt(0)),
            Expr::StringLiteral { value, .. } => {
                let module = self.builder.module_mut();
                let index = module.add_string_constant(value);
                let string_ty = module.types.string();
                module.add_global(&format!(".str{index}"), string_ty, Value::Const(index));
                Ok(Value::Const(index))
            }
            Expr::Ident { name, line } => {
                let ty = self.builder.module_mut().types.int32();
                let (_, temp) = self
                    .builder
                    .load(name, ty, *line)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Var(temp))
            }
            Expr::Path { segments, .. } => {
                Err(format!("'{}' is not a value", segments.join(".")))
            }
            Expr::Binary { op, lhs, rhs, line } => {
                let lhs_value = self.lower_expr(lhs)?;
                let rhs_value = self.lower_expr(rhs)?;
                let opcode = match op {
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Sub => Opcode::Sub,
                    BinaryOp::Mul => Opcode::Mul,
                    BinaryOp::Div => Opcode::Div,
                    BinaryOp::Mod => Opcode::Mod,
                    BinaryOp::BitAnd => Opcode::BitAnd,
                    BinaryOp::BitOr => Opcode::BitOr,
                    BinaryOp::BitXor => Opcode::BitXor,
                    BinaryOp::Shl => Opcode::Shl,
                    BinaryOp::Shr => Opcode::Shr,
                    BinaryOp::Lt => Opcode::Lt,
                    BinaryOp::Gt => Opcode::Gt,
                    BinaryOp::Le => Opcode::Le,
                    BinaryOp::Ge => Opcode::Ge,
                    BinaryOp::Eq => Opcode::Eq,
                    BinaryOp::Ne => Opcode::Ne,
                    BinaryOp::And => Opcode::LogicalAnd,
                    BinaryOp::Or => Opcode::LogicalOr,
                };
                let float = matches!(lhs_value, Value::ImmFloat(_))
                    || matches!(rhs_value, Value::ImmFloat(_));
                let ty = if opcode.is_comparison() {
                    self.builder.module_mut().types.bool()
                } else if float {
                    self.builder.module_mut().types.float64()
                } else {
                    self.builder.module_mut().types.int32()
                };
                let (_, temp) = self
                    .builder
                    .binary(opcode, lhs_value, rhs_value, ty, *line)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Var(temp))
            }
            Expr::Unary { op, operand, line } => {
                let value = self.lower_expr(operand)?;
                let (opcode, ty) = match op {
                    UnaryOp::Neg => (Opcode::Neg, self.builder.module_mut().types.int32()),
                    UnaryOp::Not => (Opcode::LogicalNot, self.builder.module_mut().types.bool()),
                };
                let temp = self.builder.fresh_temp(ty).map_err(|e| e.to_string())?;
                self.builder
                    .emit(opcode, vec![value], Some(temp), *line)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Var(temp))
            }
            Expr::Call { callee, args, line } => {
                let name = match callee.as_ref() {
                    Expr::Ident { name, .. } => name.clone(),
                    Expr::Path { segments, .. } => {
                        let joined = segments.join(".");
                        if let Some((_, runtime)) = RUNTIME_SYMBOLS
                            .iter()
                            .find(|(surface, _)| *surface == joined)
                        {
                            let runtime = (*runtime).to_string();
                            if !self.runtime_refs.contains(&runtime) {
                                self.runtime_refs.push(runtime.clone());
                            }
                            runtime
                        } else {
                            joined
                        }
                    }
                    _ => return Err("unsupported callee expression".into()),
                };
                let mut lowered_args = Vec::with_capacity(args.len());
                for arg in args {
                    lowered_args.push(self.lower_expr(arg)?);
                }
                let ret = self.builder.module_mut().types.int32();
                let (_, result) = self
                    .builder
                    .call(&name, lowered_args, Some(ret), *line)
                    .map_err(|e| e.to_string())?;
                Ok(result.map(Value::Var).unwrap_or(Value::ImmInt(0)))
            }
            Expr::New { .. } => Ok(Value::ImmInt(0)),
        }
    }
}

// -------------------------------------------------------------------------
// x86-64 assembly emission
// -------------------------------------------------------------------------

fn slot_for(var: usize, next: &mut usize, slots: &mut HashMap<usize, usize>) -> usize {
    *slots.entry(var).or_insert_with(|| {
        *next += 1;
        *next
    })
}

fn load_operand(
    value: &Value,
    register: &str,
    next: &mut usize,
    slots: &mut HashMap<usize, usize>,
    out: &mut String,
) {
    match value {
        Value::ImmInt(v) => out.push_str(&format!("    mov {register}, {v}\n")),
        Value::ImmFloat(v) => {
            out.push_str(&format!("    mov {register}, {}\n", v.to_bits()))
        }
        Value::Var(var) => {
            let slot = slot_for(var.index(), next, slots);
            out.push_str(&format!("    mov {register}, [rbp-{}]\n", slot * 8));
        }
        Value::Const(index) => out.push_str(&format!("    lea {register}, [.str{index}]\n")),
        Value::Label(_) => {}
    }
}

/// Naive stack-slot assembly: every variable version gets an 8-byte slot,
/// every operation round-trips through rax/rcx. Readable, correct, slow.
fn emit_asm(lowered: &Lowered) -> String {
    let module = &lowered.module;
    let mut out = String::new();
    out.push_str("; generated by esc\n");
    out.push_str("default rel\nsection .data\n");
    for (index, literal) in module.string_constants().enumerate() {
        let escaped = literal.replace('`', "").replace('\n', "\\n");
        out.push_str(&format!(".str{index}: db `{escaped}`, 0\n"));
    }
    out.push_str("\nsection .text\n");
    for runtime in &lowered.runtime_refs {
        out.push_str(&format!("extern {runtime}\n"));
    }

    for (_, func) in module.functions() {
        out.push_str(&format!("global {0}\n{0}:\n", func.name));
        // Slot assignment per variable version, in first-use order.
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut next_slot = 0usize;
        let mut local_count = 0usize;
        for &block_id in &func.blocks {
            local_count += module.blocks.get(block_id).insts.len();
        }
        let frame = stack_frame::predict(func.params.len(), local_count);
        out.push_str("    push rbp\n    mov rbp, rsp\n");
        out.push_str(&format!("    sub rsp, {frame}\n"));

        for &block_id in &func.blocks {
            out.push_str(&format!(".{}_{}:\n", func.name, module.block_label(block_id)));
            let block = module.blocks.get(block_id);
            for &inst_id in &block.insts {
                let inst = module.insts.get(inst_id);
                match inst.opcode {
                    Opcode::Store | Opcode::Load => {
                        if let Some(value) = inst.operands.first() {
                            load_operand(value, "rax", &mut next_slot, &mut slots, &mut out);
                        }
                        if let Some(result) = inst.result {
                            let slot = slot_for(result.index(), &mut next_slot, &mut slots);
                            out.push_str(&format!("    mov [rbp-{}], rax\n", slot * 8));
                        }
                    }
                    Opcode::Br => {
                        if let Some(Value::Label(target)) = inst.operands.first() {
                            out.push_str(&format!(
                                "    jmp .{}_{}\n",
                                func.name,
                                module.block_label(*target)
                            ));
                        }
                    }
                    Opcode::BrCond => {
                        if let [cond, Value::Label(then_b), Value::Label(else_b)] =
                            inst.operands.as_slice()
                        {
                            load_operand(cond, "rax", &mut next_slot, &mut slots, &mut out);
                            out.push_str("    test rax, rax\n");
                            out.push_str(&format!(
                                "    jnz .{}_{}\n    jmp .{}_{}\n",
                                func.name,
                                module.block_label(*then_b),
                                func.name,
                                module.block_label(*else_b)
                            ));
                        }
                    }
                    Opcode::Ret => {
                        if let Some(value) = inst.operands.first() {
                            load_operand(value, "rax", &mut next_slot, &mut slots, &mut out);
                        } else {
                            out.push_str("    xor rax, rax\n");
                        }
                        out.push_str("    leave\n    ret\n");
                    }
                    Opcode::Call => {
                        // First operand is the callee reference.
                        let callee = inst.operands.first().and_then(|v| match v {
                            Value::Var(var) => module.vars.get(*var).name,
                            _ => None,
                        });
                        let arg_registers = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
                        for (value, register) in
                            inst.operands.iter().skip(1).zip(arg_registers)
                        {
                            load_operand(value, register, &mut next_slot, &mut slots, &mut out);
                        }
                        if let Some(callee) = callee {
                            out.push_str(&format!("    call {}\n", module.sym_name(callee)));
                        }
                        if let Some(result) = inst.result {
                            let slot = slot_for(result.index(), &mut next_slot, &mut slots);
                            out.push_str(&format!("    mov [rbp-{}], rax\n", slot * 8));
                        }
                    }
                    opcode => {
                        if let [lhs, rhs] = inst.operands.as_slice() {
                            load_operand(lhs, "rax", &mut next_slot, &mut slots, &mut out);
                            load_operand(rhs, "rcx", &mut next_slot, &mut slots, &mut out);
                            out.push_str(match opcode {
                                Opcode::Add => "    add rax, rcx\n",
                                Opcode::Sub => "    sub rax, rcx\n",
                                Opcode::Mul => "    imul rax, rcx\n",
                                Opcode::Div => "    cqo\n    idiv rcx\n",
                                Opcode::Mod => "    cqo\n    idiv rcx\n    mov rax, rdx\n",
                                Opcode::BitAnd | Opcode::LogicalAnd => "    and rax, rcx\n",
                                Opcode::BitOr | Opcode::LogicalOr => "    or rax, rcx\n",
                                Opcode::BitXor => "    xor rax, rcx\n",
                                Opcode::Shl => "    mov rbx, rcx\n    mov cl, bl\n    shl rax, cl\n",
                                Opcode::Shr => "    mov rbx, rcx\n    mov cl, bl\n    shr rax, cl\n",
                                Opcode::Lt => "    cmp rax, rcx\n    setl al\n    movzx rax, al\n",
                                Opcode::Gt => "    cmp rax, rcx\n    setg al\n    movzx rax, al\n",
                                Opcode::Le => "    cmp rax, rcx\n    setle al\n    movzx rax, al\n",
                                Opcode::Ge => "    cmp rax, rcx\n    setge al\n    movzx rax, al\n",
                                Opcode::Eq => "    cmp rax, rcx\n    sete al\n    movzx rax, al\n",
                                Opcode::Ne => "    cmp rax, rcx\n    setne al\n    movzx rax, al\n",
                                _ => "    nop\n",
                            });
                        } else if let [operand] = inst.operands.as_slice() {
                            load_operand(operand, "rax", &mut next_slot, &mut slots, &mut out);
                            out.push_str(match opcode {
                                Opcode::Neg => "    neg rax\n",
                                Opcode::LogicalNot => {
                                    "    test rax, rax\n    setz al\n    movzx rax, al\n"
                                }
                                Opcode::BitNot => "    not rax\n",
                                _ => "    nop\n",
                            });
                        }
                        if let Some(result) = inst.result {
                            let slot = slot_for(result.index(), &mut next_slot, &mut slots);
                            out.push_str(&format!("    mov [rbp-{}], rax\n", slot * 8));
                        }
                    }
                }
            }
        }
        out.push('\n');
    }
    out
}

// -------------------------------------------------------------------------
// VM bytecode emission
// -------------------------------------------------------------------------

/// Two-pass AST-to-bytecode compiler: bodies are emitted function by
/// function while call sites record patch points; once every function has
/// a start offset the calls are filled in.
struct BytecodeCompiler {
    file: String,
    chunk: Chunk,
    locals: Vec<String>,
    function_offsets: HashMap<String, usize>,
    call_patches: Vec<(usize, String, u32)>,
}

impl BytecodeCompiler {
    fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            chunk: Chunk::new(),
            locals: Vec::new(),
            function_offsets: HashMap::new(),
            call_patches: Vec::new(),
        }
    }

    fn err(&self, detail: impl Into<String>) -> PipelineError {
        PipelineError::Codegen {
            file: self.file.clone(),
            detail: detail.into(),
        }
    }

    fn compile(mut self, program: &Program) -> Result<Chunk, PipelineError> {
        // Bootstrap: call main, then halt.
        self.chunk.write_op(OpCode::Call, 0);
        self.chunk.write(0, 0);
        let boot_patch = self.chunk.code.len();
        self.chunk.write(0, 0);
        self.chunk.write(0, 0);
        self.call_patches.push((boot_patch, "main".to_string(), 0));
        self.chunk.write_op(OpCode::Halt, 0);

        for item in &program.items {
            if let Item::Function(func) = item {
                self.compile_function(func)?;
            }
        }

        if !self.function_offsets.contains_key("main") {
            return Err(self.err("no 'main' function for the vm target"));
        }

        // Patch call sites now that layout is known.
        for (patch, name, line) in std::mem::take(&mut self.call_patches) {
            let Some(&target) = self.function_offsets.get(&name) else {
                return Err(self.err(format!("call to undefined function '{name}' at line {line}")));
            };
            // Offset is relative to the ip after the 2-byte operand.
            let delta = target as isize - (patch as isize + 2);
            let delta = i16::try_from(delta)
                .map_err(|_| self.err(format!("function '{name}' is out of call range")))?;
            let bytes = (delta as u16).to_be_bytes();
            self.chunk.code[patch] = bytes[0];
            self.chunk.code[patch + 1] = bytes[1];
        }

        Ok(self.chunk)
    }

    fn compile_function(&mut self, func: &Function) -> Result<(), PipelineError> {
        self.function_offsets
            .insert(func.name.clone(), self.chunk.code.len());
        self.locals = func.params.iter().map(|p| p.name.clone()).collect();
        self.compile_block(&func.body)?;
        // Implicit return for fall-through.
        let line = func.body.line as i32;
        self.chunk.write_op(OpCode::Null, line);
        self.chunk.write_op(OpCode::Return, line);
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), PipelineError> {
        let base = self.locals.len();
        for stmt in &block.stmts {
            self.compile_stmt(stmt)?;
        }
        // Locals declared in this block die with it; their stack slots
        // are popped so loop bodies do not grow the stack per iteration.
        while self.locals.len() > base {
            self.locals.pop();
            self.chunk.write_op(OpCode::Pop, block.line as i32);
        }
        Ok(())
    }

    fn local_slot(&self, name: &str) -> Option<u8> {
        self.locals
            .iter()
            .position(|local| local == name)
            .map(|slot| slot as u8)
    }

    fn emit_jump(&mut self, op: OpCode, line: i32) -> usize {
        self.chunk.write_op(op, line);
        let patch = self.chunk.code.len();
        self.chunk.write(0xff, line);
        self.chunk.write(0xff, line);
        patch
    }

    fn patch_jump(&mut self, patch: usize) -> Result<(), PipelineError> {
        let delta = self.chunk.code.len() - (patch + 2);
        let delta =
            u16::try_from(delta).map_err(|_| self.err("jump distance exceeds 16 bits"))?;
        self.chunk.code[patch] = (delta >> 8) as u8;
        self.chunk.code[patch + 1] = (delta & 0xff) as u8;
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), PipelineError> {
        match stmt {
            Stmt::Let {
                name, init, line, ..
            } => {
                match init {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.chunk.write_op(OpCode::Null, *line as i32),
                }
                // The initialised value stays on the stack as the local's
                // storage slot.
                self.locals.push(name.clone());
                Ok(())
            }
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                self.compile_expr(value)?;
                let slot = self
                    .local_slot(target)
                    .ok_or_else(|| self.err(format!("unknown local '{target}'")))?;
                self.chunk.write_op(OpCode::SetLocal, *line as i32);
                self.chunk.write(slot, *line as i32);
                self.chunk.write_op(OpCode::Pop, *line as i32);
                Ok(())
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                line,
            } => {
                let line = *line as i32;
                self.compile_expr(cond)?;
                let else_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.compile_block(then_block)?;
                let end_jump = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(else_jump)?;
                if let Some(else_block) = else_block {
                    self.compile_block(else_block)?;
                }
                self.patch_jump(end_jump)?;
                Ok(())
            }
            Stmt::While { cond, body, line } => {
                let line = *line as i32;
                let head = self.chunk.code.len();
                self.compile_expr(cond)?;
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.compile_block(body)?;
                self.chunk.write_op(OpCode::Loop, line);
                let back = self.chunk.code.len() + 2 - head;
                let back = u16::try_from(back)
                    .map_err(|_| self.err("loop body exceeds 16-bit span"))?;
                self.chunk.write((back >> 8) as u8, line);
                self.chunk.write((back & 0xff) as u8, line);
                self.patch_jump(exit_jump)?;
                Ok(())
            }
            Stmt::Return { value, line } => {
                let line = *line as i32;
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.chunk.write_op(OpCode::Null, line),
                }
                self.chunk.write_op(OpCode::Return, line);
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.chunk.write_op(OpCode::Pop, expr.line() as i32);
                Ok(())
            }
            Stmt::Block(block) => self.compile_block(block),
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), PipelineError> {
        match expr {
            Expr::IntLiteral { value, line } => {
                self.chunk
                    .emit_constant(Constant::Number(*value as f64), *line as i32);
                Ok(())
            }
            Expr::FloatLiteral { value, line } => {
                self.chunk.emit_constant(Constant::Number(*value), *line as i32);
                Ok(())
            }
            Expr::StringLiteral { value, line } => {
                self.chunk
                    .emit_constant(Constant::Str(value.clone()), *line as i32);
                Ok(())
            }
            Expr::CharLiteral { value, line } => {
                self.chunk
                    .emit_constant(Constant::Str(value.to_string()), *line as i32);
                Ok(())
            }
            Expr::BoolLiteral { value, line } => {
                let op = if *value { OpCode::True } else { OpCode::False };
                self.chunk.write_op(op, *line as i32);
                Ok(())
            }
            Expr::NullLiteral { line } => {
                self.chunk.write_op(OpCode::Null, *line as i32);
                Ok(())
            }
            Expr::Ident { name, line } => {
                let slot = self
                    .local_slot(name)
                    .ok_or_else(|| self.err(format!("unknown local '{name}'")))?;
                self.chunk.write_op(OpCode::GetLocal, *line as i32);
                self.chunk.write(slot, *line as i32);
                Ok(())
            }
            Expr::Binary { op, lhs, rhs, line } => {
                let line = *line as i32;
                match op {
                    BinaryOp::And => {
                        self.compile_expr(lhs)?;
                        let short = self.emit_jump(OpCode::JumpIfFalse, line);
                        self.compile_expr(rhs)?;
                        let end = self.emit_jump(OpCode::Jump, line);
                        self.patch_jump(short)?;
                        self.chunk.write_op(OpCode::False, line);
                        self.patch_jump(end)?;
                        return Ok(());
                    }
                    BinaryOp::Or => {
                        self.compile_expr(lhs)?;
                        self.chunk.write_op(OpCode::Not, line);
                        let short = self.emit_jump(OpCode::JumpIfFalse, line);
                        self.compile_expr(rhs)?;
                        let end = self.emit_jump(OpCode::Jump, line);
                        self.patch_jump(short)?;
                        self.chunk.write_op(OpCode::True, line);
                        self.patch_jump(end)?;
                        return Ok(());
                    }
                    _ => {}
                }
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                match op {
                    BinaryOp::Add => self.chunk.write_op(OpCode::Add, line),
                    BinaryOp::Sub => self.chunk.write_op(OpCode::Sub, line),
                    BinaryOp::Mul => self.chunk.write_op(OpCode::Mul, line),
                    BinaryOp::Div => self.chunk.write_op(OpCode::Div, line),
                    BinaryOp::Mod => {
                        return Err(self.err("'%' is not supported by the vm target"));
                    }
                    BinaryOp::Lt => self.chunk.write_op(OpCode::Less, line),
                    BinaryOp::Gt => self.chunk.write_op(OpCode::Greater, line),
                    BinaryOp::Le => {
                        self.chunk.write_op(OpCode::Greater, line);
                        self.chunk.write_op(OpCode::Not, line);
                    }
                    BinaryOp::Ge => {
                        self.chunk.write_op(OpCode::Less, line);
                        self.chunk.write_op(OpCode::Not, line);
                    }
                    BinaryOp::Eq => self.chunk.write_op(OpCode::Equal, line),
                    BinaryOp::Ne => {
                        self.chunk.write_op(OpCode::Equal, line);
                        self.chunk.write_op(OpCode::Not, line);
                    }
                    other => {
                        return Err(
                            self.err(format!("operator {other:?} is not supported by the vm target"))
                        );
                    }
                }
                Ok(())
            }
            Expr::Unary { op, operand, line } => {
                self.compile_expr(operand)?;
                let line = *line as i32;
                match op {
                    UnaryOp::Neg => self.chunk.write_op(OpCode::Negate, line),
                    UnaryOp::Not => self.chunk.write_op(OpCode::Not, line),
                }
                Ok(())
            }
            Expr::Call { callee, args, line } => {
                let line_i32 = *line as i32;
                match callee.as_ref() {
                    Expr::Path { segments, .. } => {
                        let path = segments.join(".");
                        for arg in args {
                            self.compile_expr(arg)?;
                        }
                        match path.as_str() {
                            "Console.WriteLine" | "Console.Write" => {
                                self.chunk.write_op(OpCode::Print, line_i32);
                            }
                            "Console.WriteLineInt" | "Console.WriteInt" => {
                                self.chunk.write_op(OpCode::IntToString, line_i32);
                                self.chunk.write_op(OpCode::Print, line_i32);
                            }
                            other => {
                                return Err(
                                    self.err(format!("'{other}' is not available on the vm target"))
                                );
                            }
                        }
                        // Statement position expects a value to pop.
                        self.chunk.write_op(OpCode::Null, line_i32);
                        Ok(())
                    }
                    Expr::Ident { name, .. } => {
                        for arg in args {
                            self.compile_expr(arg)?;
                        }
                        self.chunk.write_op(OpCode::Call, line_i32);
                        self.chunk.write(args.len() as u8, line_i32);
                        let patch = self.chunk.code.len();
                        self.chunk.write(0, line_i32);
                        self.chunk.write(0, line_i32);
                        self.call_patches.push((patch, name.clone(), *line));
                        Ok(())
                    }
                    _ => Err(self.err("unsupported callee expression")),
                }
            }
            Expr::Path { segments, .. } => {
                Err(self.err(format!("'{}' is not a value", segments.join("."))))
            }
            Expr::New { line, .. } => {
                self.chunk.write_op(OpCode::Null, *line as i32);
                Ok(())
            }
        }
    }
}

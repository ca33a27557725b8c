//! Expression and statement type checking against the IR type pool.
//!
//! Type resolution and the conversion rules (assignability, promotion,
//! binary results) live in `esc_ir::types`; this pass walks the AST,
//! tracks declared variable types per scope and reports mismatches as
//! [`Diagnostic`]s. An `unknown` binary result is an error diagnostic,
//! never a panic.

use std::collections::HashMap;

use esc_ir::module::Opcode;
use esc_ir::types::{TypeId, TypePool};

use crate::ast::{BinaryOp, Block, Expr, Function, Item, Program, Stmt, TypeRef, UnaryOp};
use crate::semantic::{BUILTIN_FUNCTIONS, Diagnostic, FunctionSig};

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
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
    }
}

pub struct TypeChecker {
    pub types: TypePool,
    functions: Vec<FunctionSig>,
    diagnostics: Vec<Diagnostic>,
    scopes: Vec<HashMap<String, TypeId>>,
    current_ret: Option<TypeId>,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            types: TypePool::new(),
            functions: Vec::new(),
            diagnostics: Vec::new(),
            scopes: Vec::new(),
            current_ret: None,
        }
    }

    /// Check a whole program; returns the accumulated diagnostics.
    pub fn check(mut self, program: &Program) -> Vec<Diagnostic> {
        for item in &program.items {
            match item {
                Item::Function(func) => self.functions.push(signature_of(func, None)),
                Item::Class(class) => {
                    for method in &class.methods {
                        self.functions.push(signature_of(method, Some(&class.name)));
                    }
                }
            }
        }
        for item in &program.items {
            match item {
                Item::Function(func) => self.check_function(func),
                Item::Class(class) => {
                    for method in &class.methods {
                        self.check_function(method);
                    }
                }
            }
        }
        self.diagnostics
    }

    fn error(&mut self, message: String, line: u32) {
        self.diagnostics.push(Diagnostic::error(message, line));
    }

    /// Resolve a spelled type. Class and generic names resolve to `any`
    /// at this level; reference semantics are the code generator's
    /// concern and unknown names were already reported by the semantic
    /// pass.
    fn resolve(&mut self, ty: &TypeRef) -> TypeId {
        match ty.name.as_str() {
            "void" => self.types.void(),
            "int8" => self.types.int8(),
            "int16" => self.types.int16(),
            "int32" => self.types.int32(),
            "int64" => self.types.int64(),
            "uint8" => self.types.uint8(),
            "uint16" => self.types.uint16(),
            "uint32" => self.types.uint32(),
            "uint64" => self.types.uint64(),
            "float32" => self.types.float32(),
            "float64" => self.types.float64(),
            "bool" => self.types.bool(),
            "char" => self.types.char(),
            "string" => self.types.string(),
            "any" => self.types.any(),
            _ => self.types.any(),
        }
    }

    fn define(&mut self, name: &str, ty: TypeId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<TypeId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name)).copied()
    }

    fn check_function(&mut self, func: &Function) {
        self.scopes.clear();
        self.scopes.push(HashMap::new());
        for param in &func.params {
            let ty = self.resolve(&param.ty);
            self.define(&param.name, ty);
        }
        self.current_ret = Some(self.resolve(&func.ret));
        self.check_block(&func.body);
    }

    fn check_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());
        for stmt in &block.stmts {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let {
                name,
                ty,
                init,
                line,
            } => {
                let init_ty = init.as_ref().map(|expr| self.check_expr(expr));
                let declared = ty.as_ref().map(|t| self.resolve(t));
                match (declared, init_ty) {
                    (Some(declared), Some(found)) => {
                        if !self.types.assignable(found, declared) {
                            let found_name = self.types.display(found);
                            let declared_name = self.types.display(declared);
                            self.error(
                                format!(
                                    "cannot initialize '{name}: {declared_name}' from {found_name}"
                                ),
                                *line,
                            );
                        }
                        self.define(name, declared);
                    }
                    (Some(declared), None) => self.define(name, declared),
                    (None, Some(found)) => self.define(name, found),
                    (None, None) => {
                        let unknown = self.types.unknown();
                        self.define(name, unknown);
                    }
                }
            }
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                let value_ty = self.check_expr(value);
                if let Some(target_ty) = self.lookup(target)
                    && !self.types.assignable(value_ty, target_ty)
                {
                    let value_name = self.types.display(value_ty);
                    let target_name = self.types.display(target_ty);
                    self.error(
                        format!("cannot assign {value_name} to '{target}: {target_name}'"),
                        *line,
                    );
                }
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                line,
            } => {
                self.check_condition(cond, *line);
                self.check_block(then_block);
                if let Some(else_block) = else_block {
                    self.check_block(else_block);
                }
            }
            Stmt::While { cond, body, line } => {
                self.check_condition(cond, *line);
                self.check_block(body);
            }
            Stmt::Return { value, line } => {
                let found = match value {
                    Some(expr) => self.check_expr(expr),
                    None => self.types.void(),
                };
                if let Some(expected) = self.current_ret
                    && !self.types.assignable(found, expected)
                {
                    let found_name = self.types.display(found);
                    let expected_name = self.types.display(expected);
                    self.error(
                        format!("return type mismatch: expected {expected_name}, found {found_name}"),
                        *line,
                    );
                }
            }
            Stmt::Expr(expr) => {
                self.check_expr(expr);
            }
            Stmt::Block(block) => self.check_block(block),
        }
    }

    fn check_condition(&mut self, cond: &Expr, line: u32) {
        let ty = self.check_expr(cond);
        let bool_ty = self.types.bool();
        if !self.types.assignable(ty, bool_ty) {
            let name = self.types.display(ty);
            self.error(format!("condition must be bool, found {name}"), line);
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> TypeId {
        match expr {
            Expr::IntLiteral { .. } => self.types.int32(),
            Expr::FloatLiteral { .. } => self.types.float64(),
            Expr::StringLiteral { .. } => self.types.string(),
            Expr::CharLiteral { .. } => self.types.char(),
            Expr::BoolLiteral { .. } => self.types.bool(),
            Expr::NullLiteral { .. } => self.types.any(),
            Expr::Ident { name, .. } => {
                self.lookup(name).unwrap_or_else(|| self.types.unknown())
            }
            Expr::Path { .. } => self.types.any(),
            Expr::Binary { op, lhs, rhs, line } => {
                let lhs_ty = self.check_expr(lhs);
                let rhs_ty = self.check_expr(rhs);
                let opcode = binary_opcode(*op);
                let result = self.types.binary_result(lhs_ty, rhs_ty, opcode);
                let unknown = self.types.unknown();
                if result == unknown {
                    let lhs_name = self.types.display(lhs_ty);
                    let rhs_name = self.types.display(rhs_ty);
                    self.error(
                        format!("operator not defined for {lhs_name} and {rhs_name}"),
                        *line,
                    );
                }
                result
            }
            Expr::Unary { op, operand, line } => {
                let ty = self.check_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        if !self.types.is_numeric(ty) {
                            let name = self.types.display(ty);
                            self.error(format!("cannot negate {name}"), *line);
                        }
                        ty
                    }
                    UnaryOp::Not => self.types.bool(),
                }
            }
            Expr::Call { callee, args, line } => {
                let arg_types: Vec<TypeId> =
                    args.iter().map(|arg| self.check_expr(arg)).collect();
                match callee.as_ref() {
                    Expr::Ident { name, .. } => {
                        let sig = self.functions.iter().find(|sig| sig.name == *name).cloned();
                        match sig {
                            Some(sig) => self.check_call_against(&sig, &arg_types, *line),
                            None => self.types.unknown(),
                        }
                    }
                    Expr::Path { segments, .. } => {
                        let path = segments.join(".");
                        let builtin = BUILTIN_FUNCTIONS
                            .iter()
                            .find(|(name, _, _)| *name == path)
                            .map(|(name, params, ret)| FunctionSig {
                                name: (*name).to_string(),
                                params: params
                                    .iter()
                                    .enumerate()
                                    .map(|(i, ty)| (format!("arg{i}"), (*ty).to_string()))
                                    .collect(),
                                ret: (*ret).to_string(),
                                line: *line,
                            });
                        match builtin {
                            Some(sig) => self.check_call_against(&sig, &arg_types, *line),
                            None => self.types.any(),
                        }
                    }
                    _ => self.types.unknown(),
                }
            }
            Expr::New { .. } => self.types.any(),
        }
    }

    fn check_call_against(&mut self, sig: &FunctionSig, args: &[TypeId], line: u32) -> TypeId {
        if sig.params.len() == args.len() {
            for ((param_name, param_ty), &arg) in sig.params.iter().zip(args) {
                let expected = self.resolve(&TypeRef::plain(param_ty, line));
                if !self.types.assignable(arg, expected) {
                    let arg_name = self.types.display(arg);
                    self.error(
                        format!(
                            "argument '{param_name}' of '{}' expects {param_ty}, found {arg_name}",
                            sig.name
                        ),
                        line,
                    );
                }
            }
        }
        self.resolve(&TypeRef::plain(&sig.ret, line))
    }
}

fn signature_of(func: &Function, class: Option<&str>) -> FunctionSig {
    FunctionSig {
        name: match class {
            Some(class) => format!("{class}.{}", func.name),
            None => func.name.clone(),
        },
        params: func
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.display()))
            .collect(),
        ret: func.ret.display(),
        line: func.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn check(source: &str) -> Vec<Diagnostic> {
        let program = Parser::new(source).parse().expect("parse");
        TypeChecker::new().check(&program)
    }

    #[test]
    fn clean_arithmetic_passes() {
        let diags = check(
            "int32 add(int32 a, int32 b) { return a + b; }\n\
             void main() { var x = add(1, 2); }",
        );
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn string_plus_int_is_reported() {
        let diags = check("void main() { var x = \"a\" + 1; }");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("operator not defined"));
    }

    #[test]
    fn numeric_widening_is_allowed_in_returns() {
        let diags = check("int64 f(int32 x) { return x; }");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn return_mismatch_is_reported() {
        let diags = check("int32 f() { return \"nope\"; }");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("return type mismatch"));
    }

    #[test]
    fn condition_must_be_bool_like() {
        let diags = check("void f() { if (\"yes\") { } }");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("condition"));
    }

    #[test]
    fn builtin_argument_types_are_checked() {
        let diags = check("void main() { Console.WriteLine(42); }");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("expects string"));
    }

    #[test]
    fn comparison_yields_bool() {
        let diags = check("void f(int32 a) { if (a < 10) { } }");
        assert!(diags.is_empty(), "{diags:?}");
    }
}

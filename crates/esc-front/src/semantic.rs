//! Semantic analysis: symbol tables, scope and name resolution, generic
//! declaration collection.
//!
//! The analyzer never aborts on the first problem; it accumulates
//! [`Diagnostic`]s so both the batch pipeline (which fails the stage when
//! any error-severity diagnostic exists) and the language server (which
//! publishes the whole list) get complete information from one walk.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Block, ClassDecl, Expr, Function, Item, Program, Stmt};
use crate::generics::GenericRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A source-anchored finding, shared between compiler output and LSP
/// published diagnostics. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl Diagnostic {
    pub fn error(message: String, line: u32) -> Self {
        Self {
            severity: Severity::Error,
            message,
            line,
            col: 1,
        }
    }

    pub fn warning(message: String, line: u32) -> Self {
        Self {
            severity: Severity::Warning,
            message,
            line,
            col: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Type,
    Variable,
    Param,
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    /// Spelled type for variables/params/fields, return type for
    /// functions.
    pub type_name: Option<String>,
    pub line: u32,
    pub col: u32,
}

/// Lexically scoped symbol table. The bottom scope holds globals and is
/// what generic instantiation targets.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, SymbolInfo>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "popping the global scope");
        self.scopes.pop();
    }

    /// Define in the innermost scope; returns false on redefinition
    /// within that scope.
    pub fn define(&mut self, info: SymbolInfo) -> bool {
        let scope = self.scopes.last_mut().expect("symbol table has a scope");
        scope.insert(info.name.clone(), info).is_none()
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolInfo> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn lookup_local(&self, name: &str) -> Option<&SymbolInfo> {
        self.scopes.last().and_then(|scope| scope.get(name))
    }

    /// Every symbol visible at global scope, in arbitrary order.
    pub fn globals(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.scopes[0].values()
    }
}

/// Function signature surfaced to the type checker and the LSP
/// signature-help handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub ret: String,
    pub line: u32,
}

#[derive(Debug, Default)]
pub struct SemanticResult {
    pub diagnostics: Vec<Diagnostic>,
    pub globals: SymbolTable,
    pub functions: Vec<FunctionSig>,
    /// Document-order symbols for LSP documentSymbol.
    pub outline: Vec<SymbolInfo>,
}

impl SemanticResult {
    pub fn success(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

/// Runtime intrinsics visible without declaration; the preprocessor maps
/// the surface print helpers onto these names.
pub const BUILTIN_FUNCTIONS: &[(&str, &[&str], &str)] = &[
    ("Console.WriteLine", &["string"], "void"),
    ("Console.Write", &["string"], "void"),
    ("Console.WriteLineInt", &["int32"], "void"),
    ("Console.WriteInt", &["int32"], "void"),
];

pub struct Analyzer {
    registry: Option<Arc<GenericRegistry>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self { registry: None }
    }

    /// Attach the shared registry so class declarations and
    /// instantiations flow through it.
    pub fn with_registry(registry: Arc<GenericRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn analyze(&self, program: &Program) -> SemanticResult {
        let mut result = SemanticResult {
            globals: SymbolTable::new(),
            ..SemanticResult::default()
        };

        // Pass 1: declarations, so use-before-declaration works across
        // top-level items.
        for item in &program.items {
            match item {
                Item::Function(func) => self.declare_function(func, &mut result, SymbolKind::Function),
                Item::Class(class) => self.declare_class(class, &mut result),
            }
        }

        // Pass 2: bodies.
        for item in &program.items {
            match item {
                Item::Function(func) => self.check_function(func, &mut result),
                Item::Class(class) => {
                    for method in &class.methods {
                        self.check_function(method, &mut result);
                    }
                }
            }
        }

        result
    }

    fn declare_function(&self, func: &Function, result: &mut SemanticResult, kind: SymbolKind) {
        let info = SymbolInfo {
            name: func.name.clone(),
            kind,
            type_name: Some(func.ret.display()),
            line: func.line,
            col: 1,
        };
        if !result.globals.define(info.clone()) {
            result.diagnostics.push(Diagnostic::error(
                format!("duplicate definition of '{}'", func.name),
                func.line,
            ));
        }
        result.outline.push(info);
        result.functions.push(FunctionSig {
            name: func.name.clone(),
            params: func
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.display()))
                .collect(),
            ret: func.ret.display(),
            line: func.line,
        });
    }

    fn declare_class(&self, class: &ClassDecl, result: &mut SemanticResult) {
        let info = SymbolInfo {
            name: class.name.clone(),
            kind: SymbolKind::Class,
            type_name: None,
            line: class.line,
            col: 1,
        };
        if !result.globals.define(info.clone()) {
            result.diagnostics.push(Diagnostic::error(
                format!("duplicate definition of '{}'", class.name),
                class.line,
            ));
        }
        result.outline.push(info);

        if !class.type_params.is_empty()
            && let Some(registry) = &self.registry
        {
            registry.register(
                &class.name,
                Some(class.type_params.clone()),
                Some(class.clone()),
            );
        }

        for method in &class.methods {
            result.outline.push(SymbolInfo {
                name: format!("{}.{}", class.name, method.name),
                kind: SymbolKind::Method,
                type_name: Some(method.ret.display()),
                line: method.line,
                col: 1,
            });
            result.functions.push(FunctionSig {
                name: format!("{}.{}", class.name, method.name),
                params: method
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), p.ty.display()))
                    .collect(),
                ret: method.ret.display(),
                line: method.line,
            });
        }
    }

    fn check_function(&self, func: &Function, result: &mut SemanticResult) {
        let mut locals = SymbolTable::new();
        for param in &func.params {
            let fresh = locals.define(SymbolInfo {
                name: param.name.clone(),
                kind: SymbolKind::Param,
                type_name: Some(param.ty.display()),
                line: param.line,
                col: 1,
            });
            if !fresh {
                result.diagnostics.push(Diagnostic::error(
                    format!("duplicate parameter '{}'", param.name),
                    param.line,
                ));
            }
        }
        self.check_block(&func.body, &mut locals, result);
    }

    fn check_block(&self, block: &Block, locals: &mut SymbolTable, result: &mut SemanticResult) {
        locals.push_scope();
        for stmt in &block.stmts {
            self.check_stmt(stmt, locals, result);
        }
        locals.pop_scope();
    }

    fn check_stmt(&self, stmt: &Stmt, locals: &mut SymbolTable, result: &mut SemanticResult) {
        match stmt {
            Stmt::Let {
                name,
                ty,
                init,
                line,
            } => {
                if let Some(init) = init {
                    self.check_expr(init, locals, result);
                }
                if ty.is_none() && init.is_none() {
                    result.diagnostics.push(Diagnostic::error(
                        format!("'var {name}' needs an initializer to infer its type"),
                        *line,
                    ));
                }
                // A generic local such as `List<int32> xs` instantiates
                // the specialisation on first sight.
                if let Some(ty) = ty
                    && !ty.args.is_empty()
                    && let Some(registry) = &self.registry
                {
                    let args: Vec<String> =
                        ty.args.iter().map(|arg| arg.display()).collect();
                    if registry.is_generic(&ty.name) {
                        if !registry.instantiate(&ty.name, &args, &mut result.globals) {
                            result.diagnostics.push(Diagnostic::error(
                                format!(
                                    "wrong number of type arguments for '{}'",
                                    ty.name
                                ),
                                *line,
                            ));
                        }
                    } else {
                        result.diagnostics.push(Diagnostic::error(
                            format!("unknown generic type '{}'", ty.name),
                            *line,
                        ));
                    }
                }
                let fresh = locals.define(SymbolInfo {
                    name: name.clone(),
                    kind: SymbolKind::Variable,
                    type_name: ty.as_ref().map(|t| t.display()),
                    line: *line,
                    col: 1,
                });
                if !fresh {
                    result.diagnostics.push(Diagnostic::error(
                        format!("'{name}' is already defined in this scope"),
                        *line,
                    ));
                }
            }
            Stmt::Assign {
                target,
                value,
                line,
            } => {
                if locals.lookup(target).is_none() && result.globals.lookup(target).is_none() {
                    result.diagnostics.push(Diagnostic::error(
                        format!("assignment to undeclared variable '{target}'"),
                        *line,
                    ));
                }
                self.check_expr(value, locals, result);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.check_expr(cond, locals, result);
                self.check_block(then_block, locals, result);
                if let Some(else_block) = else_block {
                    self.check_block(else_block, locals, result);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.check_expr(cond, locals, result);
                self.check_block(body, locals, result);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.check_expr(value, locals, result);
                }
            }
            Stmt::Expr(expr) => self.check_expr(expr, locals, result),
            Stmt::Block(block) => self.check_block(block, locals, result),
        }
    }

    fn check_expr(&self, expr: &Expr, locals: &SymbolTable, result: &mut SemanticResult) {
        match expr {
            Expr::Ident { name, line } => {
                if locals.lookup(name).is_none() && result.globals.lookup(name).is_none() {
                    result.diagnostics.push(Diagnostic::error(
                        format!("use of undeclared identifier '{name}'"),
                        *line,
                    ));
                }
            }
            Expr::Path { segments, line } => {
                let path = segments.join(".");
                let builtin = BUILTIN_FUNCTIONS.iter().any(|(name, _, _)| *name == path);
                let class_member = result.globals.lookup(&segments[0]).is_some();
                if !builtin && !class_member {
                    result.diagnostics.push(Diagnostic::error(
                        format!("unknown name '{path}'"),
                        *line,
                    ));
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs, locals, result);
                self.check_expr(rhs, locals, result);
            }
            Expr::Unary { operand, .. } => self.check_expr(operand, locals, result),
            Expr::Call { callee, args, line } => {
                match callee.as_ref() {
                    Expr::Ident { name, .. } => {
                        let known = result
                            .functions
                            .iter()
                            .any(|sig| sig.name == *name)
                            || result.globals.lookup(name).is_some();
                        if !known {
                            result.diagnostics.push(Diagnostic::error(
                                format!("call to undefined function '{name}'"),
                                *line,
                            ));
                        } else if let Some(sig) =
                            result.functions.iter().find(|sig| sig.name == *name)
                            && sig.params.len() != args.len()
                        {
                            result.diagnostics.push(Diagnostic::error(
                                format!(
                                    "'{name}' takes {} argument(s), {} given",
                                    sig.params.len(),
                                    args.len()
                                ),
                                *line,
                            ));
                        }
                    }
                    other => self.check_expr(other, locals, result),
                }
                for arg in args {
                    self.check_expr(arg, locals, result);
                }
            }
            Expr::New { ty, args, line } => {
                if !ty.args.is_empty() {
                    if let Some(registry) = &self.registry {
                        let type_args: Vec<String> =
                            ty.args.iter().map(|arg| arg.display()).collect();
                        if !registry.is_generic(&ty.name) {
                            result.diagnostics.push(Diagnostic::error(
                                format!("unknown generic type '{}'", ty.name),
                                *line,
                            ));
                        } else if !registry.instantiate(&ty.name, &type_args, &mut result.globals)
                        {
                            result.diagnostics.push(Diagnostic::error(
                                format!("wrong number of type arguments for '{}'", ty.name),
                                *line,
                            ));
                        }
                    }
                } else if result.globals.lookup(&ty.name).is_none() {
                    result.diagnostics.push(Diagnostic::error(
                        format!("unknown type '{}'", ty.name),
                        *line,
                    ));
                }
                for arg in args {
                    self.check_expr(arg, locals, result);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze(source: &str) -> SemanticResult {
        let program = Parser::new(source).parse().expect("parse");
        Analyzer::new().analyze(&program)
    }

    #[test]
    fn clean_program_has_no_diagnostics() {
        let result = analyze(
            "int32 add(int32 a, int32 b) { return a + b; }\n\
             void main() { var x = add(1, 2); Console.WriteLine(\"done\"); }",
        );
        assert!(result.success(), "{:?}", result.diagnostics);
        assert_eq!(result.functions.len(), 2);
    }

    #[test]
    fn undeclared_identifier_is_reported() {
        let result = analyze("void main() { var x = missing; }");
        assert!(!result.success());
        assert!(result.diagnostics[0].message.contains("missing"));
    }

    #[test]
    fn duplicate_local_in_same_scope_is_reported() {
        let result = analyze("void main() { var x = 1; var x = 2; }");
        assert!(!result.success());
    }

    #[test]
    fn shadowing_in_inner_scope_is_allowed() {
        let result = analyze("void main() { var x = 1; { var x = 2; } }");
        assert!(result.success(), "{:?}", result.diagnostics);
    }

    #[test]
    fn call_arity_is_checked() {
        let result = analyze(
            "int32 add(int32 a, int32 b) { return a + b; }\n\
             void main() { var x = add(1); }",
        );
        assert!(!result.success());
        assert!(result.diagnostics[0].message.contains("argument"));
    }

    #[test]
    fn generic_class_registers_and_instantiates() {
        let registry = Arc::new(GenericRegistry::new());
        let program = Parser::new(
            "class List<T> { int32 count; }\n\
             void main() { List<int32> xs = new List<int32>(); }",
        )
        .parse()
        .expect("parse");
        let result = Analyzer::with_registry(Arc::clone(&registry)).analyze(&program);
        assert!(result.success(), "{:?}", result.diagnostics);
        assert!(registry.is_generic("List"));
        assert_eq!(
            registry.lookup("List").unwrap().specializations,
            vec!["List<int32>"]
        );
        assert!(result.globals.lookup("List<int32>").is_some());
    }

    #[test]
    fn outline_lists_functions_and_classes_in_order() {
        let result = analyze(
            "class Point { int32 x; }\n\
             void main() { }",
        );
        let names: Vec<_> = result.outline.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Point", "main"]);
    }
}

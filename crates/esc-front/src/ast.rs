//! Abstract syntax tree for the E# surface language.

/// Spelled-out type reference, resolved against the IR type pool during
/// type checking. `args` carries generic arguments (`List<int32>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
    pub line: u32,
}

impl TypeRef {
    pub fn plain(name: &str, line: u32) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
            line,
        }
    }

    /// Mangled display form, `Name<A,B>` for generic references.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            let args = self
                .args
                .iter()
                .map(TypeRef::display)
                .collect::<Vec<_>>()
                .join(",");
            format!("{}<{}>", self.name, args)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Function(Function),
    Class(ClassDecl),
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    /// Generic parameter names; empty for a concrete class.
    pub type_params: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Function>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `var x = e;` or `int32 x = e;` (`ty` is `None` for `var`).
    Let {
        name: String,
        ty: Option<TypeRef>,
        init: Option<Expr>,
        line: u32,
    },
    Assign {
        target: String,
        value: Expr,
        line: u32,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        line: u32,
    },
    While {
        cond: Expr,
        body: Block,
        line: u32,
    },
    Return {
        value: Option<Expr>,
        line: u32,
    },
    Expr(Expr),
    Block(Block),
}

impl Stmt {
    pub fn line(&self) -> u32 {
        match self {
            Stmt::Let { line, .. }
            | Stmt::Assign { line, .. }
            | Stmt::If { line, .. }
            | Stmt::While { line, .. }
            | Stmt::Return { line, .. } => *line,
            Stmt::Expr(expr) => expr.line(),
            Stmt::Block(block) => block.line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral {
        value: i64,
        line: u32,
    },
    FloatLiteral {
        value: f64,
        line: u32,
    },
    StringLiteral {
        value: String,
        line: u32,
    },
    CharLiteral {
        value: char,
        line: u32,
    },
    BoolLiteral {
        value: bool,
        line: u32,
    },
    NullLiteral {
        line: u32,
    },
    Ident {
        name: String,
        line: u32,
    },
    /// Dotted path such as `Console.WriteLine`; kept as one callee name.
    Path {
        segments: Vec<String>,
        line: u32,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        line: u32,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        line: u32,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        line: u32,
    },
    /// `new List<int32>()`
    New {
        ty: TypeRef,
        args: Vec<Expr>,
        line: u32,
    },
}

impl Expr {
    pub fn line(&self) -> u32 {
        match self {
            Expr::IntLiteral { line, .. }
            | Expr::FloatLiteral { line, .. }
            | Expr::StringLiteral { line, .. }
            | Expr::CharLiteral { line, .. }
            | Expr::BoolLiteral { line, .. }
            | Expr::NullLiteral { line }
            | Expr::Ident { line, .. }
            | Expr::Path { line, .. }
            | Expr::Binary { line, .. }
            | Expr::Unary { line, .. }
            | Expr::Call { line, .. }
            | Expr::New { line, .. } => *line,
        }
    }
}

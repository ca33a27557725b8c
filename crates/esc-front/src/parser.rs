//! Recursive-descent parser producing the [`crate::ast`] tree.
//!
//! The parser is error-tolerant to the statement level: a syntax error
//! records a [`ParseError`] and skips to the next statement boundary, so
//! one pass reports every problem a file has. A program with any recorded
//! error still fails the pipeline's parse stage.

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub col: u32,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            errors: Vec::new(),
        }
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    /// Parse a whole program; `Err` carries every recorded error.
    pub fn parse(mut self) -> Result<Program, Vec<ParseError>> {
        let mut items = Vec::new();
        while !self.at(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_item() {
                Some(item) => items.push(item),
                None => {
                    // Ensure progress even on unrecoverable junk.
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        if self.errors.is_empty() {
            Ok(Program { items })
        } else {
            Err(self.errors)
        }
    }

    // ---------------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, ahead: usize) -> TokenKind {
        self.tokens
            .get(self.pos + ahead)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.at(kind) {
            return Some(self.advance());
        }
        self.error_here(&format!("expected {what}, found '{}'", self.peek().text));
        None
    }

    fn error_here(&mut self, message: &str) {
        let token = self.peek();
        self.errors.push(ParseError {
            message: message.to_string(),
            line: token.line,
            col: token.col,
        });
    }

    /// Skip to a statement boundary after an error.
    fn synchronize(&mut self) {
        while !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semicolon) {
                return;
            }
            if matches!(
                self.peek().kind,
                TokenKind::RBrace
                    | TokenKind::KwIf
                    | TokenKind::KwWhile
                    | TokenKind::KwReturn
                    | TokenKind::KwVar
                    | TokenKind::KwClass
            ) {
                return;
            }
            self.advance();
        }
    }

    // ---------------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------------

    fn parse_item(&mut self) -> Option<Item> {
        if self.at(TokenKind::KwClass) {
            return self.parse_class().map(Item::Class);
        }
        if self.peek().kind.is_type_keyword() || self.at(TokenKind::Identifier) {
            return self.parse_function().map(Item::Function);
        }
        self.error_here("expected function or class declaration");
        self.synchronize();
        None
    }

    fn parse_class(&mut self) -> Option<ClassDecl> {
        let class_token = self.advance();
        let name = self.expect(TokenKind::Identifier, "class name")?;

        let mut type_params = Vec::new();
        if self.eat(TokenKind::Lt) {
            loop {
                let param = self.expect(TokenKind::Identifier, "type parameter")?;
                type_params.push(param.text);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "'>'")?;
        }

        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let ty = self.parse_type()?;
            let member = self.expect(TokenKind::Identifier, "member name")?;
            if self.at(TokenKind::LParen) {
                let function = self.finish_function(ty, member)?;
                methods.push(function);
            } else {
                self.expect(TokenKind::Semicolon, "';' after field")?;
                fields.push(Field {
                    name: member.text,
                    ty,
                    line: member.line,
                });
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        Some(ClassDecl {
            name: name.text,
            type_params,
            fields,
            methods,
            line: class_token.line,
        })
    }

    fn parse_function(&mut self) -> Option<Function> {
        let ret = self.parse_type()?;
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.finish_function(ret, name)
    }

    fn finish_function(&mut self, ret: TypeRef, name: Token) -> Option<Function> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let ty = self.parse_type()?;
                let param = self.expect(TokenKind::Identifier, "parameter name")?;
                params.push(Param {
                    name: param.text,
                    ty,
                    line: param.line,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Some(Function {
            name: name.text,
            params,
            ret,
            body,
            line: name.line,
        })
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    fn parse_type(&mut self) -> Option<TypeRef> {
        let token = self.peek().clone();
        if token.kind.is_type_keyword() {
            self.advance();
            return Some(TypeRef::plain(&token.text, token.line));
        }
        if token.kind == TokenKind::Identifier {
            self.advance();
            let mut args = Vec::new();
            if self.at(TokenKind::Lt) && self.generic_args_ahead() {
                self.advance();
                loop {
                    args.push(self.parse_type()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::Gt, "'>'")?;
            }
            return Some(TypeRef {
                name: token.text,
                args,
                line: token.line,
            });
        }
        self.error_here("expected type");
        self.synchronize();
        None
    }

    /// From a '<', does a balanced generic argument list follow? Used to
    /// keep `a < b` expressions out of type parsing.
    fn generic_args_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut ahead = 0usize;
        loop {
            match self.peek_kind(ahead) {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                TokenKind::Identifier | TokenKind::Comma => {}
                kind if kind.is_type_keyword() => {}
                _ => return false,
            }
            ahead += 1;
            if ahead > 32 {
                return false;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => {
                    self.synchronize();
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Some(Block {
            stmts,
            line: open.line,
        })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.peek().kind {
            TokenKind::KwVar => {
                let token = self.advance();
                let name = self.expect(TokenKind::Identifier, "variable name")?;
                let init = if self.eat(TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Some(Stmt::Let {
                    name: name.text,
                    ty: None,
                    init,
                    line: token.line,
                })
            }
            TokenKind::KwIf => {
                let token = self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                let then_block = self.parse_block()?;
                let else_block = if self.eat(TokenKind::KwElse) {
                    Some(self.parse_block()?)
                } else {
                    None
                };
                Some(Stmt::If {
                    cond,
                    then_block,
                    else_block,
                    line: token.line,
                })
            }
            TokenKind::KwWhile => {
                let token = self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                let body = self.parse_block()?;
                Some(Stmt::While {
                    cond,
                    body,
                    line: token.line,
                })
            }
            TokenKind::KwReturn => {
                let token = self.advance();
                let value = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Some(Stmt::Return {
                    value,
                    line: token.line,
                })
            }
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            kind if kind.is_type_keyword() => self.parse_typed_let(),
            TokenKind::Identifier => {
                // `Name x`, `Name<T> x` -> declaration; `x = e` ->
                // assignment; anything else is an expression statement.
                if self.peek_kind(1) == TokenKind::Identifier
                    || (self.peek_kind(1) == TokenKind::Lt && self.typed_decl_ahead())
                {
                    return self.parse_typed_let();
                }
                if self.peek_kind(1) == TokenKind::Assign {
                    let name = self.advance();
                    self.advance();
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                    return Some(Stmt::Assign {
                        target: name.text,
                        value,
                        line: name.line,
                    });
                }
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Some(Stmt::Expr(expr))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Some(Stmt::Expr(expr))
            }
        }
    }

    /// `Name<...> ident` lookahead from the current identifier.
    fn typed_decl_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut ahead = 1usize;
        loop {
            match self.peek_kind(ahead) {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.peek_kind(ahead + 1) == TokenKind::Identifier;
                    }
                }
                TokenKind::Identifier | TokenKind::Comma => {}
                kind if kind.is_type_keyword() => {}
                _ => return false,
            }
            ahead += 1;
            if ahead > 32 {
                return false;
            }
        }
    }

    fn parse_typed_let(&mut self) -> Option<Stmt> {
        let ty = self.parse_type()?;
        let name = self.expect(TokenKind::Identifier, "variable name")?;
        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        Some(Stmt::Let {
            name: name.text,
            ty: Some(ty.clone()),
            init,
            line: ty.line,
        })
    }

    // ---------------------------------------------------------------------
    // Expressions (precedence climbing)
    // ---------------------------------------------------------------------

    fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at(TokenKind::OrOr) {
            let line = self.advance().line;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_bitor()?;
        while self.at(TokenKind::AndAnd) {
            let line = self.advance().line;
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Some(lhs)
    }

    fn parse_bitor(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.at(TokenKind::Pipe) {
            let line = self.advance().line;
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary {
                op: BinaryOp::BitOr,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Some(lhs)
    }

    fn parse_bitxor(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.at(TokenKind::Caret) {
            let line = self.advance().line;
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary {
                op: BinaryOp::BitXor,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Some(lhs)
    }

    fn parse_bitand(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at(TokenKind::Amp) {
            let line = self.advance().line;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::BitAnd,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => return Some(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Some(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
    }

    fn parse_shift(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => return Some(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Some(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Some(lhs),
            };
            let line = self.advance().line;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                line,
            };
        }
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        match self.peek().kind {
            TokenKind::Minus => {
                let line = self.advance().line;
                let operand = self.parse_unary()?;
                Some(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    line,
                })
            }
            TokenKind::Not => {
                let line = self.advance().line;
                let operand = self.parse_unary()?;
                Some(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    line,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at(TokenKind::Dot) {
                let line = self.advance().line;
                let segment = self.expect(TokenKind::Identifier, "member name")?;
                expr = match expr {
                    Expr::Ident { name, .. } => Expr::Path {
                        segments: vec![name, segment.text],
                        line,
                    },
                    Expr::Path { mut segments, .. } => {
                        segments.push(segment.text);
                        Expr::Path { segments, line }
                    }
                    other => {
                        self.error_here("member access requires a name on the left");
                        other
                    }
                };
            } else if self.at(TokenKind::LParen) {
                let line = self.advance().line;
                let mut args = Vec::new();
                if !self.at(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    line,
                };
            } else {
                return Some(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = token.text.parse().unwrap_or(0);
                Some(Expr::IntLiteral {
                    value,
                    line: token.line,
                })
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value = token.text.parse().unwrap_or(0.0);
                Some(Expr::FloatLiteral {
                    value,
                    line: token.line,
                })
            }
            TokenKind::StringLiteral => {
                self.advance();
                Some(Expr::StringLiteral {
                    value: unescape(&token.text),
                    line: token.line,
                })
            }
            TokenKind::CharLiteral => {
                self.advance();
                let value = unescape(&token.text).chars().next().unwrap_or('\0');
                Some(Expr::CharLiteral {
                    value,
                    line: token.line,
                })
            }
            TokenKind::KwTrue | TokenKind::KwFalse => {
                self.advance();
                Some(Expr::BoolLiteral {
                    value: token.kind == TokenKind::KwTrue,
                    line: token.line,
                })
            }
            TokenKind::KwNull => {
                self.advance();
                Some(Expr::NullLiteral { line: token.line })
            }
            TokenKind::KwNew => {
                self.advance();
                let ty = self.parse_type()?;
                self.expect(TokenKind::LParen, "'('")?;
                let mut args = Vec::new();
                if !self.at(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                Some(Expr::New {
                    ty,
                    args,
                    line: token.line,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Some(Expr::Ident {
                    name: token.text,
                    line: token.line,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(expr)
            }
            _ => {
                self.error_here(&format!("unexpected token '{}'", token.text));
                self.advance();
                None
            }
        }
    }
}

/// Strip quotes and process the common escapes of a string/char literal.
fn unescape(raw: &str) -> String {
    let inner = raw
        .strip_prefix(['"', '\''])
        .and_then(|s| s.strip_suffix(['"', '\'']))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        Parser::new(source).parse().expect("parse failure")
    }

    #[test]
    fn parses_function_with_params() {
        let program = parse_ok("int32 add(int32 a, int32 b) { return a + b; }");
        let Item::Function(func) = &program.items[0] else {
            panic!("expected function");
        };
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.ret.name, "int32");
    }

    #[test]
    fn parses_generic_class() {
        let program = parse_ok("class List<T> { int32 count; T get(int32 index) { return item; } }");
        let Item::Class(class) = &program.items[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name, "List");
        assert_eq!(class.type_params, vec!["T"]);
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn comparison_is_not_mistaken_for_generics() {
        let program = parse_ok("void f() { var ok = a < b; }");
        let Item::Function(func) = &program.items[0] else {
            panic!("expected function");
        };
        let Stmt::Let { init: Some(init), .. } = &func.body.stmts[0] else {
            panic!("expected let");
        };
        assert!(matches!(
            init,
            Expr::Binary {
                op: BinaryOp::Lt,
                ..
            }
        ));
    }

    #[test]
    fn generic_local_declaration_parses() {
        let program = parse_ok("void f() { List<int32> xs = new List<int32>(); }");
        let Item::Function(func) = &program.items[0] else {
            panic!("expected function");
        };
        let Stmt::Let { ty: Some(ty), .. } = &func.body.stmts[0] else {
            panic!("expected typed let");
        };
        assert_eq!(ty.display(), "List<int32>");
    }

    #[test]
    fn dotted_call_becomes_path() {
        let program = parse_ok("void main() { Console.WriteLine(\"hi\"); }");
        let Item::Function(func) = &program.items[0] else {
            panic!("expected function");
        };
        let Stmt::Expr(Expr::Call { callee, .. }) = &func.body.stmts[0] else {
            panic!("expected call statement");
        };
        let Expr::Path { segments, .. } = callee.as_ref() else {
            panic!("expected path callee");
        };
        assert_eq!(segments, &["Console", "WriteLine"]);
    }

    #[test]
    fn precedence_nests_multiplication_tighter() {
        let program = parse_ok("void f() { var x = 1 + 2 * 3; }");
        let Item::Function(func) = &program.items[0] else {
            panic!("expected function");
        };
        let Stmt::Let { init: Some(init), .. } = &func.body.stmts[0] else {
            panic!("expected let");
        };
        let Expr::Binary { op, rhs, .. } = init else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.as_ref(),
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn syntax_errors_are_collected_with_positions() {
        let errors = Parser::new("void f() { return 1 + ; }").parse().unwrap_err();
        assert!(!errors.is_empty());
        assert_eq!(errors[0].line, 1);
    }
}

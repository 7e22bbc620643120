use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};
use std::rc::Rc;

/// Parses a full translation unit. The token stream comes straight from the
/// lexer; `#include` lines are consumed and ignored. All declarations are
/// grouped in the source order the grammar fixes: struct types first, then
/// globals, then functions.
pub fn parse(source: &str) -> Result<Program, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Program, SyntaxErrors> {
        self.parse_includes();

        let mut structs = Vec::new();
        let mut globals = Vec::new();
        let mut functions = Vec::new();

        while self.check(TokenKind::Struct) && self.nth_kind(2) == Some(&TokenKind::LBrace) {
            match self.parse_struct_decl() {
                Ok(decl) => structs.push(Rc::new(decl)),
                Err(err) => {
                    self.report(err);
                    self.synchronize_decl();
                }
            }
        }

        while self.at_type_start() {
            if self.decl_is_function() {
                match self.parse_fun_decl() {
                    Ok(decl) => functions.push(Rc::new(decl)),
                    Err(err) => {
                        self.report(err);
                        self.synchronize_decl();
                    }
                }
            } else {
                match self.parse_var_decl() {
                    Ok(decl) => globals.push(Rc::new(decl)),
                    Err(err) => {
                        self.report(err);
                        self.synchronize_decl();
                    }
                }
            }
        }

        if !self.is_eof() {
            let err = self.error_here("Expected declaration");
            self.report(err);
        }

        if self.errors.is_empty() {
            Ok(Program {
                structs,
                globals,
                functions,
            })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_includes(&mut self) {
        while self.matches(TokenKind::Include) {
            if !matches!(self.peek_kind(), TokenKind::String(_)) {
                let err = self.error_here("Expected header name after '#include'");
                self.report(err);
            } else {
                self.bump();
            }
        }
    }

    fn parse_struct_decl(&mut self) -> Result<StructDecl, SyntaxError> {
        let start = self.expect(TokenKind::Struct)?.span;
        let name = self.expect_identifier("Expected struct name")?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            fields.push(Rc::new(self.parse_var_decl()?));
        }

        self.expect(TokenKind::RBrace)?;
        let end = self.expect(TokenKind::Semi)?.span;
        Ok(StructDecl {
            name,
            fields,
            span: start.to(end),
        })
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, SyntaxError> {
        let start = self.peek_span();
        let mut ty = self.parse_type()?;
        let name = self.expect_identifier("Expected variable name")?;

        if self.matches(TokenKind::LBracket) {
            let len = self.expect_integer("Expected array length")?;
            if len < 0 {
                return Err(self.error_here("Array length cannot be negative"));
            }
            self.expect(TokenKind::RBracket)?;
            ty = Type::array_of(ty, len as usize);
        }

        let end = self.expect(TokenKind::Semi)?.span;
        Ok(VarDecl::new(ty, name, start.to(end)))
    }

    fn parse_fun_decl(&mut self) -> Result<FunDecl, SyntaxError> {
        let start = self.peek_span();
        let ret = self.parse_type()?;
        let name = self.expect_identifier("Expected function name")?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param_start = self.peek_span();
                let ty = self.parse_type()?;
                let param_name = self.expect_identifier("Expected parameter name")?;
                let param_span = param_start.to(self.prev_span());
                params.push(Rc::new(VarDecl::new(ty, param_name, param_span)));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block()?;
        let span = start.to(self.prev_span());
        Ok(FunDecl::new(ret, name, params, body, span))
    }

    fn parse_type(&mut self) -> Result<Type, SyntaxError> {
        let mut ty = match self.peek_kind().clone() {
            TokenKind::Int => {
                self.bump();
                Type::Int
            }
            TokenKind::Char => {
                self.bump();
                Type::Char
            }
            TokenKind::Void => {
                self.bump();
                Type::Void
            }
            TokenKind::Struct => {
                self.bump();
                let name = self.expect_identifier("Expected struct name after 'struct'")?;
                Type::Struct(name)
            }
            _ => return Err(self.error_here("Expected type")),
        };

        while self.matches(TokenKind::Star) {
            ty = Type::pointer_to(ty);
        }
        Ok(ty)
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        self.expect(TokenKind::LBrace)?;

        let mut vars = Vec::new();
        while self.at_type_start() {
            match self.parse_var_decl() {
                Ok(decl) => vars.push(Rc::new(decl)),
                Err(err) => {
                    self.report(err);
                    self.synchronize_stmt();
                }
            }
        }

        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.report(err);
                    self.synchronize_stmt();
                }
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Block { vars, stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::While => {
                self.bump();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body })
            }
            TokenKind::If => {
                self.bump();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let then = Box::new(self.parse_stmt()?);
                let otherwise = if self.matches(TokenKind::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            TokenKind::Return => {
                let start = self.bump().span;
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self.expect(TokenKind::Semi)?.span;
                Ok(Stmt::Return {
                    value,
                    span: start.to(end),
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.matches(TokenKind::Eq) {
                    let rhs = self.parse_expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Assign { lhs: expr, rhs })
                } else {
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Expr(expr))
                }
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_and()?;
        while self.matches(TokenKind::PipePipe) {
            let rhs = self.parse_and()?;
            lhs = Self::binop(Op::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_equality()?;
        while self.matches(TokenKind::AmpersandAmpersand) {
            let rhs = self.parse_equality()?;
            lhs = Self::binop(Op::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => Op::Eq,
                TokenKind::BangEq => Op::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Self::binop(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => Op::Lt,
                TokenKind::Gt => Op::Gt,
                TokenKind::LtEq => Op::Le,
                TokenKind::GtEq => Op::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Self::binop(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => Op::Add,
                TokenKind::Minus => Op::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binop(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => Op::Mul,
                TokenKind::Slash => Op::Div,
                TokenKind::Percent => Op::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Self::binop(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                let start = self.bump().span;
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                // Negation is sugar for a subtraction from zero.
                let zero = Expr::new(ExprKind::IntLit(0), start);
                Ok(Expr::new(
                    ExprKind::BinOp {
                        op: Op::Sub,
                        lhs: Box::new(zero),
                        rhs: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Star => {
                let start = self.bump().span;
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(ExprKind::ValueAt(Box::new(operand)), span))
            }
            TokenKind::Sizeof => {
                let start = self.bump().span;
                self.expect(TokenKind::LParen)?;
                let ty = self.parse_type()?;
                let end = self.expect(TokenKind::RParen)?.span;
                Ok(Expr::new(ExprKind::SizeOf(ty), start.to(end)))
            }
            TokenKind::LParen if self.nth_is_type_start(1) => {
                let start = self.bump().span;
                let to = self.parse_type()?;
                self.expect(TokenKind::RParen)?;
                let operand = self.parse_unary()?;
                let span = start.to(operand.span);
                Ok(Expr::new(
                    ExprKind::Cast {
                        to,
                        expr: Box::new(operand),
                    },
                    span,
                ))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LBracket) {
                let index = self.parse_expr()?;
                let end = self.expect(TokenKind::RBracket)?.span;
                let span = expr.span.to(end);
                expr = Expr::new(
                    ExprKind::ArrayAccess {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.matches(TokenKind::Dot) {
                let field = self.expect_identifier("Expected field name after '.'")?;
                let span = expr.span.to(self.prev_span());
                expr = Expr::new(
                    ExprKind::FieldAccess {
                        base: Box::new(expr),
                        field,
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Integer(value) => {
                let span = self.bump().span;
                Ok(Expr::new(ExprKind::IntLit(value), span))
            }
            TokenKind::Character(value) => {
                let span = self.bump().span;
                Ok(Expr::new(ExprKind::ChrLit(value), span))
            }
            TokenKind::String(value) => {
                let span = self.bump().span;
                Ok(Expr::new(ExprKind::str_lit(value), span))
            }
            TokenKind::Identifier(name) => {
                let start = self.bump().span;
                if self.matches(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.matches(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.expect(TokenKind::RParen)?.span;
                    Ok(Expr::new(ExprKind::call(name, args), start.to(end)))
                } else {
                    Ok(Expr::new(ExprKind::var(name), start))
                }
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }

    fn binop(op: Op, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.to(rhs.span);
        Expr::new(
            ExprKind::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn at_type_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Int | TokenKind::Char | TokenKind::Void | TokenKind::Struct
        )
    }

    fn nth_is_type_start(&self, n: usize) -> bool {
        matches!(
            self.nth_kind(n),
            Some(TokenKind::Int | TokenKind::Char | TokenKind::Void | TokenKind::Struct)
        )
    }

    /// Looks past the type shape (base, optional struct name, '*'s) and an
    /// identifier to tell a function declaration from a variable one.
    fn decl_is_function(&self) -> bool {
        let mut at = 1;
        if self.peek_kind() == &TokenKind::Struct {
            at += 1;
        }
        while self.nth_kind(at) == Some(&TokenKind::Star) {
            at += 1;
        }
        // `at` now sits on the declared identifier.
        self.nth_kind(at + 1) == Some(&TokenKind::LParen)
    }

    fn is_eof(&self) -> bool {
        self.peek_kind() == &TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_span(&self) -> Span {
        self.peek().span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.peek_span();
        }
        self.tokens[self.pos - 1].span
    }

    fn nth_kind(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|token| &token.kind)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == &kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        if self.check(kind.clone()) {
            Ok(self.bump())
        } else {
            Err(self.error_here(format!("Expected {}, found {}", kind, self.peek_kind())))
        }
    }

    fn expect_identifier(&mut self, message: &str) -> Result<String, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.error_here(format!("{}, found {}", message, other))),
        }
    }

    fn expect_integer(&mut self, message: &str) -> Result<i32, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Integer(value) => {
                self.bump();
                Ok(value)
            }
            other => Err(self.error_here(format!("{}, found {}", message, other))),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.peek_span())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    fn synchronize_decl(&mut self) {
        while !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                return;
            }
            if self.matches(TokenKind::RBrace) {
                self.matches(TokenKind::Semi);
                return;
            }
            self.bump();
        }
    }

    fn synchronize_stmt(&mut self) {
        while !self.is_eof() && !self.check(TokenKind::RBrace) {
            if self.matches(TokenKind::Semi) {
                return;
            }
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_globals_and_functions() {
        let program = parse(
            "#include \"minic-stdlib.h\"\n\
             struct vector { int x; int y; };\n\
             int count;\n\
             char buffer[12];\n\
             int main() { return 0; }",
        )
        .expect("parse");

        assert_eq!(program.structs.len(), 1);
        assert_eq!(program.structs[0].fields.len(), 2);
        assert_eq!(program.globals.len(), 2);
        assert_eq!(
            program.globals[1].ty,
            Type::array_of(Type::Char, 12)
        );
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
    }

    #[test]
    fn parses_pointer_returns_and_params() {
        let program = parse("char* name(struct vector* v, int i) { return (char*) 0; }")
            .expect("parse");
        let fun = &program.functions[0];
        assert_eq!(fun.ret, Type::pointer_to(Type::Char));
        assert_eq!(fun.params.len(), 2);
        assert_eq!(
            fun.params[0].ty,
            Type::pointer_to(Type::Struct("vector".into()))
        );
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("void f() { int x; x = 2 + 3 * 4; }").expect("parse");
        let body = &program.functions[0].body;
        let Stmt::Assign { rhs, .. } = &body.stmts[0] else {
            panic!("expected assignment");
        };
        let ExprKind::BinOp { op, rhs: mul, .. } = &rhs.kind else {
            panic!("expected binop");
        };
        assert_eq!(*op, Op::Add);
        assert!(matches!(
            mul.kind,
            ExprKind::BinOp { op: Op::Mul, .. }
        ));
    }

    #[test]
    fn unary_minus_desugars_to_subtraction() {
        let program = parse("void f() { int x; x = -1; }").expect("parse");
        let body = &program.functions[0].body;
        let Stmt::Assign { rhs, .. } = &body.stmts[0] else {
            panic!("expected assignment");
        };
        let ExprKind::BinOp { op, lhs, .. } = &rhs.kind else {
            panic!("expected binop");
        };
        assert_eq!(*op, Op::Sub);
        assert!(matches!(lhs.kind, ExprKind::IntLit(0)));
    }

    #[test]
    fn parses_postfix_chains() {
        let program = parse("void f(struct cell* c) { (*c).next[0] = 0; }").expect("parse");
        let body = &program.functions[0].body;
        let Stmt::Assign { lhs, .. } = &body.stmts[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(lhs.kind, ExprKind::ArrayAccess { .. }));
    }

    #[test]
    fn collects_multiple_errors() {
        let errors = parse("int ; void f() { x = ; y = 1 }").expect_err("should fail");
        assert!(errors.errors.len() >= 2);
    }

    #[test]
    fn sizeof_and_casts() {
        let program =
            parse("void f() { int x; x = sizeof(struct vector); x = (int) 'c'; }").expect("parse");
        let body = &program.functions[0].body;
        let Stmt::Assign { rhs, .. } = &body.stmts[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(
            rhs.kind,
            ExprKind::SizeOf(Type::Struct(_))
        ));
        let Stmt::Assign { rhs, .. } = &body.stmts[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(rhs.kind, ExprKind::Cast { to: Type::Int, .. }));
    }
}

//! The Cinder parser.
//!
//! Recursive descent over the token list, with expressions parsed by
//! precedence climbing across twelve tiers:
//!
//! ```text
//!  1: postfix call () index [] member .
//!  2: unary + - ! ~
//!  3: * / %          4: + -           5: << >>
//!  6: < <= > >=      7: == !=         8: &
//!  9: ^             10: |            11: &&          12: ||
//! ```
//!
//! Errors are reported to the handler; recovery skips to the next `;` or
//! `}` and parsing continues, so one bad statement does not hide the rest.

use cinder_util::{Handler, Span, Symbol};

use crate::ast::{
    AssignOp, BinaryOp, Block, DeclForm, Expr, FuncDecl, Item, Param, Program, Stmt, TypeName,
    UnaryOp, VarDecl,
};
use crate::token::Token;

/// The loosest binary tier.
const MAX_PRECEDENCE: u8 = 12;

/// The binary operator `token` contributes at `tier`, if any.
fn binary_op_in_tier(token: &Token, tier: u8) -> Option<BinaryOp> {
    let op = match (tier, token) {
        (3, Token::Star) => BinaryOp::Mul,
        (3, Token::Slash) => BinaryOp::Div,
        (3, Token::Percent) => BinaryOp::Rem,
        (4, Token::Plus) => BinaryOp::Add,
        (4, Token::Minus) => BinaryOp::Sub,
        (5, Token::Shl) => BinaryOp::Shl,
        (5, Token::Shr) => BinaryOp::Shr,
        (6, Token::Lt) => BinaryOp::Lt,
        (6, Token::Le) => BinaryOp::Le,
        (6, Token::Gt) => BinaryOp::Gt,
        (6, Token::Ge) => BinaryOp::Ge,
        (7, Token::EqEq) => BinaryOp::Eq,
        (7, Token::NotEq) => BinaryOp::Ne,
        (8, Token::Amp) => BinaryOp::BitAnd,
        (9, Token::Caret) => BinaryOp::BitXor,
        (10, Token::Pipe) => BinaryOp::BitOr,
        (11, Token::AndAnd) => BinaryOp::And,
        (12, Token::OrOr) => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn assign_op_of(token: &Token) -> Option<AssignOp> {
    Some(match token {
        Token::Assign => AssignOp::Assign,
        Token::PlusAssign => AssignOp::Add,
        Token::MinusAssign => AssignOp::Sub,
        Token::StarAssign => AssignOp::Mul,
        Token::SlashAssign => AssignOp::Div,
        Token::PercentAssign => AssignOp::Rem,
        Token::AmpAssign => AssignOp::And,
        Token::PipeAssign => AssignOp::Or,
        Token::CaretAssign => AssignOp::Xor,
        Token::ShlAssign => AssignOp::Shl,
        Token::ShrAssign => AssignOp::Shr,
        _ => return None,
    })
}

/// Parser over a tokenized file.
pub struct Parser<'a> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    handler: &'a Handler,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<(Token, Span)>, handler: &'a Handler) -> Self {
        Self {
            tokens,
            pos: 0,
            handler,
        }
    }

    /// Parse a whole source file.
    pub fn parse_program(&mut self) -> Program {
        let mut items = Vec::new();
        while !self.at_eof() {
            match self.parse_item() {
                Some(item) => items.push(item),
                None => self.recover_to_item(),
            }
        }
        Program { items }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn peek_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        let index = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[index].0
    }

    fn bump(&mut self) -> (Token, Span) {
        let entry = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        entry
    }

    fn at_eof(&self) -> bool {
        *self.peek() == Token::Eof
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> bool {
        if self.eat(expected) {
            true
        } else {
            self.handler.error(
                format!("expected '{expected}', found '{}'", self.peek()),
                self.peek_span(),
            );
            false
        }
    }

    /// Skip to a statement boundary after an error.
    fn recover_to_stmt(&mut self) {
        while !self.at_eof() {
            match self.peek() {
                Token::Semi => {
                    self.bump();
                    return;
                }
                Token::RBrace => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Skip to something that could start a top-level item.
    fn recover_to_item(&mut self) {
        while !self.at_eof() {
            if matches!(self.peek(), Token::Ident(_))
                && matches!(
                    self.peek_ahead(1),
                    Token::ColonColon | Token::ColonAssign | Token::Colon
                )
            {
                return;
            }
            self.bump();
        }
    }

    // ------------------------------------------------------------------
    // Items and declarations
    // ------------------------------------------------------------------

    fn parse_item(&mut self) -> Option<Item> {
        let span = self.peek_span();
        let Token::Ident(name) = *self.peek() else {
            self.handler.error(
                format!("expected declaration, found '{}'", self.peek()),
                span,
            );
            return None;
        };
        // Functions are `name :: ( … )`; everything else is a variable.
        if *self.peek_ahead(1) == Token::ColonColon && *self.peek_ahead(2) == Token::LParen {
            return self.parse_func(name, span).map(Item::Func);
        }
        let decl = self.parse_var_decl()?;
        Some(Item::Var(decl))
    }

    /// `name :: (params) -> Type { block }`
    fn parse_func(&mut self, name: Symbol, span: Span) -> Option<FuncDecl> {
        self.bump(); // name
        self.bump(); // ::
        self.bump(); // (

        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                let param_span = self.peek_span();
                let Token::Ident(param_name) = *self.peek() else {
                    self.handler
                        .error("expected parameter name", param_span);
                    return None;
                };
                self.bump();
                if !self.expect(&Token::Colon) {
                    return None;
                }
                let ty = self.parse_type()?;
                params.push(Param {
                    name: param_name,
                    ty,
                    span: param_span,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            if !self.expect(&Token::RParen) {
                return None;
            }
        }

        let ret = if self.eat(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Some(FuncDecl {
            name,
            params,
            ret,
            body,
            span,
        })
    }

    /// A variable declaration in any of its three forms. The caller has
    /// checked that an identifier is current.
    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let span = self.peek_span();
        let Token::Ident(name) = *self.peek() else {
            return None;
        };
        self.bump();

        let decl = match self.peek() {
            Token::ColonAssign => {
                self.bump();
                let init = self.parse_expr()?;
                VarDecl {
                    name,
                    form: DeclForm::Inferred,
                    ty: None,
                    init: Some(init),
                    span,
                }
            }
            Token::ColonColon => {
                self.bump();
                let init = self.parse_expr()?;
                VarDecl {
                    name,
                    form: DeclForm::Constant,
                    ty: None,
                    init: Some(init),
                    span,
                }
            }
            Token::Colon => {
                self.bump();
                let ty = self.parse_type()?;
                let init = if self.eat(&Token::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                VarDecl {
                    name,
                    form: DeclForm::Typed,
                    ty: Some(ty),
                    init,
                    span,
                }
            }
            other => {
                self.handler.error(
                    format!("expected ':', ':=', or '::' in declaration, found '{other}'"),
                    self.peek_span(),
                );
                return None;
            }
        };
        if !self.expect(&Token::Semi) {
            self.recover_to_stmt();
        }
        Some(decl)
    }

    fn parse_type(&mut self) -> Option<TypeName> {
        match self.peek().clone() {
            Token::Int => {
                self.bump();
                Some(TypeName::Int)
            }
            Token::Float => {
                self.bump();
                Some(TypeName::Float)
            }
            Token::Ident(name) => {
                self.bump();
                Some(TypeName::Named(name))
            }
            other => {
                self.handler
                    .error(format!("expected type, found '{other}'"), self.peek_span());
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        let span = self.peek_span();
        if !self.expect(&Token::LBrace) {
            return None;
        }
        let mut stmts = Vec::new();
        while !self.at_eof() && *self.peek() != Token::RBrace {
            match self.parse_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => self.recover_to_stmt(),
            }
        }
        self.expect(&Token::RBrace);
        Some(Block { stmts, span })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let span = self.peek_span();
        match self.peek() {
            Token::If => {
                self.bump();
                let cond = self.parse_expr()?;
                let then_block = self.parse_block()?;
                let else_block = if self.eat(&Token::Else) {
                    Some(self.parse_block()?)
                } else {
                    None
                };
                Some(Stmt::If {
                    cond,
                    then_block,
                    else_block,
                    span,
                })
            }
            Token::While => {
                self.bump();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Some(Stmt::While { cond, body, span })
            }
            Token::Return => {
                self.bump();
                let value = if *self.peek() == Token::Semi {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                if !self.expect(&Token::Semi) {
                    self.recover_to_stmt();
                }
                Some(Stmt::Return { value, span })
            }
            Token::Print => {
                self.bump();
                let value = self.parse_expr()?;
                if !self.expect(&Token::Semi) {
                    self.recover_to_stmt();
                }
                Some(Stmt::Print { value, span })
            }
            Token::Ident(_)
                if matches!(
                    self.peek_ahead(1),
                    Token::ColonAssign | Token::ColonColon | Token::Colon
                ) =>
            {
                self.parse_var_decl().map(Stmt::Decl)
            }
            _ => {
                // Assignment: `target op value;`
                let target = self.parse_expr()?;
                let Some(op) = assign_op_of(self.peek()) else {
                    self.handler.error(
                        format!("expected assignment operator, found '{}'", self.peek()),
                        self.peek_span(),
                    );
                    return None;
                };
                self.bump();
                let value = self.parse_expr()?;
                if !self.expect(&Token::Semi) {
                    self.recover_to_stmt();
                }
                Some(Stmt::Assign {
                    target,
                    op,
                    value,
                    span,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_binary(MAX_PRECEDENCE)
    }

    /// Precedence climbing: each tier folds its operators left to right
    /// over operands of the next-tighter tier.
    fn parse_binary(&mut self, tier: u8) -> Option<Expr> {
        if tier < 3 {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(tier - 1)?;
        while let Some(op) = binary_op_in_tier(self.peek(), tier) {
            let span = self.peek_span();
            self.bump();
            let rhs = self.parse_binary(tier - 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let span = self.peek_span();
        let op = match self.peek() {
            Token::Plus => Some(UnaryOp::Plus),
            Token::Minus => Some(UnaryOp::Neg),
            Token::Bang => Some(UnaryOp::Not),
            Token::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Some(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    /// Tier 1: call, index, and member access bind tightest.
    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.peek_span();
            match self.peek() {
                Token::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen);
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span,
                    };
                }
                Token::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket);
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                        span,
                    };
                }
                Token::Dot => {
                    self.bump();
                    let Token::Ident(name) = *self.peek() else {
                        self.handler
                            .error("expected field name after '.'", self.peek_span());
                        return None;
                    };
                    self.bump();
                    expr = Expr::Field {
                        base: Box::new(expr),
                        name,
                        span,
                    };
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let span = self.peek_span();
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Some(Expr::Ident { name, span })
            }
            Token::IntLit(value) => {
                self.bump();
                Some(Expr::IntLit { value, span })
            }
            Token::RealLit(value) => {
                self.bump();
                Some(Expr::RealLit { value, span })
            }
            Token::StrLit(value) => {
                self.bump();
                Some(Expr::StrLit { value, span })
            }
            Token::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen);
                Some(inner)
            }
            other => {
                self.handler.error(
                    format!("expected expression, found '{other}'"),
                    span,
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> (Program, Handler) {
        let handler = Handler::new();
        let program = {
            let tokens = Lexer::new(source, Symbol::intern("t.cn"), &handler).tokenize();
            Parser::new(tokens, &handler).parse_program()
        };
        (program, handler)
    }

    fn parse_ok(source: &str) -> Program {
        let (program, handler) = parse(source);
        assert!(
            !handler.has_errors(),
            "unexpected diagnostics: {:?}",
            handler.diagnostics()
        );
        program
    }

    fn parse_expr_ok(source: &str) -> Expr {
        let handler = Handler::new();
        let expr = {
            let tokens = Lexer::new(source, Symbol::intern("t.cn"), &handler).tokenize();
            Parser::new(tokens, &handler).parse_expr().unwrap()
        };
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        expr
    }

    #[test]
    fn declaration_forms() {
        let program = parse_ok("a := 1;\nb :: 2;\nc : int = 3;\nd : float;");
        assert_eq!(program.items.len(), 4);
        match &program.items[0] {
            Item::Var(decl) => {
                assert_eq!(decl.form, DeclForm::Inferred);
                assert!(decl.init.is_some());
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &program.items[3] {
            Item::Var(decl) => {
                assert_eq!(decl.ty, Some(TypeName::Float));
                assert!(decl.init.is_none());
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn function_declaration() {
        let program = parse_ok("add :: (a: int, b: int) -> int { return a + b; }");
        let Item::Func(func) = &program.items[0] else {
            panic!("expected function");
        };
        assert_eq!(func.name.as_str(), "add");
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.ret, Some(TypeName::Int));
        assert_eq!(func.body.stmts.len(), 1);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse_expr_ok("a + b * c");
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn shifts_bind_looser_than_addition() {
        let expr = parse_expr_ok("a + b << c");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Shl, .. }));
    }

    #[test]
    fn logical_or_is_loosest() {
        let expr = parse_expr_ok("a && b || c == d");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn binary_operators_associate_left() {
        let expr = parse_expr_ok("a - b - c");
        let Expr::Binary { op: BinaryOp::Sub, lhs, .. } = expr else {
            panic!("expected subtraction at the root");
        };
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn unary_and_postfix() {
        let expr = parse_expr_ok("-f(x)[0].y");
        let Expr::Unary { op: UnaryOp::Neg, operand, .. } = expr else {
            panic!("expected negation at the root");
        };
        assert!(matches!(*operand, Expr::Field { .. }));
    }

    #[test]
    fn parenthesized_grouping() {
        let expr = parse_expr_ok("(a + b) * c");
        let Expr::Binary { op: BinaryOp::Mul, lhs, .. } = expr else {
            panic!("expected multiplication at the root");
        };
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn statements() {
        let source = "main :: () -> int {\n\
             x := 0;\n\
             while x < 10 { x += 1; }\n\
             if x == 10 { print x; } else { print 0; }\n\
             return x;\n\
         }";
        let program = parse_ok(source);
        let Item::Func(func) = &program.items[0] else {
            panic!("expected function");
        };
        assert_eq!(func.body.stmts.len(), 4);
        assert!(matches!(func.body.stmts[1], Stmt::While { .. }));
        assert!(matches!(
            func.body.stmts[2],
            Stmt::If { else_block: Some(_), .. }
        ));
    }

    #[test]
    fn compound_assignment() {
        let program = parse_ok("f :: () { a <<= 2; b %= 3; }");
        let Item::Func(func) = &program.items[0] else {
            panic!("expected function");
        };
        assert!(matches!(
            func.body.stmts[0],
            Stmt::Assign { op: AssignOp::Shl, .. }
        ));
        assert!(matches!(
            func.body.stmts[1],
            Stmt::Assign { op: AssignOp::Rem, .. }
        ));
    }

    #[test]
    fn error_recovery_continues_parsing() {
        let (program, handler) = parse("a := ;\nb := 2;");
        assert!(handler.has_errors());
        // The second declaration still parses.
        assert!(program
            .items
            .iter()
            .any(|item| matches!(item, Item::Var(d) if d.name.as_str() == "b")));
    }

    #[test]
    fn missing_semicolon_reports() {
        let (_, handler) = parse("a := 1\nb := 2;");
        assert!(handler.has_errors());
    }
}

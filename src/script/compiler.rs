//! Parser for the embedded scripting language.
//!
//! Produces the statement/expression AST walked by the executor. Parse
//! failures surface as compile errors carrying the offending token's
//! line and column.

use std::rc::Rc;

use crate::errors::PlScriptError;
use crate::script::scanner::{Keyword, Token, TokenKind, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    VarDecl { name: String, init: Option<Expr> },
    FunctionDecl(Rc<FunctionDef>),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Block(Vec<Stmt>),
    Throw(Expr),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    BigInt(i64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Function(Rc<FunctionDef>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        constructor: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
}

/// Parses a whole program (a statement list).
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, PlScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.at_eof() {
        stmts.push(parser.parse_stmt()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> PlScriptError {
        let span = self.tokens[self.pos].span;
        PlScriptError::Compile {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }

    fn expect(&mut self, expected: &TokenKind, what: &str) -> Result<(), PlScriptError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_semicolons(&mut self) {
        while self.eat(&TokenKind::Semicolon) {}
    }

    fn parse_stmt(&mut self) -> Result<Stmt, PlScriptError> {
        let stmt = match self.peek().clone() {
            TokenKind::Keyword(Keyword::Function) => self.parse_function_decl()?,
            TokenKind::Keyword(Keyword::Var)
            | TokenKind::Keyword(Keyword::Let)
            | TokenKind::Keyword(Keyword::Const) => {
                self.advance();
                let name = self.parse_ident("variable name")?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.eat_semicolons();
                Stmt::VarDecl { name, init }
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if matches!(
                    self.peek(),
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.eat_semicolons();
                Stmt::Return(value)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = self.parse_branch()?;
                Stmt::While { cond, body }
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                let value = self.parse_expr()?;
                self.eat_semicolons();
                Stmt::Throw(value)
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.eat_semicolons();
                Stmt::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.eat_semicolons();
                Stmt::Continue
            }
            TokenKind::LBrace => {
                self.advance();
                let mut body = Vec::new();
                while !self.eat(&TokenKind::RBrace) {
                    if self.at_eof() {
                        return Err(self.error("unterminated block"));
                    }
                    body.push(self.parse_stmt()?);
                }
                Stmt::Block(body)
            }
            _ => {
                let expr = self.parse_expr()?;
                self.eat_semicolons();
                Stmt::Expr(expr)
            }
        };
        Ok(stmt)
    }

    fn parse_if(&mut self) -> Result<Stmt, PlScriptError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let then_branch = self.parse_branch()?;
        let else_branch = if self.eat(&TokenKind::Keyword(Keyword::Else)) {
            if matches!(self.peek(), TokenKind::Keyword(Keyword::If)) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_branch()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    /// A branch is either a braced block or a single statement.
    fn parse_branch(&mut self) -> Result<Vec<Stmt>, PlScriptError> {
        if self.eat(&TokenKind::LBrace) {
            let mut body = Vec::new();
            while !self.eat(&TokenKind::RBrace) {
                if self.at_eof() {
                    return Err(self.error("unterminated block"));
                }
                body.push(self.parse_stmt()?);
            }
            Ok(body)
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, PlScriptError> {
        self.advance();
        let name = self.parse_ident("function name")?;
        let def = self.parse_function_rest(Some(name))?;
        Ok(Stmt::FunctionDecl(Rc::new(def)))
    }

    fn parse_function_rest(&mut self, name: Option<String>) -> Result<FunctionDef, PlScriptError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                params.push(self.parse_ident("parameter name")?);
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(&TokenKind::Comma, "','")?;
            }
        }
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.error("unterminated function body"));
            }
            body.push(self.parse_stmt()?);
        }
        Ok(FunctionDef { name, params, body })
    }

    fn parse_ident(&mut self, what: &str) -> Result<String, PlScriptError> {
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {what}, found {other:?}"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, PlScriptError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, PlScriptError> {
        let lhs = self.parse_logical_or()?;
        let op = match self.peek() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            _ => return Ok(lhs),
        };
        if !matches!(lhs, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
            return Err(self.error("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
        })
    }

    fn parse_logical_or(&mut self) -> Result<Expr, PlScriptError> {
        let mut lhs = self.parse_logical_and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, PlScriptError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, PlScriptError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::EqEqEq => BinOp::StrictEq,
                TokenKind::NotEq => BinOp::NotEq,
                TokenKind::NotEqEq => BinOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, PlScriptError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, PlScriptError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, PlScriptError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, PlScriptError> {
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, PlScriptError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, PlScriptError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&TokenKind::RParen) {
                break;
            }
            self.expect(&TokenKind::Comma, "','")?;
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, PlScriptError> {
        let expr = match self.peek().clone() {
            TokenKind::Number(value) => {
                self.advance();
                Expr::Number(value)
            }
            TokenKind::BigInt(value) => {
                self.advance();
                Expr::BigInt(value)
            }
            TokenKind::Str(value) => {
                self.advance();
                Expr::Str(value)
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Expr::Bool(true)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Expr::Bool(false)
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Expr::Null
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.advance();
                Expr::Undefined
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let name = match self.peek().clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                let def = self.parse_function_rest(name)?;
                Expr::Function(Rc::new(def))
            }
            TokenKind::Keyword(Keyword::New) => {
                self.advance();
                let constructor = self.parse_ident("constructor name")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let args = self.parse_args()?;
                Expr::New { constructor, args }
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Expr::Ident(name)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(&TokenKind::RBracket) {
                            break;
                        }
                        self.expect(&TokenKind::Comma, "','")?;
                    }
                }
                Expr::Array(items)
            }
            TokenKind::LBrace => {
                self.advance();
                let mut pairs = Vec::new();
                if !self.eat(&TokenKind::RBrace) {
                    loop {
                        let key = match self.peek().clone() {
                            TokenKind::Identifier(name) => {
                                self.advance();
                                name
                            }
                            TokenKind::Str(text) => {
                                self.advance();
                                text
                            }
                            other => {
                                return Err(
                                    self.error(format!("expected property name, found {other:?}"))
                                );
                            }
                        };
                        self.expect(&TokenKind::Colon, "':'")?;
                        let value = self.parse_expr()?;
                        pairs.push((key, value));
                        if self.eat(&TokenKind::RBrace) {
                            break;
                        }
                        self.expect(&TokenKind::Comma, "','")?;
                    }
                }
                Expr::Object(pairs)
            }
            other => return Err(self.error(format!("unexpected token {other:?}"))),
        };
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_function_declaration_with_trailing_reference() {
        let stmts = parse_program("function add(a, b) { return a + b; }\nadd;")
            .expect("program should parse");
        assert_eq!(stmts.len(), 2);
        let Stmt::FunctionDecl(def) = &stmts[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(def.name.as_deref(), Some("add"));
        assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(&stmts[1], Stmt::Expr(Expr::Ident(name)) if name == "add"));
    }

    #[test]
    fn parses_iife_wrapper() {
        let stmts =
            parse_program("(function () {\nreturn 1;\n})();").expect("program should parse");
        assert_eq!(stmts.len(), 1);
        let Stmt::Expr(Expr::Call { callee, args }) = &stmts[0] else {
            panic!("expected call statement");
        };
        assert!(args.is_empty());
        assert!(matches!(**callee, Expr::Function(_)));
    }

    #[test]
    fn syntax_error_carries_position() {
        let err = parse_program("function (")
            .expect_err("missing name should fail");
        assert!(matches!(err, PlScriptError::Compile { .. }));
    }

    #[test]
    fn parses_member_index_and_call_chains() {
        let stmts = parse_program("plan.cursor().fetch(2)[0].name;").expect("should parse");
        assert_eq!(stmts.len(), 1);
    }
}

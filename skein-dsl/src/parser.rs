//! Recursive-descent parser producing the statement list the graph
//! builder consumes.

use crate::lexer::{lex, Token, TokenKind};
use skein_core::error::Diagnostic;
use skein_core::types::TypeDescriptor;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub node: T,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `in name: Type`
    Input { name: String, ty: TypeDescriptor },
    /// `let name = expr`
    Let { name: String, expr: Spanned<Expr> },
    /// `out name` or `out name = expr`
    Out {
        name: String,
        expr: Option<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ident(String),
    Unary {
        op: UnaryKind,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinaryKind,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Call {
        name: String,
        args: Vec<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Parse a whole program. All diagnostics found are returned together;
/// statements that parse cleanly are kept so the checker can report
/// further errors in the same pass.
pub fn parse(source: &str) -> (Vec<Spanned<Stmt>>, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = lex(source);
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };

    let mut statements = Vec::new();
    loop {
        parser.skip_newlines();
        if parser.at_end() {
            break;
        }
        match parser.statement() {
            Ok(stmt) => statements.push(stmt),
            Err(diag) => {
                diagnostics.push(diag);
                parser.recover_to_newline();
            }
        }
    }

    (statements, diagnostics)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn last_position(&self) -> (u32, u32) {
        self.tokens
            .last()
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn error_here(&self, code: &str, message: impl Into<String>) -> Diagnostic {
        let (line, column) = self
            .peek()
            .map(|t| (t.line, t.column))
            .unwrap_or_else(|| self.last_position());
        Diagnostic::new(line, column, code, message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'a Token, Diagnostic> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(tok)
            }
            Some(tok) => Err(Diagnostic::new(
                tok.line,
                tok.column,
                "E002",
                format!("expected {what}, found `{}`", tok.text),
            )),
            None => {
                let (line, column) = self.last_position();
                Err(Diagnostic::new(
                    line,
                    column,
                    "E002",
                    format!("expected {what}, found end of input"),
                ))
            }
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(TokenKind::Newline) {}
    }

    /// After a bad statement, resync at the next newline.
    fn recover_to_newline(&mut self) {
        while let Some(kind) = self.peek_kind() {
            self.pos += 1;
            if kind == TokenKind::Newline {
                break;
            }
        }
    }

    fn end_of_statement(&mut self) -> Result<(), Diagnostic> {
        match self.peek_kind() {
            None | Some(TokenKind::Newline) => {
                self.eat(TokenKind::Newline);
                Ok(())
            }
            _ => Err(self.error_here("E002", "expected end of statement")),
        }
    }

    fn statement(&mut self) -> Result<Spanned<Stmt>, Diagnostic> {
        let tok = self.peek().expect("caller checked not at end");
        let (line, column) = (tok.line, tok.column);
        let stmt = match tok.kind {
            TokenKind::KwIn => {
                self.pos += 1;
                let name = self.expect(TokenKind::Ident, "input name")?.text.clone();
                self.expect(TokenKind::Colon, "`:`")?;
                let ty = self.type_expr()?;
                self.end_of_statement()?;
                Stmt::Input { name, ty }
            }
            TokenKind::KwLet => {
                self.pos += 1;
                let name = self.expect(TokenKind::Ident, "binding name")?.text.clone();
                self.expect(TokenKind::Assign, "`=`")?;
                let expr = self.expr()?;
                self.end_of_statement()?;
                Stmt::Let { name, expr }
            }
            TokenKind::KwOut => {
                self.pos += 1;
                let name = self.expect(TokenKind::Ident, "output name")?.text.clone();
                let expr = if self.eat(TokenKind::Assign) {
                    Some(self.expr()?)
                } else {
                    None
                };
                self.end_of_statement()?;
                Stmt::Out { name, expr }
            }
            _ => {
                return Err(Diagnostic::new(
                    line,
                    column,
                    "E002",
                    format!("expected `in`, `let`, or `out`, found `{}`", tok.text),
                ))
            }
        };
        Ok(Spanned {
            node: stmt,
            line,
            column,
        })
    }

    // ── Types ──

    fn type_expr(&mut self) -> Result<TypeDescriptor, Diagnostic> {
        let mut variants = vec![self.type_single()?];
        while self.eat(TokenKind::Pipe) {
            variants.push(self.type_single()?);
        }
        if variants.len() == 1 {
            Ok(variants.pop().expect("non-empty"))
        } else {
            Ok(TypeDescriptor::Union(variants))
        }
    }

    fn type_single(&mut self) -> Result<TypeDescriptor, Diagnostic> {
        if self.peek_kind() == Some(TokenKind::LBrace) {
            return self.record_type();
        }
        let tok = self.expect(TokenKind::Ident, "type name")?;
        match tok.text.as_str() {
            "Int" => Ok(TypeDescriptor::Int),
            "Float" => Ok(TypeDescriptor::Float),
            "Bool" => Ok(TypeDescriptor::Bool),
            "String" => Ok(TypeDescriptor::Str),
            "List" => {
                self.expect(TokenKind::Lt, "`<`")?;
                let item = self.type_expr()?;
                self.expect(TokenKind::Gt, "`>`")?;
                Ok(TypeDescriptor::list(item))
            }
            "Option" => {
                self.expect(TokenKind::Lt, "`<`")?;
                let item = self.type_expr()?;
                self.expect(TokenKind::Gt, "`>`")?;
                Ok(TypeDescriptor::optional(item))
            }
            "Map" => {
                self.expect(TokenKind::Lt, "`<`")?;
                let value = self.type_expr()?;
                self.expect(TokenKind::Gt, "`>`")?;
                Ok(TypeDescriptor::map(value))
            }
            other => Err(Diagnostic::new(
                tok.line,
                tok.column,
                "E002",
                format!("unknown type `{other}`"),
            )),
        }
    }

    /// `{ field: type, ... }`
    fn record_type(&mut self) -> Result<TypeDescriptor, Diagnostic> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut fields = BTreeMap::new();
        if self.eat(TokenKind::RBrace) {
            return Ok(TypeDescriptor::Record(fields));
        }
        loop {
            let field = self.expect(TokenKind::Ident, "field name")?;
            let (line, column) = (field.line, field.column);
            let name = field.text.clone();
            self.expect(TokenKind::Colon, "`:`")?;
            let ty = self.type_expr()?;
            if fields.insert(name.clone(), ty).is_some() {
                return Err(Diagnostic::new(
                    line,
                    column,
                    "E004",
                    format!("duplicate record field `{name}`"),
                ));
            }
            if self.eat(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RBrace, "`}`")?;
            return Ok(TypeDescriptor::Record(fields));
        }
    }

    // ── Expressions, by descending precedence ──

    fn expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let mut lhs = self.and_expr()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.and_expr()?;
            lhs = binary(BinaryKind::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let mut lhs = self.cmp_expr()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.cmp_expr()?;
            lhs = binary(BinaryKind::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BinaryKind::Eq,
                Some(TokenKind::NotEq) => BinaryKind::Ne,
                Some(TokenKind::Lt) => BinaryKind::Lt,
                Some(TokenKind::Le) => BinaryKind::Le,
                Some(TokenKind::Gt) => BinaryKind::Gt,
                Some(TokenKind::Ge) => BinaryKind::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.add_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryKind::Add,
                Some(TokenKind::Minus) => BinaryKind::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.mul_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryKind::Mul,
                Some(TokenKind::Slash) => BinaryKind::Div,
                Some(TokenKind::Percent) => BinaryKind::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary_expr()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let (op, line, column) = match self.peek() {
            Some(tok) if tok.kind == TokenKind::Minus => (UnaryKind::Neg, tok.line, tok.column),
            Some(tok) if tok.kind == TokenKind::Bang => (UnaryKind::Not, tok.line, tok.column),
            _ => return self.primary(),
        };
        self.pos += 1;
        let operand = self.unary_expr()?;
        Ok(Spanned {
            node: Expr::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
            column,
        })
    }

    fn primary(&mut self) -> Result<Spanned<Expr>, Diagnostic> {
        let tok = match self.bump() {
            Some(tok) => tok,
            None => {
                let (line, column) = self.last_position();
                return Err(Diagnostic::new(
                    line,
                    column,
                    "E002",
                    "expected expression, found end of input",
                ));
            }
        };
        let (line, column) = (tok.line, tok.column);
        let node = match tok.kind {
            TokenKind::IntLit => {
                let value: i64 = tok.text.parse().map_err(|_| {
                    Diagnostic::new(line, column, "E002", format!("integer literal `{}` out of range", tok.text))
                })?;
                Expr::Int(value)
            }
            TokenKind::FloatLit => {
                let value: f64 = tok.text.parse().map_err(|_| {
                    Diagnostic::new(line, column, "E002", format!("bad float literal `{}`", tok.text))
                })?;
                Expr::Float(value)
            }
            TokenKind::KwTrue => Expr::Bool(true),
            TokenKind::KwFalse => Expr::Bool(false),
            TokenKind::StringLit => Expr::Str(unescape(&tok.text)),
            TokenKind::Ident => {
                if self.eat(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(TokenKind::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(TokenKind::Comma) {
                                continue;
                            }
                            self.expect(TokenKind::RParen, "`)`")?;
                            break;
                        }
                    }
                    Expr::Call {
                        name: tok.text.clone(),
                        args,
                    }
                } else {
                    Expr::Ident(tok.text.clone())
                }
            }
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                inner.node
            }
            _ => {
                return Err(Diagnostic::new(
                    line,
                    column,
                    "E002",
                    format!("expected expression, found `{}`", tok.text),
                ))
            }
        };
        Ok(Spanned { node, line, column })
    }
}

fn binary(op: BinaryKind, lhs: Spanned<Expr>, rhs: Spanned<Expr>) -> Spanned<Expr> {
    let (line, column) = (lhs.line, lhs.column);
    Spanned {
        node: Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        line,
        column,
    }
}

/// Strip quotes and process `\"`, `\\`, `\n`, `\t` escapes.
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

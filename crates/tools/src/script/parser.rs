//! Recursive-descent parser and the entry-point validation.
//!
//! Parsing accepts any sequence of functions and statements at top level so
//! that validation can explain exactly what is wrong with a script instead
//! of reporting a bare syntax error.

use super::ast::{BinaryOp, Expr, Function, Item, Program, Stmt, UnaryOp};
use super::lexer::{SyntaxError, Token, TokenKind, tokenize};

/// Deepest nesting of blocks and expressions a script may use.
pub const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    loops: usize,
}

/// Parse a whole script.
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
        depth: 0,
        loops: 0,
    };
    let mut items = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        if parser.at(&TokenKind::Async) || parser.at(&TokenKind::Fn) {
            items.push(Item::Function(parser.function()?));
        } else {
            let line = parser.peek().line;
            items.push(Item::Statement {
                stmt: parser.statement()?,
                line,
            });
        }
    }
    Ok(Program { items })
}

/// Parse and check that the script is exactly one `async fn main(env)`.
///
/// The error message is the text that follows `"ERROR: format: "`.
pub fn validate(source: &str) -> Result<Function, String> {
    const SHAPE: &str = "Provide only one function 'async fn main(env)' and no other top-level code.";

    let program = parse(source).map_err(|e| format!("syntax error at {e}. {SHAPE}"))?;
    let mut functions = Vec::new();
    for item in program.items {
        match item {
            Item::Function(f) => functions.push(f),
            Item::Statement { line, .. } => {
                return Err(format!("top-level statement on line {line}. {SHAPE}"));
            }
        }
    }

    let mut functions = functions.into_iter();
    let main = match (functions.next(), functions.next()) {
        (None, _) => return Err(format!("no function definition found. {SHAPE}")),
        (Some(_), Some(extra)) => {
            return Err(format!(
                "extra function '{}' on line {}. {SHAPE}",
                extra.name, extra.line
            ));
        }
        (Some(main), None) => main,
    };

    if main.name != "main" {
        return Err(format!("function is named '{}', expected 'main'. {SHAPE}", main.name));
    }
    if !main.is_async {
        return Err(format!("'main' must be declared 'async fn'. {SHAPE}"));
    }
    if main.params.len() != 1 {
        return Err(format!(
            "'main' takes exactly one parameter (the environment handle), found {}. {SHAPE}",
            main.params.len()
        ));
    }
    Ok(main)
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof and the parser never advances past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        let token = self.peek();
        SyntaxError {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), SyntaxError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {kind}, found {}", self.peek().kind)))
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {other}"))),
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {MAX_NESTING} levels")));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn function(&mut self) -> Result<Function, SyntaxError> {
        let line = self.peek().line;
        let is_async = self.eat(&TokenKind::Async);
        self.expect(&TokenKind::Fn)?;
        let name = self.ident()?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            params.push(self.ident()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.block()?;
        Ok(Function {
            is_async,
            name,
            params,
            body,
            line,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.enter()?;
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("unclosed block, expected '}'"));
            }
            stmts.push(self.statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        self.leave();
        Ok(stmts)
    }

    /// `;` is optional before a closing brace or the end of input.
    fn terminator(&mut self) -> Result<(), SyntaxError> {
        if self.eat(&TokenKind::Semi) || self.at(&TokenKind::RBrace) || self.at(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error(format!("expected ';', found {}", self.peek().kind)))
        }
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.peek().kind {
            TokenKind::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(&TokenKind::Assign)?;
                let value = self.expr()?;
                self.terminator()?;
                Ok(Stmt::Let { name, value })
            }
            TokenKind::If => self.if_statement(),
            TokenKind::While => {
                self.advance();
                let cond = self.expr()?;
                let body = self.loop_body()?;
                Ok(Stmt::While { cond, body })
            }
            TokenKind::For => {
                self.advance();
                let mut names = vec![self.ident()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.ident()?);
                }
                self.expect(&TokenKind::In)?;
                let iterable = self.expr()?;
                let body = self.loop_body()?;
                Ok(Stmt::For {
                    names,
                    iterable,
                    body,
                })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at(&TokenKind::Semi)
                    || self.at(&TokenKind::RBrace)
                    || self.at(&TokenKind::Eof)
                {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.terminator()?;
                Ok(Stmt::Return(value))
            }
            TokenKind::Break | TokenKind::Continue => {
                let token = self.advance();
                if self.loops == 0 {
                    return Err(SyntaxError {
                        line: token.line,
                        column: token.column,
                        message: format!("{} outside of a loop", token.kind),
                    });
                }
                self.terminator()?;
                Ok(if token.kind == TokenKind::Break {
                    Stmt::Break
                } else {
                    Stmt::Continue
                })
            }
            TokenKind::Async | TokenKind::Fn => {
                Err(self.error("functions can only be defined at top level"))
            }
            _ => {
                let target = self.expr()?;
                let op = match self.peek().kind {
                    TokenKind::Assign => Some(None),
                    TokenKind::PlusAssign => Some(Some(BinaryOp::Add)),
                    TokenKind::MinusAssign => Some(Some(BinaryOp::Sub)),
                    _ => None,
                };
                let stmt = match op {
                    Some(op) => {
                        if !matches!(target, Expr::Var(_) | Expr::Index { .. }) {
                            return Err(self.error("can only assign to a variable or an index"));
                        }
                        self.advance();
                        let value = self.expr()?;
                        Stmt::Assign { target, op, value }
                    }
                    None => Stmt::Expr(target),
                };
                self.terminator()?;
                Ok(stmt)
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let mut branches = Vec::new();
        let mut otherwise = None;
        self.expect(&TokenKind::If)?;
        loop {
            let cond = self.expr()?;
            let body = self.block()?;
            branches.push((cond, body));
            if !self.eat(&TokenKind::Else) {
                break;
            }
            if !self.eat(&TokenKind::If) {
                otherwise = Some(self.block()?);
                break;
            }
        }
        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.loops += 1;
        let body = self.block();
        self.loops -= 1;
        body
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let expr = self.or();
        self.leave();
        expr
    }

    fn or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.comparison()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.comparison()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let wrap: fn(Expr) -> Expr = match self.peek().kind {
            TokenKind::Minus => |e| Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(e),
            },
            TokenKind::Bang => |e| Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(e),
            },
            TokenKind::Await => |e| Expr::Await(Box::new(e)),
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(wrap(operand?))
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                if self.eat(&TokenKind::Await) {
                    expr = Expr::Await(Box::new(expr));
                    continue;
                }
                let method = self.ident()?;
                if !self.at(&TokenKind::LParen) {
                    return Err(self.error(format!("expected '(' after method '{method}'")));
                }
                let args = self.arguments()?;
                expr = Expr::Method {
                    receiver: Box::new(expr),
                    method,
                    args,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.at(&TokenKind::LParen) {
                return Err(self.error("only named functions can be called"));
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) {
            args.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(n) => Ok(Expr::Int(n)),
            TokenKind::Float(x) => Ok(Expr::Float(x)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::None => Ok(Expr::None),
            TokenKind::Ident(name) => {
                if self.at(&TokenKind::LParen) {
                    let args = self.arguments()?;
                    Ok(Expr::Call {
                        function: name,
                        args,
                    })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    items.push(self.expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                while !self.at(&TokenKind::RBrace) {
                    let key = self.expr()?;
                    self.expect(&TokenKind::Colon)?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
                Ok(Expr::Map(entries))
            }
            other => Err(SyntaxError {
                line: token.line,
                column: token.column,
                message: format!("unexpected {other}"),
            }),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

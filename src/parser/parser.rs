//! Recursive-descent parser
//!
//! Produces the AST the emitter consumes. Expressions use precedence
//! climbing; statements are one function each. Automatic semicolon
//! insertion is the newline-flag variant: a statement may end at `;`,
//! `}`, end of input, or a token preceded by a line terminator.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub pos: u32,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    strict: bool,
    is_module: bool,
    /// Nesting depth of functions, used to reject `return` at top level.
    function_depth: u32,
}

/// Saved lexer position for speculative parses (arrow-function heads).
struct Checkpoint<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, is_module: bool) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            strict: is_module,
            is_module,
            function_depth: 0,
        }
    }

    pub fn parse_program(mut self) -> PResult<Program> {
        let mut body = Vec::new();
        let strict = self.scan_directive_prologue(&mut body)?;
        if strict {
            self.strict = true;
        }
        while !self.check(&TokenKind::Eof) {
            body.push(self.statement(true)?);
        }
        Ok(Program {
            body,
            strict: self.strict,
            is_module: self.is_module,
        })
    }

    /// Consume leading string-literal statements; true if one of them
    /// is "use strict".
    fn scan_directive_prologue(&mut self, body: &mut Vec<Stmt>) -> PResult<bool> {
        let mut strict = false;
        while let TokenKind::Str(s) = &self.current.kind {
            let is_strict = s == "use strict";
            let pos = self.current.pos;
            let s = s.clone();
            self.advance();
            if !self.consume_semicolon() {
                // Not a directive after all (e.g. `"a" + b`); re-parse
                // the rest of the expression from the literal.
                let lit = Expr {
                    kind: ExprKind::Str(s),
                    pos,
                };
                let expr = self.continue_expression(lit)?;
                self.expect_semicolon()?;
                body.push(Stmt {
                    kind: StmtKind::Expr(expr),
                    pos,
                });
                return Ok(strict);
            }
            strict |= is_strict;
            body.push(Stmt {
                kind: StmtKind::Expr(Expr {
                    kind: ExprKind::Str(s),
                    pos,
                }),
                pos,
            });
        }
        Ok(strict)
    }

    // Token plumbing

    fn advance(&mut self) {
        // Lexer errors surface as `TokenKind::Error` and fail at the
        // next expect/consume site.
        self.current = self.lexer.next_token();
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn check_ident(&self, text: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Ident(s) if s == text)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<()> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {} but found {}",
                kind, self.current.kind
            )))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match &self.current.kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(self.error(format!("expected identifier but found {}", other))),
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            pos: self.current.pos,
        }
    }

    fn consume_semicolon(&mut self) -> bool {
        if self.eat(&TokenKind::Semicolon) {
            return true;
        }
        self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Eof)
            || self.current.newline_before
    }

    fn expect_semicolon(&mut self) -> PResult<()> {
        if self.consume_semicolon() {
            Ok(())
        } else {
            Err(self.error(format!("expected ; but found {}", self.current.kind)))
        }
    }

    fn checkpoint(&self) -> Checkpoint<'a> {
        Checkpoint {
            lexer: self.lexer.clone(),
            current: self.current.clone(),
        }
    }

    fn restore(&mut self, cp: Checkpoint<'a>) {
        self.lexer = cp.lexer;
        self.current = cp.current;
    }

    // Statements

    fn statement(&mut self, top_level: bool) -> PResult<Stmt> {
        let pos = self.current.pos;
        let kind = match &self.current.kind {
            TokenKind::LBrace => {
                self.advance();
                let body = self.statement_list(&TokenKind::RBrace)?;
                self.expect(TokenKind::RBrace)?;
                StmtKind::Block(body)
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let stmt = self.variable_declaration()?;
                self.expect_semicolon()?;
                stmt
            }
            TokenKind::Function => {
                self.advance();
                let func = self.function_rest(false, true)?;
                StmtKind::FunctionDecl(Rc::new(func))
            }
            TokenKind::Class => {
                self.advance();
                let class = self.class_rest(true)?;
                StmtKind::ClassDecl(Rc::new(class))
            }
            TokenKind::Return => {
                if self.function_depth == 0 {
                    return Err(self.error("return outside of function".into()));
                }
                self.advance();
                let arg = if self.consume_semicolon_peek() {
                    None
                } else {
                    Some(self.expression(true)?)
                };
                self.expect_semicolon()?;
                StmtKind::Return(arg)
            }
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.expression(true)?;
                self.expect(TokenKind::RParen)?;
                let cons = Box::new(self.statement(false)?);
                let alt = if self.eat(&TokenKind::Else) {
                    Some(Box::new(self.statement(false)?))
                } else {
                    None
                };
                StmtKind::If { cond, cons, alt }
            }
            TokenKind::For => self.for_statement()?,
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let test = self.expression(true)?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.statement(false)?);
                StmtKind::While { test, body }
            }
            TokenKind::Do => {
                self.advance();
                let body = Box::new(self.statement(false)?);
                self.expect(TokenKind::While)?;
                self.expect(TokenKind::LParen)?;
                let test = self.expression(true)?;
                self.expect(TokenKind::RParen)?;
                self.eat(&TokenKind::Semicolon);
                StmtKind::DoWhile { body, test }
            }
            TokenKind::Break => {
                self.advance();
                self.expect_semicolon()?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_semicolon()?;
                StmtKind::Continue
            }
            TokenKind::Throw => {
                self.advance();
                if self.current.newline_before {
                    return Err(self.error("newline not allowed after throw".into()));
                }
                let arg = self.expression(true)?;
                self.expect_semicolon()?;
                StmtKind::Throw(arg)
            }
            TokenKind::Try => self.try_statement()?,
            TokenKind::Switch => self.switch_statement()?,
            TokenKind::With => {
                if self.strict {
                    return Err(self.error("with statements are not allowed in strict mode".into()));
                }
                self.advance();
                self.expect(TokenKind::LParen)?;
                let object = self.expression(true)?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.statement(false)?);
                StmtKind::With { object, body }
            }
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Import if self.is_module && top_level => self.import_declaration()?,
            TokenKind::Export if self.is_module && top_level => self.export_declaration()?,
            TokenKind::Import | TokenKind::Export => {
                return Err(self.error("import/export only allowed at module top level".into()));
            }
            TokenKind::Error(msg) => {
                return Err(self.error(msg.clone()));
            }
            _ => {
                let expr = self.expression(true)?;
                self.expect_semicolon()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, pos })
    }

    /// Whether the current position terminates a restricted production
    /// without consuming anything.
    fn consume_semicolon_peek(&self) -> bool {
        self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Eof)
            || self.current.newline_before
    }

    fn statement_list(&mut self, end: &TokenKind) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.check(end) && !self.check(&TokenKind::Eof) {
            body.push(self.statement(false)?);
        }
        Ok(body)
    }

    fn variable_declaration(&mut self) -> PResult<StmtKind> {
        let kind = match self.current.kind {
            TokenKind::Var => DeclKind::Var,
            TokenKind::Let => DeclKind::Let,
            TokenKind::Const => DeclKind::Const,
            _ => unreachable!(),
        };
        self.advance();
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.assignment_expression(true)?)
            } else {
                if kind == DeclKind::Const {
                    return Err(self.error("const declaration requires an initializer".into()));
                }
                None
            };
            decls.push((name, init));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::VarDecl { kind, decls })
    }

    fn for_statement(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.expect(TokenKind::LParen)?;

        // Declaration head: var/let/const name followed by in/of makes
        // an enumerating loop; anything else is a regular for.
        if matches!(
            self.current.kind,
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            let decl_kind = match self.current.kind {
                TokenKind::Var => DeclKind::Var,
                TokenKind::Let => DeclKind::Let,
                _ => DeclKind::Const,
            };
            let cp = self.checkpoint();
            self.advance();
            let name = self.expect_ident()?;
            if self.eat(&TokenKind::In) {
                let object = self.expression(true)?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.statement(false)?);
                return Ok(StmtKind::ForIn {
                    head: ForHead::Decl {
                        kind: decl_kind,
                        name,
                    },
                    object,
                    body,
                });
            }
            if self.check_ident("of") {
                self.advance();
                let object = self.assignment_expression(true)?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.statement(false)?);
                return Ok(StmtKind::ForOf {
                    head: ForHead::Decl {
                        kind: decl_kind,
                        name,
                    },
                    object,
                    body,
                });
            }
            // Regular for: rewind and parse the whole declaration.
            self.restore(cp);
            let pos = self.current.pos;
            let decl = self.variable_declaration()?;
            self.expect(TokenKind::Semicolon)?;
            let init = Some(Box::new(Stmt { kind: decl, pos }));
            return self.for_rest(init);
        }

        if self.eat(&TokenKind::Semicolon) {
            return self.for_rest(None);
        }

        let pos = self.current.pos;
        let expr = self.expression(false)?;
        if self.eat(&TokenKind::In) {
            let object = self.expression(true)?;
            self.expect(TokenKind::RParen)?;
            let body = Box::new(self.statement(false)?);
            return Ok(StmtKind::ForIn {
                head: ForHead::Expr(expr),
                object,
                body,
            });
        }
        if self.check_ident("of") {
            self.advance();
            let object = self.assignment_expression(true)?;
            self.expect(TokenKind::RParen)?;
            let body = Box::new(self.statement(false)?);
            return Ok(StmtKind::ForOf {
                head: ForHead::Expr(expr),
                object,
                body,
            });
        }
        self.expect(TokenKind::Semicolon)?;
        let init = Some(Box::new(Stmt {
            kind: StmtKind::Expr(expr),
            pos,
        }));
        self.for_rest(init)
    }

    fn for_rest(&mut self, init: Option<Box<Stmt>>) -> PResult<StmtKind> {
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression(true)?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.expression(true)?)
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.statement(false)?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.expect(TokenKind::LBrace)?;
        let block = self.statement_list(&TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace)?;

        let catch = if self.eat(&TokenKind::Catch) {
            let param = if self.eat(&TokenKind::LParen) {
                let name = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Some(name)
            } else {
                None
            };
            self.expect(TokenKind::LBrace)?;
            let body = self.statement_list(&TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace)?;
            Some((param, body))
        } else {
            None
        };

        let finally = if self.eat(&TokenKind::Finally) {
            self.expect(TokenKind::LBrace)?;
            let body = self.statement_list(&TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace)?;
            Some(body)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(self.error("try statement requires catch or finally".into()));
        }
        Ok(StmtKind::Try {
            block,
            catch,
            finally,
        })
    }

    fn switch_statement(&mut self) -> PResult<StmtKind> {
        self.advance();
        self.expect(TokenKind::LParen)?;
        let discriminant = self.expression(true)?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            let test = if self.eat(&TokenKind::Case) {
                let t = self.expression(true)?;
                self.expect(TokenKind::Colon)?;
                Some(t)
            } else if self.eat(&TokenKind::Default) {
                if seen_default {
                    return Err(self.error("multiple default clauses in switch".into()));
                }
                seen_default = true;
                self.expect(TokenKind::Colon)?;
                None
            } else {
                return Err(self.error("expected case or default".into()));
            };
            let mut body = Vec::new();
            while !self.check(&TokenKind::Case)
                && !self.check(&TokenKind::Default)
                && !self.check(&TokenKind::RBrace)
                && !self.check(&TokenKind::Eof)
            {
                body.push(self.statement(false)?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    fn import_declaration(&mut self) -> PResult<StmtKind> {
        self.advance();
        let mut specifiers = Vec::new();

        if let TokenKind::Str(source) = &self.current.kind {
            let source = source.clone();
            self.advance();
            self.expect_semicolon()?;
            return Ok(StmtKind::Import {
                specifiers,
                source,
            });
        }

        if let TokenKind::Ident(default_local) = &self.current.kind {
            specifiers.push(ImportSpec {
                imported: "default".into(),
                local: default_local.clone(),
            });
            self.advance();
            if !self.eat(&TokenKind::Comma) {
                return self.import_from(specifiers);
            }
        }

        self.expect(TokenKind::LBrace)?;
        while !self.check(&TokenKind::RBrace) {
            let imported = self.expect_ident()?;
            let local = if self.check_ident("as") {
                self.advance();
                self.expect_ident()?
            } else {
                imported.clone()
            };
            specifiers.push(ImportSpec { imported, local });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.import_from(specifiers)
    }

    fn import_from(&mut self, specifiers: Vec<ImportSpec>) -> PResult<StmtKind> {
        if !self.check_ident("from") {
            return Err(self.error("expected 'from' in import declaration".into()));
        }
        self.advance();
        let source = match &self.current.kind {
            TokenKind::Str(s) => s.clone(),
            other => return Err(self.error(format!("expected module specifier, found {}", other))),
        };
        self.advance();
        self.expect_semicolon()?;
        Ok(StmtKind::Import {
            specifiers,
            source,
        })
    }

    fn export_declaration(&mut self) -> PResult<StmtKind> {
        self.advance();
        if self.eat(&TokenKind::Default) {
            let expr = self.assignment_expression(true)?;
            self.expect_semicolon()?;
            return Ok(StmtKind::ExportDefault(expr));
        }
        if self.eat(&TokenKind::LBrace) {
            let mut specifiers = Vec::new();
            while !self.check(&TokenKind::RBrace) {
                let local = self.expect_ident()?;
                let exported = if self.check_ident("as") {
                    self.advance();
                    self.expect_ident()?
                } else {
                    local.clone()
                };
                specifiers.push((local, exported));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace)?;
            self.expect_semicolon()?;
            return Ok(StmtKind::ExportNamed {
                decl: None,
                specifiers,
            });
        }
        // export <declaration>
        let stmt = self.statement(false)?;
        match &stmt.kind {
            StmtKind::VarDecl { .. } | StmtKind::FunctionDecl(_) | StmtKind::ClassDecl(_) => {
                Ok(StmtKind::ExportNamed {
                    decl: Some(Box::new(stmt)),
                    specifiers: Vec::new(),
                })
            }
            _ => Err(self.error("expected declaration after export".into())),
        }
    }

    // Functions and classes

    /// Parse everything after the `function` keyword.
    fn function_rest(&mut self, is_expression: bool, require_name: bool) -> PResult<FunctionNode> {
        let pos = self.current.pos;
        let name = match &self.current.kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Some(s)
            }
            _ if require_name && !is_expression => {
                return Err(self.error("function declaration requires a name".into()))
            }
            _ => None,
        };
        let params = self.parameter_list()?;
        let body = self.function_body()?;
        Ok(FunctionNode {
            name,
            params,
            body,
            is_arrow: false,
            strict: self.strict,
            pos,
        })
    }

    fn parameter_list(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let rest = self.eat(&TokenKind::Ellipsis);
            let name = self.expect_ident()?;
            let default = if !rest && self.eat(&TokenKind::Assign) {
                Some(self.assignment_expression(true)?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                rest,
            });
            if rest {
                break;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn function_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        self.function_depth += 1;
        let saved_strict = self.strict;

        let mut body = Vec::new();
        let result = (|| -> PResult<Vec<Stmt>> {
            if self.scan_directive_prologue(&mut body)? {
                self.strict = true;
            }
            let rest = self.statement_list(&TokenKind::RBrace)?;
            body.extend(rest);
            Ok(body)
        })();

        self.strict = saved_strict;
        self.function_depth -= 1;
        let body = result?;
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn class_rest(&mut self, require_name: bool) -> PResult<ClassNode> {
        let pos = self.current.pos;
        let name = match &self.current.kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Some(s)
            }
            _ if require_name => {
                return Err(self.error("class declaration requires a name".into()))
            }
            _ => None,
        };
        let parent = if self.eat(&TokenKind::Extends) {
            Some(self.unary_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;

        // Class bodies are always strict.
        let saved_strict = std::mem::replace(&mut self.strict, true);
        let mut constructor = None;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            let is_static = if self.check_ident("static") {
                self.advance();
                true
            } else {
                false
            };
            let mut kind = MethodKind::Normal;
            if (self.check_ident("get") || self.check_ident("set")) && !self.peek_is_lparen() {
                kind = if self.check_ident("get") {
                    MethodKind::Getter
                } else {
                    MethodKind::Setter
                };
                self.advance();
            }
            let key = self.property_name()?;
            let func_pos = self.current.pos;
            self.function_depth += 1;
            let params = self.parameter_list()?;
            let body = self.function_body_inner()?;
            self.function_depth -= 1;
            let func = Rc::new(FunctionNode {
                name: match &key {
                    PropName::Ident(s) | PropName::Str(s) => Some(s.clone()),
                    _ => None,
                },
                params,
                body,
                is_arrow: false,
                strict: true,
                pos: func_pos,
            });
            let is_ctor =
                !is_static && kind == MethodKind::Normal && matches!(&key, PropName::Ident(s) if s == "constructor");
            if is_ctor {
                if constructor.is_some() {
                    self.strict = saved_strict;
                    return Err(self.error("duplicate constructor in class".into()));
                }
                constructor = Some(func);
            } else {
                methods.push(ClassMethod {
                    key,
                    func,
                    is_static,
                    kind,
                });
            }
        }
        self.strict = saved_strict;
        self.expect(TokenKind::RBrace)?;
        Ok(ClassNode {
            name,
            parent,
            constructor,
            methods,
            pos,
        })
    }

    /// `{ stmts }` without the depth bookkeeping (caller handles it).
    fn function_body_inner(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let body = self.statement_list(&TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn peek_is_lparen(&self) -> bool {
        let mut lexer = self.lexer.clone();
        lexer.next_token().kind == TokenKind::LParen
    }

    fn property_name(&mut self) -> PResult<PropName> {
        match &self.current.kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(PropName::Ident(s))
            }
            TokenKind::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(PropName::Str(s))
            }
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Ok(PropName::Num(n))
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.assignment_expression(true)?;
                self.expect(TokenKind::RBracket)?;
                Ok(PropName::Computed(Box::new(expr)))
            }
            // Keywords are valid property names.
            other => {
                let text = keyword_text(other);
                match text {
                    Some(t) => {
                        self.advance();
                        Ok(PropName::Ident(t.to_string()))
                    }
                    None => Err(self.error(format!("expected property name, found {}", other))),
                }
            }
        }
    }

    // Expressions

    pub fn expression(&mut self, allow_in: bool) -> PResult<Expr> {
        let first = self.assignment_expression(allow_in)?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let pos = first.pos;
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.assignment_expression(allow_in)?);
        }
        Ok(Expr {
            kind: ExprKind::Sequence(exprs),
            pos,
        })
    }

    /// Continue parsing an expression whose first primary has already
    /// been consumed (used by the directive-prologue scanner).
    fn continue_expression(&mut self, first: Expr) -> PResult<Expr> {
        let first = self.call_tail(first)?;
        let first = self.binary_rest(first, 0, true)?;
        let first = self.conditional_rest(first, true)?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let pos = first.pos;
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.assignment_expression(true)?);
        }
        Ok(Expr {
            kind: ExprKind::Sequence(exprs),
            pos,
        })
    }

    fn assignment_expression(&mut self, allow_in: bool) -> PResult<Expr> {
        // Arrow function lookahead: `ident =>` or `( params ) =>`.
        if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            let pos = self.current.pos;
            let cp = self.checkpoint();
            self.advance();
            if self.check(&TokenKind::Arrow) && !self.current.newline_before {
                self.advance();
                return self.arrow_body(
                    vec![Param {
                        name,
                        default: None,
                        rest: false,
                    }],
                    pos,
                );
            }
            self.restore(cp);
        }
        if self.check(&TokenKind::LParen) {
            let cp = self.checkpoint();
            if let Some(expr) = self.try_arrow_function()? {
                return Ok(expr);
            }
            self.restore(cp);
        }

        let left = self.conditional_expression(allow_in)?;
        if self.current.kind.is_assignment_op() {
            if !is_assignment_target(&left) {
                return Err(self.error("invalid assignment target".into()));
            }
            if self.strict {
                if let ExprKind::Ident(name) = &left.kind {
                    if name == "eval" || name == "arguments" {
                        return Err(
                            self.error(format!("cannot assign to '{}' in strict mode", name))
                        );
                    }
                }
            }
            let op = assign_op_to_binary(&self.current.kind);
            let pos = left.pos;
            self.advance();
            let value = self.assignment_expression(allow_in)?;
            return Ok(Expr {
                kind: ExprKind::Assign {
                    op,
                    target: Box::new(left),
                    value: Box::new(value),
                },
                pos,
            });
        }
        Ok(left)
    }

    fn try_arrow_function(&mut self) -> PResult<Option<Expr>> {
        let pos = self.current.pos;
        let params = match self.parameter_list() {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };
        if !self.check(&TokenKind::Arrow) || self.current.newline_before {
            return Ok(None);
        }
        self.advance();
        Ok(Some(self.arrow_body(params, pos)?))
    }

    fn arrow_body(&mut self, params: Vec<Param>, pos: u32) -> PResult<Expr> {
        let body = if self.check(&TokenKind::LBrace) {
            self.function_depth += 1;
            let body = self.function_body();
            self.function_depth -= 1;
            body?
        } else {
            let expr_pos = self.current.pos;
            let expr = self.assignment_expression(true)?;
            vec![Stmt {
                kind: StmtKind::Return(Some(expr)),
                pos: expr_pos,
            }]
        };
        Ok(Expr {
            kind: ExprKind::Function(Rc::new(FunctionNode {
                name: None,
                params,
                body,
                is_arrow: true,
                strict: self.strict,
                pos,
            })),
            pos,
        })
    }

    fn conditional_expression(&mut self, allow_in: bool) -> PResult<Expr> {
        let cond = self.binary_expression(0, allow_in)?;
        self.conditional_rest(cond, allow_in)
    }

    fn conditional_rest(&mut self, cond: Expr, allow_in: bool) -> PResult<Expr> {
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let pos = cond.pos;
        let cons = self.assignment_expression(true)?;
        self.expect(TokenKind::Colon)?;
        let alt = self.assignment_expression(allow_in)?;
        Ok(Expr {
            kind: ExprKind::Conditional {
                cond: Box::new(cond),
                cons: Box::new(cons),
                alt: Box::new(alt),
            },
            pos,
        })
    }

    fn binary_expression(&mut self, min_prec: u8, allow_in: bool) -> PResult<Expr> {
        let left = self.unary_expression()?;
        self.binary_rest(left, min_prec, allow_in)
    }

    fn binary_rest(&mut self, mut left: Expr, min_prec: u8, allow_in: bool) -> PResult<Expr> {
        loop {
            let Some((op, prec, right_assoc)) = binary_op_info(&self.current.kind, allow_in) else {
                // Logical operators share the climb with a lower band.
                match self.current.kind {
                    TokenKind::AmpAmp if min_prec <= 2 => {
                        self.advance();
                        let right = self.binary_expression(3, allow_in)?;
                        let pos = left.pos;
                        left = Expr {
                            kind: ExprKind::Logical {
                                op: LogicalOp::And,
                                left: Box::new(left),
                                right: Box::new(right),
                            },
                            pos,
                        };
                        continue;
                    }
                    TokenKind::PipePipe if min_prec <= 1 => {
                        self.advance();
                        let right = self.binary_expression(2, allow_in)?;
                        let pos = left.pos;
                        left = Expr {
                            kind: ExprKind::Logical {
                                op: LogicalOp::Or,
                                left: Box::new(left),
                                right: Box::new(right),
                            },
                            pos,
                        };
                        continue;
                    }
                    _ => return Ok(left),
                }
            };
            if prec < min_prec {
                return Ok(left);
            }
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.binary_expression(next_min, allow_in)?;
            let pos = left.pos;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
    }

    fn unary_expression(&mut self) -> PResult<Expr> {
        let pos = self.current.pos;
        let op = match self.current.kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary_expression()?;
            if op == UnaryOp::Delete && self.strict {
                if let ExprKind::Ident(_) = expr.kind {
                    return Err(
                        self.error("cannot delete a variable reference in strict mode".into())
                    );
                }
            }
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                pos,
            });
        }
        if matches!(self.current.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let increment = self.current.kind == TokenKind::PlusPlus;
            self.advance();
            let target = self.unary_expression()?;
            if !is_assignment_target(&target) {
                return Err(self.error("invalid increment/decrement target".into()));
            }
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                },
                pos,
            });
        }
        self.postfix_expression()
    }

    fn postfix_expression(&mut self) -> PResult<Expr> {
        let expr = self.call_expression()?;
        if !self.current.newline_before
            && matches!(self.current.kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
        {
            let increment = self.current.kind == TokenKind::PlusPlus;
            if !is_assignment_target(&expr) {
                return Err(self.error("invalid increment/decrement target".into()));
            }
            let pos = expr.pos;
            self.advance();
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment,
                    prefix: false,
                    target: Box::new(expr),
                },
                pos,
            });
        }
        Ok(expr)
    }

    fn call_expression(&mut self) -> PResult<Expr> {
        let callee = if self.check(&TokenKind::New) {
            self.new_expression()?
        } else {
            self.primary_expression()?
        };
        self.call_tail(callee)
    }

    fn call_tail(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let pos = expr.pos;
                    let name = match &self.current.kind {
                        TokenKind::Ident(s) => s.clone(),
                        other => match keyword_text(other) {
                            Some(t) => t.to_string(),
                            None => {
                                return Err(
                                    self.error(format!("expected property name, found {}", other))
                                )
                            }
                        },
                    };
                    self.advance();
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Ident(name),
                        },
                        pos,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let pos = expr.pos;
                    let index = self.expression(true)?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Computed(Box::new(index)),
                        },
                        pos,
                    };
                }
                TokenKind::LParen => {
                    let pos = expr.pos;
                    let args = self.argument_list()?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        pos,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn new_expression(&mut self) -> PResult<Expr> {
        let pos = self.current.pos;
        self.advance();
        // Member-only chain as the constructor expression.
        let mut callee = if self.check(&TokenKind::New) {
            self.new_expression()?
        } else {
            self.primary_expression()?
        };
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let p = callee.pos;
                    callee = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberProp::Ident(name),
                        },
                        pos: p,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression(true)?;
                    self.expect(TokenKind::RBracket)?;
                    let p = callee.pos;
                    callee = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberProp::Computed(Box::new(index)),
                        },
                        pos: p,
                    };
                }
                _ => break,
            }
        }
        let args = if self.check(&TokenKind::LParen) {
            self.argument_list()?
        } else {
            Vec::new()
        };
        Ok(Expr {
            kind: ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            pos,
        })
    }

    fn argument_list(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.assignment_expression(true)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn primary_expression(&mut self) -> PResult<Expr> {
        let pos = self.current.pos;
        let kind = match &self.current.kind {
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                let s = s.clone();
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                if name == "undefined" {
                    ExprKind::Undefined
                } else {
                    ExprKind::Ident(name)
                }
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::This => {
                self.advance();
                ExprKind::This
            }
            TokenKind::Super => {
                self.advance();
                let args = self.argument_list()?;
                ExprKind::SuperCall(args)
            }
            TokenKind::Function => {
                self.advance();
                let func = self.function_rest(true, false)?;
                ExprKind::Function(Rc::new(func))
            }
            TokenKind::Class => {
                self.advance();
                let class = self.class_rest(false)?;
                ExprKind::Class(Rc::new(class))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression(true)?;
                self.expect(TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    if self.check(&TokenKind::Comma) {
                        self.advance();
                        elements.push(None);
                        continue;
                    }
                    elements.push(Some(self.assignment_expression(true)?));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                ExprKind::Array(elements)
            }
            TokenKind::LBrace => {
                self.advance();
                let props = self.object_literal_body()?;
                ExprKind::Object(props)
            }
            TokenKind::Error(msg) => return Err(self.error(msg.clone())),
            other => {
                return Err(self.error(format!("unexpected token {}", other)));
            }
        };
        Ok(Expr { kind, pos })
    }

    fn object_literal_body(&mut self) -> PResult<Vec<ObjectProp>> {
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            // Accessor forms: get/set followed by a property name.
            if (self.check_ident("get") || self.check_ident("set")) && !self.accessor_ends_here() {
                let is_getter = self.check_ident("get");
                self.advance();
                let name = self.property_name()?;
                let func_pos = self.current.pos;
                self.function_depth += 1;
                let params = self.parameter_list()?;
                let body = self.function_body_inner()?;
                self.function_depth -= 1;
                let func = Rc::new(FunctionNode {
                    name: None,
                    params,
                    body,
                    is_arrow: false,
                    strict: self.strict,
                    pos: func_pos,
                });
                props.push(if is_getter {
                    ObjectProp::Getter { name, func }
                } else {
                    ObjectProp::Setter { name, func }
                });
            } else {
                let name = self.property_name()?;
                if self.check(&TokenKind::LParen) {
                    // Method shorthand.
                    let func_pos = self.current.pos;
                    self.function_depth += 1;
                    let params = self.parameter_list()?;
                    let body = self.function_body_inner()?;
                    self.function_depth -= 1;
                    let value = Expr {
                        kind: ExprKind::Function(Rc::new(FunctionNode {
                            name: match &name {
                                PropName::Ident(s) | PropName::Str(s) => Some(s.clone()),
                                _ => None,
                            },
                            params,
                            body,
                            is_arrow: false,
                            strict: self.strict,
                            pos: func_pos,
                        })),
                        pos: func_pos,
                    };
                    props.push(ObjectProp::Init { name, value });
                } else if self.eat(&TokenKind::Colon) {
                    let value = self.assignment_expression(true)?;
                    props.push(ObjectProp::Init { name, value });
                } else {
                    // Shorthand `{ a }`.
                    let pos = self.current.pos;
                    match &name {
                        PropName::Ident(s) => {
                            let value = Expr {
                                kind: ExprKind::Ident(s.clone()),
                                pos,
                            };
                            props.push(ObjectProp::Init { name, value });
                        }
                        _ => return Err(self.error("expected : after property name".into())),
                    }
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(props)
    }

    /// `{ get }` and `{ get: v }` use `get` as a plain name.
    fn accessor_ends_here(&self) -> bool {
        let mut lexer = self.lexer.clone();
        matches!(
            lexer.next_token().kind,
            TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::LParen
        )
    }
}

fn is_assignment_target(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. })
}

fn assign_op_to_binary(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Assign => None,
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::StarAssign => Some(BinaryOp::Mul),
        TokenKind::SlashAssign => Some(BinaryOp::Div),
        TokenKind::PercentAssign => Some(BinaryOp::Mod),
        TokenKind::StarStarAssign => Some(BinaryOp::Pow),
        TokenKind::AmpAssign => Some(BinaryOp::BitAnd),
        TokenKind::PipeAssign => Some(BinaryOp::BitOr),
        TokenKind::CaretAssign => Some(BinaryOp::BitXor),
        TokenKind::ShlAssign => Some(BinaryOp::Shl),
        TokenKind::SarAssign => Some(BinaryOp::Sar),
        TokenKind::ShrAssign => Some(BinaryOp::Shr),
        _ => None,
    }
}

/// Operator, precedence, right-associativity. Bands 1 and 2 are the
/// logical operators, handled separately in `binary_rest`.
fn binary_op_info(kind: &TokenKind, allow_in: bool) -> Option<(BinaryOp, u8, bool)> {
    let info = match kind {
        TokenKind::Pipe => (BinaryOp::BitOr, 3, false),
        TokenKind::Caret => (BinaryOp::BitXor, 4, false),
        TokenKind::Amp => (BinaryOp::BitAnd, 5, false),
        TokenKind::Eq => (BinaryOp::Eq, 6, false),
        TokenKind::NotEq => (BinaryOp::NotEq, 6, false),
        TokenKind::StrictEq => (BinaryOp::StrictEq, 6, false),
        TokenKind::StrictNotEq => (BinaryOp::StrictNotEq, 6, false),
        TokenKind::Lt => (BinaryOp::Lt, 7, false),
        TokenKind::Gt => (BinaryOp::Gt, 7, false),
        TokenKind::LtEq => (BinaryOp::LtEq, 7, false),
        TokenKind::GtEq => (BinaryOp::GtEq, 7, false),
        TokenKind::Instanceof => (BinaryOp::Instanceof, 7, false),
        TokenKind::In if allow_in => (BinaryOp::In, 7, false),
        TokenKind::Shl => (BinaryOp::Shl, 8, false),
        TokenKind::Sar => (BinaryOp::Sar, 8, false),
        TokenKind::Shr => (BinaryOp::Shr, 8, false),
        TokenKind::Plus => (BinaryOp::Add, 9, false),
        TokenKind::Minus => (BinaryOp::Sub, 9, false),
        TokenKind::Star => (BinaryOp::Mul, 10, false),
        TokenKind::Slash => (BinaryOp::Div, 10, false),
        TokenKind::Percent => (BinaryOp::Mod, 10, false),
        TokenKind::StarStar => (BinaryOp::Pow, 11, true),
        _ => return None,
    };
    Some(info)
}

/// Keywords usable as property names after `.` and in literals.
fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::Default => "default",
        TokenKind::Delete => "delete",
        TokenKind::New => "new",
        TokenKind::Typeof => "typeof",
        TokenKind::Void => "void",
        TokenKind::In => "in",
        TokenKind::Instanceof => "instanceof",
        TokenKind::This => "this",
        TokenKind::Null => "null",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Return => "return",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::For => "for",
        TokenKind::While => "while",
        TokenKind::Do => "do",
        TokenKind::Break => "break",
        TokenKind::Continue => "continue",
        TokenKind::Throw => "throw",
        TokenKind::Try => "try",
        TokenKind::Catch => "catch",
        TokenKind::Finally => "finally",
        TokenKind::Switch => "switch",
        TokenKind::Case => "case",
        TokenKind::With => "with",
        TokenKind::Class => "class",
        TokenKind::Extends => "extends",
        TokenKind::Super => "super",
        TokenKind::Import => "import",
        TokenKind::Export => "export",
        TokenKind::Var => "var",
        TokenKind::Let => "let",
        TokenKind::Const => "const",
        TokenKind::Function => "function",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new(src, false).parse_program().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        Parser::new(src, false).parse_program().unwrap_err()
    }

    #[test]
    fn precedence() {
        let prog = parse("x = 2 + 3 * 4;");
        let StmtKind::Expr(expr) = &prog.body[0].kind else {
            panic!()
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!()
        };
        let ExprKind::Binary { op, right, .. } = &value.kind else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn exponent_is_right_associative() {
        let prog = parse("x = 2 ** 3 ** 2;");
        let StmtKind::Expr(expr) = &prog.body[0].kind else {
            panic!()
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!()
        };
        let ExprKind::Binary { op, right, .. } = &value.kind else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Pow);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn arrow_functions() {
        let prog = parse("var f = x => x + 1; var g = (a, b) => { return a; };");
        let StmtKind::VarDecl { decls, .. } = &prog.body[0].kind else {
            panic!()
        };
        let ExprKind::Function(f) = &decls[0].1.as_ref().unwrap().kind else {
            panic!()
        };
        assert!(f.is_arrow);
        assert_eq!(f.params.len(), 1);
    }

    #[test]
    fn parenthesized_is_not_arrow() {
        let prog = parse("var x = (1 + 2);");
        let StmtKind::VarDecl { decls, .. } = &prog.body[0].kind else {
            panic!()
        };
        assert!(matches!(
            decls[0].1.as_ref().unwrap().kind,
            ExprKind::Binary { .. }
        ));
    }

    #[test]
    fn for_in_and_of() {
        let prog = parse("for (var k in o) {} for (const v of a) {}");
        assert!(matches!(prog.body[0].kind, StmtKind::ForIn { .. }));
        assert!(matches!(prog.body[1].kind, StmtKind::ForOf { .. }));
    }

    #[test]
    fn asi_on_newline() {
        let prog = parse("var a = 1\nvar b = 2");
        assert_eq!(prog.body.len(), 2);
    }

    #[test]
    fn return_restricted_production() {
        let prog = Parser::new("function f() { return\n1; }", false)
            .parse_program()
            .unwrap();
        let StmtKind::FunctionDecl(f) = &prog.body[0].kind else {
            panic!()
        };
        assert!(matches!(f.body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn strict_mode_rejects_with() {
        let err = parse_err("'use strict'; with (o) {}");
        assert!(err.message.contains("strict"));
    }

    #[test]
    fn const_requires_initializer() {
        let err = parse_err("const x;");
        assert!(err.message.contains("initializer"));
    }

    #[test]
    fn object_literal_forms() {
        let prog = parse("var o = { a: 1, b, c() { return 1; }, get d() { return 2; } };");
        let StmtKind::VarDecl { decls, .. } = &prog.body[0].kind else {
            panic!()
        };
        let ExprKind::Object(props) = &decls[0].1.as_ref().unwrap().kind else {
            panic!()
        };
        assert_eq!(props.len(), 4);
        assert!(matches!(props[3], ObjectProp::Getter { .. }));
    }

    #[test]
    fn class_with_members() {
        let prog = parse("class A extends B { constructor(x) { super(x); } m() {} static s() {} }");
        let StmtKind::ClassDecl(class) = &prog.body[0].kind else {
            panic!()
        };
        assert!(class.constructor.is_some());
        assert_eq!(class.methods.len(), 2);
        assert!(class.methods[1].is_static);
    }

    #[test]
    fn module_items() {
        let prog = Parser::new(
            "import d, { a as b } from 'dep'; export const x = 1; export { x as y };",
            true,
        )
        .parse_program()
        .unwrap();
        assert!(matches!(prog.body[0].kind, StmtKind::Import { .. }));
        assert!(matches!(prog.body[1].kind, StmtKind::ExportNamed { .. }));
    }

    #[test]
    fn elisions_in_array_literals() {
        let prog = parse("var a = [1,,3];");
        let StmtKind::VarDecl { decls, .. } = &prog.body[0].kind else {
            panic!()
        };
        let ExprKind::Array(elements) = &decls[0].1.as_ref().unwrap().kind else {
            panic!()
        };
        assert_eq!(elements.len(), 3);
        assert!(elements[1].is_none());
    }
}

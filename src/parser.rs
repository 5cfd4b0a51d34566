//! Recursive-descent parser for the host language.
//!
//! One parser serves both grammars: `parse_file` accepts the normal
//! "package clause + imports + declarations" shape, and `parse_cell` is the
//! relaxed entry point that accepts a cell body — a sequence of statements
//! in which declarations (including `func` and `import`) appear as
//! statements, labels resolve against a top-level label scope, and the
//! final statement may be a bare expression.

use crate::ast::*;
use crate::error::{ErrorList, GobletError};
use crate::scanner::{Comment, Scanned, Scanner};
use crate::token::{Span, Token};

pub struct Parser {
    toks: Vec<Scanned>,
    i: usize,
    errors: ErrorList,
    comments: Vec<Comment>,
    /// False while parsing a control-flow header, where `T{` would be
    /// ambiguous with the statement's block.
    allow_composite: bool,
}

/// Parse a cell in the relaxed grammar.
pub fn parse_cell(src: &str) -> Result<Block, ErrorList> {
    let (block, errs) = parse_cell_lenient(src);
    if errs.is_empty() {
        Ok(block)
    } else {
        Err(errs)
    }
}

/// Parse a cell, returning whatever could be recovered alongside the
/// errors. Completion and inspection run on in-progress input and need the
/// partial tree.
pub fn parse_cell_lenient(src: &str) -> (Block, ErrorList) {
    let mut p = Parser::new(src);
    let stmts = p.parse_cell_body();
    let mut errs = std::mem::take(&mut p.errors);
    errs.sort();
    let block = Block {
        id: next_id(),
        stmts,
        comments: std::mem::take(&mut p.comments),
    };
    (block, errs)
}

/// Parse a normal-grammar compilation unit.
pub fn parse_file(src: &str) -> Result<File, ErrorList> {
    let mut p = Parser::new(src);
    let file = p.parse_file_body();
    p.finish().map(|comments| File {
        id: next_id(),
        package_name: file.0,
        decls: file.1,
        comments,
    })
}

/// Parse a single expression (used to re-parse rendered type strings).
pub fn parse_expr_str(src: &str) -> Result<Expr, GobletError> {
    let mut p = Parser::new(src);
    let expr = p.parse_expr();
    if !p.errors.is_empty() {
        let mut errs = p.errors;
        errs.sort();
        return Err(errs.into_result().unwrap_err());
    }
    if p.tok() != Token::Eof && p.tok() != Token::Semicolon {
        return Err(GobletError::Parse {
            message: format!("unexpected {} after expression", p.tok()),
            offset: p.pos(),
        });
    }
    Ok(expr)
}

impl Parser {
    fn new(src: &str) -> Parser {
        let (toks, comments, errors) = Scanner::new(src).scan_all();
        Parser {
            toks,
            i: 0,
            errors,
            comments,
            allow_composite: true,
        }
    }

    fn finish(mut self) -> Result<Vec<Comment>, ErrorList> {
        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.comments))
        } else {
            self.errors.sort();
            Err(self.errors)
        }
    }

    // ── Token plumbing ───────────────────────────────────────────────────

    fn tok(&self) -> Token {
        self.toks[self.i.min(self.toks.len() - 1)].1
    }

    fn lit(&self) -> &str {
        &self.toks[self.i.min(self.toks.len() - 1)].2
    }

    fn pos(&self) -> usize {
        self.toks[self.i.min(self.toks.len() - 1)].0
    }

    /// End offset of the previous token (approximated by the next token's
    /// start for operators, exact for literal-bearing tokens).
    fn prev_end(&self) -> usize {
        if self.i == 0 {
            return 0;
        }
        let (pos, tok, lit) = &self.toks[self.i - 1];
        if !lit.is_empty() {
            pos + lit.len()
        } else {
            pos + tok.text().len()
        }
    }

    fn advance(&mut self) {
        if self.i < self.toks.len() - 1 {
            self.i += 1;
        }
    }

    fn at(&self, tok: Token) -> bool {
        self.tok() == tok
    }

    fn eat(&mut self, tok: Token) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_at(&mut self, offset: usize, msg: impl Into<String>) {
        self.errors.push(GobletError::Parse {
            message: msg.into(),
            offset,
        });
    }

    fn expect(&mut self, tok: Token) -> usize {
        let pos = self.pos();
        if self.at(tok) {
            self.advance();
        } else {
            let msg = format!("expected {:?}, found {:?}", tok.text(), self.describe());
            self.error_at(pos, msg);
            // Keep going; error recovery is positional.
        }
        pos
    }

    fn describe(&self) -> String {
        let t = self.tok();
        if t.is_literal() {
            format!("{} {}", t.text(), self.lit())
        } else {
            t.text().to_string()
        }
    }

    /// Consume a statement terminator. A closing `)` or `}` also ends a
    /// statement, matching the host grammar's semicolon elision.
    fn expect_semi(&mut self) {
        match self.tok() {
            Token::Semicolon => {
                self.advance();
            }
            Token::Rparen | Token::Rbrace | Token::Eof => {}
            _ => {
                let pos = self.pos();
                let msg = format!("expected \";\", found {:?}", self.describe());
                self.error_at(pos, msg);
                self.sync_stmt();
            }
        }
    }

    /// Skip tokens until a plausible statement boundary.
    fn sync_stmt(&mut self) {
        loop {
            match self.tok() {
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                Token::Eof | Token::Rbrace => return,
                _ => self.advance(),
            }
        }
    }

    fn parse_ident(&mut self) -> Ident {
        let pos = self.pos();
        if self.at(Token::Ident) {
            let name = self.lit().to_string();
            let end = pos + name.len();
            self.advance();
            Ident::with_span(name, (pos, end))
        } else {
            let msg = format!("expected identifier, found {:?}", self.describe());
            self.error_at(pos, msg);
            self.advance();
            Ident::with_span("_", (pos, pos))
        }
    }

    // ── Entry points ─────────────────────────────────────────────────────

    fn parse_cell_body(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !self.at(Token::Eof) {
            if self.eat(Token::Semicolon) {
                continue;
            }
            stmts.push(self.parse_stmt(true));
        }
        stmts
    }

    fn parse_file_body(&mut self) -> (Ident, Vec<Decl>) {
        self.expect(Token::Package);
        let name = self.parse_ident();
        self.expect_semi();
        let mut decls = Vec::new();
        while !self.at(Token::Eof) {
            if self.eat(Token::Semicolon) {
                continue;
            }
            decls.push(self.parse_decl());
        }
        (name, decls)
    }

    // ── Declarations ─────────────────────────────────────────────────────

    fn parse_decl(&mut self) -> Decl {
        let start = self.pos();
        let mut decl = match self.tok() {
            Token::Import | Token::Const | Token::Var | Token::Type => self.parse_gen_decl(),
            Token::Func => self.parse_func_decl(),
            _ => {
                let msg = format!("expected declaration, found {:?}", self.describe());
                self.error_at(start, msg);
                self.sync_stmt();
                Decl::gen(Token::Var, Vec::new(), false)
            }
        };
        decl.span = (start, self.prev_end());
        decl
    }

    fn parse_gen_decl(&mut self) -> Decl {
        let tok = self.tok();
        self.advance();
        let mut specs = Vec::new();
        let mut paren = false;
        if self.eat(Token::Lparen) {
            paren = true;
            while !self.at(Token::Rparen) && !self.at(Token::Eof) {
                if self.eat(Token::Semicolon) {
                    continue;
                }
                specs.push(self.parse_spec(tok));
                if !self.at(Token::Rparen) {
                    self.expect_semi();
                }
            }
            self.expect(Token::Rparen);
        } else {
            specs.push(self.parse_spec(tok));
        }
        Decl::gen(tok, specs, paren)
    }

    fn parse_spec(&mut self, tok: Token) -> Spec {
        match tok {
            Token::Import => {
                let start = self.pos();
                let name = match self.tok() {
                    Token::Ident => Some(self.parse_ident()),
                    Token::Period => {
                        // Dot imports keep the period as a name.
                        self.advance();
                        Some(Ident::with_span(".", (start, start + 1)))
                    }
                    _ => None,
                };
                let path_lit = if self.at(Token::Str) {
                    let lit = self.lit().to_string();
                    self.advance();
                    lit
                } else {
                    let msg = format!("expected import path, found {:?}", self.describe());
                    self.error_at(self.pos(), msg);
                    String::new()
                };
                let mut spec = ImportSpec::new(None, &unquote(&path_lit));
                spec.name = name;
                spec.span = (start, self.prev_end());
                Spec::Import(spec)
            }
            Token::Type => {
                let start = self.pos();
                let name = self.parse_ident();
                let alias = self.eat(Token::Assign);
                let typ = self.parse_type();
                Spec::Type(TypeSpec {
                    id: next_id(),
                    span: (start, self.prev_end()),
                    name,
                    alias,
                    typ,
                })
            }
            // const or var
            _ => {
                let start = self.pos();
                let mut names = vec![self.parse_ident()];
                while self.eat(Token::Comma) {
                    names.push(self.parse_ident());
                }
                let mut typ = None;
                let mut values = Vec::new();
                if !self.at(Token::Assign) && !self.at(Token::Semicolon) && !self.at(Token::Rparen)
                    && !self.at(Token::Eof)
                {
                    typ = Some(self.parse_type());
                }
                if self.eat(Token::Assign) {
                    values = self.parse_expr_list();
                }
                Spec::Value(ValueSpec {
                    id: next_id(),
                    span: (start, self.prev_end()),
                    names,
                    typ,
                    values,
                })
            }
        }
    }

    fn parse_func_decl(&mut self) -> Decl {
        self.expect(Token::Func);
        let mut recv = None;
        if self.at(Token::Lparen) {
            recv = Some(self.parse_receiver());
        }
        let name = self.parse_ident();
        let typ = self.parse_signature();
        let body = if self.at(Token::Lbrace) {
            Some(self.parse_block())
        } else {
            // Bodyless signature: a forward declaration.
            None
        };
        Decl::new(DeclKind::Func(FuncDecl {
            recv,
            name,
            typ,
            body,
        }))
    }

    fn parse_receiver(&mut self) -> Field {
        self.expect(Token::Lparen);
        let start = self.pos();
        let mut names = Vec::new();
        // `(name Type)` or `(Type)`.
        if self.at(Token::Ident) && self.peek_starts_type(1) {
            names.push(self.parse_ident());
        }
        let typ = self.parse_type();
        self.expect(Token::Rparen);
        let mut field = Field::new(names, typ);
        field.span = (start, self.prev_end());
        field
    }

    /// Whether the token at `self.i + ahead` can begin a type.
    fn peek_starts_type(&self, ahead: usize) -> bool {
        let idx = (self.i + ahead).min(self.toks.len() - 1);
        matches!(
            self.toks[idx].1,
            Token::Ident
                | Token::Mul
                | Token::Lbrack
                | Token::Map
                | Token::Chan
                | Token::Func
                | Token::Struct
                | Token::Interface
                | Token::Lparen
                | Token::Arrow
                | Token::Ellipsis
        )
    }

    // ── Types ────────────────────────────────────────────────────────────

    fn parse_type(&mut self) -> Expr {
        let start = self.pos();
        let kind = match self.tok() {
            Token::Ident => {
                let name = self.parse_ident();
                if self.eat(Token::Period) {
                    let sel = self.parse_ident();
                    ExprKind::Selector {
                        x: Box::new(Expr::from_ident(name)),
                        sel,
                    }
                } else {
                    ExprKind::Ident(name)
                }
            }
            Token::Mul => {
                self.advance();
                ExprKind::Star(Box::new(self.parse_type()))
            }
            Token::Lbrack => {
                self.advance();
                let len = if self.at(Token::Rbrack) {
                    None
                } else if self.eat(Token::Ellipsis) {
                    Some(Box::new(Expr::new(ExprKind::Ellipsis { elt: None })))
                } else {
                    let saved = std::mem::replace(&mut self.allow_composite, true);
                    let len = self.parse_expr();
                    self.allow_composite = saved;
                    Some(Box::new(len))
                };
                self.expect(Token::Rbrack);
                ExprKind::ArrayType {
                    len,
                    elt: Box::new(self.parse_type()),
                }
            }
            Token::Map => {
                self.advance();
                self.expect(Token::Lbrack);
                let key = self.parse_type();
                self.expect(Token::Rbrack);
                ExprKind::MapType {
                    key: Box::new(key),
                    value: Box::new(self.parse_type()),
                }
            }
            Token::Chan => {
                self.advance();
                let dir = if self.eat(Token::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                ExprKind::ChanType {
                    dir,
                    value: Box::new(self.parse_type()),
                }
            }
            Token::Arrow => {
                self.advance();
                self.expect(Token::Chan);
                ExprKind::ChanType {
                    dir: ChanDir::Recv,
                    value: Box::new(self.parse_type()),
                }
            }
            Token::Func => {
                self.advance();
                ExprKind::FuncType(self.parse_signature())
            }
            Token::Struct => {
                self.advance();
                ExprKind::StructType {
                    fields: self.parse_field_list(),
                }
            }
            Token::Interface => {
                self.advance();
                ExprKind::InterfaceType {
                    methods: self.parse_interface_body(),
                }
            }
            Token::Lparen => {
                self.advance();
                let t = self.parse_type();
                self.expect(Token::Rparen);
                ExprKind::Paren(Box::new(t))
            }
            _ => {
                let msg = format!("expected type, found {:?}", self.describe());
                self.error_at(start, msg);
                self.advance();
                ExprKind::Bad
            }
        };
        Expr::with_span(kind, (start, self.prev_end()))
    }

    fn parse_field_list(&mut self) -> Vec<Field> {
        self.expect(Token::Lbrace);
        let mut fields = Vec::new();
        while !self.at(Token::Rbrace) && !self.at(Token::Eof) {
            if self.eat(Token::Semicolon) {
                continue;
            }
            fields.push(self.parse_struct_field());
            if !self.at(Token::Rbrace) {
                self.expect_semi();
            }
        }
        self.expect(Token::Rbrace);
        fields
    }

    fn parse_struct_field(&mut self) -> Field {
        let start = self.pos();
        // Embedded field: `Type` or `*Type` with no names.
        let embedded = match self.tok() {
            Token::Mul => true,
            Token::Ident => !matches!(
                self.toks[(self.i + 1).min(self.toks.len() - 1)].1,
                Token::Ident | Token::Comma
            ) && !self.peek_composite_name(),
            _ => false,
        };
        let mut field = if embedded {
            let typ = self.parse_type();
            Field::new(Vec::new(), typ)
        } else {
            let mut names = vec![self.parse_ident()];
            while self.eat(Token::Comma) {
                names.push(self.parse_ident());
            }
            let typ = self.parse_type();
            Field::new(names, typ)
        };
        if self.at(Token::Str) {
            field.tag = Some(unquote(self.lit()));
            self.advance();
        }
        field.span = (start, self.prev_end());
        field
    }

    /// After an ident in a struct body: does a type follow (named field) as
    /// opposed to `;`/`}`/tag (embedded field)?
    fn peek_composite_name(&self) -> bool {
        matches!(
            self.toks[(self.i + 1).min(self.toks.len() - 1)].1,
            Token::Mul
                | Token::Lbrack
                | Token::Map
                | Token::Chan
                | Token::Func
                | Token::Struct
                | Token::Interface
                | Token::Arrow
                | Token::Lparen
        )
    }

    fn parse_interface_body(&mut self) -> Vec<Field> {
        self.expect(Token::Lbrace);
        let mut methods = Vec::new();
        while !self.at(Token::Rbrace) && !self.at(Token::Eof) {
            if self.eat(Token::Semicolon) {
                continue;
            }
            let start = self.pos();
            let name = self.parse_ident();
            let mut field = if self.at(Token::Lparen) {
                let sig = self.parse_signature();
                Field::new(vec![name], Expr::new(ExprKind::FuncType(sig)))
            } else {
                // Embedded interface, possibly qualified.
                let typ = if self.eat(Token::Period) {
                    let sel = self.parse_ident();
                    Expr::selector(Expr::from_ident(name), sel)
                } else {
                    Expr::from_ident(name)
                };
                Field::new(Vec::new(), typ)
            };
            field.span = (start, self.prev_end());
            methods.push(field);
            if !self.at(Token::Rbrace) {
                self.expect_semi();
            }
        }
        self.expect(Token::Rbrace);
        methods
    }

    fn parse_signature(&mut self) -> FuncType {
        let start = self.pos();
        let params = self.parse_params();
        let results = match self.tok() {
            Token::Lparen => self.parse_params(),
            t if t == Token::Ident
                || matches!(
                    t,
                    Token::Mul
                        | Token::Lbrack
                        | Token::Map
                        | Token::Chan
                        | Token::Func
                        | Token::Struct
                        | Token::Interface
                        | Token::Arrow
                ) =>
            {
                let typ = self.parse_type();
                vec![Field::new(Vec::new(), typ)]
            }
            _ => Vec::new(),
        };
        FuncType {
            id: next_id(),
            span: (start, self.prev_end()),
            params,
            results,
        }
    }

    fn parse_params(&mut self) -> Vec<Field> {
        self.expect(Token::Lparen);
        let mut items: Vec<(Option<Vec<Ident>>, Expr)> = Vec::new();
        while !self.at(Token::Rparen) && !self.at(Token::Eof) {
            let variadic = self.eat(Token::Ellipsis);
            let first = if variadic {
                Expr::new(ExprKind::Ellipsis {
                    elt: Some(Box::new(self.parse_type())),
                })
            } else {
                self.parse_type()
            };
            // `name Type` when a type token follows directly.
            if !variadic && first.as_ident().is_some() && self.peek_starts_type(0)
                && !self.at(Token::Lparen)
            {
                let name = match first.kind {
                    ExprKind::Ident(id) => id,
                    _ => unreachable!(),
                };
                let typ = if self.eat(Token::Ellipsis) {
                    Expr::new(ExprKind::Ellipsis {
                        elt: Some(Box::new(self.parse_type())),
                    })
                } else {
                    self.parse_type()
                };
                items.push((Some(vec![name]), typ));
            } else {
                items.push((None, first));
            }
            if !self.at(Token::Rparen) {
                self.expect(Token::Comma);
            }
        }
        self.expect(Token::Rparen);

        // Group bare leading idents with the next named item's type:
        // `(a, b int)` arrives as items [(None, a), (Some[b], int)].
        let named = items.iter().any(|(names, _)| names.is_some());
        let mut fields = Vec::new();
        if !named {
            for (_, typ) in items {
                fields.push(Field::new(Vec::new(), typ));
            }
            return fields;
        }
        let mut pending: Vec<Ident> = Vec::new();
        for (names, typ) in items {
            match names {
                Some(mut group_names) => {
                    let mut all = std::mem::take(&mut pending);
                    all.append(&mut group_names);
                    fields.push(Field::new(all, typ));
                }
                None => match typ.kind {
                    ExprKind::Ident(id) => pending.push(id),
                    _ => {
                        self.error_at(typ.span.0, "mixed named and unnamed parameters");
                        fields.push(Field::new(Vec::new(), typ));
                    }
                },
            }
        }
        for id in pending {
            self.error_at(id.span.0, "parameter name without type");
            fields.push(Field::new(Vec::new(), Expr::from_ident(id)));
        }
        fields
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn parse_block(&mut self) -> BlockStmt {
        let start = self.expect(Token::Lbrace);
        let saved = std::mem::replace(&mut self.allow_composite, true);
        let mut list = Vec::new();
        while !self.at(Token::Rbrace) && !self.at(Token::Eof) {
            if self.eat(Token::Semicolon) {
                continue;
            }
            list.push(self.parse_stmt(false));
        }
        self.expect(Token::Rbrace);
        self.allow_composite = saved;
        BlockStmt {
            id: next_id(),
            span: (start, self.prev_end()),
            list,
        }
    }

    /// `top_level` additionally allows `func`/`import` declarations, per the
    /// relaxed cell grammar.
    fn parse_stmt(&mut self, top_level: bool) -> Stmt {
        let start = self.pos();
        let kind = match self.tok() {
            Token::Var | Token::Const | Token::Type => {
                let decl = self.parse_gen_decl();
                self.expect_semi();
                StmtKind::Decl(decl)
            }
            Token::Import if top_level => {
                let decl = self.parse_gen_decl();
                self.expect_semi();
                StmtKind::Decl(decl)
            }
            Token::Func if top_level && self.is_func_decl_ahead() => {
                let decl = self.parse_func_decl();
                self.expect_semi();
                StmtKind::Decl(decl)
            }
            Token::Go => {
                self.advance();
                let call = self.parse_expr();
                if !call.is_call() {
                    self.error_at(call.span.0, "expression in go must be function call");
                }
                self.expect_semi();
                StmtKind::Go { call }
            }
            Token::Defer => {
                self.advance();
                let call = self.parse_expr();
                if !call.is_call() {
                    self.error_at(call.span.0, "expression in defer must be function call");
                }
                self.expect_semi();
                StmtKind::Defer { call }
            }
            Token::Return => {
                self.advance();
                let results = if self.at(Token::Semicolon)
                    || self.at(Token::Rbrace)
                    || self.at(Token::Eof)
                {
                    Vec::new()
                } else {
                    self.parse_expr_list()
                };
                self.expect_semi();
                StmtKind::Return { results }
            }
            Token::Break | Token::Continue | Token::Goto | Token::Fallthrough => {
                let tok = self.tok();
                self.advance();
                let label = if self.at(Token::Ident) {
                    Some(self.parse_ident())
                } else {
                    None
                };
                self.expect_semi();
                StmtKind::Branch { tok, label }
            }
            Token::Lbrace => {
                let block = self.parse_block();
                self.expect_semi();
                StmtKind::Block(block)
            }
            Token::If => return self.parse_if_stmt(),
            Token::For => return self.parse_for_stmt(),
            Token::Switch => return self.parse_switch_stmt(),
            Token::Select => return self.parse_select_stmt(),
            Token::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            _ => {
                let stmt = self.parse_simple_stmt(false);
                // A label: `ident:` followed by a statement.
                if let SimpleStmt::Stmt(inner) = stmt {
                    if let StmtKind::Expr(ref e) = inner.kind {
                        if e.as_ident().is_some() && self.at(Token::Colon) {
                            self.advance();
                            let label = match inner.kind {
                                StmtKind::Expr(Expr {
                                    kind: ExprKind::Ident(id),
                                    ..
                                }) => id,
                                _ => unreachable!(),
                            };
                            let next = self.parse_stmt(top_level);
                            return Stmt::with_span(
                                StmtKind::Labeled {
                                    label,
                                    stmt: Box::new(next),
                                },
                                (start, self.prev_end()),
                            );
                        }
                    }
                    self.expect_semi();
                    return inner;
                }
                self.error_at(start, "range clause outside for statement");
                StmtKind::Bad
            }
        };
        Stmt::with_span(kind, (start, self.prev_end()))
    }

    /// At `func` in a cell: a declaration has a name (or receiver) before
    /// the parameter list; a literal goes straight to `(`.
    fn is_func_decl_ahead(&self) -> bool {
        let next = self.toks[(self.i + 1).min(self.toks.len() - 1)].1;
        next == Token::Ident || next == Token::Lparen && self.receiver_ahead()
    }

    fn receiver_ahead(&self) -> bool {
        // func ( ... ) Name — a receiver, not a literal's parameter list.
        // Scan to the matching paren and look for an identifier.
        let mut depth = 0usize;
        let mut j = self.i + 1;
        while j < self.toks.len() {
            match self.toks[j].1 {
                Token::Lparen => depth += 1,
                Token::Rparen => {
                    depth -= 1;
                    if depth == 0 {
                        return j + 1 < self.toks.len() && self.toks[j + 1].1 == Token::Ident;
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
            j += 1;
        }
        false
    }

    fn parse_if_stmt(&mut self) -> Stmt {
        let start = self.expect(Token::If);
        let (init, cond) = self.parse_header();
        let body = self.parse_block();
        let els = if self.eat(Token::Else) {
            let els_stmt = if self.at(Token::If) {
                self.parse_if_stmt()
            } else {
                let block = self.parse_block();
                Stmt::new(StmtKind::Block(block))
            };
            Some(Box::new(els_stmt))
        } else {
            self.expect_semi();
            None
        };
        let cond = cond.unwrap_or_else(|| {
            self.error_at(start, "missing condition in if statement");
            Expr::bad()
        });
        Stmt::with_span(
            StmtKind::If {
                init,
                cond,
                body,
                els,
            },
            (start, self.prev_end()),
        )
    }

    /// Parse `[init ;] cond` for if/switch headers (composite literals
    /// disallowed at the top level of the header expressions).
    fn parse_header(&mut self) -> (Option<Box<Stmt>>, Option<Expr>) {
        let saved = std::mem::replace(&mut self.allow_composite, false);
        let mut init = None;
        let mut cond = None;
        if !self.at(Token::Lbrace) {
            match self.parse_simple_stmt(false) {
                SimpleStmt::Stmt(s) => {
                    if self.eat(Token::Semicolon) {
                        init = Some(Box::new(s));
                        if !self.at(Token::Lbrace) {
                            match self.parse_simple_stmt(false) {
                                SimpleStmt::Stmt(s2) => match s2.kind {
                                    StmtKind::Expr(e) => cond = Some(e),
                                    _ => {
                                        init = Some(Box::new(s2));
                                    }
                                },
                                SimpleStmt::Range { .. } => {
                                    self.error_at(self.pos(), "range clause outside for statement")
                                }
                            }
                        }
                    } else {
                        match s.kind {
                            StmtKind::Expr(e) => cond = Some(e),
                            other => {
                                init = Some(Box::new(Stmt::new(other)));
                            }
                        }
                    }
                }
                SimpleStmt::Range { .. } => {
                    self.error_at(self.pos(), "range clause outside for statement");
                }
            }
        }
        self.allow_composite = saved;
        (init, cond)
    }

    fn parse_for_stmt(&mut self) -> Stmt {
        let start = self.expect(Token::For);
        let saved = std::mem::replace(&mut self.allow_composite, false);

        // `for {`
        if self.at(Token::Lbrace) {
            self.allow_composite = saved;
            let body = self.parse_block();
            self.expect_semi();
            return Stmt::with_span(
                StmtKind::For {
                    init: None,
                    cond: None,
                    post: None,
                    body,
                },
                (start, self.prev_end()),
            );
        }

        // `for range x {`
        if self.eat(Token::Range) {
            let x = self.parse_expr();
            self.allow_composite = saved;
            let body = self.parse_block();
            self.expect_semi();
            return Stmt::with_span(
                StmtKind::Range {
                    key: None,
                    value: None,
                    tok: None,
                    x,
                    body,
                },
                (start, self.prev_end()),
            );
        }

        let first = match self.parse_simple_stmt(true) {
            SimpleStmt::Range { key, value, tok, x } => {
                self.allow_composite = saved;
                let body = self.parse_block();
                self.expect_semi();
                return Stmt::with_span(
                    StmtKind::Range {
                        key,
                        value,
                        tok: Some(tok),
                        x,
                        body,
                    },
                    (start, self.prev_end()),
                );
            }
            SimpleStmt::Stmt(s) => s,
        };

        if self.at(Token::Lbrace) {
            // `for cond {`
            self.allow_composite = saved;
            let cond = match first.kind {
                StmtKind::Expr(e) => Some(e),
                other => {
                    self.error_at(start, "expected for-loop condition");
                    let _ = other;
                    None
                }
            };
            let body = self.parse_block();
            self.expect_semi();
            return Stmt::with_span(
                StmtKind::For {
                    init: None,
                    cond,
                    post: None,
                    body,
                },
                (start, self.prev_end()),
            );
        }

        // `for init; cond; post {`
        self.expect(Token::Semicolon);
        let cond = if self.at(Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(Token::Semicolon);
        let post = if self.at(Token::Lbrace) {
            None
        } else {
            match self.parse_simple_stmt(false) {
                SimpleStmt::Stmt(s) => Some(Box::new(s)),
                SimpleStmt::Range { .. } => {
                    self.error_at(self.pos(), "range clause outside for statement");
                    None
                }
            }
        };
        self.allow_composite = saved;
        let body = self.parse_block();
        self.expect_semi();
        Stmt::with_span(
            StmtKind::For {
                init: Some(Box::new(first)),
                cond,
                post,
                body,
            },
            (start, self.prev_end()),
        )
    }

    fn parse_switch_stmt(&mut self) -> Stmt {
        let start = self.expect(Token::Switch);
        let saved = std::mem::replace(&mut self.allow_composite, false);
        let mut init = None;
        let mut tag = None;
        let mut assign = None;
        if !self.at(Token::Lbrace) {
            match self.parse_simple_stmt(false) {
                SimpleStmt::Stmt(s) => {
                    if self.eat(Token::Semicolon) {
                        init = Some(Box::new(s));
                        if !self.at(Token::Lbrace) {
                            match self.parse_simple_stmt(false) {
                                SimpleStmt::Stmt(s2) => {
                                    if is_type_switch_guard(&s2) {
                                        assign = Some(Box::new(s2));
                                    } else if let StmtKind::Expr(e) = s2.kind {
                                        tag = Some(e);
                                    } else {
                                        self.error_at(self.pos(), "expected switch expression");
                                    }
                                }
                                SimpleStmt::Range { .. } => self
                                    .error_at(self.pos(), "range clause outside for statement"),
                            }
                        }
                    } else if is_type_switch_guard(&s) {
                        assign = Some(Box::new(s));
                    } else if let StmtKind::Expr(e) = s.kind {
                        tag = Some(e);
                    } else {
                        init = Some(Box::new(s));
                    }
                }
                SimpleStmt::Range { .. } => {
                    self.error_at(self.pos(), "range clause outside for statement");
                }
            }
        }
        self.allow_composite = saved;

        self.expect(Token::Lbrace);
        let mut body = Vec::new();
        while !self.at(Token::Rbrace) && !self.at(Token::Eof) {
            body.push(self.parse_case_clause());
        }
        self.expect(Token::Rbrace);
        self.expect_semi();

        let kind = match assign {
            Some(assign) => StmtKind::TypeSwitch { init, assign, body },
            None => StmtKind::Switch { init, tag, body },
        };
        Stmt::with_span(kind, (start, self.prev_end()))
    }

    fn parse_case_clause(&mut self) -> Stmt {
        let start = self.pos();
        let list = if self.eat(Token::Case) {
            self.parse_expr_list()
        } else {
            self.expect(Token::Default);
            Vec::new()
        };
        self.expect(Token::Colon);
        let mut body = Vec::new();
        while !self.at(Token::Case) && !self.at(Token::Default) && !self.at(Token::Rbrace)
            && !self.at(Token::Eof)
        {
            if self.eat(Token::Semicolon) {
                continue;
            }
            body.push(self.parse_stmt(false));
        }
        Stmt::with_span(StmtKind::CaseClause { list, body }, (start, self.prev_end()))
    }

    fn parse_select_stmt(&mut self) -> Stmt {
        let start = self.expect(Token::Select);
        self.expect(Token::Lbrace);
        let mut body = Vec::new();
        while !self.at(Token::Rbrace) && !self.at(Token::Eof) {
            let clause_start = self.pos();
            let comm = if self.eat(Token::Case) {
                match self.parse_simple_stmt(false) {
                    SimpleStmt::Stmt(s) => Some(Box::new(s)),
                    SimpleStmt::Range { .. } => {
                        self.error_at(self.pos(), "range clause in select");
                        None
                    }
                }
            } else {
                self.expect(Token::Default);
                None
            };
            self.expect(Token::Colon);
            let mut clause_body = Vec::new();
            while !self.at(Token::Case) && !self.at(Token::Default) && !self.at(Token::Rbrace)
                && !self.at(Token::Eof)
            {
                if self.eat(Token::Semicolon) {
                    continue;
                }
                clause_body.push(self.parse_stmt(false));
            }
            body.push(Stmt::with_span(
                StmtKind::CommClause {
                    comm,
                    body: clause_body,
                },
                (clause_start, self.prev_end()),
            ));
        }
        self.expect(Token::Rbrace);
        self.expect_semi();
        Stmt::with_span(StmtKind::Select { body }, (start, self.prev_end()))
    }

    fn parse_simple_stmt(&mut self, for_header: bool) -> SimpleStmt {
        let start = self.pos();
        let lhs = self.parse_expr_list();

        match self.tok() {
            Token::Define | Token::Assign => {
                let tok = self.tok();
                self.advance();
                if for_header && self.at(Token::Range) {
                    self.advance();
                    let x = self.parse_expr();
                    let mut iter = lhs.into_iter();
                    let key = iter.next();
                    let value = iter.next();
                    return SimpleStmt::Range {
                        key,
                        value,
                        tok,
                        x,
                    };
                }
                let rhs = self.parse_expr_list();
                SimpleStmt::Stmt(Stmt::with_span(
                    StmtKind::Assign { lhs, tok, rhs },
                    (start, self.prev_end()),
                ))
            }
            t if t.assign_op().is_some() => {
                self.advance();
                let rhs = self.parse_expr_list();
                SimpleStmt::Stmt(Stmt::with_span(
                    StmtKind::Assign { lhs, tok: t, rhs },
                    (start, self.prev_end()),
                ))
            }
            Token::Arrow if lhs.len() == 1 => {
                self.advance();
                let value = self.parse_expr();
                let chan = lhs.into_iter().next().unwrap();
                SimpleStmt::Stmt(Stmt::with_span(
                    StmtKind::Send { chan, value },
                    (start, self.prev_end()),
                ))
            }
            Token::Inc | Token::Dec if lhs.len() == 1 => {
                let op = self.tok();
                self.advance();
                let x = lhs.into_iter().next().unwrap();
                SimpleStmt::Stmt(Stmt::with_span(
                    StmtKind::IncDec { x, op },
                    (start, self.prev_end()),
                ))
            }
            _ => {
                if lhs.len() != 1 {
                    self.error_at(start, "expected one expression");
                }
                let e = lhs.into_iter().next().unwrap_or_else(Expr::bad);
                SimpleStmt::Stmt(Stmt::expr(e))
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn parse_expr_list(&mut self) -> Vec<Expr> {
        let mut list = vec![self.parse_expr()];
        while self.eat(Token::Comma) {
            list.push(self.parse_expr());
        }
        list
    }

    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_binary_expr(1)
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Expr {
        let start = self.pos();
        let mut x = self.parse_unary_expr();
        loop {
            let op = self.tok();
            let prec = op.precedence();
            if prec < min_prec {
                return x;
            }
            self.advance();
            let y = self.parse_binary_expr(prec + 1);
            x = Expr::with_span(
                ExprKind::Binary {
                    x: Box::new(x),
                    op,
                    y: Box::new(y),
                },
                (start, self.prev_end()),
            );
        }
    }

    fn parse_unary_expr(&mut self) -> Expr {
        let start = self.pos();
        // `<-chan T` is a type, not a receive.
        if self.at(Token::Arrow)
            && self.toks[(self.i + 1).min(self.toks.len() - 1)].1 == Token::Chan
        {
            return self.parse_type();
        }
        match self.tok() {
            Token::Add | Token::Sub | Token::Not | Token::Xor | Token::And | Token::Arrow => {
                let op = self.tok();
                self.advance();
                let x = self.parse_unary_expr();
                Expr::with_span(
                    ExprKind::Unary {
                        op,
                        x: Box::new(x),
                    },
                    (start, self.prev_end()),
                )
            }
            Token::Mul => {
                self.advance();
                let x = self.parse_unary_expr();
                Expr::with_span(ExprKind::Star(Box::new(x)), (start, self.prev_end()))
            }
            _ => self.parse_primary_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Expr {
        let start = self.pos();
        let mut x = self.parse_operand();
        loop {
            match self.tok() {
                Token::Period => {
                    self.advance();
                    if self.eat(Token::Lparen) {
                        // Type assertion: x.(T) or x.(type).
                        let typ = if self.eat(Token::Type) {
                            None
                        } else {
                            Some(Box::new(self.parse_type()))
                        };
                        self.expect(Token::Rparen);
                        x = Expr::with_span(
                            ExprKind::TypeAssert {
                                x: Box::new(x),
                                typ,
                            },
                            (start, self.prev_end()),
                        );
                    } else {
                        let sel = self.parse_ident();
                        x = Expr::with_span(
                            ExprKind::Selector {
                                x: Box::new(x),
                                sel,
                            },
                            (start, self.prev_end()),
                        );
                    }
                }
                Token::Lbrack => {
                    self.advance();
                    let saved = std::mem::replace(&mut self.allow_composite, true);
                    // Index or slice.
                    let low = if self.at(Token::Colon) {
                        None
                    } else {
                        Some(self.parse_expr())
                    };
                    if self.eat(Token::Colon) {
                        let high = if self.at(Token::Rbrack) || self.at(Token::Colon) {
                            None
                        } else {
                            Some(Box::new(self.parse_expr()))
                        };
                        let max = if self.eat(Token::Colon) {
                            Some(Box::new(self.parse_expr()))
                        } else {
                            None
                        };
                        self.expect(Token::Rbrack);
                        x = Expr::with_span(
                            ExprKind::Slice {
                                x: Box::new(x),
                                low: low.map(Box::new),
                                high,
                                max,
                            },
                            (start, self.prev_end()),
                        );
                    } else {
                        self.expect(Token::Rbrack);
                        x = Expr::with_span(
                            ExprKind::Index {
                                x: Box::new(x),
                                index: Box::new(low.unwrap_or_else(Expr::bad)),
                            },
                            (start, self.prev_end()),
                        );
                    }
                    self.allow_composite = saved;
                }
                Token::Lparen => {
                    self.advance();
                    let saved = std::mem::replace(&mut self.allow_composite, true);
                    let mut args = Vec::new();
                    let mut ellipsis = false;
                    while !self.at(Token::Rparen) && !self.at(Token::Eof) {
                        args.push(self.parse_expr());
                        if self.eat(Token::Ellipsis) {
                            ellipsis = true;
                        }
                        if !self.at(Token::Rparen) {
                            self.expect(Token::Comma);
                        } else {
                            self.eat(Token::Comma);
                        }
                    }
                    self.expect(Token::Rparen);
                    self.allow_composite = saved;
                    x = Expr::with_span(
                        ExprKind::Call {
                            fun: Box::new(x),
                            args,
                            ellipsis,
                        },
                        (start, self.prev_end()),
                    );
                }
                Token::Lbrace if self.allow_composite && is_literal_type(&x) => {
                    x = self.parse_composite_lit(Some(x), start);
                }
                _ => return x,
            }
        }
    }

    fn parse_operand(&mut self) -> Expr {
        let start = self.pos();
        match self.tok() {
            Token::Ident => {
                let ident = self.parse_ident();
                Expr::from_ident(ident)
            }
            Token::Int | Token::Float | Token::Char | Token::Str => {
                let tok = self.tok();
                let value = self.lit().to_string();
                let end = start + value.len();
                self.advance();
                Expr::with_span(ExprKind::BasicLit { tok, value }, (start, end))
            }
            Token::Lparen => {
                self.advance();
                let saved = std::mem::replace(&mut self.allow_composite, true);
                let x = self.parse_expr();
                self.allow_composite = saved;
                self.expect(Token::Rparen);
                Expr::with_span(ExprKind::Paren(Box::new(x)), (start, self.prev_end()))
            }
            Token::Func => {
                self.advance();
                let typ = self.parse_signature();
                if self.at(Token::Lbrace) {
                    let saved = std::mem::replace(&mut self.allow_composite, true);
                    let body = self.parse_block();
                    self.allow_composite = saved;
                    Expr::with_span(
                        ExprKind::FuncLit { typ, body },
                        (start, self.prev_end()),
                    )
                } else {
                    Expr::with_span(ExprKind::FuncType(typ), (start, self.prev_end()))
                }
            }
            Token::Lbrack | Token::Map | Token::Chan | Token::Struct | Token::Interface => {
                let typ = self.parse_type();
                if self.at(Token::Lbrace) && self.allow_composite {
                    self.parse_composite_lit(Some(typ), start)
                } else {
                    typ
                }
            }
            _ => {
                let msg = format!("expected expression, found {:?}", self.describe());
                self.error_at(start, msg);
                self.advance();
                Expr::with_span(ExprKind::Bad, (start, start))
            }
        }
    }

    fn parse_composite_lit(&mut self, typ: Option<Expr>, start: usize) -> Expr {
        self.expect(Token::Lbrace);
        let saved = std::mem::replace(&mut self.allow_composite, true);
        let mut elts = Vec::new();
        while !self.at(Token::Rbrace) && !self.at(Token::Eof) {
            let elt_start = self.pos();
            let elt = if self.at(Token::Lbrace) {
                // Nested literal with elided type.
                self.parse_composite_lit(None, elt_start)
            } else {
                self.parse_expr()
            };
            let elt = if self.eat(Token::Colon) {
                let value = if self.at(Token::Lbrace) {
                    let vs = self.pos();
                    self.parse_composite_lit(None, vs)
                } else {
                    self.parse_expr()
                };
                Expr::with_span(
                    ExprKind::KeyValue {
                        key: Box::new(elt),
                        value: Box::new(value),
                    },
                    (elt_start, self.prev_end()),
                )
            } else {
                elt
            };
            elts.push(elt);
            if !self.at(Token::Rbrace) {
                if !self.eat(Token::Comma) {
                    self.eat(Token::Semicolon);
                }
            } else {
                self.eat(Token::Comma);
            }
        }
        self.expect(Token::Rbrace);
        self.allow_composite = saved;
        Expr::with_span(
            ExprKind::CompositeLit {
                typ: typ.map(Box::new),
                elts,
            },
            (start, self.prev_end()),
        )
    }
}

enum SimpleStmt {
    Stmt(Stmt),
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        tok: Token,
        x: Expr,
    },
}

/// `x := y.(type)` (or `x = y.(type)`) in a switch header.
fn is_type_switch_guard(stmt: &Stmt) -> bool {
    let candidates: Vec<&Expr> = match &stmt.kind {
        StmtKind::Assign { rhs, .. } => rhs.iter().collect(),
        StmtKind::Expr(e) => vec![e],
        _ => return false,
    };
    candidates.iter().any(|e| {
        matches!(
            e.kind,
            ExprKind::TypeAssert { typ: None, .. }
        )
    })
}

/// Expression shapes that may be followed by a composite-literal body.
fn is_literal_type(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Selector { x, .. } => x.as_ident().is_some(),
        ExprKind::ArrayType { .. }
        | ExprKind::MapType { .. }
        | ExprKind::StructType { .. } => true,
        _ => false,
    }
}

fn unquote(lit: &str) -> String {
    let inner = lit
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| lit.strip_prefix('`').and_then(|s| s.strip_suffix('`')));
    let inner = match inner {
        Some(s) => s,
        None => return lit.to_string(),
    };
    if lit.starts_with('`') {
        return inner.to_string();
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests;

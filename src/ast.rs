//! Host-language AST.
//!
//! Nodes carry a `NodeId` so checker facts (definitions, uses, types,
//! scopes) survive the in-place rewrites the converter performs: a rewrite
//! that moves an identifier into a new parent keeps the identifier's id, so
//! maps keyed by id remain valid. Fresh nodes built by rewriters get fresh
//! ids from a process-wide counter.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::scanner::Comment;
use crate::token::{Span, Token};

pub type NodeId = u32;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

pub fn next_id() -> NodeId {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub const NO_SPAN: Span = (0, 0);

// ── Identifiers ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Ident {
    pub id: NodeId,
    pub span: Span,
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Ident {
        Ident {
            id: next_id(),
            span: NO_SPAN,
            name: name.into(),
        }
    }

    pub fn with_span(name: impl Into<String>, span: Span) -> Ident {
        Ident {
            id: next_id(),
            span,
            name: name.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

/// Whether a name is exported (first character uppercase).
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

// ── Expressions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Ident(Ident),
    BasicLit {
        tok: Token,
        value: String,
    },
    CompositeLit {
        typ: Option<Box<Expr>>,
        elts: Vec<Expr>,
    },
    FuncLit {
        typ: FuncType,
        body: BlockStmt,
    },
    Paren(Box<Expr>),
    Selector {
        x: Box<Expr>,
        sel: Ident,
    },
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        x: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `x.(T)`; `typ` is `None` for the `x.(type)` form in type switches.
    TypeAssert {
        x: Box<Expr>,
        typ: Option<Box<Expr>>,
    },
    Call {
        fun: Box<Expr>,
        args: Vec<Expr>,
        ellipsis: bool,
    },
    Star(Box<Expr>),
    Unary {
        op: Token,
        x: Box<Expr>,
    },
    Binary {
        x: Box<Expr>,
        op: Token,
        y: Box<Expr>,
    },
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
    },

    // Type expressions.
    /// `[N]T` with a length, `[]T` without.
    ArrayType {
        len: Option<Box<Expr>>,
        elt: Box<Expr>,
    },
    StructType {
        fields: Vec<Field>,
    },
    FuncType(FuncType),
    InterfaceType {
        methods: Vec<Field>,
    },
    MapType {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    ChanType {
        dir: ChanDir,
        value: Box<Expr>,
    },
    /// `...T` in a final parameter.
    Ellipsis {
        elt: Option<Box<Expr>>,
    },

    Bad,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Expr {
        Expr {
            id: next_id(),
            span: NO_SPAN,
            kind,
        }
    }

    pub fn with_span(kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: next_id(),
            span,
            kind,
        }
    }

    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::new(ExprKind::Ident(Ident::new(name)))
    }

    pub fn from_ident(ident: Ident) -> Expr {
        let span = ident.span;
        Expr::with_span(ExprKind::Ident(ident), span)
    }

    pub fn selector(x: Expr, sel: Ident) -> Expr {
        Expr::new(ExprKind::Selector {
            x: Box::new(x),
            sel,
        })
    }

    /// `pkg.name` with fresh idents.
    pub fn qualified(pkg: &str, name: &str) -> Expr {
        Expr::selector(Expr::ident(pkg), Ident::new(name))
    }

    pub fn call(fun: Expr, args: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Call {
            fun: Box::new(fun),
            args,
            ellipsis: false,
        })
    }

    pub fn string_lit(value: &str) -> Expr {
        Expr::new(ExprKind::BasicLit {
            tok: Token::Str,
            value: format!("{:?}", value),
        })
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match &self.kind {
            ExprKind::Ident(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. })
    }

    /// A placeholder used while a slot's contents are being rewritten.
    pub fn bad() -> Expr {
        Expr::new(ExprKind::Bad)
    }
}

// ── Fields, signatures, specs ────────────────────────────────────────────

/// A struct field, interface method, or parameter/result group.
#[derive(Debug, Clone)]
pub struct Field {
    pub id: NodeId,
    pub span: Span,
    pub names: Vec<Ident>,
    pub typ: Expr,
    pub tag: Option<String>,
}

impl Field {
    pub fn new(names: Vec<Ident>, typ: Expr) -> Field {
        Field {
            id: next_id(),
            span: NO_SPAN,
            names,
            typ,
            tag: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncType {
    pub id: NodeId,
    pub span: Span,
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

impl FuncType {
    pub fn nullary() -> FuncType {
        FuncType {
            id: next_id(),
            span: NO_SPAN,
            params: Vec::new(),
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub id: NodeId,
    pub span: Span,
    /// Explicit binding name; `_` imports keep the underscore here.
    pub name: Option<Ident>,
    /// Unquoted import path.
    pub path: String,
}

impl ImportSpec {
    pub fn new(name: Option<&str>, path: &str) -> ImportSpec {
        ImportSpec {
            id: next_id(),
            span: NO_SPAN,
            name: name.map(Ident::new),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub id: NodeId,
    pub span: Span,
    pub names: Vec<Ident>,
    pub typ: Option<Expr>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    /// True for `type T = U` aliases.
    pub alias: bool,
    pub typ: Expr,
}

#[derive(Debug, Clone)]
pub enum Spec {
    Import(ImportSpec),
    Value(ValueSpec),
    Type(TypeSpec),
}

// ── Declarations ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Decl {
    pub id: NodeId,
    pub span: Span,
    pub kind: DeclKind,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    /// `import`/`const`/`var`/`type` declaration; `paren` records whether
    /// the source used a parenthesized spec group.
    Gen {
        tok: Token,
        specs: Vec<Spec>,
        paren: bool,
    },
    Func(FuncDecl),
}

impl Decl {
    pub fn new(kind: DeclKind) -> Decl {
        Decl {
            id: next_id(),
            span: NO_SPAN,
            kind,
        }
    }

    pub fn gen(tok: Token, specs: Vec<Spec>, paren: bool) -> Decl {
        Decl::new(DeclKind::Gen { tok, specs, paren })
    }

    pub fn single_import(name: Option<&str>, path: &str) -> Decl {
        Decl::gen(
            Token::Import,
            vec![Spec::Import(ImportSpec::new(name, path))],
            false,
        )
    }
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub recv: Option<Field>,
    pub name: Ident,
    pub typ: FuncType,
    pub body: Option<BlockStmt>,
}

// ── Statements ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BlockStmt {
    pub id: NodeId,
    pub span: Span,
    pub list: Vec<Stmt>,
}

impl BlockStmt {
    pub fn new(list: Vec<Stmt>) -> BlockStmt {
        BlockStmt {
            id: next_id(),
            span: NO_SPAN,
            list,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Decl(Decl),
    Empty,
    Labeled {
        label: Ident,
        stmt: Box<Stmt>,
    },
    Expr(Expr),
    Send {
        chan: Expr,
        value: Expr,
    },
    IncDec {
        x: Expr,
        op: Token,
    },
    Assign {
        lhs: Vec<Expr>,
        tok: Token,
        rhs: Vec<Expr>,
    },
    Go {
        call: Expr,
    },
    Defer {
        call: Expr,
    },
    Return {
        results: Vec<Expr>,
    },
    /// `break`/`continue`/`goto`/`fallthrough`.
    Branch {
        tok: Token,
        label: Option<Ident>,
    },
    Block(BlockStmt),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        body: BlockStmt,
        els: Option<Box<Stmt>>,
    },
    /// One `case`/`default` clause; an empty `list` is `default`.
    CaseClause {
        list: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        body: Vec<Stmt>,
    },
    TypeSwitch {
        init: Option<Box<Stmt>>,
        assign: Box<Stmt>,
        body: Vec<Stmt>,
    },
    /// One select clause; `comm` is `None` for `default`.
    CommClause {
        comm: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Select {
        body: Vec<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: BlockStmt,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        /// `:=` or `=`; `None` for a bare `for range x`.
        tok: Option<Token>,
        x: Expr,
        body: BlockStmt,
    },
    Bad,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Stmt {
        Stmt {
            id: next_id(),
            span: NO_SPAN,
            kind,
        }
    }

    pub fn with_span(kind: StmtKind, span: Span) -> Stmt {
        Stmt {
            id: next_id(),
            span,
            kind,
        }
    }

    pub fn expr(e: Expr) -> Stmt {
        let span = e.span;
        Stmt::with_span(StmtKind::Expr(e), span)
    }
}

// ── Files and cell blocks ────────────────────────────────────────────────

/// A normal-grammar compilation unit.
#[derive(Debug, Clone)]
pub struct File {
    pub id: NodeId,
    pub package_name: Ident,
    pub decls: Vec<Decl>,
    pub comments: Vec<Comment>,
}

/// A relaxed-grammar cell: an ordered statement sequence in which
/// declarations appear as declaration-statements. Output of `parse_cell`.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
    pub comments: Vec<Comment>,
}

impl Block {
    /// The import specs declared anywhere in the cell, in order.
    pub fn imports(&self) -> Vec<&ImportSpec> {
        let mut out = Vec::new();
        for stmt in &self.stmts {
            if let StmtKind::Decl(decl) = &stmt.kind {
                if let DeclKind::Gen {
                    tok: Token::Import,
                    specs,
                    ..
                } = &decl.kind
                {
                    for spec in specs {
                        if let Spec::Import(im) = spec {
                            out.push(im);
                        }
                    }
                }
            }
        }
        out
    }
}

// ── Read-only expression traversal ───────────────────────────────────────

/// Pre-order visit of every expression under `e`, including `e` itself.
/// The callback returns false to skip the node's children.
pub fn visit_expr(e: &Expr, f: &mut dyn FnMut(&Expr) -> bool) {
    if !f(e) {
        return;
    }
    match &e.kind {
        ExprKind::Ident(_) | ExprKind::BasicLit { .. } | ExprKind::Bad => {}
        ExprKind::CompositeLit { typ, elts } => {
            if let Some(t) = typ {
                visit_expr(t, f);
            }
            for elt in elts {
                visit_expr(elt, f);
            }
        }
        ExprKind::FuncLit { typ, body } => {
            visit_func_type(typ, f);
            visit_block(body, f);
        }
        ExprKind::Paren(x) | ExprKind::Star(x) => visit_expr(x, f),
        ExprKind::Selector { x, .. } => visit_expr(x, f),
        ExprKind::Index { x, index } => {
            visit_expr(x, f);
            visit_expr(index, f);
        }
        ExprKind::Slice { x, low, high, max } => {
            visit_expr(x, f);
            for part in [low, high, max].into_iter().flatten() {
                visit_expr(part, f);
            }
        }
        ExprKind::TypeAssert { x, typ } => {
            visit_expr(x, f);
            if let Some(t) = typ {
                visit_expr(t, f);
            }
        }
        ExprKind::Call { fun, args, .. } => {
            visit_expr(fun, f);
            for arg in args {
                visit_expr(arg, f);
            }
        }
        ExprKind::Unary { x, .. } => visit_expr(x, f),
        ExprKind::Binary { x, y, .. } => {
            visit_expr(x, f);
            visit_expr(y, f);
        }
        ExprKind::KeyValue { key, value } => {
            visit_expr(key, f);
            visit_expr(value, f);
        }
        ExprKind::ArrayType { len, elt } => {
            if let Some(l) = len {
                visit_expr(l, f);
            }
            visit_expr(elt, f);
        }
        ExprKind::StructType { fields } | ExprKind::InterfaceType { methods: fields } => {
            for field in fields {
                visit_expr(&field.typ, f);
            }
        }
        ExprKind::FuncType(ft) => visit_func_type(ft, f),
        ExprKind::MapType { key, value } => {
            visit_expr(key, f);
            visit_expr(value, f);
        }
        ExprKind::ChanType { value, .. } => visit_expr(value, f),
        ExprKind::Ellipsis { elt } => {
            if let Some(t) = elt {
                visit_expr(t, f);
            }
        }
    }
}

fn visit_func_type(ft: &FuncType, f: &mut dyn FnMut(&Expr) -> bool) {
    for field in ft.params.iter().chain(ft.results.iter()) {
        visit_expr(&field.typ, f);
    }
}

/// Pre-order visit of every expression in a statement subtree.
pub fn visit_stmt_exprs(stmt: &Stmt, f: &mut dyn FnMut(&Expr) -> bool) {
    match &stmt.kind {
        StmtKind::Decl(decl) => visit_decl_exprs(decl, f),
        StmtKind::Empty | StmtKind::Branch { .. } | StmtKind::Bad => {}
        StmtKind::Labeled { stmt, .. } => visit_stmt_exprs(stmt, f),
        StmtKind::Expr(e) => visit_expr(e, f),
        StmtKind::Send { chan, value } => {
            visit_expr(chan, f);
            visit_expr(value, f);
        }
        StmtKind::IncDec { x, .. } => visit_expr(x, f),
        StmtKind::Assign { lhs, rhs, .. } => {
            for e in lhs.iter().chain(rhs.iter()) {
                visit_expr(e, f);
            }
        }
        StmtKind::Go { call } | StmtKind::Defer { call } => visit_expr(call, f),
        StmtKind::Return { results } => {
            for e in results {
                visit_expr(e, f);
            }
        }
        StmtKind::Block(block) => visit_block(block, f),
        StmtKind::If {
            init,
            cond,
            body,
            els,
        } => {
            if let Some(s) = init {
                visit_stmt_exprs(s, f);
            }
            visit_expr(cond, f);
            visit_block(body, f);
            if let Some(s) = els {
                visit_stmt_exprs(s, f);
            }
        }
        StmtKind::CaseClause { list, body } => {
            for e in list {
                visit_expr(e, f);
            }
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        StmtKind::Switch { init, tag, body } => {
            if let Some(s) = init {
                visit_stmt_exprs(s, f);
            }
            if let Some(e) = tag {
                visit_expr(e, f);
            }
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        StmtKind::TypeSwitch { init, assign, body } => {
            if let Some(s) = init {
                visit_stmt_exprs(s, f);
            }
            visit_stmt_exprs(assign, f);
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        StmtKind::CommClause { comm, body } => {
            if let Some(s) = comm {
                visit_stmt_exprs(s, f);
            }
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        StmtKind::Select { body } => {
            for s in body {
                visit_stmt_exprs(s, f);
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(s) = init {
                visit_stmt_exprs(s, f);
            }
            if let Some(e) = cond {
                visit_expr(e, f);
            }
            if let Some(s) = post {
                visit_stmt_exprs(s, f);
            }
            visit_block(body, f);
        }
        StmtKind::Range {
            key,
            value,
            x,
            body,
            ..
        } => {
            for e in [key, value].into_iter().flatten() {
                visit_expr(e, f);
            }
            visit_expr(x, f);
            visit_block(body, f);
        }
    }
}

pub fn visit_block(block: &BlockStmt, f: &mut dyn FnMut(&Expr) -> bool) {
    for stmt in &block.list {
        visit_stmt_exprs(stmt, f);
    }
}

pub fn visit_decl_exprs(decl: &Decl, f: &mut dyn FnMut(&Expr) -> bool) {
    match &decl.kind {
        DeclKind::Gen { specs, .. } => {
            for spec in specs {
                match spec {
                    Spec::Import(_) => {}
                    Spec::Value(vs) => {
                        if let Some(t) = &vs.typ {
                            visit_expr(t, f);
                        }
                        for v in &vs.values {
                            visit_expr(v, f);
                        }
                    }
                    Spec::Type(ts) => visit_expr(&ts.typ, f),
                }
            }
        }
        DeclKind::Func(fd) => {
            if let Some(recv) = &fd.recv {
                visit_expr(&recv.typ, f);
            }
            visit_func_type(&fd.typ, f);
            if let Some(body) = &fd.body {
                visit_block(body, f);
            }
        }
    }
}

pub fn visit_file_exprs(file: &File, f: &mut dyn FnMut(&Expr) -> bool) {
    for decl in &file.decls {
        visit_decl_exprs(decl, f);
    }
}

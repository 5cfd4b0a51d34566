//! The host-language type checker, usable as a library.
//!
//! `check_file` type-checks one compilation unit against a package whose
//! scope may have been pre-seeded with session objects from prior cells.
//! Facts are reported into an `Info` (definitions, uses, expression types,
//! scopes, implicit import bindings) keyed by AST `NodeId`, so converter
//! rewrites can consult them after the AST has been mutated.
//!
//! Two deliberate departures from a strict host checker, both load-bearing
//! for the converter:
//! - `ignore_func_bodies` skips every function body except the synthesized
//!   cell entry (`lgo_init`), which must be checked to infer cell variable
//!   types before those variables exist at package level.
//! - Unexported members of per-cell packages resolve across packages; the
//!   rename pass rewrites them to exported names before the host compiler
//!   ever sees them.

mod lookup;

pub use lookup::{enumerate_members, lookup_field_or_method};

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::convert::INIT_FUNC_NAME;
use crate::error::GobletError;
use crate::stdlib;
use crate::token::{Span, Token};
use crate::types::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckConfig {
    /// Skip function bodies other than the cell entry function.
    pub ignore_func_bodies: bool,
}

#[derive(Debug, Default)]
pub struct Info {
    pub defs: HashMap<NodeId, ObjId>,
    pub uses: HashMap<NodeId, ObjId>,
    pub types: HashMap<NodeId, TypeId>,
    pub scopes: HashMap<NodeId, ScopeId>,
    /// PkgName objects for imports without an explicit name.
    pub implicits: HashMap<NodeId, ObjId>,
    /// Objects referenced at least once (drives import pruning).
    pub used: HashSet<ObjId>,
}

impl Info {
    /// The object an identifier resolves to, definition or use.
    pub fn object_of(&self, id: NodeId) -> Option<ObjId> {
        self.uses.get(&id).copied().or_else(|| self.defs.get(&id).copied())
    }
}

/// Create a fresh cell package seeded with prior-session objects, prior
/// imports (re-bound as this package's own PkgNames), and the execution
/// context variable. Returns the package, the rebound import objects, and
/// the context object if it was injected (absent when shadowed).
///
/// Session objects live in a values scope spliced between the package's
/// own scope and the universe: the cell's definitions shadow them by plain
/// scope nesting, and the package scope itself holds only what this cell
/// declares — which is exactly what commits to the session afterwards.
pub fn new_cell_package(
    ctx: &mut TypeCtx,
    path: &str,
    olds: &[ObjId],
    old_imports: &[ObjId],
) -> (PkgId, Vec<ObjId>, Option<ObjId>) {
    let pkg = ctx.new_package(path, crate::convert::CELL_PKG_NAME, true);
    let vscope = ctx.new_scope(Some(ctx.universe));
    let pkg_scope = ctx.pkg(pkg).scope;
    ctx.set_scope_parent(pkg_scope, vscope);
    for &old in olds {
        ctx.scope_insert(vscope, old);
    }
    let mut rebound = Vec::new();
    for &im in old_imports {
        let (name, target) = {
            let obj = ctx.obj(im);
            let target = match obj.kind {
                ObjKind::PkgName(p) => p,
                _ => continue,
            };
            (obj.name.clone(), target)
        };
        let invalid = ctx.invalid_type();
        let pname = ctx.new_object(Object {
            name,
            kind: ObjKind::PkgName(target),
            typ: invalid,
            pkg: Some(pkg),
        });
        ctx.scope_insert(vscope, pname);
        rebound.push(pname);
    }
    let runctx = inject_cell_context(ctx, pkg, vscope);
    (pkg, rebound, runctx)
}

/// Insert the `_ctx` execution-context variable unless the session has
/// shadowed the name.
fn inject_cell_context(ctx: &mut TypeCtx, pkg: PkgId, vscope: ScopeId) -> Option<ObjId> {
    if ctx.scope_lookup(vscope, crate::convert::RUN_CTX_NAME).is_some() {
        return None;
    }
    let rt = stdlib::import(ctx, stdlib::runtime_pkg_path())?;
    let rt_scope = ctx.pkg(rt).scope;
    let exec_ctx = ctx.scope_lookup(rt_scope, "ExecContext")?;
    let typ = ctx.obj(exec_ctx).typ;
    let obj = ctx.new_var(crate::convert::RUN_CTX_NAME, typ, Some(pkg));
    ctx.scope_insert(vscope, obj);
    Some(obj)
}

pub fn check_file(
    ctx: &mut TypeCtx,
    pkg: PkgId,
    file: &File,
    conf: CheckConfig,
) -> (Info, Vec<GobletError>) {
    let mut c = Checker {
        ctx,
        pkg,
        conf,
        info: Info::default(),
        errors: Vec::new(),
        scope: ScopeId(0),
    };
    c.file(file);
    (c.info, c.errors)
}

struct Checker<'a> {
    ctx: &'a mut TypeCtx,
    pkg: PkgId,
    conf: CheckConfig,
    info: Info,
    errors: Vec<GobletError>,
    /// Current lexical scope.
    scope: ScopeId,
}

impl<'a> Checker<'a> {
    fn error(&mut self, span: Span, msg: impl Into<String>) {
        self.errors.push(GobletError::Type {
            message: msg.into(),
            span,
        });
    }

    fn invalid(&self) -> TypeId {
        self.ctx.invalid_type()
    }

    fn pkg_scope(&self) -> ScopeId {
        self.ctx.pkg(self.pkg).scope
    }

    // ── File-level driving ───────────────────────────────────────────────

    fn file(&mut self, file: &File) {
        let pkg_scope = self.pkg_scope();
        let file_scope = self.ctx.new_scope(Some(pkg_scope));
        self.info.scopes.insert(file.id, file_scope);
        self.scope = file_scope;

        // Pass 0: bind imports into the file scope.
        for decl in &file.decls {
            if let DeclKind::Gen {
                tok: Token::Import,
                specs,
                ..
            } = &decl.kind
            {
                for spec in specs {
                    if let Spec::Import(im) = spec {
                        self.import_spec(im, file_scope);
                    }
                }
            }
        }

        // Pass 1: declare package-level type names with placeholders.
        let mut type_placeholders: Vec<(NodeId, ObjId, TypeId, &TypeSpec)> = Vec::new();
        for decl in &file.decls {
            if let DeclKind::Gen {
                tok: Token::Type,
                specs,
                ..
            } = &decl.kind
            {
                for spec in specs {
                    if let Spec::Type(ts) = spec {
                        let (obj, named) =
                            self.ctx.declare_named(self.pkg, &ts.name.name, self.invalid());
                        self.info.defs.insert(ts.name.id, obj);
                        type_placeholders.push((ts.name.id, obj, named, ts));
                    }
                }
            }
        }

        // Pass 2: resolve type definitions (may reference each other).
        for (_, obj, named, ts) in &type_placeholders {
            let underlying = self.resolve_type(&ts.typ);
            self.ctx.set_type_kind(
                *named,
                TypeKind::Named {
                    obj: *obj,
                    underlying,
                },
            );
        }

        // Pass 3: declare package-level funcs, methods, consts, and vars.
        for decl in &file.decls {
            match &decl.kind {
                DeclKind::Func(fd) => self.declare_func(fd),
                DeclKind::Gen {
                    tok: tok @ (Token::Var | Token::Const),
                    specs,
                    ..
                } => {
                    for spec in specs {
                        if let Spec::Value(vs) = spec {
                            self.declare_package_value(*tok, vs);
                        }
                    }
                }
                _ => {}
            }
        }

        // Pass 4: check function bodies.
        for decl in &file.decls {
            if let DeclKind::Func(fd) = &decl.kind {
                let skip = self.conf.ignore_func_bodies && fd.name.name != INIT_FUNC_NAME;
                if skip {
                    continue;
                }
                self.check_func_body(fd);
            }
        }
        self.scope = file_scope;
    }

    fn import_spec(&mut self, im: &ImportSpec, file_scope: ScopeId) {
        let target = match stdlib::import(self.ctx, &im.path) {
            Some(pkg) => pkg,
            None => {
                self.error(im.span, format!("could not import {} (not found)", im.path));
                return;
            }
        };
        let bind_name = match &im.name {
            Some(name) => name.name.clone(),
            None => self.ctx.pkg(target).name.clone(),
        };
        let invalid = self.invalid();
        let pname = self.ctx.new_object(Object {
            name: bind_name,
            kind: ObjKind::PkgName(target),
            typ: invalid,
            pkg: Some(self.pkg),
        });
        match &im.name {
            Some(name) => {
                self.info.defs.insert(name.id, pname);
            }
            None => {
                self.info.implicits.insert(im.id, pname);
            }
        }
        // Blank imports bind nothing.
        if self.ctx.obj(pname).name != "_" {
            self.ctx.scope_insert(file_scope, pname);
        }
    }

    fn declare_func(&mut self, fd: &FuncDecl) {
        let sig = self.resolve_signature(&fd.typ, fd.recv.as_ref());
        let typ = self.ctx.intern(TypeKind::Func(sig));
        let obj = self.ctx.new_object(Object {
            name: fd.name.name.clone(),
            kind: ObjKind::Func,
            typ,
            pkg: Some(self.pkg),
        });
        self.info.defs.insert(fd.name.id, obj);
        match &fd.recv {
            None => {
                // The entry function stays out of the package scope in
                // spirit; keeping it resolvable is harmless and matches the
                // session filter downstream.
                let scope = self.pkg_scope();
                self.ctx.scope_insert(scope, obj);
            }
            Some(recv) => {
                // Bind the method to its receiver's named type.
                if let Some(type_obj) = self.receiver_type_obj(recv) {
                    self.ctx.add_method(type_obj, obj);
                }
            }
        }
    }

    fn receiver_type_obj(&mut self, recv: &Field) -> Option<ObjId> {
        let mut t = &recv.typ;
        if let ExprKind::Star(inner) = &t.kind {
            t = inner;
        }
        let name = t.as_ident()?;
        let (_, obj) = self.ctx.lookup_parent(self.pkg_scope(), &name.name)?;
        self.info.uses.insert(name.id, obj);
        if self.ctx.obj(obj).kind == ObjKind::TypeName {
            Some(obj)
        } else {
            None
        }
    }

    fn declare_package_value(&mut self, tok: Token, vs: &ValueSpec) {
        let declared = vs.typ.as_ref().map(|t| self.resolve_type(t));
        let value_types: Vec<TypeId> = vs.values.iter().map(|v| self.check_expr(v)).collect();
        let spread = if vs.names.len() > 1 && value_types.len() == 1 {
            self.tuple_parts(value_types[0])
        } else {
            value_types.clone()
        };
        for (i, name) in vs.names.iter().enumerate() {
            let typ = declared
                .or_else(|| spread.get(i).copied())
                .unwrap_or_else(|| self.invalid());
            let kind = if tok == Token::Const {
                ObjKind::Const
            } else {
                ObjKind::Var { is_field: false }
            };
            let obj = self.ctx.new_object(Object {
                name: name.name.clone(),
                kind,
                typ,
                pkg: Some(self.pkg),
            });
            self.info.defs.insert(name.id, obj);
            if !name.is_blank() {
                let scope = self.pkg_scope();
                self.ctx.scope_insert(scope, obj);
            }
        }
    }

    fn check_func_body(&mut self, fd: &FuncDecl) {
        let body = match &fd.body {
            Some(body) => body,
            None => return,
        };
        let outer = self.scope;
        let func_scope = self.ctx.new_scope(Some(outer));
        self.scope = func_scope;
        if let Some(recv) = &fd.recv {
            self.bind_params(std::slice::from_ref(recv));
        }
        self.bind_params(&fd.typ.params);
        self.bind_params(&fd.typ.results);
        self.block(body, func_scope);
        self.scope = outer;
    }

    fn bind_params(&mut self, fields: &[Field]) {
        for field in fields {
            let typ = self.resolve_type(&field.typ);
            for name in &field.names {
                let obj = self.ctx.new_var(&name.name, typ, Some(self.pkg));
                self.info.defs.insert(name.id, obj);
                if !name.is_blank() {
                    self.ctx.scope_insert(self.scope, obj);
                }
            }
        }
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn block(&mut self, block: &BlockStmt, scope: ScopeId) {
        self.info.scopes.insert(block.id, scope);
        let outer = self.scope;
        self.scope = scope;
        for stmt in &block.list {
            self.stmt(stmt);
        }
        self.scope = outer;
    }

    fn child_block(&mut self, block: &BlockStmt) {
        let scope = self.ctx.new_scope(Some(self.scope));
        self.block(block, scope);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Decl(decl) => self.local_decl(decl),
            StmtKind::Empty | StmtKind::Branch { .. } | StmtKind::Bad => {}
            StmtKind::Labeled { label, stmt } => {
                let invalid = self.invalid();
                let obj = self.ctx.new_object(Object {
                    name: label.name.clone(),
                    kind: ObjKind::Label,
                    typ: invalid,
                    pkg: Some(self.pkg),
                });
                self.info.defs.insert(label.id, obj);
                self.stmt(stmt);
            }
            StmtKind::Expr(e) => {
                self.check_expr(e);
            }
            StmtKind::Send { chan, value } => {
                let ct = self.check_expr(chan);
                self.check_expr(value);
                if self.chan_elem(ct).is_none() && !self.ctx.is_invalid(ct) {
                    self.error(chan.span, "cannot send to non-channel value");
                }
            }
            StmtKind::IncDec { x, .. } => {
                self.check_expr(x);
            }
            StmtKind::Assign { lhs, tok, rhs } => self.assign(lhs, *tok, rhs),
            StmtKind::Go { call } | StmtKind::Defer { call } => {
                self.check_expr(call);
            }
            StmtKind::Return { results } => {
                for e in results {
                    self.check_expr(e);
                }
            }
            StmtKind::Block(block) => self.child_block(block),
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.check_expr(cond);
                self.child_block(body);
                if let Some(els) = els {
                    self.stmt(els);
                }
                self.scope = outer;
            }
            StmtKind::CaseClause { list, body } => {
                for e in list {
                    self.check_expr(e);
                }
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                for s in body {
                    self.stmt(s);
                }
                self.scope = outer;
            }
            StmtKind::Switch { init, tag, body } => {
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(tag) = tag {
                    self.check_expr(tag);
                }
                for clause in body {
                    self.stmt(clause);
                }
                self.scope = outer;
            }
            StmtKind::TypeSwitch { init, assign, body } => {
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.stmt(assign);
                for clause in body {
                    self.stmt(clause);
                }
                self.scope = outer;
            }
            StmtKind::CommClause { comm, body } => {
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                if let Some(comm) = comm {
                    self.stmt(comm);
                }
                for s in body {
                    self.stmt(s);
                }
                self.scope = outer;
            }
            StmtKind::Select { body } => {
                for clause in body {
                    self.stmt(clause);
                }
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_expr(cond);
                }
                if let Some(post) = post {
                    self.stmt(post);
                }
                self.child_block(body);
                self.scope = outer;
            }
            StmtKind::Range {
                key,
                value,
                tok,
                x,
                body,
            } => {
                let scope = self.ctx.new_scope(Some(self.scope));
                let outer = self.scope;
                self.scope = scope;
                let xt = self.check_expr(x);
                let (kt, vt) = self.range_types(xt);
                let pairs: [(&Option<Expr>, TypeId); 2] = [(key, kt), (value, vt)];
                for (e, t) in pairs {
                    if let Some(e) = e {
                        if *tok == Some(Token::Define) {
                            self.define_ident_expr(e, t);
                        } else {
                            self.check_expr(e);
                        }
                    }
                }
                self.child_block(body);
                self.scope = outer;
            }
        }
    }

    fn local_decl(&mut self, decl: &Decl) {
        match &decl.kind {
            DeclKind::Gen { tok, specs, .. } => {
                for spec in specs {
                    match spec {
                        Spec::Value(vs) => self.local_value_spec(*tok, vs),
                        Spec::Type(ts) => {
                            let underlying = self.resolve_type(&ts.typ);
                            let named = self.ctx.intern(TypeKind::Invalid);
                            let obj = self.ctx.new_object(Object {
                                name: ts.name.name.clone(),
                                kind: ObjKind::TypeName,
                                typ: named,
                                pkg: Some(self.pkg),
                            });
                            self.ctx.set_type_kind(
                                named,
                                TypeKind::Named { obj, underlying },
                            );
                            self.info.defs.insert(ts.name.id, obj);
                            self.ctx.scope_insert(self.scope, obj);
                        }
                        Spec::Import(im) => {
                            // Imports inside the relaxed grammar bind at the
                            // file scope; the converter hoists them.
                            let file_scope = self.scope;
                            self.import_spec(im, file_scope);
                        }
                    }
                }
            }
            DeclKind::Func(_) => {
                // Local func decls only appear in the relaxed grammar and
                // are hoisted before checking.
            }
        }
    }

    fn local_value_spec(&mut self, tok: Token, vs: &ValueSpec) {
        let declared = vs.typ.as_ref().map(|t| self.resolve_type(t));
        let value_types: Vec<TypeId> = vs.values.iter().map(|v| self.check_expr(v)).collect();
        let spread = if vs.names.len() > 1 && value_types.len() == 1 {
            self.tuple_parts(value_types[0])
        } else {
            value_types
        };
        for (i, name) in vs.names.iter().enumerate() {
            let typ = declared
                .or_else(|| spread.get(i).copied())
                .unwrap_or_else(|| self.invalid());
            let kind = if tok == Token::Const {
                ObjKind::Const
            } else {
                ObjKind::Var { is_field: false }
            };
            let obj = self.ctx.new_object(Object {
                name: name.name.clone(),
                kind,
                typ,
                pkg: Some(self.pkg),
            });
            self.info.defs.insert(name.id, obj);
            if !name.is_blank() {
                self.ctx.scope_insert(self.scope, obj);
            }
        }
    }

    fn assign(&mut self, lhs: &[Expr], tok: Token, rhs: &[Expr]) {
        let rhs_types: Vec<TypeId> = rhs.iter().map(|e| self.check_expr(e)).collect();
        if tok != Token::Define {
            for e in lhs {
                self.check_expr(e);
            }
            return;
        }
        let spread = if lhs.len() > 1 && rhs_types.len() == 1 {
            let parts = self.tuple_parts(rhs_types[0]);
            if parts.len() == 1 && lhs.len() == 2 {
                // Comma-ok: v, ok := <-ch / m[k] / x.(T).
                let bool_t = self.ctx.basic(BasicKind::Bool);
                vec![parts[0], bool_t]
            } else {
                parts
            }
        } else {
            rhs_types
        };
        for (i, e) in lhs.iter().enumerate() {
            let typ = spread.get(i).copied().unwrap_or_else(|| self.invalid());
            self.define_ident_expr(e, typ);
        }
    }

    /// Define (or redeclare) the identifier in a `:=` position.
    fn define_ident_expr(&mut self, e: &Expr, typ: TypeId) {
        let ident = match e.as_ident() {
            Some(ident) => ident,
            None => {
                // `a[i], ok := ...` is not valid with define; check as use.
                self.check_expr(e);
                return;
            }
        };
        if ident.is_blank() {
            let obj = self.ctx.new_var("_", typ, Some(self.pkg));
            self.info.defs.insert(ident.id, obj);
            return;
        }
        // Redeclaration in the same scope assigns instead of defining.
        if let Some(existing) = self.ctx.scope_lookup(self.scope, &ident.name) {
            if matches!(self.ctx.obj(existing).kind, ObjKind::Var { .. }) {
                self.info.uses.insert(ident.id, existing);
                self.info.used.insert(existing);
                self.info.types.insert(e.id, self.ctx.obj(existing).typ);
                return;
            }
        }
        let obj = self.ctx.new_var(&ident.name, typ, Some(self.pkg));
        self.info.defs.insert(ident.id, obj);
        self.info.types.insert(e.id, typ);
        self.ctx.scope_insert(self.scope, obj);
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn check_expr(&mut self, e: &Expr) -> TypeId {
        let typ = self.expr_type(e);
        self.info.types.insert(e.id, typ);
        typ
    }

    fn expr_type(&mut self, e: &Expr) -> TypeId {
        match &e.kind {
            ExprKind::Ident(ident) => self.ident_expr(ident),
            ExprKind::BasicLit { tok, .. } => match tok {
                Token::Int => self.ctx.basic(BasicKind::Int),
                Token::Float => self.ctx.basic(BasicKind::Float64),
                Token::Char => self.ctx.basic(BasicKind::Int32),
                Token::Str => self.ctx.basic(BasicKind::Str),
                _ => self.invalid(),
            },
            ExprKind::CompositeLit { typ, elts } => {
                let lit_type = match typ {
                    Some(t) => self.resolve_type(t),
                    None => self.invalid(),
                };
                self.composite_elems(lit_type, elts);
                lit_type
            }
            ExprKind::FuncLit { typ, body } => {
                let sig = self.resolve_signature(typ, None);
                let func_type = self.ctx.intern(TypeKind::Func(sig));
                let outer = self.scope;
                let scope = self.ctx.new_scope(Some(outer));
                self.scope = scope;
                self.bind_params(&typ.params);
                self.bind_params(&typ.results);
                self.block(body, scope);
                self.scope = outer;
                func_type
            }
            ExprKind::Paren(x) => self.check_expr(x),
            ExprKind::Selector { x, sel } => self.selector(x, sel),
            ExprKind::Index { x, index } => {
                let xt = self.check_expr(x);
                self.check_expr(index);
                self.index_type(xt, e.span)
            }
            ExprKind::Slice { x, low, high, max } => {
                let xt = self.check_expr(x);
                for part in [low, high, max].into_iter().flatten() {
                    self.check_expr(part);
                }
                let (base, _) = self.ctx.deref(xt);
                match self.ctx.type_kind(self.ctx.underlying(base)) {
                    TypeKind::Array { elem, .. } => {
                        let elem = *elem;
                        self.ctx.intern(TypeKind::Slice(elem))
                    }
                    _ => xt,
                }
            }
            ExprKind::TypeAssert { x, typ } => {
                self.check_expr(x);
                match typ {
                    Some(t) => self.resolve_type(t),
                    None => self.invalid(), // x.(type) has no value type
                }
            }
            ExprKind::Call {
                fun,
                args,
                ..
            } => self.call(fun, args, e.span),
            ExprKind::Star(x) => {
                // `*T` as type or pointer deref as value.
                if self.is_type_expr(x) {
                    let inner = self.resolve_type(x);
                    return self.ctx.intern(TypeKind::Pointer(inner));
                }
                let xt = self.check_expr(x);
                match self.ctx.type_kind(self.ctx.underlying(xt)) {
                    TypeKind::Pointer(elem) => *elem,
                    _ => {
                        if !self.ctx.is_invalid(xt) {
                            self.error(e.span, "cannot dereference non-pointer value");
                        }
                        self.invalid()
                    }
                }
            }
            ExprKind::Unary { op, x } => {
                let xt = self.check_expr(x);
                match op {
                    Token::Not => self.ctx.basic(BasicKind::Bool),
                    Token::And => self.ctx.intern(TypeKind::Pointer(xt)),
                    Token::Arrow => match self.chan_elem(xt) {
                        Some(elem) => elem,
                        None => {
                            if !self.ctx.is_invalid(xt) {
                                self.error(e.span, "cannot receive from non-channel value");
                            }
                            self.invalid()
                        }
                    },
                    _ => xt,
                }
            }
            ExprKind::Binary { x, op, y } => {
                let xt = self.check_expr(x);
                let yt = self.check_expr(y);
                match op {
                    Token::Eql
                    | Token::Neq
                    | Token::Lss
                    | Token::Leq
                    | Token::Gtr
                    | Token::Geq
                    | Token::LogAnd
                    | Token::LogOr => self.ctx.basic(BasicKind::Bool),
                    _ => {
                        if self.ctx.is_invalid(xt) {
                            yt
                        } else {
                            xt
                        }
                    }
                }
            }
            ExprKind::KeyValue { value, .. } => self.check_expr(value),
            ExprKind::ArrayType { .. }
            | ExprKind::StructType { .. }
            | ExprKind::FuncType(_)
            | ExprKind::InterfaceType { .. }
            | ExprKind::MapType { .. }
            | ExprKind::ChanType { .. } => self.resolve_type(e),
            ExprKind::Ellipsis { .. } => self.invalid(),
            ExprKind::Bad => self.invalid(),
        }
    }

    fn ident_expr(&mut self, ident: &Ident) -> TypeId {
        if ident.is_blank() {
            return self.invalid();
        }
        match self.ctx.lookup_parent(self.scope, &ident.name) {
            Some((_, obj)) => {
                self.info.uses.insert(ident.id, obj);
                self.info.used.insert(obj);
                self.ctx.obj(obj).typ
            }
            None => {
                self.error(ident.span, format!("undefined: {}", ident.name));
                self.invalid()
            }
        }
    }

    fn selector(&mut self, x: &Expr, sel: &Ident) -> TypeId {
        // Package-qualified reference?
        if let Some(base) = x.as_ident() {
            if let Some((_, obj)) = self.ctx.lookup_parent(self.scope, &base.name) {
                if let ObjKind::PkgName(target) = self.ctx.obj(obj).kind {
                    self.info.uses.insert(base.id, obj);
                    self.info.used.insert(obj);
                    self.info.types.insert(x.id, self.invalid());
                    let target_scope = self.ctx.pkg(target).scope;
                    match self.ctx.scope_lookup(target_scope, &sel.name) {
                        Some(member) => {
                            // Unexported cross-package access is allowed only
                            // into cell packages (renamed before compilation).
                            let member_obj = self.ctx.obj(member);
                            if !member_obj.exported() && !self.ctx.pkg(target).is_cell {
                                self.error(
                                    sel.span,
                                    format!(
                                        "cannot refer to unexported name {}.{}",
                                        base.name, sel.name
                                    ),
                                );
                            }
                            self.info.uses.insert(sel.id, member);
                            self.info.used.insert(member);
                            return self.ctx.obj(member).typ;
                        }
                        None => {
                            self.error(
                                sel.span,
                                format!("undefined: {}.{}", base.name, sel.name),
                            );
                            return self.invalid();
                        }
                    }
                }
            }
        }
        let xt = self.check_expr(x);
        if self.ctx.is_invalid(xt) {
            return self.invalid();
        }
        match lookup_field_or_method(self.ctx, xt, &sel.name) {
            Some(member) => {
                self.info.uses.insert(sel.id, member);
                self.info.used.insert(member);
                self.ctx.obj(member).typ
            }
            None => {
                let rendered = self.ctx.display_type(xt);
                self.error(
                    sel.span,
                    format!(
                        "{}.{} undefined (type {} has no field or method {})",
                        crate::printer::print_expr(x),
                        sel.name,
                        rendered,
                        sel.name
                    ),
                );
                self.invalid()
            }
        }
    }

    fn call(&mut self, fun: &Expr, args: &[Expr], span: Span) -> TypeId {
        // Builtin?
        if let Some(ident) = fun.as_ident() {
            if let Some((_, obj)) = self.ctx.lookup_parent(self.scope, &ident.name) {
                if let ObjKind::Builtin(builtin) = self.ctx.obj(obj).kind {
                    self.info.uses.insert(ident.id, obj);
                    self.info.used.insert(obj);
                    return self.builtin_call(builtin, args, span);
                }
            }
        }
        let fun_type = self.check_expr(fun);
        // Conversion: the callee is a type.
        if self.expr_is_type(fun) {
            for arg in args {
                self.check_expr(arg);
            }
            return fun_type;
        }
        for arg in args {
            self.check_expr(arg);
        }
        match self.ctx.type_kind(self.ctx.underlying(fun_type)).clone() {
            TypeKind::Func(sig) => self.result_type(&sig),
            TypeKind::Invalid => self.invalid(),
            _ => {
                self.error(span, "cannot call non-function value");
                self.invalid()
            }
        }
    }

    fn result_type(&mut self, sig: &Signature) -> TypeId {
        match sig.results.len() {
            0 => self.ctx.intern(TypeKind::Tuple(vec![])),
            1 => self.ctx.obj(sig.results[0]).typ,
            _ => {
                let parts = sig.results.iter().map(|r| self.ctx.obj(*r).typ).collect();
                self.ctx.intern(TypeKind::Tuple(parts))
            }
        }
    }

    fn builtin_call(&mut self, builtin: Builtin, args: &[Expr], span: Span) -> TypeId {
        match builtin {
            Builtin::Len | Builtin::Cap => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.ctx.basic(BasicKind::Int)
            }
            Builtin::Make => {
                if args.is_empty() {
                    self.error(span, "missing argument to make");
                    return self.invalid();
                }
                let typ = self.resolve_type(&args[0]);
                self.info.types.insert(args[0].id, typ);
                for arg in &args[1..] {
                    self.check_expr(arg);
                }
                typ
            }
            Builtin::New => {
                if args.is_empty() {
                    self.error(span, "missing argument to new");
                    return self.invalid();
                }
                let typ = self.resolve_type(&args[0]);
                self.info.types.insert(args[0].id, typ);
                self.ctx.intern(TypeKind::Pointer(typ))
            }
            Builtin::Append => {
                let first = args
                    .first()
                    .map(|a| self.check_expr(a))
                    .unwrap_or_else(|| self.invalid());
                for arg in args.iter().skip(1) {
                    self.check_expr(arg);
                }
                first
            }
            Builtin::Copy => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.ctx.basic(BasicKind::Int)
            }
            Builtin::Recover => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.ctx.intern(TypeKind::Interface {
                    methods: vec![],
                    embeddeds: vec![],
                })
            }
            Builtin::Delete
            | Builtin::Close
            | Builtin::Panic
            | Builtin::Print
            | Builtin::Println => {
                for arg in args {
                    self.check_expr(arg);
                }
                self.ctx.intern(TypeKind::Tuple(vec![]))
            }
        }
    }

    fn composite_elems(&mut self, lit_type: TypeId, elts: &[Expr]) {
        let under = self.ctx.underlying(lit_type);
        let struct_fields: Option<Vec<ObjId>> = match self.ctx.type_kind(under) {
            TypeKind::Struct { fields } => Some(fields.clone()),
            _ => None,
        };
        for (i, elt) in elts.iter().enumerate() {
            match &elt.kind {
                ExprKind::KeyValue { key, value } => {
                    // Struct field keys resolve to field objects.
                    if let (Some(fields), Some(key_ident)) =
                        (&struct_fields, key.as_ident())
                    {
                        if let Some(field) = fields
                            .iter()
                            .find(|f| self.ctx.obj(**f).name == key_ident.name)
                        {
                            self.info.uses.insert(key_ident.id, *field);
                            self.info.used.insert(*field);
                        }
                    } else {
                        self.check_expr(key);
                    }
                    self.check_expr(value);
                    let vt = self.info.types.get(&value.id).copied();
                    if let Some(vt) = vt {
                        self.info.types.insert(elt.id, vt);
                    }
                }
                _ => {
                    let et = self.check_expr(elt);
                    // Positional struct literals type-check arity loosely.
                    if let Some(fields) = &struct_fields {
                        if i >= fields.len() {
                            self.error(elt.span, "too many values in struct literal");
                        }
                    }
                    let _ = et;
                }
            }
        }
    }

    fn index_type(&mut self, xt: TypeId, span: Span) -> TypeId {
        let (base, _) = self.ctx.deref(xt);
        match self.ctx.type_kind(self.ctx.underlying(base)).clone() {
            TypeKind::Slice(elem) | TypeKind::Array { elem, .. } => elem,
            TypeKind::Map { value, .. } => value,
            TypeKind::Basic(BasicKind::Str) => self.ctx.basic(BasicKind::Uint8),
            TypeKind::Invalid => self.invalid(),
            _ => {
                self.error(span, "cannot index value");
                self.invalid()
            }
        }
    }

    fn chan_elem(&self, t: TypeId) -> Option<TypeId> {
        match self.ctx.type_kind(self.ctx.underlying(t)) {
            TypeKind::Chan { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    fn range_types(&mut self, xt: TypeId) -> (TypeId, TypeId) {
        let int_t = self.ctx.basic(BasicKind::Int);
        match self.ctx.type_kind(self.ctx.underlying(xt)).clone() {
            TypeKind::Slice(elem) | TypeKind::Array { elem, .. } => (int_t, elem),
            TypeKind::Map { key, value } => (key, value),
            TypeKind::Basic(BasicKind::Str) => (int_t, self.ctx.basic(BasicKind::Int32)),
            TypeKind::Chan { elem, .. } => (elem, self.invalid()),
            _ => (self.invalid(), self.invalid()),
        }
    }

    fn tuple_parts(&self, t: TypeId) -> Vec<TypeId> {
        match self.ctx.type_kind(t) {
            TypeKind::Tuple(parts) => parts.clone(),
            _ => vec![t],
        }
    }

    // ── Types from expressions ───────────────────────────────────────────

    /// Whether `e` denotes a type in this scope (for conversions and `*T`).
    fn is_type_expr(&self, e: &Expr) -> bool {
        match &e.kind {
            ExprKind::Ident(ident) => self
                .ctx
                .lookup_parent(self.scope, &ident.name)
                .map(|(_, obj)| self.ctx.obj(obj).kind == ObjKind::TypeName)
                .unwrap_or(false),
            ExprKind::Selector { x, sel } => {
                let base = match x.as_ident() {
                    Some(base) => base,
                    None => return false,
                };
                match self.ctx.lookup_parent(self.scope, &base.name) {
                    Some((_, obj)) => match self.ctx.obj(obj).kind {
                        ObjKind::PkgName(target) => {
                            let scope = self.ctx.pkg(target).scope;
                            self.ctx
                                .scope_lookup(scope, &sel.name)
                                .map(|m| self.ctx.obj(m).kind == ObjKind::TypeName)
                                .unwrap_or(false)
                        }
                        _ => false,
                    },
                    None => false,
                }
            }
            ExprKind::Paren(x) => self.is_type_expr(x),
            ExprKind::ArrayType { .. }
            | ExprKind::StructType { .. }
            | ExprKind::FuncType(_)
            | ExprKind::InterfaceType { .. }
            | ExprKind::MapType { .. }
            | ExprKind::ChanType { .. } => true,
            ExprKind::Star(x) => self.is_type_expr(x),
            _ => false,
        }
    }

    /// Like `is_type_expr` but consults recorded uses (valid after the
    /// expression has been checked).
    fn expr_is_type(&self, e: &Expr) -> bool {
        match &e.kind {
            ExprKind::Ident(ident) => self
                .info
                .uses
                .get(&ident.id)
                .map(|obj| self.ctx.obj(*obj).kind == ObjKind::TypeName)
                .unwrap_or(false),
            ExprKind::Selector { sel, .. } => self
                .info
                .uses
                .get(&sel.id)
                .map(|obj| self.ctx.obj(*obj).kind == ObjKind::TypeName)
                .unwrap_or(false),
            ExprKind::Paren(x) => self.expr_is_type(x),
            ExprKind::ArrayType { .. }
            | ExprKind::StructType { .. }
            | ExprKind::FuncType(_)
            | ExprKind::InterfaceType { .. }
            | ExprKind::MapType { .. }
            | ExprKind::ChanType { .. } => true,
            ExprKind::Star(x) => self.expr_is_type(x),
            _ => false,
        }
    }

    fn resolve_signature(&mut self, ft: &FuncType, recv: Option<&Field>) -> Signature {
        let mut params = Vec::new();
        let mut variadic = false;
        for field in &ft.params {
            let (typ, is_variadic) = match &field.typ.kind {
                ExprKind::Ellipsis { elt } => {
                    let elem = elt
                        .as_ref()
                        .map(|t| self.resolve_type(t))
                        .unwrap_or_else(|| self.invalid());
                    (self.ctx.intern(TypeKind::Slice(elem)), true)
                }
                _ => (self.resolve_type(&field.typ), false),
            };
            variadic = variadic || is_variadic;
            if field.names.is_empty() {
                params.push(self.ctx.new_var("", typ, Some(self.pkg)));
            } else {
                for name in &field.names {
                    params.push(self.ctx.new_var(&name.name, typ, Some(self.pkg)));
                }
            }
        }
        let mut results = Vec::new();
        for field in &ft.results {
            let typ = self.resolve_type(&field.typ);
            if field.names.is_empty() {
                results.push(self.ctx.new_var("", typ, Some(self.pkg)));
            } else {
                for name in &field.names {
                    results.push(self.ctx.new_var(&name.name, typ, Some(self.pkg)));
                }
            }
        }
        let recv = recv.map(|field| {
            let typ = self.resolve_type(&field.typ);
            let name = field
                .names
                .first()
                .map(|n| n.name.as_str())
                .unwrap_or("");
            self.ctx.new_var(name, typ, Some(self.pkg))
        });
        Signature {
            params,
            results,
            variadic,
            recv,
        }
    }

    pub(crate) fn resolve_type(&mut self, e: &Expr) -> TypeId {
        let typ = self.resolve_type_inner(e);
        self.info.types.insert(e.id, typ);
        typ
    }

    fn resolve_type_inner(&mut self, e: &Expr) -> TypeId {
        match &e.kind {
            ExprKind::Ident(ident) => match self.ctx.lookup_parent(self.scope, &ident.name) {
                Some((_, obj)) => {
                    self.info.uses.insert(ident.id, obj);
                    self.info.used.insert(obj);
                    if self.ctx.obj(obj).kind == ObjKind::TypeName {
                        self.ctx.obj(obj).typ
                    } else {
                        self.error(ident.span, format!("{} is not a type", ident.name));
                        self.invalid()
                    }
                }
                None => {
                    self.error(ident.span, format!("undefined: {}", ident.name));
                    self.invalid()
                }
            },
            ExprKind::Selector { x, sel } => {
                let base = match x.as_ident() {
                    Some(base) => base,
                    None => {
                        self.error(e.span, "invalid type expression");
                        return self.invalid();
                    }
                };
                match self.ctx.lookup_parent(self.scope, &base.name) {
                    Some((_, obj)) => match self.ctx.obj(obj).kind {
                        ObjKind::PkgName(target) => {
                            self.info.uses.insert(base.id, obj);
                            self.info.used.insert(obj);
                            let scope = self.ctx.pkg(target).scope;
                            match self.ctx.scope_lookup(scope, &sel.name) {
                                Some(member)
                                    if self.ctx.obj(member).kind == ObjKind::TypeName =>
                                {
                                    self.info.uses.insert(sel.id, member);
                                    self.info.used.insert(member);
                                    self.ctx.obj(member).typ
                                }
                                _ => {
                                    self.error(
                                        sel.span,
                                        format!("undefined type: {}.{}", base.name, sel.name),
                                    );
                                    self.invalid()
                                }
                            }
                        }
                        _ => {
                            self.error(e.span, format!("{} is not a package", base.name));
                            self.invalid()
                        }
                    },
                    None => {
                        self.error(base.span, format!("undefined: {}", base.name));
                        self.invalid()
                    }
                }
            }
            ExprKind::Paren(x) => self.resolve_type(x),
            ExprKind::Star(x) => {
                let inner = self.resolve_type(x);
                self.ctx.intern(TypeKind::Pointer(inner))
            }
            ExprKind::ArrayType { len, elt } => {
                let elem = self.resolve_type(elt);
                match len {
                    None => self.ctx.intern(TypeKind::Slice(elem)),
                    Some(len_expr) => {
                        let n = const_len(len_expr);
                        if n.is_some() {
                            self.ctx.intern(TypeKind::Array { len: n, elem })
                        } else {
                            self.check_expr(len_expr);
                            self.ctx.intern(TypeKind::Array { len: None, elem })
                        }
                    }
                }
            }
            ExprKind::MapType { key, value } => {
                let key = self.resolve_type(key);
                let value = self.resolve_type(value);
                self.ctx.intern(TypeKind::Map { key, value })
            }
            ExprKind::ChanType { dir, value } => {
                let elem = self.resolve_type(value);
                self.ctx.intern(TypeKind::Chan { dir: *dir, elem })
            }
            ExprKind::FuncType(ft) => {
                let sig = self.resolve_signature(ft, None);
                self.ctx.intern(TypeKind::Func(sig))
            }
            ExprKind::StructType { fields } => {
                let mut field_objs = Vec::new();
                for field in fields {
                    let typ = self.resolve_type(&field.typ);
                    if field.names.is_empty() {
                        // Embedded field: named after its type.
                        let name = embedded_field_name(&field.typ);
                        let obj = self.ctx.new_field(&name, typ, Some(self.pkg));
                        field_objs.push(obj);
                    } else {
                        for name in &field.names {
                            let obj = self.ctx.new_field(&name.name, typ, Some(self.pkg));
                            self.info.defs.insert(name.id, obj);
                            field_objs.push(obj);
                        }
                    }
                }
                self.ctx.intern(TypeKind::Struct { fields: field_objs })
            }
            ExprKind::InterfaceType { methods } => {
                let mut method_objs = Vec::new();
                let mut embeddeds = Vec::new();
                for field in methods {
                    if field.names.is_empty() {
                        embeddeds.push(self.resolve_type(&field.typ));
                        continue;
                    }
                    let typ = self.resolve_type(&field.typ);
                    let obj = self.ctx.new_object(Object {
                        name: field.names[0].name.clone(),
                        kind: ObjKind::Func,
                        typ,
                        pkg: Some(self.pkg),
                    });
                    self.info.defs.insert(field.names[0].id, obj);
                    method_objs.push(obj);
                }
                self.ctx.intern(TypeKind::Interface {
                    methods: method_objs,
                    embeddeds,
                })
            }
            ExprKind::Ellipsis { elt } => match elt {
                Some(t) => {
                    let elem = self.resolve_type(t);
                    self.ctx.intern(TypeKind::Slice(elem))
                }
                None => self.invalid(),
            },
            _ => {
                self.error(e.span, "invalid type expression");
                self.invalid()
            }
        }
    }
}

fn const_len(e: &Expr) -> Option<u64> {
    match &e.kind {
        ExprKind::BasicLit {
            tok: Token::Int,
            value,
        } => value.parse().ok(),
        _ => None,
    }
}

fn embedded_field_name(typ: &Expr) -> String {
    match &typ.kind {
        ExprKind::Ident(id) => id.name.clone(),
        ExprKind::Star(inner) => embedded_field_name(inner),
        ExprKind::Selector { sel, .. } => sel.name.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests;

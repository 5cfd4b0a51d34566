//! Cooperative-cancellation injection.
//!
//! Rules:
//! - a cancellation check opens every function body not bound to `defer`;
//! - a check lands between two consecutive heavy statements in a block (a
//!   statement is heavy when its subtree outside function literals contains
//!   a call);
//! - loop, branch, and switch bodies inherit the heaviness of their header;
//! - channel sends become a `select` racing the send against context done;
//! - `select` statements without a `default` gain a context-done clause;
//! - channel receives outside select clauses are extracted into synthesized
//!   helper functions whose `select` the rules above then guard.

use std::collections::HashSet;

use crate::ast::*;
use crate::error::GobletError;
use crate::parser::parse_expr_str;
use crate::stdlib;
use crate::token::Token;
use crate::types::{PkgId, TypeCtx, TypeKind};

use super::imports::ImportManager;
use super::namepick::NamePicker;
use super::rename::{check_file_in_phase2, CheckedPhase2};
use super::rewrite::rewrite_file_exprs;
use super::Config;

// ── Heavy-statement classification ───────────────────────────────────────

/// Whether the expression contains a call, not descending into function
/// literals (their bodies are guarded separately).
fn contains_call(e: &Expr) -> bool {
    let mut found = false;
    visit_expr(e, &mut |e| {
        if found {
            return false;
        }
        match &e.kind {
            ExprKind::Call { .. } => {
                found = true;
                false
            }
            ExprKind::FuncLit { .. } => false,
            _ => true,
        }
    });
    found
}

fn is_heavy_stmt(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Assign { lhs, rhs, .. } => {
            lhs.iter().chain(rhs.iter()).any(contains_call)
        }
        StmtKind::Expr(e) => contains_call(e),
        StmtKind::For { init, .. } => init.as_deref().map(is_heavy_stmt).unwrap_or(false),
        StmtKind::Go { call } => match &call.kind {
            ExprKind::Call { fun, args, .. } => {
                contains_call(fun) || args.iter().any(contains_call)
            }
            _ => false,
        },
        StmtKind::If { init, cond, .. } => {
            init.as_deref().map(is_heavy_stmt).unwrap_or(false) || contains_call(cond)
        }
        StmtKind::Return { results } => results.iter().any(contains_call),
        StmtKind::Switch { init, tag, body } => {
            init.as_deref().map(is_heavy_stmt).unwrap_or(false)
                || tag.as_ref().map(contains_call).unwrap_or(false)
                || body.iter().any(|clause| match &clause.kind {
                    StmtKind::CaseClause { list, .. } => list.iter().any(contains_call),
                    _ => false,
                })
        }
        _ => false,
    }
}

// ── Injection ────────────────────────────────────────────────────────────

struct Injector<'a, 'b> {
    ctx: &'a TypeCtx,
    immg: &'b mut ImportManager,
    runtime_pkg: PkgId,
}

impl Injector<'_, '_> {
    fn alias(&mut self) -> String {
        self.immg.short_name(self.ctx, self.runtime_pkg)
    }

    /// `<runtime>.ExitIfCtxDone()`
    fn exit_check(&mut self) -> Stmt {
        let alias = self.alias();
        Stmt::new(StmtKind::Expr(Expr::call(
            Expr::qualified(&alias, "ExitIfCtxDone"),
            vec![],
        )))
    }

    /// `case <-<runtime>.GetExecContext().Done(): panic(<runtime>.Bailout)`
    fn exit_comm_clause(&mut self) -> Stmt {
        let alias = self.alias();
        let done = Expr::call(
            Expr::selector(
                Expr::call(Expr::qualified(&alias, "GetExecContext"), vec![]),
                Ident::new("Done"),
            ),
            vec![],
        );
        let recv = Expr::new(ExprKind::Unary {
            op: Token::Arrow,
            x: Box::new(done),
        });
        let bail = Expr::call(
            Expr::ident("panic"),
            vec![Expr::qualified(&alias, "Bailout")],
        );
        Stmt::new(StmtKind::CommClause {
            comm: Some(Box::new(Stmt::new(StmtKind::Expr(recv)))),
            body: vec![Stmt::new(StmtKind::Expr(bail))],
        })
    }

    fn inject_block(&mut self, block: &mut BlockStmt, inject_head: bool, default_flag: bool) {
        self.inject_stmt_list(&mut block.list, inject_head, default_flag);
    }

    fn inject_stmt_list(
        &mut self,
        list: &mut Vec<Stmt>,
        inject_head: bool,
        default_flag: bool,
    ) {
        let old = std::mem::take(list);
        let mut new_list = Vec::with_capacity(2 * old.len() + 1);
        let mut flag = default_flag;
        if inject_head {
            new_list.push(self.exit_check());
            flag = false;
        }
        for mut stmt in old {
            if let StmtKind::Send { .. } = stmt.kind {
                // ch <- v  ⇒  select { case ch <- v: ; case <-Done(): panic }
                let guard = self.exit_comm_clause();
                let send_clause = Stmt::new(StmtKind::CommClause {
                    comm: Some(Box::new(stmt)),
                    body: vec![],
                });
                new_list.push(Stmt::new(StmtKind::Select {
                    body: vec![send_clause, guard],
                }));
                flag = false;
                continue;
            }
            let heavy = self.inject_stmt(&mut stmt, flag);
            if heavy {
                if flag {
                    new_list.push(self.exit_check());
                }
                flag = true;
            }
            new_list.push(stmt);
        }
        *list = new_list;
    }

    /// Returns whether the statement was heavy.
    fn inject_stmt(&mut self, stmt: &mut Stmt, prev_heavy: bool) -> bool {
        let heavy = is_heavy_stmt(stmt);
        match &mut stmt.kind {
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond);
                }
                if let Some(post) = post {
                    self.walk_stmt(post);
                }
                self.inject_block(body, true, heavy);
            }
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                self.walk_expr(cond);
                self.inject_block(body, false, heavy);
                if let Some(els) = els {
                    if let StmtKind::Block(block) = &mut els.kind {
                        self.inject_stmt_list(&mut block.list, false, heavy);
                    } else {
                        self.inject_stmt(els, heavy);
                    }
                }
            }
            StmtKind::Switch { init, tag, body } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(tag) = tag {
                    self.walk_expr(tag);
                }
                for clause in body {
                    if let StmtKind::CaseClause { body, .. } = &mut clause.kind {
                        self.inject_stmt_list(body, false, heavy);
                    }
                }
            }
            StmtKind::Block(block) => {
                self.inject_block(block, true, prev_heavy);
            }
            StmtKind::Defer { .. } => {
                // Deferred work runs at unwind time; interrupting it would
                // break cleanup.
            }
            _ => self.walk_stmt(stmt),
        }
        heavy
    }

    /// Default traversal: guard nested function literals and selects
    /// without between-statement insertion at this level.
    fn walk_stmt(&mut self, stmt: &mut Stmt) {
        if let StmtKind::Select { body } = &mut stmt.kind {
            let has_default = body.iter().any(|clause| {
                matches!(&clause.kind, StmtKind::CommClause { comm: None, .. })
            });
            if !has_default {
                let guard = self.exit_comm_clause();
                body.push(guard);
            }
        }
        match &mut stmt.kind {
            StmtKind::Decl(decl) => self.walk_decl(decl),
            StmtKind::Empty | StmtKind::Branch { .. } | StmtKind::Bad => {}
            StmtKind::Labeled { stmt, .. } => {
                self.inject_stmt(stmt, false);
            }
            StmtKind::Expr(e) => self.walk_expr(e),
            StmtKind::Send { chan, value } => {
                self.walk_expr(chan);
                self.walk_expr(value);
            }
            StmtKind::IncDec { x, .. } => self.walk_expr(x),
            StmtKind::Assign { lhs, rhs, .. } => {
                for e in lhs.iter_mut().chain(rhs.iter_mut()) {
                    self.walk_expr(e);
                }
            }
            StmtKind::Go { call } => self.walk_expr(call),
            StmtKind::Defer { .. } => {}
            StmtKind::Return { results } => {
                for e in results {
                    self.walk_expr(e);
                }
            }
            StmtKind::Block(block) => self.inject_block(block, true, false),
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                self.walk_expr(cond);
                self.inject_block(body, false, false);
                if let Some(els) = els {
                    self.walk_stmt(els);
                }
            }
            StmtKind::CaseClause { list, body } => {
                for e in list {
                    self.walk_expr(e);
                }
                for s in body {
                    self.walk_stmt(s);
                }
            }
            StmtKind::Switch { init, tag, body } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(tag) = tag {
                    self.walk_expr(tag);
                }
                for clause in body {
                    self.walk_stmt(clause);
                }
            }
            StmtKind::TypeSwitch { init, assign, body } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                self.walk_stmt(assign);
                for clause in body {
                    self.walk_stmt(clause);
                }
            }
            StmtKind::CommClause { comm, body } => {
                if let Some(comm) = comm {
                    self.walk_stmt(comm);
                }
                for s in body {
                    self.walk_stmt(s);
                }
            }
            StmtKind::Select { body } => {
                for clause in body {
                    self.walk_stmt(clause);
                }
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond);
                }
                if let Some(post) = post {
                    self.walk_stmt(post);
                }
                self.inject_block(body, true, false);
            }
            StmtKind::Range { key, value, x, body, .. } => {
                for e in [key, value].into_iter().flatten() {
                    self.walk_expr(e);
                }
                self.walk_expr(x);
                self.inject_block(body, true, false);
            }
        }
    }

    fn walk_expr(&mut self, e: &mut Expr) {
        match &mut e.kind {
            ExprKind::FuncLit { body, .. } => {
                self.inject_block(body, true, false);
            }
            ExprKind::Ident(_) | ExprKind::BasicLit { .. } | ExprKind::Bad => {}
            ExprKind::CompositeLit { typ, elts } => {
                if let Some(typ) = typ {
                    self.walk_expr(typ);
                }
                for elt in elts {
                    self.walk_expr(elt);
                }
            }
            ExprKind::Paren(x) | ExprKind::Star(x) => self.walk_expr(x),
            ExprKind::Selector { x, .. } => self.walk_expr(x),
            ExprKind::Index { x, index } => {
                self.walk_expr(x);
                self.walk_expr(index);
            }
            ExprKind::Slice { x, low, high, max } => {
                self.walk_expr(x);
                for part in [low, high, max].into_iter().flatten() {
                    self.walk_expr(part);
                }
            }
            ExprKind::TypeAssert { x, typ } => {
                self.walk_expr(x);
                if let Some(typ) = typ {
                    self.walk_expr(typ);
                }
            }
            ExprKind::Call { fun, args, .. } => {
                self.walk_expr(fun);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            ExprKind::Unary { x, .. } => self.walk_expr(x),
            ExprKind::Binary { x, y, .. } => {
                self.walk_expr(x);
                self.walk_expr(y);
            }
            ExprKind::KeyValue { key, value } => {
                self.walk_expr(key);
                self.walk_expr(value);
            }
            ExprKind::ArrayType { .. }
            | ExprKind::StructType { .. }
            | ExprKind::FuncType(_)
            | ExprKind::InterfaceType { .. }
            | ExprKind::MapType { .. }
            | ExprKind::ChanType { .. }
            | ExprKind::Ellipsis { .. } => {}
        }
    }

    fn walk_decl(&mut self, decl: &mut Decl) {
        match &mut decl.kind {
            DeclKind::Func(fd) => {
                if let Some(body) = &mut fd.body {
                    self.inject_block(body, true, false);
                }
            }
            DeclKind::Gen { specs, .. } => {
                for spec in specs {
                    if let Spec::Value(vs) = spec {
                        for value in &mut vs.values {
                            self.walk_expr(value);
                        }
                    }
                }
            }
        }
    }
}

pub fn inject_auto_exit_to_file(ctx: &mut TypeCtx, file: &mut File, immg: &mut ImportManager) {
    let runtime_pkg = match stdlib::import(ctx, stdlib::runtime_pkg_path()) {
        Some(pkg) => pkg,
        None => return,
    };
    let ctx: &TypeCtx = ctx;
    let mut injector = Injector {
        ctx,
        immg,
        runtime_pkg,
    };
    let mut decls = std::mem::take(&mut file.decls);
    for decl in &mut decls {
        injector.walk_decl(decl);
    }
    file.decls = decls;
}

// ── Receive-expression extraction ────────────────────────────────────────

/// Receive expressions appearing as a select clause's communication stay in
/// place; everything else is rewritten through a synthesized helper.
fn select_comm_expr_ids(file: &File) -> HashSet<NodeId> {
    let mut ids = HashSet::new();
    for_each_func_stmt(file, &mut |stmt| {
        if let StmtKind::Select { body } = &stmt.kind {
            for clause in body {
                if let StmtKind::CommClause {
                    comm: Some(comm), ..
                } = &clause.kind
                {
                    match &comm.kind {
                        StmtKind::Assign { rhs, .. } => {
                            for e in rhs {
                                ids.insert(e.id);
                            }
                        }
                        StmtKind::Expr(e) => {
                            ids.insert(e.id);
                        }
                        _ => {}
                    }
                }
            }
        }
    });
    ids
}

/// Receive expressions whose result feeds a two-value assignment (the
/// comma-ok form) need a two-result helper.
fn comma_ok_recv_ids(file: &File) -> HashSet<NodeId> {
    let mut ids = HashSet::new();
    for_each_func_stmt(file, &mut |stmt| {
        if let StmtKind::Assign { lhs, rhs, .. } = &stmt.kind {
            if lhs.len() == 2 && rhs.len() == 1 {
                if let ExprKind::Unary {
                    op: Token::Arrow, ..
                } = &rhs[0].kind
                {
                    ids.insert(rhs[0].id);
                }
            }
        }
    });
    ids
}

fn for_each_func_stmt(file: &File, f: &mut dyn FnMut(&Stmt)) {
    for decl in &file.decls {
        if let DeclKind::Func(fd) = &decl.kind {
            if let Some(body) = &fd.body {
                walk_stmts(body, f);
            }
        }
    }
}

fn walk_stmts(block: &BlockStmt, f: &mut dyn FnMut(&Stmt)) {
    fn rec(stmt: &Stmt, f: &mut dyn FnMut(&Stmt)) {
        f(stmt);
        // Function literals may hide statements inside any expression
        // position; re-scanning nested literals twice is harmless since
        // consumers collect into sets.
        visit_stmt_exprs(stmt, &mut |e| {
            if let ExprKind::FuncLit { body, .. } = &e.kind {
                for s in &body.list {
                    rec(s, f);
                }
            }
            true
        });
        match &stmt.kind {
            StmtKind::Labeled { stmt, .. } => rec(stmt, f),
            StmtKind::Block(b) => {
                for s in &b.list {
                    rec(s, f);
                }
            }
            StmtKind::If { init, body, els, .. } => {
                if let Some(init) = init {
                    rec(init, f);
                }
                for s in &body.list {
                    rec(s, f);
                }
                if let Some(els) = els {
                    rec(els, f);
                }
            }
            StmtKind::For { init, post, body, .. } => {
                for s in [init, post].into_iter().flatten() {
                    rec(s, f);
                }
                for s in &body.list {
                    rec(s, f);
                }
            }
            StmtKind::Range { body, .. } => {
                for s in &body.list {
                    rec(s, f);
                }
            }
            StmtKind::Switch { init, body, .. } => {
                if let Some(init) = init {
                    rec(init, f);
                }
                for s in body {
                    rec(s, f);
                }
            }
            StmtKind::TypeSwitch { init, assign, body } => {
                if let Some(init) = init {
                    rec(init, f);
                }
                rec(assign, f);
                for s in body {
                    rec(s, f);
                }
            }
            StmtKind::Select { body } => {
                for s in body {
                    rec(s, f);
                }
            }
            StmtKind::CaseClause { body, .. } => {
                for s in body {
                    rec(s, f);
                }
            }
            StmtKind::CommClause { comm, body } => {
                if let Some(comm) = comm {
                    rec(comm, f);
                }
                for s in body {
                    rec(s, f);
                }
            }
            _ => {}
        }
    }
    for s in &block.list {
        rec(s, f);
    }
}

/// Extract channel receives into synthesized helpers so the auto-exit pass
/// can guard them, then re-check the rewritten unit.
pub fn may_wrap_recv_op(
    ctx: &mut TypeCtx,
    conf: &Config,
    file: &mut File,
    checked: CheckedPhase2,
) -> Result<CheckedPhase2, GobletError> {
    let in_select = select_comm_expr_ids(file);
    let comma_ok = comma_ok_recv_ids(file);
    let mut picker = NamePicker::for_file(file);
    let mut immg = ImportManager::new(ctx, checked.pkg, file, &checked.info);
    let info = &checked.info;

    let mut new_decls: Vec<Decl> = Vec::new();
    let mut rewritten = false;
    let mut failure: Option<GobletError> = None;
    {
        let ctx_ref: &TypeCtx = ctx;
        rewrite_file_exprs(file, &mut |e| {
            if failure.is_some() || in_select.contains(&e.id) {
                return e;
            }
            let (x_id, elem_ok) = match &e.kind {
                ExprKind::Unary {
                    op: Token::Arrow,
                    x,
                } => (x.id, comma_ok.contains(&e.id)),
                _ => return e,
            };
            let chan_type = match info.types.get(&x_id) {
                Some(t) => *t,
                None => return e,
            };
            let elem = match ctx_ref.type_kind(ctx_ref.underlying(chan_type)) {
                TypeKind::Chan { elem, .. } => *elem,
                _ => return e,
            };
            let mut type_expr = |t| {
                let mut qual = |pkg: PkgId| immg.short_name(ctx_ref, pkg);
                let s = ctx_ref.type_string(t, &mut qual);
                parse_expr_str(&s).map_err(|err| GobletError::Rewrite {
                    message: format!("failed to parse type expr {:?}: {}", s, err),
                })
            };
            let chan_expr = match type_expr(chan_type) {
                Ok(expr) => expr,
                Err(err) => {
                    failure = Some(err);
                    return e;
                }
            };
            let elem_expr = match type_expr(elem) {
                Ok(expr) => expr,
                Err(err) => {
                    failure = Some(err);
                    return e;
                }
            };
            let name = picker.pick("recvChan");
            new_decls.push(make_chan_recv_wrapper(&name, chan_expr, elem_expr, elem_ok));
            rewritten = true;
            let x = match e.kind {
                ExprKind::Unary { x, .. } => *x,
                _ => unreachable!(),
            };
            Expr::call(Expr::ident(name), vec![x])
        });
    }
    if let Some(err) = failure {
        return Err(err);
    }
    if !rewritten {
        return Ok(checked);
    }
    file.decls.extend(new_decls);
    if !immg.injected.is_empty() {
        let mut decls = std::mem::take(&mut immg.injected);
        decls.append(&mut file.decls);
        file.decls = decls;
    }
    check_file_in_phase2(ctx, conf, file)
}

/// func <name>(c chan E) (x E[, ok bool]) { select { case x(, ok) = <-c: return } }
fn make_chan_recv_wrapper(
    name: &str,
    chan_expr: Expr,
    elem_expr: Expr,
    comma_ok: bool,
) -> Decl {
    let mut results = vec![Field::new(vec![Ident::new("x")], elem_expr)];
    let mut lhs = vec![Expr::ident("x")];
    if comma_ok {
        results.push(Field::new(vec![Ident::new("ok")], Expr::ident("bool")));
        lhs.push(Expr::ident("ok"));
    }
    let recv = Expr::new(ExprKind::Unary {
        op: Token::Arrow,
        x: Box::new(Expr::ident("c")),
    });
    let comm = Stmt::new(StmtKind::Assign {
        lhs,
        tok: Token::Assign,
        rhs: vec![recv],
    });
    let clause = Stmt::new(StmtKind::CommClause {
        comm: Some(Box::new(comm)),
        body: vec![Stmt::new(StmtKind::Return { results: vec![] })],
    });
    let body = BlockStmt::new(vec![Stmt::new(StmtKind::Select {
        body: vec![clause],
    })]);
    Decl::new(DeclKind::Func(FuncDecl {
        recv: None,
        name: Ident::new(name),
        typ: FuncType {
            id: next_id(),
            span: NO_SPAN,
            params: vec![Field::new(vec![Ident::new("c")], chan_expr)],
            results,
        },
        body: Some(body),
    }))
}

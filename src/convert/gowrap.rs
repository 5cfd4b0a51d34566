//! Goroutine capture: preserve failure semantics of spawned routines.
//!
//! Every `go f(x, y)` becomes
//!
//! ```text
//! {
//!     ectx := <runtime>.InitGoroutine()
//!     go func() {
//!         defer <runtime>.FinalizeGoroutine(ectx)
//!         f(x, y)
//!     }()
//! }
//! ```
//!
//! so a panic in the routine is recovered, classified, and counted, and an
//! unrecoverable failure cancels the execution context for its siblings.

use crate::ast::*;
use crate::token::Token;
use crate::stdlib;
use crate::types::{PkgId, TypeCtx};

use super::imports::ImportManager;
use super::namepick::NamePicker;

pub fn capture_panic_in_goroutines(
    ctx: &mut TypeCtx,
    file: &mut File,
    immg: &mut ImportManager,
) {
    let runtime_pkg = match stdlib::import(ctx, stdlib::runtime_pkg_path()) {
        Some(pkg) => pkg,
        None => return,
    };
    let ctx: &TypeCtx = ctx;
    let mut picker = NamePicker::for_file(file);
    let mut wrapper = GoWrapper {
        ctx,
        immg,
        runtime_pkg,
        picker: &mut picker,
    };
    for decl in &mut file.decls {
        wrapper.walk_decl(decl);
    }
}

struct GoWrapper<'a, 'b, 'c> {
    ctx: &'a TypeCtx,
    immg: &'b mut ImportManager,
    runtime_pkg: PkgId,
    picker: &'c mut NamePicker,
}

impl GoWrapper<'_, '_, '_> {
    fn walk_decl(&mut self, decl: &mut Decl) {
        match &mut decl.kind {
            DeclKind::Func(fd) => {
                if let Some(body) = &mut fd.body {
                    self.walk_stmt_list(&mut body.list);
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

    fn walk_stmt_list(&mut self, list: &mut [Stmt]) {
        for stmt in list.iter_mut() {
            self.walk_stmt(stmt);
            if let StmtKind::Go { .. } = &stmt.kind {
                let go_stmt = std::mem::replace(stmt, Stmt::new(StmtKind::Empty));
                *stmt = self.wrap_go(go_stmt);
            }
        }
    }

    fn wrap_go(&mut self, stmt: Stmt) -> Stmt {
        let call = match stmt.kind {
            StmtKind::Go { call } => call,
            _ => unreachable!(),
        };
        let alias = self.immg.short_name(self.ctx, self.runtime_pkg);
        let ectx = self.picker.pick("ectx");

        let init = Stmt::new(StmtKind::Assign {
            lhs: vec![Expr::ident(ectx.clone())],
            tok: Token::Define,
            rhs: vec![Expr::call(Expr::qualified(&alias, "InitGoroutine"), vec![])],
        });
        let finalize = Stmt::new(StmtKind::Defer {
            call: Expr::call(
                Expr::qualified(&alias, "FinalizeGoroutine"),
                vec![Expr::ident(ectx)],
            ),
        });
        let lit = Expr::new(ExprKind::FuncLit {
            typ: FuncType::nullary(),
            body: BlockStmt::new(vec![finalize, Stmt::new(StmtKind::Expr(call))]),
        });
        let go = Stmt::new(StmtKind::Go {
            call: Expr::call(lit, vec![]),
        });
        Stmt::new(StmtKind::Block(BlockStmt::new(vec![init, go])))
    }

    fn walk_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Decl(decl) => self.walk_decl(decl),
            StmtKind::Empty | StmtKind::Branch { .. } | StmtKind::Bad => {}
            StmtKind::Labeled { stmt, .. } => self.walk_stmt(stmt),
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
            StmtKind::Go { call } | StmtKind::Defer { call } => self.walk_expr(call),
            StmtKind::Return { results } => {
                for e in results {
                    self.walk_expr(e);
                }
            }
            StmtKind::Block(block) => self.walk_stmt_list(&mut block.list),
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
                self.walk_stmt_list(&mut body.list);
                if let Some(els) = els {
                    self.walk_stmt(els);
                }
            }
            StmtKind::CaseClause { list, body } => {
                for e in list {
                    self.walk_expr(e);
                }
                self.walk_stmt_list(body);
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
                self.walk_stmt_list(body);
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
                self.walk_stmt_list(&mut body.list);
            }
            StmtKind::Range {
                key,
                value,
                x,
                body,
                ..
            } => {
                for e in [key, value].into_iter().flatten() {
                    self.walk_expr(e);
                }
                self.walk_expr(x);
                self.walk_stmt_list(&mut body.list);
            }
        }
    }

    fn walk_expr(&mut self, e: &mut Expr) {
        match &mut e.kind {
            ExprKind::FuncLit { body, .. } => self.walk_stmt_list(&mut body.list),
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
}

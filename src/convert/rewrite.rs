//! In-place expression rewriting.
//!
//! Applies a caller-supplied transform to every expression slot in a
//! subtree — each slot exactly once, recursing into the replacement's
//! children. Selector members, declared names, and field names are not
//! slots; they are identities, not expressions.

use crate::ast::*;

pub fn rewrite_file_exprs(file: &mut File, f: &mut dyn FnMut(Expr) -> Expr) {
    for decl in &mut file.decls {
        rewrite_decl_exprs(decl, f);
    }
}

pub fn rewrite_decl_exprs(decl: &mut Decl, f: &mut dyn FnMut(Expr) -> Expr) {
    match &mut decl.kind {
        DeclKind::Gen { specs, .. } => {
            for spec in specs {
                match spec {
                    Spec::Import(_) => {}
                    Spec::Value(vs) => {
                        if let Some(typ) = &mut vs.typ {
                            apply(typ, f);
                        }
                        for value in &mut vs.values {
                            apply(value, f);
                        }
                    }
                    Spec::Type(ts) => apply(&mut ts.typ, f),
                }
            }
        }
        DeclKind::Func(fd) => {
            if let Some(recv) = &mut fd.recv {
                apply(&mut recv.typ, f);
            }
            rewrite_func_type(&mut fd.typ, f);
            if let Some(body) = &mut fd.body {
                rewrite_block_exprs(body, f);
            }
        }
    }
}

pub fn rewrite_block_exprs(block: &mut BlockStmt, f: &mut dyn FnMut(Expr) -> Expr) {
    for stmt in &mut block.list {
        rewrite_stmt_exprs(stmt, f);
    }
}

pub fn rewrite_stmt_exprs(stmt: &mut Stmt, f: &mut dyn FnMut(Expr) -> Expr) {
    match &mut stmt.kind {
        StmtKind::Decl(decl) => rewrite_decl_exprs(decl, f),
        StmtKind::Empty | StmtKind::Branch { .. } | StmtKind::Bad => {}
        StmtKind::Labeled { stmt, .. } => rewrite_stmt_exprs(stmt, f),
        StmtKind::Expr(e) => apply(e, f),
        StmtKind::Send { chan, value } => {
            apply(chan, f);
            apply(value, f);
        }
        StmtKind::IncDec { x, .. } => apply(x, f),
        StmtKind::Assign { lhs, rhs, .. } => {
            for e in lhs.iter_mut().chain(rhs.iter_mut()) {
                apply(e, f);
            }
        }
        StmtKind::Go { call } | StmtKind::Defer { call } => apply(call, f),
        StmtKind::Return { results } => {
            for e in results {
                apply(e, f);
            }
        }
        StmtKind::Block(block) => rewrite_block_exprs(block, f),
        StmtKind::If {
            init,
            cond,
            body,
            els,
        } => {
            if let Some(init) = init {
                rewrite_stmt_exprs(init, f);
            }
            apply(cond, f);
            rewrite_block_exprs(body, f);
            if let Some(els) = els {
                rewrite_stmt_exprs(els, f);
            }
        }
        StmtKind::CaseClause { list, body } => {
            for e in list {
                apply(e, f);
            }
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        StmtKind::Switch { init, tag, body } => {
            if let Some(init) = init {
                rewrite_stmt_exprs(init, f);
            }
            if let Some(tag) = tag {
                apply(tag, f);
            }
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        StmtKind::TypeSwitch { init, assign, body } => {
            if let Some(init) = init {
                rewrite_stmt_exprs(init, f);
            }
            rewrite_stmt_exprs(assign, f);
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        StmtKind::CommClause { comm, body } => {
            if let Some(comm) = comm {
                rewrite_stmt_exprs(comm, f);
            }
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        StmtKind::Select { body } => {
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                rewrite_stmt_exprs(init, f);
            }
            if let Some(cond) = cond {
                apply(cond, f);
            }
            if let Some(post) = post {
                rewrite_stmt_exprs(post, f);
            }
            rewrite_block_exprs(body, f);
        }
        StmtKind::Range {
            key,
            value,
            x,
            body,
            ..
        } => {
            for e in [key, value].into_iter().flatten() {
                apply(e, f);
            }
            apply(x, f);
            rewrite_block_exprs(body, f);
        }
    }
}

/// Rewrite one slot, then recurse into the replacement's child slots.
fn apply(slot: &mut Expr, f: &mut dyn FnMut(Expr) -> Expr) {
    let old = std::mem::replace(slot, Expr::bad());
    *slot = f(old);
    rewrite_children(slot, f);
}

fn rewrite_func_type(ft: &mut FuncType, f: &mut dyn FnMut(Expr) -> Expr) {
    for field in ft.params.iter_mut().chain(ft.results.iter_mut()) {
        apply(&mut field.typ, f);
    }
}

fn rewrite_children(e: &mut Expr, f: &mut dyn FnMut(Expr) -> Expr) {
    match &mut e.kind {
        ExprKind::Ident(_) | ExprKind::BasicLit { .. } | ExprKind::Bad => {}
        ExprKind::CompositeLit { typ, elts } => {
            if let Some(typ) = typ {
                apply(typ, f);
            }
            for elt in elts {
                apply(elt, f);
            }
        }
        ExprKind::FuncLit { typ, body } => {
            rewrite_func_type(typ, f);
            rewrite_block_exprs(body, f);
        }
        ExprKind::Paren(x) | ExprKind::Star(x) => apply(x, f),
        ExprKind::Selector { x, .. } => apply(x, f),
        ExprKind::Index { x, index } => {
            apply(x, f);
            apply(index, f);
        }
        ExprKind::Slice { x, low, high, max } => {
            apply(x, f);
            for part in [low, high, max].into_iter().flatten() {
                apply(part, f);
            }
        }
        ExprKind::TypeAssert { x, typ } => {
            apply(x, f);
            if let Some(typ) = typ {
                apply(typ, f);
            }
        }
        ExprKind::Call { fun, args, .. } => {
            apply(fun, f);
            for arg in args {
                apply(arg, f);
            }
        }
        ExprKind::Unary { x, .. } => apply(x, f),
        ExprKind::Binary { x, y, .. } => {
            apply(x, f);
            apply(y, f);
        }
        ExprKind::KeyValue { key, value } => {
            apply(key, f);
            apply(value, f);
        }
        ExprKind::ArrayType { len, elt } => {
            if let Some(len) = len {
                apply(len, f);
            }
            apply(elt, f);
        }
        ExprKind::StructType { fields } | ExprKind::InterfaceType { methods: fields } => {
            for field in fields {
                apply(&mut field.typ, f);
            }
        }
        ExprKind::FuncType(ft) => rewrite_func_type(ft, f),
        ExprKind::MapType { key, value } => {
            apply(key, f);
            apply(value, f);
        }
        ExprKind::ChanType { value, .. } => apply(value, f),
        ExprKind::Ellipsis { elt } => {
            if let Some(elt) = elt {
                apply(elt, f);
            }
        }
    }
}

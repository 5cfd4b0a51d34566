//! Final check, export renaming, and import hygiene.
//!
//! Re-checks the rewritten unit against a package seeded with session
//! state, renames unexported package-level symbols so they stay linkable
//! across shared objects, rewrites the context handle, runs the auto-exit
//! and goroutine-capture passes, prunes unused imports, and emits the final
//! source text.

use std::collections::HashSet;

use crate::ast::*;
use crate::check::{check_file, new_cell_package, CheckConfig, Info};
use crate::error::GobletError;
use crate::printer::print_file;
use crate::stdlib;
use crate::token::Token;
use crate::types::{ObjId, ObjKind, PkgId, Signature, TypeCtx, TypeKind};

use super::autoexit;
use super::gowrap;
use super::imports::ImportManager;
use super::rewrite::rewrite_file_exprs;
use super::{Config, INIT_FUNC_NAME};

pub struct FinalOutput {
    /// Final source; empty when the cell reduced to nothing buildable.
    pub src: String,
    pub pkg: PkgId,
    pub info: Info,
}

pub struct CheckedPhase2 {
    pub pkg: PkgId,
    pub info: Info,
    pub runctx: Option<ObjId>,
    pub old_imports: Vec<ObjId>,
}

/// Check the rewritten file against a fresh cell package carrying session
/// objects, session imports, and the context variable.
pub fn check_file_in_phase2(
    ctx: &mut TypeCtx,
    conf: &Config,
    file: &File,
) -> Result<CheckedPhase2, GobletError> {
    let (pkg, old_imports, runctx) =
        new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info, errors) = check_file(
        ctx,
        pkg,
        file,
        CheckConfig {
            ignore_func_bodies: false,
        },
    );
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    Ok(CheckedPhase2 {
        pkg,
        info,
        runctx,
        old_imports,
    })
}

pub fn final_check_and_rename(
    ctx: &mut TypeCtx,
    file: &mut File,
    conf: &Config,
) -> Result<FinalOutput, GobletError> {
    let mut checked = check_file_in_phase2(ctx, conf, file)?;
    if conf.auto_exit_code {
        checked = autoexit::may_wrap_recv_op(ctx, conf, file, checked)?;
    }
    let CheckedPhase2 {
        pkg,
        info,
        runctx,
        old_imports,
    } = checked;

    // Rename definitions of unexported package-level symbols, methods, and
    // fields so they survive the exported-only linkage boundary.
    let pkg_scope = ctx.pkg(pkg).scope;
    for_each_ident_mut(file, &mut |ident| {
        if is_exported(&ident.name) || ident.name == INIT_FUNC_NAME || ident.name == "_" {
            return;
        }
        let obj = match info.defs.get(&ident.id) {
            Some(obj) => *obj,
            None => return,
        };
        if should_rename(ctx, pkg_scope, obj) {
            ident.name = format!("{}{}", conf.def_prefix, ident.name);
        }
    });

    let mut immg = ImportManager::new(ctx, pkg, file, &info);
    super::phase2::prepend_pkg_to_olds(ctx, conf, &info, file, &mut immg);

    // Rewrite the context handle into a runtime call.
    if let Some(runctx) = runctx {
        if let Some(rt) = stdlib::import(ctx, stdlib::runtime_pkg_path()) {
            let ctx_ref: &TypeCtx = ctx;
            rewrite_file_exprs(file, &mut |e| {
                let is_runctx = e
                    .as_ident()
                    .and_then(|id| info.uses.get(&id.id))
                    .is_some_and(|obj| *obj == runctx);
                if !is_runctx {
                    return e;
                }
                let alias = immg.short_name(ctx_ref, rt);
                Expr::call(Expr::qualified(&alias, "GetExecContext"), vec![])
            });
        }
    }

    if conf.auto_exit_code {
        autoexit::inject_auto_exit_to_file(ctx, file, &mut immg);
    }
    gowrap::capture_panic_in_goroutines(ctx, file, &mut immg);

    // Assemble the final declaration list: injected imports, used session
    // imports, then remaining decls with unused imports pruned.
    let mut new_decls: Vec<Decl> = std::mem::take(&mut immg.injected);
    for &im in &old_imports {
        if !info.used.contains(&im) {
            continue;
        }
        let obj = ctx.obj(im);
        if let ObjKind::PkgName(target) = obj.kind {
            new_decls.push(Decl::single_import(
                Some(&obj.name),
                &ctx.pkg(target).path,
            ));
        }
    }
    for decl in std::mem::take(&mut file.decls) {
        match &decl.kind {
            DeclKind::Gen {
                tok: Token::Import,
                specs,
                paren,
            } => {
                let mut kept = Vec::new();
                for spec in specs {
                    let im = match spec {
                        Spec::Import(im) => im,
                        _ => continue,
                    };
                    let pname = match &im.name {
                        Some(name) => info.defs.get(&name.id).copied(),
                        None => info.implicits.get(&im.id).copied(),
                    };
                    let used = match pname {
                        Some(p) => info.used.contains(&p),
                        None => false,
                    };
                    if used {
                        kept.push(Spec::Import(im.clone()));
                    }
                }
                if !kept.is_empty() {
                    new_decls.push(Decl::gen(Token::Import, kept, *paren));
                }
            }
            _ => new_decls.push(decl),
        }
    }

    if new_decls.is_empty() {
        // Nothing is left; the runner skips the build entirely.
        return Ok(FinalOutput {
            src: String::new(),
            pkg,
            info,
        });
    }

    file.decls = workaround_indirect_methods(ctx, pkg, &info, new_decls);

    // Rename uses of unexported session-package symbols.
    for_each_ident_mut(file, &mut |ident| {
        if is_exported(&ident.name) {
            return;
        }
        let obj = match info.uses.get(&ident.id) {
            Some(obj) => *obj,
            None => return,
        };
        let owner = match ctx.obj(obj).pkg {
            Some(owner) => owner,
            None => return,
        };
        if !ctx.pkg(owner).is_cell {
            return;
        }
        let owner_scope = ctx.pkg(owner).scope;
        if should_rename(ctx, owner_scope, obj) {
            ident.name = format!("{}{}", conf.ref_prefix, ident.name);
        }
    });

    Ok(FinalOutput {
        src: print_file(file),
        pkg,
        info,
    })
}

/// Package-level symbols, methods, and struct fields rename; locals do not.
fn should_rename(ctx: &TypeCtx, pkg_scope: crate::types::ScopeId, obj: ObjId) -> bool {
    if ctx.scope_lookup(pkg_scope, &ctx.obj(obj).name) == Some(obj) {
        return true;
    }
    match &ctx.obj(obj).kind {
        // Methods are Func objects that are not package-scope entries.
        ObjKind::Func => true,
        ObjKind::Var { is_field: true } => true,
        _ => false,
    }
}

/// Import packages whose methods this cell uses only indirectly (through
/// interface dispatch), as blank imports. Without them the dynamic linker
/// can resolve the interface table against a library that was never loaded.
fn workaround_indirect_methods(
    ctx: &TypeCtx,
    pkg: PkgId,
    info: &Info,
    decls: Vec<Decl>,
) -> Vec<Decl> {
    let mut imported: HashSet<String> = HashSet::new();
    for decl in &decls {
        if let DeclKind::Gen {
            tok: Token::Import,
            specs,
            ..
        } = &decl.kind
        {
            for spec in specs {
                if let Spec::Import(im) = spec {
                    imported.insert(im.path.clone());
                }
            }
        }
    }
    let mut targets: Vec<String> = Vec::new();
    for obj in info.uses.values() {
        let o = ctx.obj(*obj);
        if o.kind != ObjKind::Func {
            continue;
        }
        let sig: &Signature = match ctx.type_kind(o.typ) {
            TypeKind::Func(sig) => sig,
            _ => continue,
        };
        let recv = match sig.recv {
            Some(recv) => recv,
            None => continue,
        };
        let recv_obj = ctx.obj(recv);
        let recv_pkg = match recv_obj.pkg {
            Some(p) if p != pkg => p,
            _ => continue,
        };
        if ctx.is_interface(recv_obj.typ) {
            continue;
        }
        let path = ctx.pkg(recv_pkg).path.clone();
        if imported.insert(path.clone()) {
            targets.push(path);
        }
    }
    if targets.is_empty() {
        return decls;
    }
    targets.sort();
    let specs: Vec<Spec> = targets
        .iter()
        .map(|path| Spec::Import(ImportSpec::new(Some("_"), path)))
        .collect();
    let paren = specs.len() > 1;
    let mut out = vec![Decl::gen(Token::Import, specs, paren)];
    out.extend(decls);
    out
}

// ── Identifier traversal ─────────────────────────────────────────────────

/// Visit every identifier in the file mutably: expression identifiers,
/// selector members, declared names, field names, and labels. Import
/// bindings are left alone.
pub fn for_each_ident_mut(file: &mut File, f: &mut dyn FnMut(&mut Ident)) {
    for decl in &mut file.decls {
        decl_idents(decl, f);
    }
}

fn decl_idents(decl: &mut Decl, f: &mut dyn FnMut(&mut Ident)) {
    match &mut decl.kind {
        DeclKind::Gen { specs, .. } => {
            for spec in specs {
                match spec {
                    Spec::Import(_) => {}
                    Spec::Value(vs) => {
                        for name in &mut vs.names {
                            f(name);
                        }
                        if let Some(typ) = &mut vs.typ {
                            expr_idents(typ, f);
                        }
                        for value in &mut vs.values {
                            expr_idents(value, f);
                        }
                    }
                    Spec::Type(ts) => {
                        f(&mut ts.name);
                        expr_idents(&mut ts.typ, f);
                    }
                }
            }
        }
        DeclKind::Func(fd) => {
            f(&mut fd.name);
            if let Some(recv) = &mut fd.recv {
                field_idents(recv, f);
            }
            func_type_idents(&mut fd.typ, f);
            if let Some(body) = &mut fd.body {
                block_idents(body, f);
            }
        }
    }
}

fn field_idents(field: &mut Field, f: &mut dyn FnMut(&mut Ident)) {
    for name in &mut field.names {
        f(name);
    }
    expr_idents(&mut field.typ, f);
}

fn func_type_idents(ft: &mut FuncType, f: &mut dyn FnMut(&mut Ident)) {
    for field in ft.params.iter_mut().chain(ft.results.iter_mut()) {
        field_idents(field, f);
    }
}

fn block_idents(block: &mut BlockStmt, f: &mut dyn FnMut(&mut Ident)) {
    for stmt in &mut block.list {
        stmt_idents(stmt, f);
    }
}

fn stmt_idents(stmt: &mut Stmt, f: &mut dyn FnMut(&mut Ident)) {
    match &mut stmt.kind {
        StmtKind::Decl(decl) => decl_idents(decl, f),
        StmtKind::Empty | StmtKind::Bad => {}
        StmtKind::Labeled { label, stmt } => {
            f(label);
            stmt_idents(stmt, f);
        }
        StmtKind::Expr(e) => expr_idents(e, f),
        StmtKind::Send { chan, value } => {
            expr_idents(chan, f);
            expr_idents(value, f);
        }
        StmtKind::IncDec { x, .. } => expr_idents(x, f),
        StmtKind::Assign { lhs, rhs, .. } => {
            for e in lhs.iter_mut().chain(rhs.iter_mut()) {
                expr_idents(e, f);
            }
        }
        StmtKind::Go { call } | StmtKind::Defer { call } => expr_idents(call, f),
        StmtKind::Return { results } => {
            for e in results {
                expr_idents(e, f);
            }
        }
        StmtKind::Branch { label, .. } => {
            if let Some(label) = label {
                f(label);
            }
        }
        StmtKind::Block(block) => block_idents(block, f),
        StmtKind::If {
            init,
            cond,
            body,
            els,
        } => {
            if let Some(init) = init {
                stmt_idents(init, f);
            }
            expr_idents(cond, f);
            block_idents(body, f);
            if let Some(els) = els {
                stmt_idents(els, f);
            }
        }
        StmtKind::CaseClause { list, body } => {
            for e in list {
                expr_idents(e, f);
            }
            for s in body {
                stmt_idents(s, f);
            }
        }
        StmtKind::Switch { init, tag, body } => {
            if let Some(init) = init {
                stmt_idents(init, f);
            }
            if let Some(tag) = tag {
                expr_idents(tag, f);
            }
            for s in body {
                stmt_idents(s, f);
            }
        }
        StmtKind::TypeSwitch { init, assign, body } => {
            if let Some(init) = init {
                stmt_idents(init, f);
            }
            stmt_idents(assign, f);
            for s in body {
                stmt_idents(s, f);
            }
        }
        StmtKind::CommClause { comm, body } => {
            if let Some(comm) = comm {
                stmt_idents(comm, f);
            }
            for s in body {
                stmt_idents(s, f);
            }
        }
        StmtKind::Select { body } => {
            for s in body {
                stmt_idents(s, f);
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                stmt_idents(init, f);
            }
            if let Some(cond) = cond {
                expr_idents(cond, f);
            }
            if let Some(post) = post {
                stmt_idents(post, f);
            }
            block_idents(body, f);
        }
        StmtKind::Range {
            key,
            value,
            x,
            body,
            ..
        } => {
            for e in [key, value].into_iter().flatten() {
                expr_idents(e, f);
            }
            expr_idents(x, f);
            block_idents(body, f);
        }
    }
}

fn expr_idents(e: &mut Expr, f: &mut dyn FnMut(&mut Ident)) {
    match &mut e.kind {
        ExprKind::Ident(ident) => f(ident),
        ExprKind::BasicLit { .. } | ExprKind::Bad => {}
        ExprKind::CompositeLit { typ, elts } => {
            if let Some(typ) = typ {
                expr_idents(typ, f);
            }
            for elt in elts {
                expr_idents(elt, f);
            }
        }
        ExprKind::FuncLit { typ, body } => {
            func_type_idents(typ, f);
            block_idents(body, f);
        }
        ExprKind::Paren(x) | ExprKind::Star(x) => expr_idents(x, f),
        ExprKind::Selector { x, sel } => {
            expr_idents(x, f);
            f(sel);
        }
        ExprKind::Index { x, index } => {
            expr_idents(x, f);
            expr_idents(index, f);
        }
        ExprKind::Slice { x, low, high, max } => {
            expr_idents(x, f);
            for part in [low, high, max].into_iter().flatten() {
                expr_idents(part, f);
            }
        }
        ExprKind::TypeAssert { x, typ } => {
            expr_idents(x, f);
            if let Some(typ) = typ {
                expr_idents(typ, f);
            }
        }
        ExprKind::Call { fun, args, .. } => {
            expr_idents(fun, f);
            for arg in args {
                expr_idents(arg, f);
            }
        }
        ExprKind::Unary { x, .. } => expr_idents(x, f),
        ExprKind::Binary { x, y, .. } => {
            expr_idents(x, f);
            expr_idents(y, f);
        }
        ExprKind::KeyValue { key, value } => {
            expr_idents(key, f);
            expr_idents(value, f);
        }
        ExprKind::ArrayType { len, elt } => {
            if let Some(len) = len {
                expr_idents(len, f);
            }
            expr_idents(elt, f);
        }
        ExprKind::StructType { fields } | ExprKind::InterfaceType { methods: fields } => {
            for field in fields {
                field_idents(field, f);
            }
        }
        ExprKind::FuncType(ft) => func_type_idents(ft, f),
        ExprKind::MapType { key, value } => {
            expr_idents(key, f);
            expr_idents(value, f);
        }
        ExprKind::ChanType { value, .. } => expr_idents(value, f),
        ExprKind::Ellipsis { elt } => {
            if let Some(elt) = elt {
                expr_idents(elt, f);
            }
        }
    }
}

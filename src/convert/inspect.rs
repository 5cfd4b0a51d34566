//! Identifier inspection: a synthesized signature for local objects, or a
//! query string for the host doc tool for everything else.

use crate::ast::*;
use crate::check::{check_file, new_cell_package, CheckConfig};
use crate::parser::parse_cell_lenient;
use crate::types::{ObjId, ObjKind, PkgId, TypeCtx, TypeKind};

use super::phase1::convert_to_phase1;
use super::phase2::convert_to_phase2;
use super::Config;

/// Outcome of inspecting an identifier: a ready document, or a query for
/// the host's doc tool (`<pkg>.<name>` or `<pkg>.<type>.<method>`).
#[derive(Debug, Default, PartialEq)]
pub struct InspectResult {
    pub doc: String,
    pub query: String,
}

/// Find the identifier at a 0-based byte cursor. A cursor directly after
/// an identifier still hits it; a cursor between a call's parentheses
/// inspects the called function.
fn find_ident_at(block: &Block, pos: usize) -> Option<NodeId> {
    let mut found: Option<NodeId> = None;
    for stmt in &block.stmts {
        find_in_stmt(stmt, pos, &mut found);
        if found.is_some() {
            break;
        }
    }
    found
}

fn find_in_stmt(stmt: &Stmt, pos: usize, found: &mut Option<NodeId>) {
    // Declared names are not expressions; check them directly.
    if let StmtKind::Decl(decl) = &stmt.kind {
        let mut check = |ident: &Ident| {
            if found.is_none() && ident.span.0 <= pos && pos <= ident.span.1 {
                *found = Some(ident.id);
            }
        };
        match &decl.kind {
            DeclKind::Func(fd) => check(&fd.name),
            DeclKind::Gen { specs, .. } => {
                for spec in specs {
                    match spec {
                        Spec::Value(vs) => {
                            for name in &vs.names {
                                check(name);
                            }
                        }
                        Spec::Type(ts) => check(&ts.name),
                        Spec::Import(_) => {}
                    }
                }
            }
        }
        if found.is_some() {
            return;
        }
    }
    visit_stmt_exprs(stmt, &mut |e| {
        if found.is_some() {
            return false;
        }
        match &e.kind {
            ExprKind::Ident(ident) => {
                if ident.span.0 <= pos && pos <= ident.span.1 {
                    *found = Some(ident.id);
                }
                false
            }
            ExprKind::Selector { sel, .. } => {
                if sel.span.0 <= pos && pos <= sel.span.1 {
                    *found = Some(sel.id);
                    return false;
                }
                true
            }
            ExprKind::Call { fun, args, .. } => {
                // Try children first; a cursor on an argument identifier
                // wins over the call rule.
                let mut inner: Option<NodeId> = None;
                for arg in args {
                    visit_expr(arg, &mut |e| {
                        if inner.is_some() {
                            return false;
                        }
                        if let ExprKind::Ident(ident) = &e.kind {
                            if ident.span.0 <= pos && pos <= ident.span.1 {
                                inner = Some(ident.id);
                            }
                        }
                        true
                    });
                }
                if inner.is_some() {
                    *found = inner;
                    return false;
                }
                // Inside the argument list: inspect the callee.
                if fun.span.1 <= pos && pos <= e.span.1 {
                    let callee = match &fun.kind {
                        ExprKind::Ident(ident) => Some(ident.id),
                        ExprKind::Selector { sel, .. } => Some(sel.id),
                        _ => None,
                    };
                    if callee.is_some() {
                        *found = callee;
                        return false;
                    }
                }
                true
            }
            _ => true,
        }
    });
}

pub fn inspect_ident(
    ctx: &mut TypeCtx,
    src: &str,
    cursor: usize,
    conf: &Config,
) -> InspectResult {
    let (obj, is_local) = match inspect_object(ctx, src, cursor, conf) {
        Some(found) => found,
        None => return InspectResult::default(),
    };
    let (doc, query) = doc_or_query(ctx, obj, is_local);
    if !doc.is_empty() {
        return InspectResult {
            doc,
            query: String::new(),
        };
    }
    let mut query = match query {
        Some(q) => q,
        None => return InspectResult::default(),
    };
    // Objects living in session packages resolve under their renamed
    // definitions.
    if let Some(owner) = ctx.obj(obj).pkg {
        if ctx.pkg(owner).is_cell {
            for id in &mut query.ids {
                if !is_exported(id) {
                    *id = format!("{}{}", conf.def_prefix, id);
                }
            }
        }
    }
    let rendered = if query.ids.is_empty() {
        query.pkg
    } else {
        format!("{}.{}", query.pkg, query.ids.join("."))
    };
    InspectResult {
        doc: String::new(),
        query: rendered,
    }
}

fn inspect_object(
    ctx: &mut TypeCtx,
    src: &str,
    cursor: usize,
    conf: &Config,
) -> Option<(ObjId, bool)> {
    let (block, _) = parse_cell_lenient(src);
    let target = find_ident_at(&block, cursor)?;
    let mut ph1 = convert_to_phase1(block);

    let (pkg1, _, _) = new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info1, _) = check_file(
        ctx,
        pkg1,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: true,
        },
    );
    convert_to_phase2(ctx, &mut ph1, pkg1, &info1, conf).ok()?;

    let (pkg2, _, _) = new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info2, _) = check_file(
        ctx,
        pkg2,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: false,
        },
    );
    let obj = info2.object_of(target)?;
    Some((obj, ctx.obj(obj).pkg == Some(pkg2)))
}

struct DocQuery {
    pkg: String,
    ids: Vec<String>,
}

fn pkg_path(ctx: &TypeCtx, pkg: Option<PkgId>) -> String {
    match pkg {
        Some(pkg) => ctx.pkg(pkg).path.clone(),
        None => "builtin".to_string(),
    }
}

fn doc_or_query(ctx: &TypeCtx, obj: ObjId, is_local: bool) -> (String, Option<DocQuery>) {
    let o = ctx.obj(obj);
    match &o.kind {
        ObjKind::PkgName(target) => (
            String::new(),
            Some(DocQuery {
                pkg: ctx.pkg(*target).path.clone(),
                ids: Vec::new(),
            }),
        ),
        ObjKind::Func => {
            let sig = match ctx.type_kind(o.typ) {
                TypeKind::Func(sig) => sig.clone(),
                _ => return (String::new(), None),
            };
            if is_local {
                let mut qual = |_: PkgId| String::new();
                let doc = format!("func {}{}", o.name, ctx.signature_string(&sig, &mut qual));
                return (doc, None);
            }
            let recv = match sig.recv {
                None => {
                    return (
                        String::new(),
                        Some(DocQuery {
                            pkg: pkg_path(ctx, o.pkg),
                            ids: vec![o.name.clone()],
                        }),
                    )
                }
                Some(recv) => recv,
            };
            let recv_type = ctx.obj(recv).typ;
            let recv_name = receiver_type_name(ctx, recv_type, o.pkg);
            match recv_name {
                Some(name) => (
                    String::new(),
                    Some(DocQuery {
                        pkg: pkg_path(ctx, o.pkg),
                        ids: vec![name, o.name.clone()],
                    }),
                ),
                None => (String::new(), None),
            }
        }
        ObjKind::Var { is_field } => {
            if *is_field {
                if is_local {
                    return (
                        format!("var {} {}", o.name, ctx.display_type(o.typ)),
                        None,
                    );
                }
                // Find the struct type the field belongs to.
                if let Some(owner) = o.pkg {
                    let scope = ctx.pkg(owner).scope;
                    for name in ctx.scope_names(scope) {
                        let tyn = match ctx.scope_lookup(scope, &name) {
                            Some(t) if ctx.obj(t).kind == ObjKind::TypeName => t,
                            _ => continue,
                        };
                        let under = ctx.underlying(ctx.obj(tyn).typ);
                        if let TypeKind::Struct { fields } = ctx.type_kind(under) {
                            if fields.contains(&obj) {
                                return (
                                    String::new(),
                                    Some(DocQuery {
                                        pkg: pkg_path(ctx, o.pkg),
                                        ids: vec![name, o.name.clone()],
                                    }),
                                );
                            }
                        }
                    }
                }
                // Anonymous struct field; nothing to point at.
                return (String::new(), None);
            }
            if is_local {
                return (
                    format!("var {} {}", o.name, ctx.display_type(o.typ)),
                    None,
                );
            }
            (
                String::new(),
                Some(DocQuery {
                    pkg: pkg_path(ctx, o.pkg),
                    ids: vec![o.name.clone()],
                }),
            )
        }
        ObjKind::Const => {
            if is_local {
                return (
                    format!("const {} {}", o.name, ctx.display_type(o.typ)),
                    None,
                );
            }
            (
                String::new(),
                Some(DocQuery {
                    pkg: pkg_path(ctx, o.pkg),
                    ids: vec![o.name.clone()],
                }),
            )
        }
        ObjKind::TypeName => {
            if is_local {
                let under = ctx.underlying(o.typ);
                return (
                    format!("type {} {}", o.name, ctx.display_type(under)),
                    None,
                );
            }
            (
                String::new(),
                Some(DocQuery {
                    pkg: pkg_path(ctx, o.pkg),
                    ids: vec![o.name.clone()],
                }),
            )
        }
        ObjKind::Builtin(b) => (
            String::new(),
            Some(DocQuery {
                pkg: "builtin".to_string(),
                ids: vec![b.name().to_string()],
            }),
        ),
        ObjKind::Label | ObjKind::Nil => (String::new(), None),
    }
}

/// Name of the receiver's named type, dereferencing pointers; for an
/// interface receiver, the interface type's name found in its package.
fn receiver_type_name(ctx: &TypeCtx, recv_type: crate::types::TypeId, pkg: Option<PkgId>) -> Option<String> {
    let base = match ctx.type_kind(recv_type) {
        TypeKind::Pointer(elem) => *elem,
        _ => recv_type,
    };
    if let TypeKind::Named { obj, .. } = ctx.type_kind(base) {
        return Some(ctx.obj(*obj).name.clone());
    }
    if let TypeKind::Interface { .. } = ctx.type_kind(ctx.underlying(base)) {
        let scope = ctx.pkg(pkg?).scope;
        for name in ctx.scope_names(scope) {
            if let Some(tyn) = ctx.scope_lookup(scope, &name) {
                if ctx.obj(tyn).kind == ObjKind::TypeName
                    && ctx.underlying(ctx.obj(tyn).typ) == base
                {
                    return Some(name);
                }
            }
        }
    }
    None
}

//! Code completion over the two-phase translation.
//!
//! Runs the same pipeline as conversion up to type-checking only. A cursor
//! after a dot completes the selector's members; otherwise the surrounding
//! identifier completes against the innermost lexical scope.

use std::collections::BTreeSet;

use crate::ast::*;
use crate::check::{check_file, enumerate_members, new_cell_package, CheckConfig, Info};
use crate::parser::parse_cell_lenient;
use crate::token::Span;
use crate::types::{ObjKind, ScopeId, TypeCtx};

use super::phase1::convert_to_phase1;
use super::phase2::convert_to_phase2;
use super::Config;

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// The identifier spanning byte index `idx`, or `None`. The index may sit
/// just past the identifier's final character.
fn identifier_at(src: &str, idx: usize) -> Option<(usize, usize)> {
    if idx > src.len() {
        return None;
    }
    let mut end = idx;
    for c in src[idx..].chars() {
        if !is_ident_char(c) {
            break;
        }
        end += c.len_utf8();
    }
    let mut start = idx;
    for c in src[..start].chars().rev() {
        if !is_ident_char(c) {
            break;
        }
        start -= c.len_utf8();
    }
    if start == end {
        return None;
    }
    if src[start..].chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((start, end))
}

/// Scan left from the cursor for the dot introducing a selector, skipping
/// the partially typed member and any whitespace.
fn find_last_dot(src: &str, idx: usize) -> Option<(usize, usize, usize)> {
    let (id_start, id_end) = match identifier_at(src, idx) {
        Some((s, e)) => (s as isize, e as isize),
        None => (-1, -1),
    };
    let mut s = if id_start >= 0 { id_start as usize } else { idx };
    for c in src[..s].chars().rev() {
        if c.is_whitespace() {
            s -= c.len_utf8();
            continue;
        }
        if c == '.' {
            s -= c.len_utf8();
        }
        break;
    }
    if src.as_bytes().get(s) == Some(&b'.') {
        if id_start < 0 {
            return Some((s, idx, idx));
        }
        return Some((s, id_start as usize, id_end as usize));
    }
    None
}

/// Complete at a 0-based byte cursor. Returns case-insensitively sorted
/// matches and the byte range they replace.
pub fn complete(
    ctx: &mut TypeCtx,
    src: &str,
    cursor: usize,
    conf: &Config,
) -> (Vec<String>, usize, usize) {
    let mut idx = cursor.min(src.len());
    while idx > 0 && !src.is_char_boundary(idx) {
        idx -= 1;
    }
    if let Some((dot, start, end)) = find_last_dot(src, idx) {
        let matches = complete_dot(ctx, src, dot, start, end, conf);
        return (matches, start, end);
    }
    let (start, end) = identifier_at(src, idx).unwrap_or((idx, idx));
    let matches = complete_ident(ctx, src, start, end, conf);
    (matches, start, end)
}

struct FoundSelector {
    sel_x_id: NodeId,
}

fn find_selector(block: &Block, dot: usize) -> Option<FoundSelector> {
    let mut found = None;
    for stmt in &block.stmts {
        visit_stmt_exprs(stmt, &mut |e| {
            if found.is_some() {
                return false;
            }
            if let ExprKind::Selector { x, sel } = &e.kind {
                if x.span.1 <= dot && dot < sel.span.0 {
                    found = Some(FoundSelector { sel_x_id: x.id });
                    return false;
                }
            }
            true
        });
        if found.is_some() {
            break;
        }
    }
    found
}

/// Whether the position falls strictly inside some function body.
fn is_pos_in_func_body(block: &Block, pos: usize) -> bool {
    let mut inside = false;
    for stmt in &block.stmts {
        if let StmtKind::Decl(decl) = &stmt.kind {
            if let DeclKind::Func(fd) = &decl.kind {
                if let Some(body) = &fd.body {
                    if body.span.0 < pos && pos < body.span.1 {
                        inside = true;
                    }
                }
            }
        }
        visit_stmt_exprs(stmt, &mut |e| {
            if let ExprKind::FuncLit { body, .. } = &e.kind {
                if body.span.0 < pos && pos < body.span.1 {
                    inside = true;
                }
            }
            true
        });
    }
    inside
}

fn complete_dot(
    ctx: &mut TypeCtx,
    src: &str,
    dot: usize,
    start: usize,
    end: usize,
    conf: &Config,
) -> Vec<String> {
    let (block, _) = parse_cell_lenient(src);
    let selector = match find_selector(&block, dot) {
        Some(sel) => sel,
        None => return Vec::new(),
    };
    let in_func_body = is_pos_in_func_body(&block, dot);
    let mut ph1 = convert_to_phase1(block);

    let (pkg, _, _) = new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info, _) = check_file(
        ctx,
        pkg,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: true,
        },
    );

    let prefix = src[start..end].to_lowercase();
    if !in_func_body {
        return complete_selector(ctx, &info, selector.sel_x_id, &prefix);
    }

    // Local scopes only exist once phase 2 has materialised the cell's
    // variables; rewrite and re-check against a fresh package.
    if convert_to_phase2(ctx, &mut ph1, pkg, &info, conf).is_err() {
        return complete_selector(ctx, &info, selector.sel_x_id, &prefix);
    }
    let (pkg2, _, _) = new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info2, _) = check_file(
        ctx,
        pkg2,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: false,
        },
    );
    complete_selector(ctx, &info2, selector.sel_x_id, &prefix)
}

fn complete_selector(
    ctx: &TypeCtx,
    info: &Info,
    base_id: NodeId,
    prefix: &str,
) -> Vec<String> {
    let mut suggests: BTreeSet<String> = BTreeSet::new();
    let mut add = |name: &str| {
        if name.to_lowercase().starts_with(prefix) {
            suggests.insert(name.to_string());
        }
    };

    // Package member completion.
    if let Some(obj) = info.uses.get(&base_id) {
        if let ObjKind::PkgName(target) = ctx.obj(*obj).kind {
            let scope = ctx.pkg(target).scope;
            for name in ctx.scope_names(scope) {
                if let Some(member) = ctx.scope_lookup(scope, &name) {
                    if ctx.obj(member).exported() {
                        add(&name);
                    }
                }
            }
        }
    }
    // Field/method completion on a value.
    if let Some(typ) = info.types.get(&base_id) {
        if !ctx.is_invalid(*typ) {
            enumerate_members(ctx, *typ, &mut |name, obj| {
                if ctx.obj(obj).exported() {
                    add(name);
                }
            });
        }
    }

    sorted_case_insensitive(suggests)
}

fn complete_ident(
    ctx: &mut TypeCtx,
    src: &str,
    start: usize,
    end: usize,
    conf: &Config,
) -> Vec<String> {
    let (block, _) = parse_cell_lenient(src);
    let ph1 = convert_to_phase1(block);
    let (pkg, _, _) = new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info, _) = check_file(
        ctx,
        pkg,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: false,
        },
    );

    let scope = innermost_scope(ctx, &ph1, &info, start);
    let prefix = src[start..end].to_lowercase();
    let mut suggests: BTreeSet<String> = BTreeSet::new();
    let mut cur = Some(scope);
    while let Some(s) = cur {
        for name in ctx.scope_names(s) {
            if name.to_lowercase().starts_with(&prefix) && name != "_" {
                suggests.insert(name);
            }
        }
        cur = ctx.scope_parent(s);
    }
    sorted_case_insensitive(suggests)
}

/// The scope of the deepest block whose span contains the position; the
/// entry function's body when no user block does.
fn innermost_scope(
    ctx: &TypeCtx,
    ph1: &super::phase1::Phase1Out,
    info: &Info,
    pos: usize,
) -> ScopeId {
    struct Best {
        span: Span,
        scope: ScopeId,
    }
    let mut best: Option<Best> = None;
    // Blocks carry spans; walk them through the AST to find the deepest.
    fn consider(
        block: &BlockStmt,
        info: &Info,
        pos: usize,
        best: &mut Option<Best>,
    ) {
        if let Some(scope) = info.scopes.get(&block.id) {
            let (lo, hi) = block.span;
            let contains = lo < pos && pos < hi;
            let tighter = best
                .as_ref()
                .map(|b| hi.saturating_sub(lo) < b.span.1.saturating_sub(b.span.0))
                .unwrap_or(true);
            if contains && tighter {
                *best = Some(Best {
                    span: block.span,
                    scope: *scope,
                });
            }
        }
        for stmt in &block.list {
            visit_stmt_exprs(stmt, &mut |e| {
                if let ExprKind::FuncLit { body, .. } = &e.kind {
                    consider(body, info, pos, best);
                }
                true
            });
            if let StmtKind::Block(inner) = &stmt.kind {
                consider(inner, info, pos, best);
            }
        }
    }
    for decl in &ph1.file.decls {
        if let DeclKind::Func(fd) = &decl.kind {
            if let Some(body) = &fd.body {
                consider(body, info, pos, &mut best);
            }
        }
    }
    if let Some(best) = best {
        return best.scope;
    }
    // Fall back to the entry function's body scope, then the file scope.
    let init_block_scope = ph1.file.decls.iter().find_map(|d| {
        if d.id != ph1.init_func_id {
            return None;
        }
        match &d.kind {
            DeclKind::Func(fd) => fd
                .body
                .as_ref()
                .and_then(|b| info.scopes.get(&b.id).copied()),
            _ => None,
        }
    });
    init_block_scope
        .or_else(|| info.scopes.get(&ph1.file.id).copied())
        .unwrap_or(ctx.universe)
}

fn sorted_case_insensitive(set: BTreeSet<String>) -> Vec<String> {
    let mut out: Vec<String> = set.into_iter().collect();
    out.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    out
}

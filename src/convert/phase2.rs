//! Phase 2: rewrite the checked phase-1 unit into its final package shape.
//!
//! With checker facts in hand, cell variables become package-level `var`
//! declarations typed by inference, prior-cell references become qualified
//! selectors, the trailing expression becomes a print call, constants move
//! to package level, and variable registrations are prepended to the entry
//! body.

use std::collections::HashSet;

use crate::ast::*;
use crate::check::Info;
use crate::error::GobletError;
use crate::parser::parse_expr_str;
use crate::stdlib;
use crate::token::Token;
use crate::types::{ObjId, PkgId, TypeCtx};

use super::imports::ImportManager;
use super::phase1::Phase1Out;
use super::rewrite::rewrite_file_exprs;
use super::Config;

/// Identifiers used as the member of a `pkg.member` selector. Such uses are
/// already qualified and must not be qualified again.
pub fn qualified_sel_ids(file: &File, info: &Info, ctx: &TypeCtx) -> HashSet<NodeId> {
    let mut out = HashSet::new();
    visit_file_exprs(file, &mut |e| {
        if let ExprKind::Selector { x, sel } = &e.kind {
            if let Some(base) = x.as_ident() {
                if let Some(obj) = info.uses.get(&base.id) {
                    if matches!(ctx.obj(*obj).kind, crate::types::ObjKind::PkgName(_)) {
                        out.insert(sel.id);
                    }
                }
            }
        }
        true
    });
    out
}

/// Qualify references to prior-cell objects: `x` becomes `<alias>.x` when
/// the checker resolved `x` to a session object from an earlier cell.
pub fn prepend_pkg_to_olds(
    ctx: &TypeCtx,
    conf: &Config,
    info: &Info,
    file: &mut File,
    immg: &mut ImportManager,
) {
    let is_old: HashSet<ObjId> = conf.olds.iter().copied().collect();
    let qualified = qualified_sel_ids(file, info, ctx);
    rewrite_file_exprs(file, &mut |e| {
        let ident = match &e.kind {
            ExprKind::Ident(ident) => ident,
            _ => return e,
        };
        let obj = match info.uses.get(&ident.id) {
            Some(obj) => *obj,
            None => return e,
        };
        if !is_old.contains(&obj) || qualified.contains(&ident.id) {
            return e;
        }
        let pkg = match ctx.obj(obj).pkg {
            Some(pkg) => pkg,
            None => return e,
        };
        let alias = immg.short_name(ctx, pkg);
        let ident = match e.kind {
            ExprKind::Ident(ident) => ident,
            _ => unreachable!(),
        };
        Expr::selector(Expr::ident(alias), ident)
    });
}

fn is_valid_type_object(ctx: &TypeCtx, info: &Info, ident: &Ident) -> bool {
    match info.defs.get(&ident.id) {
        Some(obj) => !ctx.is_invalid(ctx.obj(*obj).typ),
        None => false,
    }
}

/// Build `var <name> <type>` from the checker-inferred type of `ident`.
/// `reuse` keeps the original identifier node (and id); otherwise a fresh
/// identifier is minted so node ids stay unique in the rewritten file.
fn var_spec_from_ident(
    ctx: &TypeCtx,
    info: &Info,
    immg: &mut ImportManager,
    ident: &Ident,
    reuse: bool,
) -> Result<Option<ValueSpec>, GobletError> {
    let obj = match info.defs.get(&ident.id) {
        Some(obj) => *obj,
        None => return Ok(None),
    };
    let typ = ctx.obj(obj).typ;
    if ctx.is_invalid(typ) {
        // Carry the checker's error; skip materialisation.
        return Ok(None);
    }
    let mut qual = |pkg: PkgId| immg.short_name(ctx, pkg);
    let type_str = ctx.type_string(typ, &mut qual);
    let type_expr = parse_expr_str(&type_str).map_err(|err| GobletError::Rewrite {
        message: format!("failed to parse type expr {:?}: {}", type_str, err),
    })?;
    let name = if reuse {
        ident.clone()
    } else {
        Ident::new(ident.name.clone())
    };
    Ok(Some(ValueSpec {
        id: next_id(),
        span: NO_SPAN,
        names: vec![name],
        typ: Some(type_expr),
        values: Vec::new(),
    }))
}

pub fn convert_to_phase2(
    ctx: &mut TypeCtx,
    ph1: &mut Phase1Out,
    pkg: PkgId,
    info: &Info,
    conf: &Config,
) -> Result<(), GobletError> {
    let mut immg = ImportManager::new(ctx, pkg, &ph1.file, info);
    prepend_pkg_to_olds(ctx, conf, info, &mut ph1.file, &mut immg);

    let runtime_pkg = stdlib::import(ctx, stdlib::runtime_pkg_path()).ok_or_else(|| {
        GobletError::Rewrite {
            message: "runtime support package unavailable".to_string(),
        }
    })?;

    // Pull the entry function's body out for rebuilding.
    let init_idx = ph1
        .file
        .decls
        .iter()
        .position(|d| d.id == ph1.init_func_id)
        .ok_or_else(|| GobletError::Rewrite {
            message: "entry function missing in phase-1 output".to_string(),
        })?;
    let old_body = match &mut ph1.file.decls[init_idx].kind {
        DeclKind::Func(fd) => fd.body.take().map(|b| b.list).unwrap_or_default(),
        _ => {
            return Err(GobletError::Rewrite {
                message: "entry declaration is not a function".to_string(),
            })
        }
    };

    let mut new_init_body: Vec<Stmt> = Vec::new();
    let mut var_specs: Vec<ValueSpec> = Vec::new();
    let mut hoisted_consts: Vec<Decl> = Vec::new();

    for mut stmt in old_body {
        if Some(stmt.id) == ph1.consume_all_id {
            continue;
        }
        if Some(stmt.id) == ph1.last_expr_id {
            self::rewrite_last_expr(ctx, ph1, info, &mut immg, runtime_pkg, &mut stmt);
        }
        match stmt.kind {
            StmtKind::Decl(decl) => match decl.kind {
                DeclKind::Gen {
                    tok: Token::Var,
                    specs,
                    ..
                } => {
                    for spec in specs {
                        let vs = match spec {
                            Spec::Value(vs) => vs,
                            _ => continue,
                        };
                        for (i, name) in vs.names.iter().enumerate() {
                            if i == 0 && vs.typ.is_some() {
                                // Reuse the written type annotation directly.
                                if is_valid_type_object(ctx, info, name) {
                                    var_specs.push(ValueSpec {
                                        id: next_id(),
                                        span: NO_SPAN,
                                        names: vec![name.clone()],
                                        typ: vs.typ.clone(),
                                        values: Vec::new(),
                                    });
                                }
                                continue;
                            }
                            if let Some(spec) =
                                var_spec_from_ident(ctx, info, &mut immg, name, true)?
                            {
                                var_specs.push(spec);
                            }
                        }
                        if !vs.values.is_empty() {
                            let lhs: Vec<Expr> = vs
                                .names
                                .iter()
                                .map(|n| Expr::ident(n.name.clone()))
                                .collect();
                            new_init_body.push(Stmt::new(StmtKind::Assign {
                                lhs,
                                tok: Token::Assign,
                                rhs: vs.values,
                            }));
                        }
                    }
                }
                DeclKind::Gen {
                    tok: Token::Const,
                    specs,
                    paren,
                } => {
                    hoisted_consts.push(Decl::gen(Token::Const, specs, paren));
                }
                other => {
                    return Err(GobletError::Rewrite {
                        message: format!("unexpected declaration in entry body: {:?}", other),
                    })
                }
            },
            StmtKind::Assign {
                lhs,
                tok: Token::Define,
                rhs,
            } => {
                // Downgrade := to = and materialise the defined names.
                for e in &lhs {
                    if let Some(ident) = e.as_ident() {
                        if !ident.is_blank() {
                            if let Some(spec) =
                                var_spec_from_ident(ctx, info, &mut immg, ident, false)?
                            {
                                var_specs.push(spec);
                            }
                        }
                    }
                }
                new_init_body.push(Stmt::with_span(
                    StmtKind::Assign {
                        lhs,
                        tok: Token::Assign,
                        rhs,
                    },
                    stmt.span,
                ));
            }
            kind => {
                new_init_body.push(Stmt::with_span(kind, stmt.span));
            }
        }
    }

    ph1.file.decls.extend(hoisted_consts);

    if !var_specs.is_empty() && conf.register_vars {
        let alias = immg.short_name(ctx, runtime_pkg);
        let mut registers: Vec<Stmt> = Vec::new();
        for vs in &var_specs {
            for name in &vs.names {
                let call = Expr::call(
                    Expr::qualified(&alias, "RegisterVar"),
                    vec![
                        Expr::string_lit(&name.name),
                        Expr::new(ExprKind::Unary {
                            op: Token::And,
                            x: Box::new(Expr::ident(name.name.clone())),
                        }),
                    ],
                );
                registers.push(Stmt::new(StmtKind::Expr(call)));
            }
        }
        registers.append(&mut new_init_body);
        new_init_body = registers;
    }

    if !var_specs.is_empty() {
        ph1.file.decls.push(Decl::gen(
            Token::Var,
            var_specs.into_iter().map(Spec::Value).collect(),
            true,
        ));
    }

    // Reassemble: injected imports first, then decls; drop the entry
    // function when its body ended up empty.
    let init_empty = new_init_body.is_empty();
    if !init_empty {
        if let DeclKind::Func(fd) = &mut ph1.file.decls[init_idx].kind {
            fd.body = Some(BlockStmt::new(new_init_body));
        }
    }
    let mut new_decls: Vec<Decl> = std::mem::take(&mut immg.injected);
    for decl in std::mem::take(&mut ph1.file.decls) {
        if init_empty && decl.id == ph1.init_func_id {
            continue;
        }
        new_decls.push(decl);
    }
    ph1.file.decls = new_decls;
    Ok(())
}

fn rewrite_last_expr(
    ctx: &TypeCtx,
    ph1: &Phase1Out,
    info: &Info,
    immg: &mut ImportManager,
    runtime_pkg: PkgId,
    stmt: &mut Stmt,
) {
    let e = match &mut stmt.kind {
        StmtKind::Expr(e) => e,
        _ => return,
    };
    let target: Option<Expr> = if ph1.last_expr_wrapped {
        // Unwrap panic(<expr>).
        match std::mem::replace(e, Expr::bad()).kind {
            ExprKind::Call { mut args, .. } if !args.is_empty() => Some(args.remove(0)),
            other => {
                *e = Expr::new(other);
                None
            }
        }
    } else {
        let arity = info
            .types
            .get(&e.id)
            .map(|t| ctx.value_arity(*t))
            .unwrap_or(0);
        if arity > 0 {
            Some(std::mem::replace(e, Expr::bad()))
        } else {
            None
        }
    };
    if let Some(target) = target {
        let alias = immg.short_name(ctx, runtime_pkg);
        *e = Expr::call(Expr::qualified(&alias, "Print"), vec![target]);
    }
}

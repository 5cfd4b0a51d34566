//! The cell converter: relaxed source in, buildable host source out.
//!
//! A cell travels through the relaxed parser, the phase-1 lifter, a
//! declarations-only check with prior session objects injected into scope,
//! the phase-2 rewriter, a full final check with export renaming, the
//! auto-exit injector, and the goroutine-capture wrapper. The result is the
//! final source string plus the checker facts the session needs to carry
//! symbols forward.

mod autoexit;
mod complete;
mod gowrap;
mod imports;
mod inspect;
mod namepick;
pub(crate) mod phase1;
mod phase2;
mod rename;
mod rewrite;

pub use complete::complete;
pub use inspect::inspect_ident;

use crate::check::{check_file, new_cell_package, CheckConfig, Info};
use crate::error::{ErrorList, GobletError};
use crate::parser::parse_cell;
use crate::types::{ObjId, ObjKind, PkgId, TypeCtx};

/// Name of the synthesized entry function in every cell package.
pub const INIT_FUNC_NAME: &str = "lgo_init";

/// Package name shared by all generated cells (paths differ; names do not).
pub const CELL_PKG_NAME: &str = "lgo_exec";

/// The synthetic execution-context variable injected into cell scope.
pub const RUN_CTX_NAME: &str = "_ctx";

/// Default rename prefix for unexported cell symbols.
pub const DEFAULT_EXPORT_PREFIX: &str = "LgoExport_";

pub struct Config {
    /// Session objects from prior cells, insertion order.
    pub olds: Vec<ObjId>,
    /// Session import bindings (PkgName objects) from prior cells.
    pub old_imports: Vec<ObjId>,
    pub def_prefix: String,
    pub ref_prefix: String,
    /// Package path of the compilation unit being generated.
    pub pkg_path: String,
    pub auto_exit_code: bool,
    pub register_vars: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            olds: Vec::new(),
            old_imports: Vec::new(),
            def_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            ref_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            pkg_path: "cells/exec0".to_string(),
            auto_exit_code: false,
            register_vars: false,
        }
    }
}

#[derive(Debug)]
pub struct ConvertResult {
    /// Final source; empty when the cell produced nothing buildable
    /// (imports only, or an empty cell).
    pub src: String,
    /// The cell package holding this cell's committed objects.
    pub pkg: PkgId,
    /// This cell's own import bindings, to be merged into the session.
    pub imports: Vec<ObjId>,
}

pub fn convert(ctx: &mut TypeCtx, src: &str, conf: &Config) -> Result<ConvertResult, GobletError> {
    let block = match parse_cell(src) {
        Ok(block) => block,
        Err(errs) => return Err(list_to_error(errs)),
    };
    let mut ph1 = phase1::convert_to_phase1(block);

    let (pkg1, _, _) = new_cell_package(ctx, &conf.pkg_path, &conf.olds, &conf.old_imports);
    let (info1, errors) = check_file(
        ctx,
        pkg1,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: true,
        },
    );
    if !errors.is_empty() {
        let mut list = ErrorList::new();
        for err in errors {
            list.push(err);
        }
        return Err(list.into_result().unwrap_err());
    }

    phase2::convert_to_phase2(ctx, &mut ph1, pkg1, &info1, conf)?;
    let final_out = rename::final_check_and_rename(ctx, &mut ph1.file, conf)?;

    let imports = collect_file_imports(ctx, &ph1.file, &info1);

    Ok(ConvertResult {
        src: final_out.src,
        pkg: final_out.pkg,
        imports,
    })
}

fn list_to_error(errs: ErrorList) -> GobletError {
    errs.into_result()
        .err()
        .unwrap_or_else(|| GobletError::Parse {
            message: "unknown parse failure".to_string(),
            offset: 0,
        })
}

/// PkgName bindings established by this cell's own imports, read from the
/// phase-1 file scope.
fn collect_file_imports(ctx: &TypeCtx, file: &crate::ast::File, info: &Info) -> Vec<ObjId> {
    let scope = match info.scopes.get(&file.id) {
        Some(scope) => *scope,
        None => return Vec::new(),
    };
    let mut out = Vec::new();
    for name in ctx.scope_names(scope) {
        if let Some(obj) = ctx.scope_lookup(scope, &name) {
            if matches!(ctx.obj(obj).kind, ObjKind::PkgName(_)) {
                out.push(obj);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests;

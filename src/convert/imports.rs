//! Import alias management for generated source.
//!
//! Tracks which package each alias refers to in the file being rewritten,
//! reusing the file's own import bindings and inventing `pkg0`, `pkg1`, …
//! for packages the rewrite needs to reference (the runtime-support package
//! and the owning packages of prior-cell symbols), skipping names already
//! bound anywhere in scope.

use std::collections::HashMap;

use crate::ast::{Decl, File};
use crate::check::Info;
use crate::types::{ObjKind, PkgId, ScopeId, TypeCtx};

pub struct ImportManager {
    current: PkgId,
    file_scope: ScopeId,
    names: HashMap<PkgId, String>,
    counter: usize,
    /// Import declarations for aliases invented by `short_name`, in the
    /// order they were needed.
    pub injected: Vec<Decl>,
}

impl ImportManager {
    pub fn new(ctx: &TypeCtx, current: PkgId, file: &File, info: &Info) -> ImportManager {
        let file_scope = info
            .scopes
            .get(&file.id)
            .copied()
            .unwrap_or_else(|| ctx.pkg(current).scope);
        let mut names = HashMap::new();
        for name in ctx.scope_names(file_scope) {
            if let Some(obj) = ctx.scope_lookup(file_scope, &name) {
                if let ObjKind::PkgName(target) = ctx.obj(obj).kind {
                    names.insert(target, name);
                }
            }
        }
        ImportManager {
            current,
            file_scope,
            names,
            counter: 0,
            injected: Vec::new(),
        }
    }

    /// The alias for `pkg` in the generated file; empty for the current
    /// package. Invents and records an import when none exists yet.
    pub fn short_name(&mut self, ctx: &TypeCtx, pkg: PkgId) -> String {
        if pkg == self.current {
            return String::new();
        }
        if let Some(name) = self.names.get(&pkg) {
            return name.clone();
        }
        let name = loop {
            let candidate = format!("pkg{}", self.counter);
            self.counter += 1;
            if ctx.lookup_parent(self.file_scope, &candidate).is_none()
                && !self.names.values().any(|n| n == &candidate)
            {
                break candidate;
            }
        };
        self.names.insert(pkg, name.clone());
        self.injected
            .push(Decl::single_import(Some(&name), &ctx.pkg(pkg).path));
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{next_id, Ident};

    fn empty_file() -> File {
        File {
            id: next_id(),
            package_name: Ident::new("lgo_exec"),
            decls: Vec::new(),
            comments: Vec::new(),
        }
    }

    #[test]
    fn invents_sequential_aliases() {
        let mut ctx = TypeCtx::new();
        let current = ctx.new_package("sess/exec2", "lgo_exec", true);
        let prior = ctx.new_package("sess/exec1", "lgo_exec", true);
        let fmt = crate::stdlib::import(&mut ctx, "fmt").unwrap();
        let file = empty_file();
        let info = Info::default();
        let mut immg = ImportManager::new(&ctx, current, &file, &info);
        assert_eq!(immg.short_name(&ctx, prior), "pkg0");
        assert_eq!(immg.short_name(&ctx, prior), "pkg0");
        assert_eq!(immg.short_name(&ctx, fmt), "pkg1");
        assert_eq!(immg.injected.len(), 2);
    }

    #[test]
    fn current_package_has_empty_alias() {
        let mut ctx = TypeCtx::new();
        let current = ctx.new_package("sess/exec1", "lgo_exec", true);
        let file = empty_file();
        let info = Info::default();
        let mut immg = ImportManager::new(&ctx, current, &file, &info);
        assert_eq!(immg.short_name(&ctx, current), "");
        assert!(immg.injected.is_empty());
    }

    #[test]
    fn reuses_existing_file_binding() {
        let mut ctx = TypeCtx::new();
        let current = ctx.new_package("sess/exec1", "lgo_exec", true);
        let fmt = crate::stdlib::import(&mut ctx, "fmt").unwrap();
        let file = empty_file();
        // Simulate a file scope with `fmt` imported.
        let file_scope = ctx.new_scope(Some(ctx.pkg(current).scope));
        let invalid = ctx.invalid_type();
        let pname = ctx.new_object(crate::types::Object {
            name: "fmt".to_string(),
            kind: ObjKind::PkgName(fmt),
            typ: invalid,
            pkg: Some(current),
        });
        ctx.scope_insert(file_scope, pname);
        let mut info = Info::default();
        info.scopes.insert(file.id, file_scope);
        let mut immg = ImportManager::new(&ctx, current, &file, &info);
        assert_eq!(immg.short_name(&ctx, fmt), "fmt");
        assert!(immg.injected.is_empty());
    }
}

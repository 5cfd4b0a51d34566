//! Type and object model for the host-language checker.
//!
//! Packages, scopes, objects, and types live in arenas owned by a `TypeCtx`
//! and reference each other by index, which breaks the package ⇄ scope
//! reference cycle the host checker's object graph would otherwise need.
//! Checker objects are opaque `ObjId`s to the rest of the crate; the session
//! symbol table stores them across cells.

mod universe;

pub use universe::install_universe;

use std::collections::HashMap;

use crate::ast::ChanDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkgId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

// ── Types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Str,
    UntypedNil,
}

impl BasicKind {
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Str => "string",
            BasicKind::UntypedNil => "untyped nil",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, BasicKind::Bool | BasicKind::Str | BasicKind::UntypedNil)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<ObjId>,
    pub results: Vec<ObjId>,
    pub variadic: bool,
    /// Receiver var for methods.
    pub recv: Option<ObjId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Invalid,
    Basic(BasicKind),
    /// A declared type; `obj` is its TypeName, methods live in the ctx
    /// method table keyed by that object.
    Named { obj: ObjId, underlying: TypeId },
    Pointer(TypeId),
    Slice(TypeId),
    Array { len: Option<u64>, elem: TypeId },
    Map { key: TypeId, value: TypeId },
    Chan { dir: ChanDir, elem: TypeId },
    Func(Signature),
    /// Field objects in declaration order.
    Struct { fields: Vec<ObjId> },
    /// Method objects (Func kind), plus embedded interface types.
    Interface { methods: Vec<ObjId>, embeddeds: Vec<TypeId> },
    Tuple(Vec<TypeId>),
}

// ── Objects ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ObjKind {
    Var { is_field: bool },
    Const,
    Func,
    TypeName,
    PkgName(PkgId),
    Builtin(Builtin),
    Label,
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Cap,
    Make,
    New,
    Append,
    Copy,
    Delete,
    Close,
    Panic,
    Recover,
    Print,
    Println,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Cap => "cap",
            Builtin::Make => "make",
            Builtin::New => "new",
            Builtin::Append => "append",
            Builtin::Copy => "copy",
            Builtin::Delete => "delete",
            Builtin::Close => "close",
            Builtin::Panic => "panic",
            Builtin::Recover => "recover",
            Builtin::Print => "print",
            Builtin::Println => "println",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub kind: ObjKind,
    pub typ: TypeId,
    /// Owning package; `None` for universe objects.
    pub pkg: Option<PkgId>,
}

impl Object {
    pub fn exported(&self) -> bool {
        crate::ast::is_exported(&self.name)
    }
}

// ── Packages and scopes ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct Package {
    pub path: String,
    pub name: String,
    pub scope: ScopeId,
    /// True for per-cell packages generated by the converter; their
    /// unexported symbols are subject to export renaming.
    pub is_cell: bool,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    entries: HashMap<String, ObjId>,
}

// ── The context ──────────────────────────────────────────────────────────

pub struct TypeCtx {
    types: Vec<TypeKind>,
    objs: Vec<Object>,
    pkgs: Vec<Package>,
    scopes: Vec<Scope>,
    /// Methods of named types, keyed by the type's TypeName object.
    methods: HashMap<ObjId, Vec<ObjId>>,
    pkg_by_path: HashMap<String, PkgId>,
    pub universe: ScopeId,
    invalid: TypeId,
    basics: HashMap<BasicKind, TypeId>,
}

impl TypeCtx {
    pub fn new() -> TypeCtx {
        let mut ctx = TypeCtx {
            types: Vec::new(),
            objs: Vec::new(),
            pkgs: Vec::new(),
            scopes: Vec::new(),
            methods: HashMap::new(),
            pkg_by_path: HashMap::new(),
            universe: ScopeId(0),
            invalid: TypeId(0),
            basics: HashMap::new(),
        };
        ctx.scopes.push(Scope::default()); // universe scope
        ctx.invalid = ctx.intern(TypeKind::Invalid);
        for kind in [
            BasicKind::Bool,
            BasicKind::Int,
            BasicKind::Int8,
            BasicKind::Int16,
            BasicKind::Int32,
            BasicKind::Int64,
            BasicKind::Uint,
            BasicKind::Uint8,
            BasicKind::Uint16,
            BasicKind::Uint32,
            BasicKind::Uint64,
            BasicKind::Uintptr,
            BasicKind::Float32,
            BasicKind::Float64,
            BasicKind::Str,
            BasicKind::UntypedNil,
        ] {
            let id = ctx.intern(TypeKind::Basic(kind));
            ctx.basics.insert(kind, id);
        }
        install_universe(&mut ctx);
        ctx
    }

    // ── Arena primitives ─────────────────────────────────────────────────

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        self.types.push(kind);
        TypeId(self.types.len() as u32 - 1)
    }

    pub fn type_kind(&self, id: TypeId) -> &TypeKind {
        &self.types[id.0 as usize]
    }

    /// Patch a type in place (used to tie recursive named types).
    pub fn set_type_kind(&mut self, id: TypeId, kind: TypeKind) {
        self.types[id.0 as usize] = kind;
    }

    pub fn invalid_type(&self) -> TypeId {
        self.invalid
    }

    pub fn basic(&self, kind: BasicKind) -> TypeId {
        self.basics[&kind]
    }

    pub fn new_object(&mut self, obj: Object) -> ObjId {
        self.objs.push(obj);
        ObjId(self.objs.len() as u32 - 1)
    }

    pub fn obj(&self, id: ObjId) -> &Object {
        &self.objs[id.0 as usize]
    }

    pub fn obj_mut(&mut self, id: ObjId) -> &mut Object {
        &mut self.objs[id.0 as usize]
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            entries: HashMap::new(),
        });
        ScopeId(self.scopes.len() as u32 - 1)
    }

    /// Insert into a scope; a same-name entry is shadowed (replaced).
    pub fn scope_insert(&mut self, scope: ScopeId, obj: ObjId) {
        let name = self.obj(obj).name.clone();
        self.scopes[scope.0 as usize].entries.insert(name, obj);
    }

    pub fn scope_lookup(&self, scope: ScopeId, name: &str) -> Option<ObjId> {
        self.scopes[scope.0 as usize].entries.get(name).copied()
    }

    /// Search `scope` and its parents; returns the scope that held the name.
    pub fn lookup_parent(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, ObjId)> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(obj) = self.scope_lookup(s, name) {
                return Some((s, obj));
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    pub fn scope_parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Re-parent a scope (used to splice a session-values scope between a
    /// cell package's scope and the universe).
    pub fn set_scope_parent(&mut self, scope: ScopeId, parent: ScopeId) {
        self.scopes[scope.0 as usize].parent = Some(parent);
    }

    /// Names in a scope, sorted for deterministic iteration.
    pub fn scope_names(&self, scope: ScopeId) -> Vec<String> {
        let mut names: Vec<String> = self.scopes[scope.0 as usize]
            .entries
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn new_package(&mut self, path: &str, name: &str, is_cell: bool) -> PkgId {
        let scope = self.new_scope(Some(self.universe));
        self.pkgs.push(Package {
            path: path.to_string(),
            name: name.to_string(),
            scope,
            is_cell,
        });
        let id = PkgId(self.pkgs.len() as u32 - 1);
        self.pkg_by_path.insert(path.to_string(), id);
        id
    }

    pub fn pkg(&self, id: PkgId) -> &Package {
        &self.pkgs[id.0 as usize]
    }

    pub fn pkg_by_path(&self, path: &str) -> Option<PkgId> {
        self.pkg_by_path.get(path).copied()
    }

    // ── Methods of named types ───────────────────────────────────────────

    pub fn add_method(&mut self, type_obj: ObjId, method: ObjId) {
        self.methods.entry(type_obj).or_default().push(method);
    }

    pub fn methods_of(&self, type_obj: ObjId) -> &[ObjId] {
        self.methods
            .get(&type_obj)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    // ── Derived type helpers ─────────────────────────────────────────────

    /// Follow Named chains to the structural type.
    pub fn underlying(&self, id: TypeId) -> TypeId {
        let mut cur = id;
        for _ in 0..64 {
            match self.type_kind(cur) {
                TypeKind::Named { underlying, .. } => cur = *underlying,
                _ => return cur,
            }
        }
        cur
    }

    pub fn deref(&self, id: TypeId) -> (TypeId, bool) {
        match self.type_kind(self.underlying(id)) {
            TypeKind::Pointer(elem) => (*elem, true),
            _ => (id, false),
        }
    }

    pub fn is_interface(&self, id: TypeId) -> bool {
        matches!(self.type_kind(self.underlying(id)), TypeKind::Interface { .. })
    }

    pub fn is_invalid(&self, id: TypeId) -> bool {
        matches!(self.type_kind(id), TypeKind::Invalid)
    }

    /// Arity of a type viewed as a value list: tuples flatten, invalid is 0.
    pub fn value_arity(&self, id: TypeId) -> usize {
        match self.type_kind(id) {
            TypeKind::Tuple(parts) => parts.len(),
            TypeKind::Invalid => 0,
            _ => 1,
        }
    }

    pub fn new_var(&mut self, name: &str, typ: TypeId, pkg: Option<PkgId>) -> ObjId {
        self.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Var { is_field: false },
            typ,
            pkg,
        })
    }

    pub fn new_field(&mut self, name: &str, typ: TypeId, pkg: Option<PkgId>) -> ObjId {
        self.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Var { is_field: true },
            typ,
            pkg,
        })
    }

    pub fn new_func_type(
        &mut self,
        params: Vec<(&str, TypeId)>,
        results: Vec<TypeId>,
        variadic: bool,
        pkg: Option<PkgId>,
    ) -> TypeId {
        let params = params
            .into_iter()
            .map(|(name, typ)| self.new_var(name, typ, pkg))
            .collect();
        let results = results
            .into_iter()
            .map(|typ| self.new_var("", typ, pkg))
            .collect();
        self.intern(TypeKind::Func(Signature {
            params,
            results,
            variadic,
            recv: None,
        }))
    }

    /// Declare a named type in a package scope; `underlying` may be patched
    /// later for recursive definitions.
    pub fn declare_named(&mut self, pkg: PkgId, name: &str, underlying: TypeId) -> (ObjId, TypeId) {
        let named = self.intern(TypeKind::Invalid); // placeholder, patched below
        let obj = self.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::TypeName,
            typ: named,
            pkg: Some(pkg),
        });
        self.set_type_kind(named, TypeKind::Named { obj, underlying });
        let scope = self.pkg(pkg).scope;
        self.scope_insert(scope, obj);
        (obj, named)
    }

    // ── Rendering ────────────────────────────────────────────────────────

    /// Render a type the way the host checker would, mapping package
    /// references through `qual`. An empty qualifier elides the package.
    pub fn type_string(&self, id: TypeId, qual: &mut dyn FnMut(PkgId) -> String) -> String {
        match self.type_kind(id) {
            TypeKind::Invalid => "invalid type".to_string(),
            TypeKind::Basic(kind) => kind.name().to_string(),
            TypeKind::Named { obj, .. } => {
                let obj = self.obj(*obj);
                match obj.pkg {
                    Some(pkg) => {
                        let q = qual(pkg);
                        if q.is_empty() {
                            obj.name.clone()
                        } else {
                            format!("{}.{}", q, obj.name)
                        }
                    }
                    None => obj.name.clone(),
                }
            }
            TypeKind::Pointer(elem) => format!("*{}", self.type_string(*elem, qual)),
            TypeKind::Slice(elem) => format!("[]{}", self.type_string(*elem, qual)),
            TypeKind::Array { len, elem } => match len {
                Some(n) => format!("[{}]{}", n, self.type_string(*elem, qual)),
                None => format!("[]{}", self.type_string(*elem, qual)),
            },
            TypeKind::Map { key, value } => format!(
                "map[{}]{}",
                self.type_string(*key, qual),
                self.type_string(*value, qual)
            ),
            TypeKind::Chan { dir, elem } => {
                let prefix = match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                };
                format!("{}{}", prefix, self.type_string(*elem, qual))
            }
            TypeKind::Func(sig) => format!("func{}", self.signature_string(sig, qual)),
            TypeKind::Struct { fields } => {
                let mut parts = Vec::new();
                for field in fields {
                    let field = self.obj(*field);
                    let ts = self.type_string(field.typ, qual);
                    if field.name.is_empty() {
                        parts.push(ts);
                    } else {
                        parts.push(format!("{} {}", field.name, ts));
                    }
                }
                if parts.is_empty() {
                    "struct{}".to_string()
                } else {
                    format!("struct{{{}}}", parts.join("; "))
                }
            }
            TypeKind::Interface { methods, embeddeds } => {
                if methods.is_empty() && embeddeds.is_empty() {
                    return "interface{}".to_string();
                }
                let mut parts = Vec::new();
                for emb in embeddeds {
                    parts.push(self.type_string(*emb, qual));
                }
                for m in methods {
                    let m = self.obj(*m);
                    if let TypeKind::Func(sig) = self.type_kind(m.typ) {
                        parts.push(format!("{}{}", m.name, self.signature_string(sig, qual)));
                    }
                }
                format!("interface{{{}}}", parts.join("; "))
            }
            TypeKind::Tuple(parts) => {
                let rendered: Vec<String> =
                    parts.iter().map(|t| self.type_string(*t, qual)).collect();
                format!("({})", rendered.join(", "))
            }
        }
    }

    pub fn signature_string(
        &self,
        sig: &Signature,
        qual: &mut dyn FnMut(PkgId) -> String,
    ) -> String {
        let mut params = Vec::new();
        for (i, p) in sig.params.iter().enumerate() {
            let p = self.obj(*p);
            let variadic = sig.variadic && i == sig.params.len() - 1;
            let ts = if variadic {
                match self.type_kind(self.underlying(p.typ)) {
                    TypeKind::Slice(elem) => format!("...{}", self.type_string(*elem, qual)),
                    _ => format!("...{}", self.type_string(p.typ, qual)),
                }
            } else {
                self.type_string(p.typ, qual)
            };
            if p.name.is_empty() {
                params.push(ts);
            } else {
                params.push(format!("{} {}", p.name, ts));
            }
        }
        let mut out = format!("({})", params.join(", "));
        match sig.results.len() {
            0 => {}
            1 => {
                let r = self.obj(sig.results[0]);
                if r.name.is_empty() {
                    out.push_str(&format!(" {}", self.type_string(r.typ, qual)));
                } else {
                    out.push_str(&format!(" ({} {})", r.name, self.type_string(r.typ, qual)));
                }
            }
            _ => {
                let results: Vec<String> = sig
                    .results
                    .iter()
                    .map(|r| {
                        let r = self.obj(*r);
                        if r.name.is_empty() {
                            self.type_string(r.typ, qual)
                        } else {
                            format!("{} {}", r.name, self.type_string(r.typ, qual))
                        }
                    })
                    .collect();
                out.push_str(&format!(" ({})", results.join(", ")));
            }
        }
        out
    }

    /// Plain rendering with bare package names (used in messages).
    pub fn display_type(&self, id: TypeId) -> String {
        let pkgs = &self.pkgs;
        let mut qual = |pkg: PkgId| pkgs[pkg.0 as usize].name.clone();
        self.type_string(id, &mut qual)
    }
}

impl Default for TypeCtx {
    fn default() -> Self {
        TypeCtx::new()
    }
}

// ── Structural identity & assignability (pragmatic) ──────────────────────

impl TypeCtx {
    pub fn identical(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.type_kind(a), self.type_kind(b)) {
            (TypeKind::Basic(x), TypeKind::Basic(y)) => x == y,
            (TypeKind::Named { obj: x, .. }, TypeKind::Named { obj: y, .. }) => x == y,
            (TypeKind::Pointer(x), TypeKind::Pointer(y)) => self.identical(*x, *y),
            (TypeKind::Slice(x), TypeKind::Slice(y)) => self.identical(*x, *y),
            (
                TypeKind::Array { len: lx, elem: ex },
                TypeKind::Array { len: ly, elem: ey },
            ) => lx == ly && self.identical(*ex, *ey),
            (
                TypeKind::Map { key: kx, value: vx },
                TypeKind::Map { key: ky, value: vy },
            ) => self.identical(*kx, *ky) && self.identical(*vx, *vy),
            (
                TypeKind::Chan { dir: dx, elem: ex },
                TypeKind::Chan { dir: dy, elem: ey },
            ) => dx == dy && self.identical(*ex, *ey),
            (TypeKind::Tuple(xs), TypeKind::Tuple(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| self.identical(*x, *y))
            }
            _ => false,
        }
    }

    /// Loose assignability: identical types, matching numeric kinds (literal
    /// conversions are not tracked), nil into nilable, or anything into an
    /// interface. Errs on the side of accepting.
    pub fn assignable(&self, src: TypeId, dst: TypeId) -> bool {
        if self.identical(src, dst) || self.is_invalid(src) || self.is_invalid(dst) {
            return true;
        }
        if self.is_interface(dst) {
            return true;
        }
        let (su, du) = (self.underlying(src), self.underlying(dst));
        match (self.type_kind(su), self.type_kind(du)) {
            (TypeKind::Basic(BasicKind::UntypedNil), k) => matches!(
                k,
                TypeKind::Pointer(_)
                    | TypeKind::Slice(_)
                    | TypeKind::Map { .. }
                    | TypeKind::Chan { .. }
                    | TypeKind::Func(_)
                    | TypeKind::Interface { .. }
            ),
            (TypeKind::Basic(x), TypeKind::Basic(y)) => {
                x == y || (x.is_numeric() && y.is_numeric())
            }
            (x, y) => x == y || self.identical(su, du),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_types_render() {
        let ctx = TypeCtx::new();
        assert_eq!(ctx.display_type(ctx.basic(BasicKind::Int)), "int");
        assert_eq!(ctx.display_type(ctx.basic(BasicKind::Str)), "string");
    }

    #[test]
    fn composite_types_render() {
        let mut ctx = TypeCtx::new();
        let int = ctx.basic(BasicKind::Int);
        let str_t = ctx.basic(BasicKind::Str);
        let slice = ctx.intern(TypeKind::Slice(int));
        let map = ctx.intern(TypeKind::Map {
            key: str_t,
            value: slice,
        });
        assert_eq!(ctx.display_type(map), "map[string][]int");
        let ch = ctx.intern(TypeKind::Chan {
            dir: ChanDir::Recv,
            elem: int,
        });
        assert_eq!(ctx.display_type(ch), "<-chan int");
    }

    #[test]
    fn named_type_renders_with_qualifier() {
        let mut ctx = TypeCtx::new();
        let pkg = ctx.new_package("sess/exec1", "lgo_exec", true);
        let int = ctx.basic(BasicKind::Int);
        let (_, named) = ctx.declare_named(pkg, "Counter", int);
        let mut qual = |_: PkgId| "pkg0".to_string();
        assert_eq!(ctx.type_string(named, &mut qual), "pkg0.Counter");
        let mut elide = |_: PkgId| String::new();
        assert_eq!(ctx.type_string(named, &mut elide), "Counter");
    }

    #[test]
    fn underlying_follows_named_chain() {
        let mut ctx = TypeCtx::new();
        let pkg = ctx.new_package("p", "p", false);
        let int = ctx.basic(BasicKind::Int);
        let (_, a) = ctx.declare_named(pkg, "A", int);
        let (_, b) = ctx.declare_named(pkg, "B", a);
        assert_eq!(ctx.underlying(b), int);
    }

    #[test]
    fn scope_shadowing_replaces() {
        let mut ctx = TypeCtx::new();
        let pkg = ctx.new_package("p", "p", false);
        let scope = ctx.pkg(pkg).scope;
        let int = ctx.basic(BasicKind::Int);
        let str_t = ctx.basic(BasicKind::Str);
        let a = ctx.new_var("x", int, Some(pkg));
        let b = ctx.new_var("x", str_t, Some(pkg));
        ctx.scope_insert(scope, a);
        ctx.scope_insert(scope, b);
        assert_eq!(ctx.scope_lookup(scope, "x"), Some(b));
    }

    #[test]
    fn lookup_parent_reaches_universe() {
        let ctx = TypeCtx::new();
        let (scope, obj) = ctx.lookup_parent(ctx.universe, "int").unwrap();
        assert_eq!(scope, ctx.universe);
        assert_eq!(ctx.obj(obj).kind, ObjKind::TypeName);
    }

    #[test]
    fn assignability_is_loose_on_numerics() {
        let ctx = TypeCtx::new();
        assert!(ctx.assignable(ctx.basic(BasicKind::Int), ctx.basic(BasicKind::Float64)));
        assert!(!ctx.assignable(ctx.basic(BasicKind::Str), ctx.basic(BasicKind::Int)));
    }

    #[test]
    fn func_type_renders() {
        let mut ctx = TypeCtx::new();
        let i64_t = ctx.basic(BasicKind::Int64);
        let f = ctx.new_func_type(vec![("n", i64_t)], vec![i64_t], false, None);
        assert_eq!(ctx.display_type(f), "func(n int64) int64");
    }
}

//! Field and method lookup, including embedded fields.

use std::collections::HashSet;

use crate::types::*;

/// Resolve `name` as a field or method of `typ`, following the host's
/// selector rules: methods of the named type, fields of the underlying
/// struct, then embedded fields breadth-first. A named-pointer-type value
/// offers fields only.
pub fn lookup_field_or_method(ctx: &TypeCtx, typ: TypeId, name: &str) -> Option<ObjId> {
    let mut found = None;
    scan_members(ctx, typ, &mut |member_name, obj| {
        if found.is_none() && member_name == name {
            found = Some(obj);
        }
    });
    found
}

/// Enumerate every selectable member (field or method) of `typ`, shallowest
/// first. Used both by the checker and by completion.
pub fn enumerate_members(ctx: &TypeCtx, typ: TypeId, add: &mut dyn FnMut(&str, ObjId)) {
    scan_members(ctx, typ, add);
}

fn scan_members(ctx: &TypeCtx, typ: TypeId, add: &mut dyn FnMut(&str, ObjId)) {
    // Deref one pointer level.
    let deref = |t: TypeId| -> (TypeId, bool) {
        match ctx.type_kind(t) {
            TypeKind::Pointer(elem) => (*elem, true),
            _ => (t, false),
        }
    };

    let mut typ = typ;
    let mut ignore_methods = false;
    // Named type whose underlying is a pointer: fields only.
    if let TypeKind::Named { underlying, .. } = ctx.type_kind(typ) {
        if matches!(ctx.type_kind(*underlying), TypeKind::Pointer(_)) {
            typ = *underlying;
            ignore_methods = true;
        }
    }
    let (typ, is_ptr) = deref(typ);
    if is_ptr && ctx.is_interface(typ) {
        return;
    }

    let mut current = vec![typ];
    let mut seen: HashSet<ObjId> = HashSet::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        for typ in current {
            let mut typ = typ;
            if let TypeKind::Named { obj, underlying } = ctx.type_kind(typ) {
                if !seen.insert(*obj) {
                    continue;
                }
                if !ignore_methods {
                    for &method in ctx.methods_of(*obj) {
                        add(&ctx.obj(method).name, method);
                    }
                }
                typ = *underlying;
            }
            match ctx.type_kind(typ) {
                TypeKind::Struct { fields } => {
                    for &field in fields {
                        let obj = ctx.obj(field);
                        add(&obj.name, field);
                        // Embedded fields contribute their members at the
                        // next depth.
                        if is_embedded(ctx, field) {
                            let (t, _) = deref(obj.typ);
                            next.push(t);
                        }
                    }
                }
                TypeKind::Interface { methods, embeddeds } => {
                    for &method in methods {
                        add(&ctx.obj(method).name, method);
                    }
                    for &emb in embeddeds {
                        next.push(emb);
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
}

/// An embedded field's name equals its (possibly pointer-stripped) type
/// name; that is how the checker constructs them.
fn is_embedded(ctx: &TypeCtx, field: ObjId) -> bool {
    let obj = ctx.obj(field);
    let (base, _) = match ctx.type_kind(obj.typ) {
        TypeKind::Pointer(elem) => (*elem, true),
        _ => (obj.typ, false),
    };
    match ctx.type_kind(base) {
        TypeKind::Named { obj: type_obj, .. } => ctx.obj(*type_obj).name == obj.name,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib;

    #[test]
    fn finds_method_on_named_type() {
        let mut ctx = TypeCtx::new();
        let bytes = stdlib::import(&mut ctx, "bytes").unwrap();
        let scope = ctx.pkg(bytes).scope;
        let buffer = ctx.scope_lookup(scope, "Buffer").unwrap();
        let buffer_t = ctx.obj(buffer).typ;
        assert!(lookup_field_or_method(&ctx, buffer_t, "WriteString").is_some());
        assert!(lookup_field_or_method(&ctx, buffer_t, "NoSuchMethod").is_none());
    }

    #[test]
    fn pointer_receiver_value_still_finds_methods() {
        let mut ctx = TypeCtx::new();
        let bytes = stdlib::import(&mut ctx, "bytes").unwrap();
        let scope = ctx.pkg(bytes).scope;
        let buffer = ctx.scope_lookup(scope, "Buffer").unwrap();
        let buffer_t = ctx.obj(buffer).typ;
        let ptr = ctx.intern(TypeKind::Pointer(buffer_t));
        assert!(lookup_field_or_method(&ctx, ptr, "String").is_some());
    }

    #[test]
    fn finds_field_through_embedding() {
        let mut ctx = TypeCtx::new();
        let pkg = ctx.new_package("p", "p", false);
        let int = ctx.basic(BasicKind::Int);
        let inner_field = ctx.new_field("Count", int, Some(pkg));
        let inner_struct = ctx.intern(TypeKind::Struct {
            fields: vec![inner_field],
        });
        let (_, inner_named) = ctx.declare_named(pkg, "Inner", inner_struct);
        let embedded = ctx.new_field("Inner", inner_named, Some(pkg));
        let outer_struct = ctx.intern(TypeKind::Struct {
            fields: vec![embedded],
        });
        let (_, outer_named) = ctx.declare_named(pkg, "Outer", outer_struct);
        assert!(lookup_field_or_method(&ctx, outer_named, "Count").is_some());
        assert!(lookup_field_or_method(&ctx, outer_named, "Inner").is_some());
    }

    #[test]
    fn interface_methods_enumerate() {
        let mut ctx = TypeCtx::new();
        let rt = stdlib::import(&mut ctx, "context").unwrap();
        let scope = ctx.pkg(rt).scope;
        let context = ctx.scope_lookup(scope, "Context").unwrap();
        let context_t = ctx.obj(context).typ;
        let mut names = Vec::new();
        enumerate_members(&ctx, context_t, &mut |name, _| names.push(name.to_string()));
        assert!(names.contains(&"Done".to_string()));
        assert!(names.contains(&"Err".to_string()));
    }
}

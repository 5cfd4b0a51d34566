//! The universe scope: predeclared types, constants, and builtin functions.

use super::*;

pub fn install_universe(ctx: &mut TypeCtx) {
    let universe = ctx.universe;

    // Predeclared type names.
    let named_basics: &[(&str, BasicKind)] = &[
        ("bool", BasicKind::Bool),
        ("int", BasicKind::Int),
        ("int8", BasicKind::Int8),
        ("int16", BasicKind::Int16),
        ("int32", BasicKind::Int32),
        ("int64", BasicKind::Int64),
        ("uint", BasicKind::Uint),
        ("uint8", BasicKind::Uint8),
        ("uint16", BasicKind::Uint16),
        ("uint32", BasicKind::Uint32),
        ("uint64", BasicKind::Uint64),
        ("uintptr", BasicKind::Uintptr),
        ("float32", BasicKind::Float32),
        ("float64", BasicKind::Float64),
        ("string", BasicKind::Str),
        // Aliases.
        ("byte", BasicKind::Uint8),
        ("rune", BasicKind::Int32),
    ];
    for (name, kind) in named_basics {
        let typ = ctx.basic(*kind);
        let obj = ctx.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::TypeName,
            typ,
            pkg: None,
        });
        ctx.scope_insert(universe, obj);
    }

    // error: interface { Error() string }
    let str_t = ctx.basic(BasicKind::Str);
    let error_sig = ctx.new_func_type(vec![], vec![str_t], false, None);
    let error_method = ctx.new_object(Object {
        name: "Error".to_string(),
        kind: ObjKind::Func,
        typ: error_sig,
        pkg: None,
    });
    let error_iface = ctx.intern(TypeKind::Interface {
        methods: vec![error_method],
        embeddeds: vec![],
    });
    let error_named = ctx.intern(TypeKind::Invalid);
    let error_obj = ctx.new_object(Object {
        name: "error".to_string(),
        kind: ObjKind::TypeName,
        typ: error_named,
        pkg: None,
    });
    ctx.set_type_kind(
        error_named,
        TypeKind::Named {
            obj: error_obj,
            underlying: error_iface,
        },
    );
    ctx.scope_insert(universe, error_obj);

    // Constants.
    let bool_t = ctx.basic(BasicKind::Bool);
    for name in ["true", "false"] {
        let obj = ctx.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Const,
            typ: bool_t,
            pkg: None,
        });
        ctx.scope_insert(universe, obj);
    }
    let int_t = ctx.basic(BasicKind::Int);
    let iota = ctx.new_object(Object {
        name: "iota".to_string(),
        kind: ObjKind::Const,
        typ: int_t,
        pkg: None,
    });
    ctx.scope_insert(universe, iota);

    let nil_t = ctx.basic(BasicKind::UntypedNil);
    let nil = ctx.new_object(Object {
        name: "nil".to_string(),
        kind: ObjKind::Nil,
        typ: nil_t,
        pkg: None,
    });
    ctx.scope_insert(universe, nil);

    // Builtin functions. Their types are synthesized per call site; the
    // object's own type stays invalid.
    let invalid = ctx.invalid_type();
    for builtin in [
        Builtin::Len,
        Builtin::Cap,
        Builtin::Make,
        Builtin::New,
        Builtin::Append,
        Builtin::Copy,
        Builtin::Delete,
        Builtin::Close,
        Builtin::Panic,
        Builtin::Recover,
        Builtin::Print,
        Builtin::Println,
    ] {
        let obj = ctx.new_object(Object {
            name: builtin.name().to_string(),
            kind: ObjKind::Builtin(builtin),
            typ: invalid,
            pkg: None,
        });
        ctx.scope_insert(universe, obj);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_has_predeclared_names() {
        let ctx = TypeCtx::new();
        for name in ["int", "string", "error", "nil", "true", "len", "make", "byte"] {
            assert!(
                ctx.scope_lookup(ctx.universe, name).is_some(),
                "universe missing {}",
                name
            );
        }
    }

    #[test]
    fn byte_aliases_uint8() {
        let ctx = TypeCtx::new();
        let byte = ctx.scope_lookup(ctx.universe, "byte").unwrap();
        assert_eq!(ctx.obj(byte).typ, ctx.basic(BasicKind::Uint8));
    }
}

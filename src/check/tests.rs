use super::*;
use crate::convert::phase1::convert_to_phase1;
use crate::parser::parse_cell;
use crate::types::{BasicKind, TypeCtx};

/// Run the phase-1 lift and a full check over a cell source.
fn check_cell(src: &str) -> (TypeCtx, PkgId, Info, Vec<GobletError>) {
    let block = parse_cell(src).expect("parse failed");
    let ph1 = convert_to_phase1(block);
    let mut ctx = TypeCtx::new();
    let (pkg, _, _) = new_cell_package(&mut ctx, "cells/exec1", &[], &[]);
    let (info, errors) = check_file(
        &mut ctx,
        pkg,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: false,
        },
    );
    (ctx, pkg, info, errors)
}

fn assert_clean(errors: &[GobletError]) {
    assert!(
        errors.is_empty(),
        "unexpected errors: {:?}",
        errors.iter().map(|e| e.to_string()).collect::<Vec<_>>()
    );
}

#[test]
fn infers_short_var_decl() {
    let (ctx, _, info, errors) = check_cell("x := 10\ny := \"hi\"\n_, _ = x, y");
    assert_clean(&errors);
    let mut found_int = false;
    let mut found_str = false;
    for obj in info.defs.values() {
        let o = ctx.obj(*obj);
        if o.name == "x" {
            assert_eq!(o.typ, ctx.basic(BasicKind::Int));
            found_int = true;
        }
        if o.name == "y" {
            assert_eq!(o.typ, ctx.basic(BasicKind::Str));
            found_str = true;
        }
    }
    assert!(found_int && found_str);
}

#[test]
fn undefined_name_is_reported() {
    let (_, _, _, errors) = check_cell("x := undefinedName\n_ = x");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("undefined: undefinedName"));
}

#[test]
fn function_signature_and_recursion() {
    let src = "func fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * fact(n-1)\n\t}\n\treturn 1\n}";
    let (ctx, pkg, _, errors) = check_cell(src);
    assert_clean(&errors);
    let scope = ctx.pkg(pkg).scope;
    let fact = ctx.scope_lookup(scope, "fact").expect("fact in package scope");
    assert_eq!(ctx.display_type(ctx.obj(fact).typ), "func(n int64) int64");
}

#[test]
fn struct_type_and_composite_literal() {
    let src = "type P struct {\n\tName string\n}\np := P{\"A\"}\n_ = p.Name";
    let (ctx, pkg, info, errors) = check_cell(src);
    assert_clean(&errors);
    let scope = ctx.pkg(pkg).scope;
    let p_type = ctx.scope_lookup(scope, "P").unwrap();
    assert_eq!(ctx.obj(p_type).kind, ObjKind::TypeName);
    // p.Name resolves to the field.
    let field_use = info
        .uses
        .values()
        .find(|obj| {
            let o = ctx.obj(**obj);
            o.name == "Name" && matches!(o.kind, ObjKind::Var { is_field: true })
        });
    assert!(field_use.is_some());
}

#[test]
fn imports_bind_and_selectors_resolve() {
    let src = "import \"fmt\"\nfmt.Println(1)";
    let (_, _, info, errors) = check_cell(src);
    assert_clean(&errors);
    assert!(!info.implicits.is_empty());
}

#[test]
fn unknown_import_is_error() {
    let (_, _, _, errors) = check_cell("import \"no/such/pkg\"");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("no/such/pkg"));
}

#[test]
fn unexported_member_of_stdlib_is_error() {
    let (_, _, _, errors) = check_cell("import \"bytes\"\nx := bytes.Buffer{}\n_ = x");
    assert_clean(&errors);
    let (_, _, _, errors) = check_cell("import \"fmt\"\nfmt.println(1)");
    assert!(!errors.is_empty());
}

#[test]
fn channel_receive_types() {
    let src = "ch := make(chan int, 1)\nv := <-ch\n_, _ = ch, v";
    let (ctx, _, info, errors) = check_cell(src);
    assert_clean(&errors);
    let v = info
        .defs
        .values()
        .find(|obj| ctx.obj(**obj).name == "v")
        .unwrap();
    assert_eq!(ctx.obj(*v).typ, ctx.basic(BasicKind::Int));
}

#[test]
fn comma_ok_receive_defines_bool() {
    let src = "ch := make(chan string, 1)\nv, ok := <-ch\n_, _, _ = ch, v, ok";
    let (ctx, _, info, errors) = check_cell(src);
    assert_clean(&errors);
    let ok = info
        .defs
        .values()
        .find(|obj| ctx.obj(**obj).name == "ok")
        .unwrap();
    assert_eq!(ctx.obj(*ok).typ, ctx.basic(BasicKind::Bool));
}

#[test]
fn multi_return_spreads_in_define() {
    let src = "import \"strconv\"\nn, err := strconv.Atoi(\"3\")\n_, _ = n, err";
    let (ctx, _, info, errors) = check_cell(src);
    assert_clean(&errors);
    let n = info
        .defs
        .values()
        .find(|obj| ctx.obj(**obj).name == "n")
        .unwrap();
    assert_eq!(ctx.obj(*n).typ, ctx.basic(BasicKind::Int));
    let err = info
        .defs
        .values()
        .find(|obj| ctx.obj(**obj).name == "err")
        .unwrap();
    assert_eq!(ctx.display_type(ctx.obj(*err).typ), "error");
}

#[test]
fn session_objects_resolve_in_next_cell() {
    let mut ctx = TypeCtx::new();
    // Simulate a prior cell having defined `x int`.
    let prior = ctx.new_package("cells/exec1", "lgo_exec", true);
    let int_t = ctx.basic(BasicKind::Int);
    let x = ctx.new_var("x", int_t, Some(prior));
    let prior_scope = ctx.pkg(prior).scope;
    ctx.scope_insert(prior_scope, x);

    let block = parse_cell("y := x * 2\n_ = y").unwrap();
    let ph1 = convert_to_phase1(block);
    let (pkg, _, _) = new_cell_package(&mut ctx, "cells/exec2", &[x], &[]);
    let (info, errors) = check_file(
        &mut ctx,
        pkg,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: false,
        },
    );
    assert_clean(&errors);
    assert!(info.uses.values().any(|obj| *obj == x));
}

#[test]
fn ctx_variable_is_injected() {
    let (ctx, pkg, _, _) = check_cell("x := 1\n_ = x");
    let scope = ctx.pkg(pkg).scope;
    // The context variable lives in the spliced values scope, reachable
    // through the package scope but not owned by it.
    let (holder, runctx) = ctx.lookup_parent(scope, "_ctx").expect("_ctx injected");
    assert_ne!(holder, scope);
    assert!(ctx.display_type(ctx.obj(runctx).typ).contains("ExecContext"));
}

#[test]
fn ignore_func_bodies_still_checks_entry() {
    let block = parse_cell("func f() int {\n\treturn undefinedInsideF\n}\nx := 1\n_ = x").unwrap();
    let ph1 = convert_to_phase1(block);
    let mut ctx = TypeCtx::new();
    let (pkg, _, _) = new_cell_package(&mut ctx, "cells/exec1", &[], &[]);
    let (_, errors) = check_file(
        &mut ctx,
        pkg,
        &ph1.file,
        CheckConfig {
            ignore_func_bodies: true,
        },
    );
    // The broken body was skipped; the checked entry body is clean.
    assert!(errors.is_empty());
}

#[test]
fn method_binds_to_receiver_type() {
    let src = "type counter struct {\n\tn int\n}\nfunc (c *counter) inc() {\n\tc.n++\n}";
    let (ctx, pkg, _, errors) = check_cell(src);
    assert_clean(&errors);
    let scope = ctx.pkg(pkg).scope;
    let counter = ctx.scope_lookup(scope, "counter").unwrap();
    let methods: Vec<&str> = ctx
        .methods_of(counter)
        .iter()
        .map(|m| ctx.obj(*m).name.as_str())
        .collect();
    assert_eq!(methods, vec!["inc"]);
}

use super::*;
use crate::session::SessionState;

fn conf_for(state: &SessionState, exec: u64) -> Config {
    Config {
        olds: state.olds(),
        old_imports: state.old_imports(),
        pkg_path: format!("goblet/sessions/s1/exec{}", exec),
        ..Config::default()
    }
}

/// Convert one cell against the session and commit its results.
fn run_cell(state: &mut SessionState, exec: u64, src: &str) -> ConvertResult {
    let conf = conf_for(state, exec);
    let result = match convert(&mut state.ctx, src, &conf) {
        Ok(result) => result,
        Err(err) => panic!("convert({:?}) failed: {}", src, err),
    };
    state.merge_package(result.pkg);
    let imports = result.imports.clone();
    state.merge_imports(&imports);
    result
}

fn run_cell_auto_exit(state: &mut SessionState, exec: u64, src: &str) -> ConvertResult {
    let mut conf = conf_for(state, exec);
    conf.auto_exit_code = true;
    conf.register_vars = true;
    let result = match convert(&mut state.ctx, src, &conf) {
        Ok(result) => result,
        Err(err) => panic!("convert({:?}) failed: {}", src, err),
    };
    state.merge_package(result.pkg);
    let imports = result.imports.clone();
    state.merge_imports(&imports);
    result
}

// ── Single-cell shapes ───────────────────────────────────────────────────

#[test]
fn short_var_decl_materialises_package_var() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "x := 10");
    assert_eq!(
        result.src,
        "package lgo_exec\n\nfunc lgo_init() {\n\tLgoExport_x = 10\n}\nvar (\n\tLgoExport_x int\n)\n"
    );
    assert!(state.lookup("x").is_some());
}

#[test]
fn var_decl_with_type_keeps_annotation() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "var x int = 3");
    assert!(result.src.contains("var (\n\tLgoExport_x int\n)"));
    assert!(result.src.contains("\tLgoExport_x = 3\n"));
}

#[test]
fn func_decl_renames_definition_and_recursive_use() {
    let mut state = SessionState::new();
    let result = run_cell(
        &mut state,
        1,
        "func fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * fact(n-1)\n\t}\n\treturn 1\n}",
    );
    assert_eq!(
        result.src,
        "package lgo_exec\n\nfunc LgoExport_fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * LgoExport_fact(n - 1)\n\t}\n\treturn 1\n}\n"
    );
    // No vars: no registrations, no entry function.
    assert!(!result.src.contains("lgo_init"));
    assert!(state.lookup("fact").is_some());
}

#[test]
fn exported_names_are_never_renamed() {
    let mut state = SessionState::new();
    let result = run_cell(
        &mut state,
        1,
        "type P struct {\n\tName string\n}\nfunc Hello() string {\n\treturn \"hi\"\n}",
    );
    assert!(result.src.contains("type P struct"));
    assert!(result.src.contains("Name string"));
    assert!(result.src.contains("func Hello() string"));
    assert!(!result.src.contains("LgoExport_"));
}

#[test]
fn unexported_field_renames_both_sites() {
    let mut state = SessionState::new();
    let result = run_cell(
        &mut state,
        1,
        "type rec struct {\n\tcount int\n}\nr := rec{count: 1}\nn := r.count\n_ = n",
    );
    assert!(result.src.contains("type LgoExport_rec struct {\n\tLgoExport_count int\n}"));
    assert!(result.src.contains("LgoExport_r = LgoExport_rec{LgoExport_count: 1}"));
    assert!(result.src.contains("LgoExport_n = LgoExport_r.LgoExport_count"));
}

#[test]
fn trailing_expression_is_printed() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "x := 10\nx * x");
    assert!(result.src.contains("pkg0.Print(LgoExport_x * LgoExport_x)"));
    assert!(result.src.contains("import pkg0 \"goblet/runtime\""));
}

#[test]
fn trailing_zero_return_call_is_not_printed() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "func noop() {\n}");
    let result = run_cell(&mut state, 2, "noop()");
    assert!(!result.src.contains("Print"));
    assert!(result.src.contains("pkg0.LgoExport_noop()"));
}

#[test]
fn trailing_call_with_result_is_printed() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "func two() int {\n\treturn 2\n}");
    let result = run_cell(&mut state, 2, "two()");
    assert!(result.src.contains("Print(pkg0.LgoExport_two())"));
}

#[test]
fn empty_cell_produces_no_source() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "");
    assert!(result.src.is_empty());
}

#[test]
fn imports_only_cell_produces_no_source_but_registers() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "import \"fmt\"");
    assert!(result.src.is_empty());
    assert_eq!(result.imports.len(), 1);
    assert_eq!(state.old_imports().len(), 1);
}

#[test]
fn blank_var_emits_unit_but_registers_nothing() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "var _ int");
    assert!(!result.src.is_empty());
    assert!(state.olds().is_empty());
}

#[test]
fn unused_imports_are_pruned() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "import \"fmt\"\nimport \"strings\"\nfmt.Println(1)");
    assert!(result.src.contains("\"fmt\""));
    assert!(!result.src.contains("strings"));
}

#[test]
fn parse_error_surfaces_with_offset() {
    let mut state = SessionState::new();
    let conf = conf_for(&state, 1);
    let err = convert(&mut state.ctx, "x := (", &conf).unwrap_err();
    assert!(matches!(err, crate::error::GobletError::Parse { .. }));
}

#[test]
fn type_error_surfaces_first() {
    let mut state = SessionState::new();
    let conf = conf_for(&state, 1);
    let err = convert(&mut state.ctx, "x := undefinedName", &conf).unwrap_err();
    assert!(err.to_string().contains("undefined: undefinedName"));
}

// ── Session persistence across cells ─────────────────────────────────────

#[test]
fn session_vars_qualify_through_pkg_alias() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "x := 10");
    let result = run_cell(&mut state, 2, "x * x");
    assert!(result.src.contains("import pkg0 \"goblet/sessions/s1/exec1\""));
    assert!(result.src.contains("Print(pkg0.LgoExport_x * pkg0.LgoExport_x)"));
}

#[test]
fn factorial_across_cells() {
    let mut state = SessionState::new();
    run_cell(
        &mut state,
        1,
        "func fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * fact(n-1)\n\t}\n\treturn 1\n}",
    );
    let result = run_cell(&mut state, 2, "fact(5)");
    assert!(result.src.contains("import pkg0 \"goblet/sessions/s1/exec1\""));
    assert!(result.src.contains("pkg0.LgoExport_fact(5)"));
}

#[test]
fn type_then_value_then_field_access() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "type P struct {\n\tName string\n}");
    let b = run_cell(&mut state, 2, "p := P{\"A\"}");
    // P is exported and keeps its name; p is unexported and renames.
    assert!(b.src.contains("LgoExport_p pkg0.P"), "got:\n{}", b.src);
    assert!(b.src.contains("LgoExport_p = pkg0.P{\"A\"}"));
    let c = run_cell(&mut state, 3, "p.Name");
    // The third cell re-imports the second cell's package for `p` and
    // reaches `Name` without renaming (exported).
    assert!(c.src.contains("LgoExport_p.Name"), "got:\n{}", c.src);
    assert!(c.src.contains("Print"));
}

#[test]
fn explicit_selector_is_not_double_qualified() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "import \"strings\"");
    let result = run_cell(&mut state, 2, "strings.ToUpper(\"a\")");
    // The user wrote the qualifier; it is re-imported, not wrapped again.
    assert!(result.src.contains("import strings \"strings\""));
    assert!(result.src.contains("strings.ToUpper(\"a\")"));
    assert!(!result.src.contains("strings.strings"));
}

#[test]
fn shadowing_replaces_session_entry() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "x := 10");
    let first = state.lookup("x").unwrap();
    run_cell(&mut state, 2, "x := \"now a string\"");
    let second = state.lookup("x").unwrap();
    assert_ne!(first, second);
    let result = run_cell(&mut state, 3, "x");
    assert!(result.src.contains("import pkg0 \"goblet/sessions/s1/exec2\""));
}

#[test]
fn var_self_reference_in_redefinition() {
    // `x := x * x` reads the old x while defining a new one.
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "x := 10");
    let result = run_cell(&mut state, 2, "x := x * x");
    assert!(
        result.src.contains("LgoExport_x = pkg0.LgoExport_x * pkg0.LgoExport_x"),
        "got:\n{}",
        result.src
    );
}

#[test]
fn session_import_reemitted_when_used() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "import \"fmt\"");
    let result = run_cell(&mut state, 2, "fmt.Println(42)");
    assert!(result.src.contains("import fmt \"fmt\""));
}

// ── Variable registration ────────────────────────────────────────────────

#[test]
fn register_vars_emits_registrations() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(&mut state, 1, "x := 10\ny := \"s\"");
    assert!(result.src.contains("RegisterVar(\"x\", &LgoExport_x)"));
    assert!(result.src.contains("RegisterVar(\"y\", &LgoExport_y)"));
}

#[test]
fn no_registrations_for_pure_func_cell() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(&mut state, 1, "func f() int {\n\treturn 1\n}");
    assert!(!result.src.contains("RegisterVar"));
}

// ── Auto-exit injection ──────────────────────────────────────────────────

#[test]
fn function_bodies_start_with_cancellation_check() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "func spin() {\n\tfor {\n\t}\n}",
    );
    assert!(
        result.src.contains(
            "func LgoExport_spin() {\n\tpkg0.ExitIfCtxDone()\n\tfor {\n\t\tpkg0.ExitIfCtxDone()\n\t}\n}"
        ),
        "got:\n{}",
        result.src
    );
}

#[test]
fn tight_loop_cell_gets_loop_head_check() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(&mut state, 1, "for {\n}");
    assert!(
        result.src.contains("for {\n\t\tpkg0.ExitIfCtxDone()\n\t}"),
        "got:\n{}",
        result.src
    );
}

#[test]
fn check_inserted_between_heavy_statements() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "func f() int {\n\treturn 1\n}");
    let result = run_cell_auto_exit(&mut state, 2, "a := f()\nb := f()\n_, _ = a, b");
    let first = result.src.find("LgoExport_a = pkg0.LgoExport_f()").expect("first call");
    let between = &result.src[first..];
    assert!(
        between.contains("ExitIfCtxDone()\n\tLgoExport_b = pkg0.LgoExport_f()"),
        "got:\n{}",
        result.src
    );
}

#[test]
fn defer_bound_function_is_not_instrumented() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "func f() {\n\tdefer func() {\n\t\tprintln(1)\n\t}()\n}",
    );
    // The deferred literal's body has no check; the enclosing body does.
    let deferred = result.src.find("defer func() {").expect("defer literal");
    let body = &result.src[deferred..];
    assert!(!body.contains("ExitIfCtxDone"), "got:\n{}", result.src);
}

#[test]
fn send_becomes_guarded_select() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "ch := make(chan int, 1)\nch <- 42\n_ = ch",
    );
    assert!(
        result.src.contains("select {\n\tcase LgoExport_ch <- 42:\n\tcase <-pkg0.GetExecContext().Done():\n\t\tpanic(pkg0.Bailout)\n\t}"),
        "got:\n{}",
        result.src
    );
}

#[test]
fn select_without_default_gains_guard_clause() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "ch := make(chan int, 1)\nselect {\ncase v := <-ch:\n\tprintln(v)\n}\n_ = ch",
    );
    assert!(
        result.src.contains("case <-pkg0.GetExecContext().Done():"),
        "got:\n{}",
        result.src
    );
}

#[test]
fn select_with_default_is_untouched() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "ch := make(chan int, 1)\nselect {\ncase v := <-ch:\n\tprintln(v)\ndefault:\n}\n_ = ch",
    );
    assert!(
        !result.src.contains("GetExecContext().Done()"),
        "got:\n{}",
        result.src
    );
}

#[test]
fn bare_receive_extracts_helper() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "ch := make(chan int, 1)\nv := <-ch\n_, _ = ch, v",
    );
    // The helper is an unexported package-level definition and renames
    // like any other.
    assert!(
        result.src.contains("func LgoExport_recvChan(c chan int) (x int)"),
        "got:\n{}",
        result.src
    );
    assert!(
        result.src.contains("LgoExport_v = LgoExport_recvChan(LgoExport_ch)"),
        "got:\n{}",
        result.src
    );
    // The helper's select is guarded like any other.
    assert!(result.src.contains("case x = <-c:"), "got:\n{}", result.src);
}

#[test]
fn comma_ok_receive_extracts_two_result_helper() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "ch := make(chan string, 1)\nv, ok := <-ch\n_, _, _ = ch, v, ok",
    );
    assert!(
        result
            .src
            .contains("func LgoExport_recvChan(c chan string) (x string, ok bool)"),
        "got:\n{}",
        result.src
    );
    assert!(result.src.contains("case x, ok = <-c:"), "got:\n{}", result.src);
}

#[test]
fn receive_inside_select_comm_is_left_alone() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(
        &mut state,
        1,
        "ch := make(chan int, 1)\nselect {\ncase v := <-ch:\n\tprintln(v)\ndefault:\n}\n_ = ch",
    );
    assert!(!result.src.contains("recvChan"), "got:\n{}", result.src);
}

// ── Goroutine capture ────────────────────────────────────────────────────

#[test]
fn go_statement_is_wrapped() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "func f() {\n}");
    let result = run_cell_auto_exit(&mut state, 2, "go f()");
    // pkg0 aliases the prior cell, pkg1 the runtime package.
    assert!(
        result.src.contains("ectx := pkg1.InitGoroutine()"),
        "got:\n{}",
        result.src
    );
    assert!(
        result.src.contains(
            "go func() {\n\t\t\tdefer pkg1.FinalizeGoroutine(ectx)\n\t\t\tpkg0.LgoExport_f()\n\t\t}()"
        ),
        "got:\n{}",
        result.src
    );
}

#[test]
fn go_func_literal_keeps_cancellation_check() {
    let mut state = SessionState::new();
    let result = run_cell_auto_exit(&mut state, 1, "go func() {\n\tprintln(1)\n}()");
    // The user literal's body is instrumented; the wrapper's body is not.
    assert!(result.src.contains("defer pkg0.FinalizeGoroutine(ectx)"));
    let wrapper = result.src.find("FinalizeGoroutine").unwrap();
    let after = &result.src[wrapper..];
    assert!(after.contains("ExitIfCtxDone"), "got:\n{}", result.src);
}

// ── _ctx rewriting ───────────────────────────────────────────────────────

#[test]
fn ctx_handle_becomes_runtime_call() {
    let mut state = SessionState::new();
    let result = run_cell(&mut state, 1, "done := _ctx.Done()\n_ = done");
    assert!(
        result.src.contains("LgoExport_done = pkg0.GetExecContext().Done()"),
        "got:\n{}",
        result.src
    );
    assert!(!result.src.contains("_ctx"));
}

#[test]
fn shadowed_ctx_name_is_left_alone() {
    let mut state = SessionState::new();
    run_cell(&mut state, 1, "_ctx := 10");
    let result = run_cell(&mut state, 2, "_ctx * 2");
    assert!(result.src.contains("pkg0.LgoExport__ctx * 2"), "got:\n{}", result.src);
    assert!(!result.src.contains("GetExecContext"));
}

// ── Rename invariants ────────────────────────────────────────────────────

#[test]
fn renaming_is_a_bijection_within_a_cell() {
    let mut state = SessionState::new();
    let result = run_cell(
        &mut state,
        1,
        "func helper() int {\n\treturn 1\n}\nv := helper()\n_ = v",
    );
    // Every definition carries the prefix exactly once; no double prefixes.
    assert!(result.src.contains("func LgoExport_helper() int"));
    assert!(result.src.contains("LgoExport_v = LgoExport_helper()"));
    assert!(!result.src.contains("LgoExport_LgoExport_"));
}

#[test]
fn local_identifiers_are_untouched() {
    let mut state = SessionState::new();
    let result = run_cell(
        &mut state,
        1,
        "func f() int {\n\tlocal := 2\n\treturn local\n}",
    );
    assert!(result.src.contains("local := 2"));
    assert!(!result.src.contains("LgoExport_local"));
}

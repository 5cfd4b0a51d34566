use super::*;

fn cell(src: &str) -> Block {
    match parse_cell(src) {
        Ok(b) => b,
        Err(errs) => panic!("parse_cell({:?}) failed: {}", src, errs),
    }
}

fn cell_err(src: &str) -> ErrorList {
    match parse_cell(src) {
        Ok(_) => panic!("parse_cell({:?}) unexpectedly succeeded", src),
        Err(errs) => errs,
    }
}

#[test]
fn empty_cell() {
    assert!(cell("").stmts.is_empty());
    assert!(cell("\n\n").stmts.is_empty());
}

#[test]
fn short_var_decl() {
    let b = cell("x := 10");
    assert_eq!(b.stmts.len(), 1);
    match &b.stmts[0].kind {
        StmtKind::Assign { lhs, tok, rhs } => {
            assert_eq!(*tok, Token::Define);
            assert_eq!(lhs.len(), 1);
            assert_eq!(rhs.len(), 1);
            assert_eq!(lhs[0].as_ident().unwrap().name, "x");
        }
        other => panic!("expected assign, got {:?}", other),
    }
}

#[test]
fn func_decl_as_cell_statement() {
    let b = cell("func fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * fact(n-1)\n\t}\n\treturn 1\n}");
    assert_eq!(b.stmts.len(), 1);
    match &b.stmts[0].kind {
        StmtKind::Decl(decl) => match &decl.kind {
            DeclKind::Func(fd) => {
                assert_eq!(fd.name.name, "fact");
                assert_eq!(fd.typ.params.len(), 1);
                assert_eq!(fd.typ.results.len(), 1);
                assert!(fd.body.is_some());
            }
            other => panic!("expected func decl, got {:?}", other),
        },
        other => panic!("expected decl stmt, got {:?}", other),
    }
}

#[test]
fn func_literal_call_is_not_a_decl() {
    let b = cell("func() {\n\tprintln(1)\n}()");
    assert_eq!(b.stmts.len(), 1);
    match &b.stmts[0].kind {
        StmtKind::Expr(e) => assert!(e.is_call()),
        other => panic!("expected expr stmt, got {:?}", other),
    }
}

#[test]
fn method_decl_with_receiver() {
    let b = cell("func (p *P) Name() string {\n\treturn p.name\n}");
    match &b.stmts[0].kind {
        StmtKind::Decl(decl) => match &decl.kind {
            DeclKind::Func(fd) => {
                assert!(fd.recv.is_some());
                assert_eq!(fd.name.name, "Name");
            }
            other => panic!("expected func decl, got {:?}", other),
        },
        other => panic!("expected decl stmt, got {:?}", other),
    }
}

#[test]
fn bodyless_func_signature_parses() {
    // Forward signature; the line editor relies on this staying legal.
    let b = cell("func sig()");
    match &b.stmts[0].kind {
        StmtKind::Decl(decl) => match &decl.kind {
            DeclKind::Func(fd) => assert!(fd.body.is_none()),
            other => panic!("expected func decl, got {:?}", other),
        },
        other => panic!("expected decl stmt, got {:?}", other),
    }
}

#[test]
fn top_level_label_parses() {
    let b = cell("loop:\nfor {\n\tbreak loop\n}");
    match &b.stmts[0].kind {
        StmtKind::Labeled { label, stmt } => {
            assert_eq!(label.name, "loop");
            assert!(matches!(stmt.kind, StmtKind::For { .. }));
        }
        other => panic!("expected labeled stmt, got {:?}", other),
    }
}

#[test]
fn trailing_expression() {
    let b = cell("x := 10\nx * x");
    assert_eq!(b.stmts.len(), 2);
    match &b.stmts[1].kind {
        StmtKind::Expr(e) => assert!(matches!(e.kind, ExprKind::Binary { .. })),
        other => panic!("expected expr stmt, got {:?}", other),
    }
}

#[test]
fn imports_collected() {
    let b = cell("import (\n\t\"fmt\"\n\tstrs \"strings\"\n)\nimport \"bytes\"");
    let imports = b.imports();
    assert_eq!(imports.len(), 3);
    assert_eq!(imports[0].path, "fmt");
    assert!(imports[0].name.is_none());
    assert_eq!(imports[1].path, "strings");
    assert_eq!(imports[1].name.as_ref().unwrap().name, "strs");
    assert_eq!(imports[2].path, "bytes");
}

#[test]
fn composite_literal_in_assignment() {
    let b = cell("p := P{\"A\"}");
    match &b.stmts[0].kind {
        StmtKind::Assign { rhs, .. } => match &rhs[0].kind {
            ExprKind::CompositeLit { typ, elts } => {
                assert_eq!(typ.as_ref().unwrap().as_ident().unwrap().name, "P");
                assert_eq!(elts.len(), 1);
            }
            other => panic!("expected composite literal, got {:?}", other),
        },
        other => panic!("expected assign, got {:?}", other),
    }
}

#[test]
fn no_composite_literal_in_if_header() {
    let b = cell("if p == x {\n\tprintln(1)\n}");
    match &b.stmts[0].kind {
        StmtKind::If { cond, .. } => {
            assert!(matches!(cond.kind, ExprKind::Binary { .. }));
        }
        other => panic!("expected if stmt, got {:?}", other),
    }
}

#[test]
fn if_with_init_stmt() {
    let b = cell("if v, ok := m[k]; ok {\n\tprintln(v)\n}");
    match &b.stmts[0].kind {
        StmtKind::If { init, cond, .. } => {
            assert!(init.is_some());
            assert_eq!(cond.as_ident().unwrap().name, "ok");
        }
        other => panic!("expected if stmt, got {:?}", other),
    }
}

#[test]
fn three_clause_for() {
    let b = cell("for i := 0; i < 10; i++ {\n\tprintln(i)\n}");
    match &b.stmts[0].kind {
        StmtKind::For {
            init, cond, post, ..
        } => {
            assert!(init.is_some());
            assert!(cond.is_some());
            assert!(matches!(post.as_ref().unwrap().kind, StmtKind::IncDec { .. }));
        }
        other => panic!("expected for stmt, got {:?}", other),
    }
}

#[test]
fn range_for() {
    let b = cell("for k, v := range m {\n\tprintln(k, v)\n}");
    match &b.stmts[0].kind {
        StmtKind::Range {
            key, value, tok, ..
        } => {
            assert_eq!(key.as_ref().unwrap().as_ident().unwrap().name, "k");
            assert_eq!(value.as_ref().unwrap().as_ident().unwrap().name, "v");
            assert_eq!(*tok, Some(Token::Define));
        }
        other => panic!("expected range stmt, got {:?}", other),
    }
}

#[test]
fn infinite_for() {
    let b = cell("for {\n}");
    match &b.stmts[0].kind {
        StmtKind::For {
            init, cond, post, ..
        } => {
            assert!(init.is_none() && cond.is_none() && post.is_none());
        }
        other => panic!("expected for stmt, got {:?}", other),
    }
}

#[test]
fn select_with_clauses() {
    let b = cell("select {\ncase v := <-ch:\n\tprintln(v)\ncase ch2 <- 1:\ndefault:\n}");
    match &b.stmts[0].kind {
        StmtKind::Select { body } => {
            assert_eq!(body.len(), 3);
            match &body[0].kind {
                StmtKind::CommClause { comm, .. } => {
                    assert!(matches!(
                        comm.as_ref().unwrap().kind,
                        StmtKind::Assign { .. }
                    ));
                }
                other => panic!("expected comm clause, got {:?}", other),
            }
            match &body[2].kind {
                StmtKind::CommClause { comm, .. } => assert!(comm.is_none()),
                other => panic!("expected comm clause, got {:?}", other),
            }
        }
        other => panic!("expected select stmt, got {:?}", other),
    }
}

#[test]
fn send_statement() {
    let b = cell("ch <- 42");
    assert!(matches!(b.stmts[0].kind, StmtKind::Send { .. }));
}

#[test]
fn go_statement() {
    let b = cell("go f(1, 2)");
    match &b.stmts[0].kind {
        StmtKind::Go { call } => assert!(call.is_call()),
        other => panic!("expected go stmt, got {:?}", other),
    }
}

#[test]
fn type_decl_with_struct() {
    let b = cell("type P struct {\n\tName string\n\tage  int\n}");
    match &b.stmts[0].kind {
        StmtKind::Decl(decl) => match &decl.kind {
            DeclKind::Gen { tok, specs, .. } => {
                assert_eq!(*tok, Token::Type);
                match &specs[0] {
                    Spec::Type(ts) => {
                        assert_eq!(ts.name.name, "P");
                        match &ts.typ.kind {
                            ExprKind::StructType { fields } => assert_eq!(fields.len(), 2),
                            other => panic!("expected struct type, got {:?}", other),
                        }
                    }
                    other => panic!("expected type spec, got {:?}", other),
                }
            }
            other => panic!("expected gen decl, got {:?}", other),
        },
        other => panic!("expected decl stmt, got {:?}", other),
    }
}

#[test]
fn type_switch_parses() {
    let b = cell("switch v := x.(type) {\ncase int:\n\tprintln(v)\ndefault:\n}");
    assert!(matches!(b.stmts[0].kind, StmtKind::TypeSwitch { .. }));
}

#[test]
fn parse_error_reports_offset() {
    let errs = cell_err("x := ");
    assert!(!errs.is_empty());
    assert!(errs.first().unwrap().offset().is_some());
}

#[test]
fn errors_are_ordered() {
    let errs = cell_err("x := (\ny := )");
    let offsets: Vec<usize> = errs.iter().filter_map(|e| e.offset()).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
}

#[test]
fn parse_expr_str_roundtrip_shapes() {
    assert!(matches!(
        parse_expr_str("map[string]int").unwrap().kind,
        ExprKind::MapType { .. }
    ));
    assert!(matches!(
        parse_expr_str("[]bytes.Buffer").unwrap().kind,
        ExprKind::ArrayType { .. }
    ));
    assert!(matches!(
        parse_expr_str("chan int").unwrap().kind,
        ExprKind::ChanType { .. }
    ));
    assert!(matches!(
        parse_expr_str("func(int) error").unwrap().kind,
        ExprKind::FuncType { .. }
    ));
    assert!(parse_expr_str("x +").is_err());
}

#[test]
fn parse_file_normal_grammar() {
    let f = parse_file("package lgo_exec\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(1)\n}\n")
        .unwrap();
    assert_eq!(f.package_name.name, "lgo_exec");
    assert_eq!(f.decls.len(), 2);
}

#[test]
fn defer_statement() {
    let b = cell("defer mu.Unlock()");
    assert!(matches!(b.stmts[0].kind, StmtKind::Defer { .. }));
}

#[test]
fn channel_receive_expression() {
    let b = cell("v := <-ch");
    match &b.stmts[0].kind {
        StmtKind::Assign { rhs, .. } => {
            assert!(matches!(
                rhs[0].kind,
                ExprKind::Unary {
                    op: Token::Arrow,
                    ..
                }
            ));
        }
        other => panic!("expected assign, got {:?}", other),
    }
}

#[test]
fn multi_assign() {
    let b = cell("a, b = b, a");
    match &b.stmts[0].kind {
        StmtKind::Assign { lhs, tok, rhs } => {
            assert_eq!(lhs.len(), 2);
            assert_eq!(rhs.len(), 2);
            assert_eq!(*tok, Token::Assign);
        }
        other => panic!("expected assign, got {:?}", other),
    }
}

#[test]
fn comments_attach_to_block() {
    let b = cell("x := 1 // one\n// trailing");
    assert_eq!(b.comments.len(), 2);
}

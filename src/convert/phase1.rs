//! Phase 1: lift a relaxed cell block into a legal compilation unit.
//!
//! Declarations become package-level members; imperative statements become
//! the body of the synthesized entry function. The result type-checks under
//! the strict grammar while preserving every original node (and its id) so
//! phase 2 can consult checker facts gathered here.

use crate::ast::*;
use crate::token::Token;

use super::{CELL_PKG_NAME, INIT_FUNC_NAME};

pub struct Phase1Out {
    pub file: File,
    /// Decl id of the synthesized entry function.
    pub init_func_id: NodeId,
    /// Stmt id of the consume-all assignment, if one was appended.
    pub consume_all_id: Option<NodeId>,
    /// Stmt id of the cell's trailing expression statement, if any.
    pub last_expr_id: Option<NodeId>,
    /// Whether the trailing expression was wrapped in `panic(...)` to dodge
    /// the checker's unused-expression complaint.
    pub last_expr_wrapped: bool,
}

pub fn convert_to_phase1(block: Block) -> Phase1Out {
    let mut decls: Vec<Decl> = Vec::new();
    let mut init_body: Vec<Stmt> = Vec::new();
    let mut vars: Vec<Ident> = Vec::new();

    for stmt in block.stmts {
        if let StmtKind::Decl(decl) = &stmt.kind {
            match &decl.kind {
                DeclKind::Gen {
                    tok: tok @ (Token::Const | Token::Var),
                    specs,
                    ..
                } => {
                    if *tok == Token::Var {
                        for spec in specs {
                            if let Spec::Value(vs) = spec {
                                for name in &vs.names {
                                    vars.push(name.clone());
                                }
                            }
                        }
                    }
                    init_body.push(stmt);
                    continue;
                }
                _ => {
                    if let StmtKind::Decl(decl) = stmt.kind {
                        decls.push(decl);
                    }
                    continue;
                }
            }
        }
        if let StmtKind::Assign {
            lhs,
            tok: Token::Define,
            ..
        } = &stmt.kind
        {
            for e in lhs {
                if let ExprKind::Ident(ident) = &e.kind {
                    vars.push(ident.clone());
                }
            }
        }
        init_body.push(stmt);
    }

    // Trailing expression: wrap non-calls in panic so the checker accepts
    // an otherwise unused expression. Phase 2 turns either form into a
    // print call.
    let mut last_expr_id = None;
    let mut last_expr_wrapped = false;
    if let Some(last) = init_body.last_mut() {
        if let StmtKind::Expr(e) = &mut last.kind {
            last_expr_id = Some(last.id);
            if !e.is_call() {
                let inner = std::mem::replace(e, Expr::bad());
                *e = Expr::call(Expr::ident("panic"), vec![inner]);
                last_expr_wrapped = true;
            }
        }
    }

    // Consume-all: `_, _ = a, b` for every session-visible var, so the
    // checker does not flag unused locals. Removed again in phase 2.
    let mut consume_all_id = None;
    let var_names = unique_sorted_names(&vars);
    if !var_names.is_empty() {
        let lhs: Vec<Expr> = var_names.iter().map(|_| Expr::ident("_")).collect();
        let rhs: Vec<Expr> = var_names.iter().map(|n| Expr::ident(n.as_str())).collect();
        let consume = Stmt::new(StmtKind::Assign {
            lhs,
            tok: Token::Assign,
            rhs,
        });
        consume_all_id = Some(consume.id);
        init_body.push(consume);
    }

    let init_func = Decl::new(DeclKind::Func(FuncDecl {
        recv: None,
        name: Ident::new(INIT_FUNC_NAME),
        typ: FuncType::nullary(),
        body: Some(BlockStmt::new(init_body)),
    }));
    let init_func_id = init_func.id;
    decls.push(init_func);

    Phase1Out {
        file: File {
            id: next_id(),
            package_name: Ident::new(CELL_PKG_NAME),
            decls,
            comments: block.comments,
        },
        init_func_id,
        consume_all_id,
        last_expr_id,
        last_expr_wrapped,
    }
}

fn unique_sorted_names(idents: &[Ident]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for ident in idents {
        if ident.is_blank() || names.iter().any(|n| n == &ident.name) {
            continue;
        }
        names.push(ident.name.clone());
    }
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_cell;
    use crate::printer::print_file;

    fn phase1(src: &str) -> Phase1Out {
        convert_to_phase1(parse_cell(src).expect("parse failed"))
    }

    #[test]
    fn splits_decls_from_init_body() {
        let out = phase1("func f() int {\n\treturn 1\n}\nx := f()");
        assert_eq!(out.file.decls.len(), 2);
        let printed = print_file(&out.file);
        assert!(printed.contains("func lgo_init() {"));
        assert!(printed.contains("x := f()"));
    }

    #[test]
    fn wraps_trailing_non_call_in_panic() {
        let out = phase1("x := 10\nx * x");
        assert!(out.last_expr_wrapped);
        let printed = print_file(&out.file);
        assert!(printed.contains("panic(x * x)"));
    }

    #[test]
    fn leaves_trailing_call_unwrapped() {
        let out = phase1("f()");
        assert!(out.last_expr_id.is_some());
        assert!(!out.last_expr_wrapped);
    }

    #[test]
    fn consume_all_lists_unique_sorted_names() {
        let out = phase1("b := 1\na := 2\nb := 3");
        assert!(out.consume_all_id.is_some());
        let printed = print_file(&out.file);
        assert!(printed.contains("_, _ = a, b"), "got:\n{}", printed);
    }

    #[test]
    fn var_decl_stays_in_init_body() {
        let out = phase1("var x int = 3");
        let printed = print_file(&out.file);
        assert!(printed.contains("func lgo_init() {\n\tvar x int = 3"));
    }

    #[test]
    fn const_decl_stays_in_init_body_for_now() {
        let out = phase1("const k = 2");
        let printed = print_file(&out.file);
        assert!(printed.contains("func lgo_init() {\n\tconst k = 2"));
    }

    #[test]
    fn empty_cell_still_produces_entry() {
        let out = phase1("");
        assert_eq!(out.file.decls.len(), 1);
        assert!(out.consume_all_id.is_none());
        assert!(out.last_expr_id.is_none());
    }
}

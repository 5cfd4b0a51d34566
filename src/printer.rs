//! AST → host source text.
//!
//! Output formatting is canonical: tab indentation, one space around binary
//! operators, declarations separated by single newlines under the package
//! clause. The emitted text is the contract with the host build tool, so
//! stability matters more than prettiness.

use crate::ast::*;
use crate::token::Token;

/// Render a compilation unit: package clause first, then each declaration.
pub fn print_file(file: &File) -> String {
    let mut p = Printer::new();
    p.push("package ");
    p.push(&file.package_name.name);
    p.push("\n\n");
    for decl in &file.decls {
        p.decl(decl);
        p.newline_if_needed();
    }
    p.buf
}

pub fn print_expr(e: &Expr) -> String {
    let mut p = Printer::new();
    p.expr(e);
    p.buf
}

pub fn print_stmt(s: &Stmt) -> String {
    let mut p = Printer::new();
    p.stmt(s);
    p.buf
}

struct Printer {
    buf: String,
    indent: usize,
}

impl Printer {
    fn new() -> Printer {
        Printer {
            buf: String::new(),
            indent: 0,
        }
    }

    fn push(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    fn tabs(&mut self) {
        for _ in 0..self.indent {
            self.buf.push('\t');
        }
    }

    fn newline_if_needed(&mut self) {
        if !self.buf.ends_with('\n') {
            self.buf.push('\n');
        }
    }

    // ── Declarations ─────────────────────────────────────────────────────

    fn decl(&mut self, decl: &Decl) {
        match &decl.kind {
            DeclKind::Gen { tok, specs, paren } => self.gen_decl(*tok, specs, *paren),
            DeclKind::Func(fd) => self.func_decl(fd),
        }
    }

    fn gen_decl(&mut self, tok: Token, specs: &[Spec], paren: bool) {
        self.push(tok.text());
        if paren || specs.len() > 1 {
            self.push(" (\n");
            self.indent += 1;
            for spec in specs {
                self.tabs();
                self.spec(spec);
                self.push("\n");
            }
            self.indent -= 1;
            self.tabs();
            self.push(")");
        } else if let Some(spec) = specs.first() {
            self.push(" ");
            self.spec(spec);
        }
        self.push("\n");
    }

    fn spec(&mut self, spec: &Spec) {
        match spec {
            Spec::Import(im) => {
                if let Some(name) = &im.name {
                    self.push(&name.name);
                    self.push(" ");
                }
                self.push(&format!("{:?}", im.path));
            }
            Spec::Value(vs) => {
                self.ident_list(&vs.names);
                if let Some(typ) = &vs.typ {
                    self.push(" ");
                    self.expr(typ);
                }
                if !vs.values.is_empty() {
                    self.push(" = ");
                    self.expr_list(&vs.values);
                }
            }
            Spec::Type(ts) => {
                self.push(&ts.name.name);
                if ts.alias {
                    self.push(" = ");
                } else {
                    self.push(" ");
                }
                self.expr(&ts.typ);
            }
        }
    }

    fn func_decl(&mut self, fd: &FuncDecl) {
        self.push("func ");
        if let Some(recv) = &fd.recv {
            self.push("(");
            self.field(recv);
            self.push(") ");
        }
        self.push(&fd.name.name);
        self.signature(&fd.typ);
        match &fd.body {
            Some(body) => {
                self.push(" ");
                self.block(body);
                self.push("\n");
            }
            None => self.push("\n"),
        }
    }

    fn signature(&mut self, ft: &FuncType) {
        self.push("(");
        self.fields(&ft.params);
        self.push(")");
        match ft.results.len() {
            0 => {}
            1 if ft.results[0].names.is_empty() => {
                self.push(" ");
                self.expr(&ft.results[0].typ);
            }
            _ => {
                self.push(" (");
                self.fields(&ft.results);
                self.push(")");
            }
        }
    }

    fn fields(&mut self, fields: &[Field]) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.field(field);
        }
    }

    fn field(&mut self, field: &Field) {
        if !field.names.is_empty() {
            self.ident_list(&field.names);
            self.push(" ");
        }
        self.expr(&field.typ);
        if let Some(tag) = &field.tag {
            self.push(" `");
            self.push(tag);
            self.push("`");
        }
    }

    fn ident_list(&mut self, idents: &[Ident]) {
        for (i, ident) in idents.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&ident.name);
        }
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn block(&mut self, block: &BlockStmt) {
        if block.list.is_empty() {
            self.push("{\n");
            self.tabs();
            self.push("}");
            return;
        }
        self.push("{\n");
        self.indent += 1;
        for stmt in &block.list {
            self.stmt_line(stmt);
        }
        self.indent -= 1;
        self.tabs();
        self.push("}");
    }

    fn stmt_line(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Labeled { .. } => self.stmt(stmt),
            _ => {
                self.tabs();
                self.stmt(stmt);
            }
        }
        self.newline_if_needed();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Decl(decl) => {
                // Trailing newline is supplied by the caller.
                self.decl(decl);
                while self.buf.ends_with('\n') {
                    self.buf.pop();
                }
            }
            StmtKind::Empty => {}
            StmtKind::Labeled { label, stmt } => {
                // Labels outdent one level.
                let outdent = self.indent.saturating_sub(1);
                for _ in 0..outdent {
                    self.buf.push('\t');
                }
                self.push(&label.name);
                self.push(":\n");
                self.tabs();
                self.stmt(stmt);
            }
            StmtKind::Expr(e) => self.expr(e),
            StmtKind::Send { chan, value } => {
                self.expr(chan);
                self.push(" <- ");
                self.expr(value);
            }
            StmtKind::IncDec { x, op } => {
                self.expr(x);
                self.push(op.text());
            }
            StmtKind::Assign { lhs, tok, rhs } => {
                self.expr_list(lhs);
                self.push(" ");
                self.push(tok.text());
                self.push(" ");
                self.expr_list(rhs);
            }
            StmtKind::Go { call } => {
                self.push("go ");
                self.expr(call);
            }
            StmtKind::Defer { call } => {
                self.push("defer ");
                self.expr(call);
            }
            StmtKind::Return { results } => {
                self.push("return");
                if !results.is_empty() {
                    self.push(" ");
                    self.expr_list(results);
                }
            }
            StmtKind::Branch { tok, label } => {
                self.push(tok.text());
                if let Some(label) = label {
                    self.push(" ");
                    self.push(&label.name);
                }
            }
            StmtKind::Block(block) => self.block(block),
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                self.push("if ");
                if let Some(init) = init {
                    self.stmt(init);
                    self.push("; ");
                }
                self.expr(cond);
                self.push(" ");
                self.block(body);
                if let Some(els) = els {
                    self.push(" else ");
                    self.stmt(els);
                }
            }
            StmtKind::CaseClause { list, body } => {
                if list.is_empty() {
                    self.push("default:");
                } else {
                    self.push("case ");
                    self.expr_list(list);
                    self.push(":");
                }
                self.clause_body(body);
            }
            StmtKind::Switch { init, tag, body } => {
                self.push("switch ");
                if let Some(init) = init {
                    self.stmt(init);
                    self.push("; ");
                }
                if let Some(tag) = tag {
                    self.expr(tag);
                    self.push(" ");
                }
                self.case_block(body);
            }
            StmtKind::TypeSwitch { init, assign, body } => {
                self.push("switch ");
                if let Some(init) = init {
                    self.stmt(init);
                    self.push("; ");
                }
                self.stmt(assign);
                self.push(" ");
                self.case_block(body);
            }
            StmtKind::CommClause { comm, body } => {
                match comm {
                    Some(comm) => {
                        self.push("case ");
                        self.stmt(comm);
                        self.push(":");
                    }
                    None => self.push("default:"),
                }
                self.clause_body(body);
            }
            StmtKind::Select { body } => {
                self.push("select ");
                self.case_block(body);
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                self.push("for ");
                if init.is_some() || post.is_some() {
                    if let Some(init) = init {
                        self.stmt(init);
                    }
                    self.push("; ");
                    if let Some(cond) = cond {
                        self.expr(cond);
                    }
                    self.push("; ");
                    if let Some(post) = post {
                        self.stmt(post);
                    }
                    self.push(" ");
                } else if let Some(cond) = cond {
                    self.expr(cond);
                    self.push(" ");
                }
                self.block(body);
            }
            StmtKind::Range {
                key,
                value,
                tok,
                x,
                body,
            } => {
                self.push("for ");
                if let Some(key) = key {
                    self.expr(key);
                    if let Some(value) = value {
                        self.push(", ");
                        self.expr(value);
                    }
                    self.push(" ");
                    self.push(tok.unwrap_or(Token::Assign).text());
                    self.push(" ");
                }
                self.push("range ");
                self.expr(x);
                self.push(" ");
                self.block(body);
            }
            StmtKind::Bad => self.push("/* bad statement */"),
        }
    }

    fn case_block(&mut self, clauses: &[Stmt]) {
        self.push("{\n");
        for clause in clauses {
            self.tabs();
            self.stmt(clause);
        }
        self.tabs();
        self.push("}");
    }

    fn clause_body(&mut self, body: &[Stmt]) {
        self.push("\n");
        self.indent += 1;
        for stmt in body {
            self.stmt_line(stmt);
        }
        self.indent -= 1;
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expr_list(&mut self, exprs: &[Expr]) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(e);
        }
    }

    fn expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Ident(id) => self.push(&id.name),
            ExprKind::BasicLit { value, .. } => self.push(value),
            ExprKind::CompositeLit { typ, elts } => {
                if let Some(typ) = typ {
                    self.expr(typ);
                }
                self.push("{");
                self.expr_list(elts);
                self.push("}");
            }
            ExprKind::FuncLit { typ, body } => {
                self.push("func");
                self.signature(typ);
                self.push(" ");
                self.block(body);
            }
            ExprKind::Paren(x) => {
                self.push("(");
                self.expr(x);
                self.push(")");
            }
            ExprKind::Selector { x, sel } => {
                self.expr(x);
                self.push(".");
                self.push(&sel.name);
            }
            ExprKind::Index { x, index } => {
                self.expr(x);
                self.push("[");
                self.expr(index);
                self.push("]");
            }
            ExprKind::Slice { x, low, high, max } => {
                self.expr(x);
                self.push("[");
                if let Some(low) = low {
                    self.expr(low);
                }
                self.push(":");
                if let Some(high) = high {
                    self.expr(high);
                }
                if let Some(max) = max {
                    self.push(":");
                    self.expr(max);
                }
                self.push("]");
            }
            ExprKind::TypeAssert { x, typ } => {
                self.expr(x);
                self.push(".(");
                match typ {
                    Some(typ) => self.expr(typ),
                    None => self.push("type"),
                }
                self.push(")");
            }
            ExprKind::Call {
                fun,
                args,
                ellipsis,
            } => {
                self.expr(fun);
                self.push("(");
                self.expr_list(args);
                if *ellipsis {
                    self.push("...");
                }
                self.push(")");
            }
            ExprKind::Star(x) => {
                self.push("*");
                self.expr(x);
            }
            ExprKind::Unary { op, x } => {
                self.push(op.text());
                self.expr(x);
            }
            ExprKind::Binary { x, op, y } => {
                self.expr(x);
                self.push(" ");
                self.push(op.text());
                self.push(" ");
                self.expr(y);
            }
            ExprKind::KeyValue { key, value } => {
                self.expr(key);
                self.push(": ");
                self.expr(value);
            }
            ExprKind::ArrayType { len, elt } => {
                self.push("[");
                if let Some(len) = len {
                    self.expr(len);
                }
                self.push("]");
                self.expr(elt);
            }
            ExprKind::StructType { fields } => {
                if fields.is_empty() {
                    self.push("struct{}");
                    return;
                }
                self.push("struct {\n");
                self.indent += 1;
                for field in fields {
                    self.tabs();
                    self.field(field);
                    self.push("\n");
                }
                self.indent -= 1;
                self.tabs();
                self.push("}");
            }
            ExprKind::FuncType(ft) => {
                self.push("func");
                self.signature(ft);
            }
            ExprKind::InterfaceType { methods } => {
                if methods.is_empty() {
                    self.push("interface{}");
                    return;
                }
                self.push("interface {\n");
                self.indent += 1;
                for field in methods {
                    self.tabs();
                    if field.names.is_empty() {
                        self.expr(&field.typ);
                    } else {
                        self.push(&field.names[0].name);
                        if let ExprKind::FuncType(ft) = &field.typ.kind {
                            self.signature(ft);
                        }
                    }
                    self.push("\n");
                }
                self.indent -= 1;
                self.tabs();
                self.push("}");
            }
            ExprKind::MapType { key, value } => {
                self.push("map[");
                self.expr(key);
                self.push("]");
                self.expr(value);
            }
            ExprKind::ChanType { dir, value } => {
                match dir {
                    ChanDir::Both => self.push("chan "),
                    ChanDir::Send => self.push("chan<- "),
                    ChanDir::Recv => self.push("<-chan "),
                }
                self.expr(value);
            }
            ExprKind::Ellipsis { elt } => {
                self.push("...");
                if let Some(elt) = elt {
                    self.expr(elt);
                }
            }
            ExprKind::Bad => self.push("/* bad expr */"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_cell, parse_expr_str};

    fn roundtrip_stmt(src: &str) -> String {
        let block = parse_cell(src).expect("parse failed");
        print_stmt(&block.stmts[0])
    }

    #[test]
    fn prints_assignment() {
        assert_eq!(roundtrip_stmt("x := 10"), "x := 10");
        assert_eq!(roundtrip_stmt("a, b = b, a"), "a, b = b, a");
    }

    #[test]
    fn prints_binary_with_spaces() {
        assert_eq!(roundtrip_stmt("x * x"), "x * x");
        assert_eq!(roundtrip_stmt("(a + b) * c"), "(a + b) * c");
    }

    #[test]
    fn prints_func_decl() {
        let src = "func fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * fact(n-1)\n\t}\n\treturn 1\n}";
        let printed = roundtrip_stmt(src);
        assert_eq!(
            printed,
            "func fact(n int64) int64 {\n\tif n > 0 {\n\t\treturn n * fact(n - 1)\n\t}\n\treturn 1\n}"
        );
    }

    #[test]
    fn prints_struct_type_decl() {
        let printed = roundtrip_stmt("type P struct {\n\tName string\n}");
        assert_eq!(printed, "type P struct {\n\tName string\n}");
    }

    #[test]
    fn prints_select() {
        let printed = roundtrip_stmt("select {\ncase v := <-ch:\n\tprintln(v)\ndefault:\n}");
        assert_eq!(
            printed,
            "select {\ncase v := <-ch:\n\tprintln(v)\ndefault:\n}"
        );
    }

    #[test]
    fn prints_for_range() {
        assert_eq!(
            roundtrip_stmt("for k, v := range m {\n\tprintln(k, v)\n}"),
            "for k, v := range m {\n\tprintln(k, v)\n}"
        );
    }

    #[test]
    fn prints_type_exprs() {
        for src in [
            "map[string]int",
            "[]bytes.Buffer",
            "chan int",
            "<-chan int",
            "func(int) error",
            "*P",
            "[4]byte",
        ] {
            let e = parse_expr_str(src).unwrap();
            assert_eq!(print_expr(&e), src);
        }
    }

    #[test]
    fn prints_file_with_package_clause() {
        let block = parse_cell("func f() int {\n\treturn 1\n}").unwrap();
        let decl = match &block.stmts[0].kind {
            crate::ast::StmtKind::Decl(d) => d.clone(),
            _ => unreachable!(),
        };
        let file = crate::ast::File {
            id: crate::ast::next_id(),
            package_name: crate::ast::Ident::new("lgo_exec"),
            decls: vec![decl],
            comments: Vec::new(),
        };
        assert_eq!(
            print_file(&file),
            "package lgo_exec\n\nfunc f() int {\n\treturn 1\n}\n"
        );
    }

    #[test]
    fn prints_labeled_loop() {
        let printed = roundtrip_stmt("loop:\nfor {\n\tbreak loop\n}");
        assert_eq!(printed, "loop:\nfor {\n\tbreak loop\n}");
    }

    #[test]
    fn prints_import_group() {
        let block = parse_cell("import (\n\t\"fmt\"\n\tstrs \"strings\"\n)").unwrap();
        let printed = print_stmt(&block.stmts[0]);
        assert_eq!(printed, "import (\n\t\"fmt\"\n\tstrs \"strings\"\n)");
    }
}

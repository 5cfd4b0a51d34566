//! Synthetic host standard library.
//!
//! The checker resolves imports against this registry: a curated subset of
//! the host's standard packages, built in code the first time a path is
//! imported. Enough surface is modeled for checking, completion, and
//! inspection of typical cell code; an unknown path surfaces as a type
//! error naming the path.

use crate::ast::ChanDir;
use crate::types::*;

/// Resolve an import path to a package, building it on first use.
pub fn import(ctx: &mut TypeCtx, path: &str) -> Option<PkgId> {
    if let Some(pkg) = ctx.pkg_by_path(path) {
        return Some(pkg);
    }
    build(ctx, path)
}

/// Import path of the runtime-support package injected into generated code.
pub fn runtime_pkg_path() -> &'static str {
    goblet_runtime::SELF_PKG_PATH
}

fn build(ctx: &mut TypeCtx, path: &str) -> Option<PkgId> {
    match path {
        "fmt" => Some(build_fmt(ctx)),
        "strings" => Some(build_strings(ctx)),
        "bytes" => Some(build_bytes(ctx)),
        "strconv" => Some(build_strconv(ctx)),
        "errors" => Some(build_errors(ctx)),
        "time" => Some(build_time(ctx)),
        "sync" => Some(build_sync(ctx)),
        "context" => Some(build_context(ctx)),
        "sort" => Some(build_sort(ctx)),
        "math" => Some(build_math(ctx)),
        "os" => Some(build_os(ctx)),
        "io" => Some(build_io(ctx)),
        "bufio" => Some(build_bufio(ctx)),
        p if p == runtime_pkg_path() => Some(build_runtime(ctx)),
        _ => None,
    }
}

// ── Construction helpers ─────────────────────────────────────────────────

struct PkgBuilder<'a> {
    ctx: &'a mut TypeCtx,
    pkg: PkgId,
}

impl<'a> PkgBuilder<'a> {
    fn new(ctx: &'a mut TypeCtx, path: &str, name: &str) -> PkgBuilder<'a> {
        let pkg = ctx.new_package(path, name, false);
        PkgBuilder { ctx, pkg }
    }

    fn basic(&self, kind: BasicKind) -> TypeId {
        self.ctx.basic(kind)
    }

    fn any(&mut self) -> TypeId {
        self.ctx.intern(TypeKind::Interface {
            methods: vec![],
            embeddeds: vec![],
        })
    }

    fn slice(&mut self, elem: TypeId) -> TypeId {
        self.ctx.intern(TypeKind::Slice(elem))
    }

    fn ptr(&mut self, elem: TypeId) -> TypeId {
        self.ctx.intern(TypeKind::Pointer(elem))
    }

    fn error_type(&self) -> TypeId {
        let obj = self
            .ctx
            .scope_lookup(self.ctx.universe, "error")
            .expect("universe error type");
        self.ctx.obj(obj).typ
    }

    fn func(&mut self, name: &str, params: Vec<(&str, TypeId)>, results: Vec<TypeId>) {
        self.func_full(name, params, results, false);
    }

    fn func_variadic(&mut self, name: &str, params: Vec<(&str, TypeId)>, results: Vec<TypeId>) {
        self.func_full(name, params, results, true);
    }

    fn func_full(
        &mut self,
        name: &str,
        params: Vec<(&str, TypeId)>,
        results: Vec<TypeId>,
        variadic: bool,
    ) {
        let typ = self.ctx.new_func_type(params, results, variadic, Some(self.pkg));
        let obj = self.ctx.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Func,
            typ,
            pkg: Some(self.pkg),
        });
        let scope = self.ctx.pkg(self.pkg).scope;
        self.ctx.scope_insert(scope, obj);
    }

    fn var(&mut self, name: &str, typ: TypeId) {
        let obj = self.ctx.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Var { is_field: false },
            typ,
            pkg: Some(self.pkg),
        });
        let scope = self.ctx.pkg(self.pkg).scope;
        self.ctx.scope_insert(scope, obj);
    }

    fn konst(&mut self, name: &str, typ: TypeId) {
        let obj = self.ctx.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Const,
            typ,
            pkg: Some(self.pkg),
        });
        let scope = self.ctx.pkg(self.pkg).scope;
        self.ctx.scope_insert(scope, obj);
    }

    fn named(&mut self, name: &str, underlying: TypeId) -> (ObjId, TypeId) {
        self.ctx.declare_named(self.pkg, name, underlying)
    }

    fn struct_of(&mut self, fields: Vec<(&str, TypeId)>) -> TypeId {
        let field_objs = fields
            .into_iter()
            .map(|(name, typ)| self.ctx.new_field(name, typ, Some(self.pkg)))
            .collect();
        self.ctx.intern(TypeKind::Struct { fields: field_objs })
    }

    fn method(
        &mut self,
        type_obj: ObjId,
        name: &str,
        params: Vec<(&str, TypeId)>,
        results: Vec<TypeId>,
    ) {
        self.method_full(type_obj, name, params, results, false);
    }

    fn method_variadic(
        &mut self,
        type_obj: ObjId,
        name: &str,
        params: Vec<(&str, TypeId)>,
        results: Vec<TypeId>,
    ) {
        self.method_full(type_obj, name, params, results, true);
    }

    fn method_full(
        &mut self,
        type_obj: ObjId,
        name: &str,
        params: Vec<(&str, TypeId)>,
        results: Vec<TypeId>,
        variadic: bool,
    ) {
        let recv_type = self.ctx.obj(type_obj).typ;
        let recv = self.ctx.new_var("recv", recv_type, Some(self.pkg));
        let typ = self.ctx.new_func_type(params, results, variadic, Some(self.pkg));
        let typ = match self.ctx.type_kind(typ).clone() {
            TypeKind::Func(mut sig) => {
                sig.recv = Some(recv);
                self.ctx.intern(TypeKind::Func(sig))
            }
            _ => typ,
        };
        let obj = self.ctx.new_object(Object {
            name: name.to_string(),
            kind: ObjKind::Func,
            typ,
            pkg: Some(self.pkg),
        });
        self.ctx.add_method(type_obj, obj);
    }

    fn done(self) -> PkgId {
        self.pkg
    }
}

fn empty_struct(ctx: &mut TypeCtx) -> TypeId {
    ctx.intern(TypeKind::Struct { fields: vec![] })
}

// ── Packages ─────────────────────────────────────────────────────────────

fn build_fmt(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "fmt", "fmt");
    let str_t = b.basic(BasicKind::Str);
    let int_t = b.basic(BasicKind::Int);
    let any = b.any();
    let args = b.slice(any);
    let err = b.error_type();

    // Stringer is widely asserted against.
    let string_sig = b.ctx.new_func_type(vec![], vec![str_t], false, None);
    let string_m = b.ctx.new_object(Object {
        name: "String".to_string(),
        kind: ObjKind::Func,
        typ: string_sig,
        pkg: Some(b.pkg),
    });
    let stringer_iface = b.ctx.intern(TypeKind::Interface {
        methods: vec![string_m],
        embeddeds: vec![],
    });
    b.named("Stringer", stringer_iface);

    b.func_variadic("Println", vec![("a", args)], vec![int_t, err]);
    b.func_variadic("Print", vec![("a", args)], vec![int_t, err]);
    b.func_variadic("Printf", vec![("format", str_t), ("a", args)], vec![int_t, err]);
    b.func_variadic("Sprintf", vec![("format", str_t), ("a", args)], vec![str_t]);
    b.func_variadic("Sprint", vec![("a", args)], vec![str_t]);
    b.func_variadic("Sprintln", vec![("a", args)], vec![str_t]);
    b.func_variadic("Errorf", vec![("format", str_t), ("a", args)], vec![err]);
    b.done()
}

fn build_strings(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "strings", "strings");
    let str_t = b.basic(BasicKind::Str);
    let int_t = b.basic(BasicKind::Int);
    let bool_t = b.basic(BasicKind::Bool);
    let str_slice = b.slice(str_t);
    let byte_t = b.basic(BasicKind::Uint8);
    let byte_slice = b.slice(byte_t);
    let err = b.error_type();

    let builder_struct = b.struct_of(vec![]);
    let (builder_obj, _) = b.named("Builder", builder_struct);
    b.method(builder_obj, "WriteString", vec![("s", str_t)], vec![int_t, err]);
    b.method(builder_obj, "Write", vec![("p", byte_slice)], vec![int_t, err]);
    b.method(builder_obj, "String", vec![], vec![str_t]);
    b.method(builder_obj, "Len", vec![], vec![int_t]);
    b.method(builder_obj, "Reset", vec![], vec![]);

    b.func("ToUpper", vec![("s", str_t)], vec![str_t]);
    b.func("ToLower", vec![("s", str_t)], vec![str_t]);
    b.func("TrimSpace", vec![("s", str_t)], vec![str_t]);
    b.func("Split", vec![("s", str_t), ("sep", str_t)], vec![str_slice]);
    b.func("Join", vec![("elems", str_slice), ("sep", str_t)], vec![str_t]);
    b.func("Contains", vec![("s", str_t), ("substr", str_t)], vec![bool_t]);
    b.func("HasPrefix", vec![("s", str_t), ("prefix", str_t)], vec![bool_t]);
    b.func("HasSuffix", vec![("s", str_t), ("suffix", str_t)], vec![bool_t]);
    b.func("Repeat", vec![("s", str_t), ("count", int_t)], vec![str_t]);
    b.func("Index", vec![("s", str_t), ("substr", str_t)], vec![int_t]);
    b.func(
        "Replace",
        vec![("s", str_t), ("old", str_t), ("new", str_t), ("n", int_t)],
        vec![str_t],
    );
    b.done()
}

fn build_bytes(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "bytes", "bytes");
    let str_t = b.basic(BasicKind::Str);
    let int_t = b.basic(BasicKind::Int);
    let bool_t = b.basic(BasicKind::Bool);
    let byte_t = b.basic(BasicKind::Uint8);
    let byte_slice = b.slice(byte_t);
    let err = b.error_type();

    let buffer_struct = b.struct_of(vec![]);
    let (buffer_obj, buffer_t) = b.named("Buffer", buffer_struct);
    b.method(buffer_obj, "Write", vec![("p", byte_slice)], vec![int_t, err]);
    b.method(buffer_obj, "WriteString", vec![("s", str_t)], vec![int_t, err]);
    b.method(buffer_obj, "WriteByte", vec![("c", byte_t)], vec![err]);
    b.method(buffer_obj, "String", vec![], vec![str_t]);
    b.method(buffer_obj, "Len", vec![], vec![int_t]);
    b.method(buffer_obj, "Reset", vec![], vec![]);
    b.method(buffer_obj, "Bytes", vec![], vec![byte_slice]);

    let buffer_ptr = b.ptr(buffer_t);
    b.func("NewBuffer", vec![("buf", byte_slice)], vec![buffer_ptr]);
    b.func("NewBufferString", vec![("s", str_t)], vec![buffer_ptr]);
    b.func("Contains", vec![("b", byte_slice), ("subslice", byte_slice)], vec![bool_t]);
    b.func("Equal", vec![("a", byte_slice), ("b", byte_slice)], vec![bool_t]);
    b.done()
}

fn build_strconv(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "strconv", "strconv");
    let str_t = b.basic(BasicKind::Str);
    let int_t = b.basic(BasicKind::Int);
    let i64_t = b.basic(BasicKind::Int64);
    let err = b.error_type();

    b.func("Itoa", vec![("i", int_t)], vec![str_t]);
    b.func("Atoi", vec![("s", str_t)], vec![int_t, err]);
    b.func("Quote", vec![("s", str_t)], vec![str_t]);
    b.func(
        "FormatInt",
        vec![("i", i64_t), ("base", int_t)],
        vec![str_t],
    );
    b.func(
        "ParseInt",
        vec![("s", str_t), ("base", int_t), ("bitSize", int_t)],
        vec![i64_t, err],
    );
    b.done()
}

fn build_errors(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "errors", "errors");
    let str_t = b.basic(BasicKind::Str);
    let err = b.error_type();
    let bool_t = b.basic(BasicKind::Bool);
    b.func("New", vec![("text", str_t)], vec![err]);
    b.func("Is", vec![("err", err), ("target", err)], vec![bool_t]);
    b.func("Unwrap", vec![("err", err)], vec![err]);
    b.done()
}

fn build_time(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "time", "time");
    let i64_t = b.basic(BasicKind::Int64);
    let f64_t = b.basic(BasicKind::Float64);
    let str_t = b.basic(BasicKind::Str);
    let bool_t = b.basic(BasicKind::Bool);

    let (duration_obj, duration_t) = b.named("Duration", i64_t);
    b.method(duration_obj, "Seconds", vec![], vec![f64_t]);
    b.method(duration_obj, "String", vec![], vec![str_t]);
    b.method(duration_obj, "Milliseconds", vec![], vec![i64_t]);

    let time_struct = b.struct_of(vec![]);
    let (time_obj, time_t) = b.named("Time", time_struct);
    b.method(time_obj, "Unix", vec![], vec![i64_t]);
    b.method(time_obj, "UnixNano", vec![], vec![i64_t]);
    b.method(time_obj, "Add", vec![("d", duration_t)], vec![time_t]);
    b.method(time_obj, "Sub", vec![("u", time_t)], vec![duration_t]);
    b.method(time_obj, "Before", vec![("u", time_t)], vec![bool_t]);
    b.method(time_obj, "After", vec![("u", time_t)], vec![bool_t]);
    b.method(time_obj, "String", vec![], vec![str_t]);

    b.konst("Nanosecond", duration_t);
    b.konst("Microsecond", duration_t);
    b.konst("Millisecond", duration_t);
    b.konst("Second", duration_t);
    b.konst("Minute", duration_t);
    b.konst("Hour", duration_t);

    b.func("Sleep", vec![("d", duration_t)], vec![]);
    b.func("Now", vec![], vec![time_t]);
    b.func("Since", vec![("t", time_t)], vec![duration_t]);

    let ch_time = b.ctx.intern(TypeKind::Chan {
        dir: ChanDir::Recv,
        elem: time_t,
    });
    b.func("After", vec![("d", duration_t)], vec![ch_time]);
    b.func("Tick", vec![("d", duration_t)], vec![ch_time]);
    b.done()
}

fn build_sync(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "sync", "sync");
    let int_t = b.basic(BasicKind::Int);

    let mutex_struct = b.struct_of(vec![]);
    let (mutex_obj, _) = b.named("Mutex", mutex_struct);
    b.method(mutex_obj, "Lock", vec![], vec![]);
    b.method(mutex_obj, "Unlock", vec![], vec![]);

    let rw_struct = b.struct_of(vec![]);
    let (rw_obj, _) = b.named("RWMutex", rw_struct);
    b.method(rw_obj, "Lock", vec![], vec![]);
    b.method(rw_obj, "Unlock", vec![], vec![]);
    b.method(rw_obj, "RLock", vec![], vec![]);
    b.method(rw_obj, "RUnlock", vec![], vec![]);

    let wg_struct = b.struct_of(vec![]);
    let (wg_obj, _) = b.named("WaitGroup", wg_struct);
    b.method(wg_obj, "Add", vec![("delta", int_t)], vec![]);
    b.method(wg_obj, "Done", vec![], vec![]);
    b.method(wg_obj, "Wait", vec![], vec![]);

    let once_struct = b.struct_of(vec![]);
    let (once_obj, _) = b.named("Once", once_struct);
    let nullary = b.ctx.new_func_type(vec![], vec![], false, None);
    b.method(once_obj, "Do", vec![("f", nullary)], vec![]);
    b.done()
}

fn build_context(ctx: &mut TypeCtx) -> PkgId {
    let empty = empty_struct(ctx);
    let mut b = PkgBuilder::new(ctx, "context", "context");
    let err = b.error_type();

    let done_chan = b.ctx.intern(TypeKind::Chan {
        dir: ChanDir::Recv,
        elem: empty,
    });
    let done_sig = b.ctx.new_func_type(vec![], vec![done_chan], false, None);
    let done_m = b.ctx.new_object(Object {
        name: "Done".to_string(),
        kind: ObjKind::Func,
        typ: done_sig,
        pkg: Some(b.pkg),
    });
    let err_sig = b.ctx.new_func_type(vec![], vec![err], false, None);
    let err_m = b.ctx.new_object(Object {
        name: "Err".to_string(),
        kind: ObjKind::Func,
        typ: err_sig,
        pkg: Some(b.pkg),
    });
    let ctx_iface = b.ctx.intern(TypeKind::Interface {
        methods: vec![done_m, err_m],
        embeddeds: vec![],
    });
    let (_, context_t) = b.named("Context", ctx_iface);

    let nullary = b.ctx.new_func_type(vec![], vec![], false, None);
    let (_, cancel_t) = b.named("CancelFunc", nullary);

    b.func("Background", vec![], vec![context_t]);
    b.func("TODO", vec![], vec![context_t]);
    b.func(
        "WithCancel",
        vec![("parent", context_t)],
        vec![context_t, cancel_t],
    );
    b.done()
}

fn build_sort(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "sort", "sort");
    let int_t = b.basic(BasicKind::Int);
    let str_t = b.basic(BasicKind::Str);
    let bool_t = b.basic(BasicKind::Bool);
    let ints = b.slice(int_t);
    let strs = b.slice(str_t);
    let any = b.any();
    let less = b
        .ctx
        .new_func_type(vec![("i", int_t), ("j", int_t)], vec![bool_t], false, None);

    b.func("Ints", vec![("x", ints)], vec![]);
    b.func("Strings", vec![("x", strs)], vec![]);
    b.func("Slice", vec![("x", any), ("less", less)], vec![]);
    b.done()
}

fn build_math(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "math", "math");
    let f64_t = b.basic(BasicKind::Float64);
    let i64_t = b.basic(BasicKind::Int64);

    b.konst("Pi", f64_t);
    b.konst("E", f64_t);
    b.konst("MaxInt64", i64_t);
    b.konst("MaxFloat64", f64_t);
    b.func("Sqrt", vec![("x", f64_t)], vec![f64_t]);
    b.func("Abs", vec![("x", f64_t)], vec![f64_t]);
    b.func("Floor", vec![("x", f64_t)], vec![f64_t]);
    b.func("Ceil", vec![("x", f64_t)], vec![f64_t]);
    b.func("Pow", vec![("x", f64_t), ("y", f64_t)], vec![f64_t]);
    b.func("Max", vec![("x", f64_t), ("y", f64_t)], vec![f64_t]);
    b.func("Min", vec![("x", f64_t), ("y", f64_t)], vec![f64_t]);
    b.done()
}

fn build_os(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "os", "os");
    let str_t = b.basic(BasicKind::Str);
    let int_t = b.basic(BasicKind::Int);
    let byte_t = b.basic(BasicKind::Uint8);
    let byte_slice = b.slice(byte_t);
    let str_slice = b.slice(str_t);
    let err = b.error_type();

    let file_struct = b.struct_of(vec![]);
    let (file_obj, file_t) = b.named("File", file_struct);
    b.method(file_obj, "Write", vec![("p", byte_slice)], vec![int_t, err]);
    b.method(file_obj, "WriteString", vec![("s", str_t)], vec![int_t, err]);
    b.method(file_obj, "Close", vec![], vec![err]);
    b.method(file_obj, "Name", vec![], vec![str_t]);

    let file_ptr = b.ptr(file_t);
    b.var("Stdout", file_ptr);
    b.var("Stderr", file_ptr);
    b.var("Stdin", file_ptr);
    b.var("Args", str_slice);

    b.func("Getenv", vec![("key", str_t)], vec![str_t]);
    b.func("Exit", vec![("code", int_t)], vec![]);
    b.func("Open", vec![("name", str_t)], vec![file_ptr, err]);
    b.done()
}

fn build_io(ctx: &mut TypeCtx) -> PkgId {
    let mut b = PkgBuilder::new(ctx, "io", "io");
    let int_t = b.basic(BasicKind::Int);
    let i64_t = b.basic(BasicKind::Int64);
    let byte_t = b.basic(BasicKind::Uint8);
    let byte_slice = b.slice(byte_t);
    let err = b.error_type();

    let read_sig = b
        .ctx
        .new_func_type(vec![("p", byte_slice)], vec![int_t, err], false, None);
    let read_m = b.ctx.new_object(Object {
        name: "Read".to_string(),
        kind: ObjKind::Func,
        typ: read_sig,
        pkg: Some(b.pkg),
    });
    let reader_iface = b.ctx.intern(TypeKind::Interface {
        methods: vec![read_m],
        embeddeds: vec![],
    });
    let (_, reader_t) = b.named("Reader", reader_iface);

    let write_sig = b
        .ctx
        .new_func_type(vec![("p", byte_slice)], vec![int_t, err], false, None);
    let write_m = b.ctx.new_object(Object {
        name: "Write".to_string(),
        kind: ObjKind::Func,
        typ: write_sig,
        pkg: Some(b.pkg),
    });
    let writer_iface = b.ctx.intern(TypeKind::Interface {
        methods: vec![write_m],
        embeddeds: vec![],
    });
    let (_, writer_t) = b.named("Writer", writer_iface);

    b.var("EOF", err);
    b.func(
        "Copy",
        vec![("dst", writer_t), ("src", reader_t)],
        vec![i64_t, err],
    );
    let str_t = b.basic(BasicKind::Str);
    b.func(
        "WriteString",
        vec![("w", writer_t), ("s", str_t)],
        vec![int_t, err],
    );
    b.done()
}

fn build_bufio(ctx: &mut TypeCtx) -> PkgId {
    // The reader/writer argument types come from io.
    let io_pkg = import(ctx, "io").expect("io package builds");
    let io_scope = ctx.pkg(io_pkg).scope;
    let io_reader = {
        let obj = ctx.scope_lookup(io_scope, "Reader").expect("io.Reader");
        ctx.obj(obj).typ
    };
    let io_writer = {
        let obj = ctx.scope_lookup(io_scope, "Writer").expect("io.Writer");
        ctx.obj(obj).typ
    };

    let mut b = PkgBuilder::new(ctx, "bufio", "bufio");
    let str_t = b.basic(BasicKind::Str);
    let int_t = b.basic(BasicKind::Int);
    let bool_t = b.basic(BasicKind::Bool);
    let byte_t = b.basic(BasicKind::Uint8);
    let byte_slice = b.slice(byte_t);
    let err = b.error_type();

    let scanner_struct = b.struct_of(vec![]);
    let (scanner_obj, scanner_t) = b.named("Scanner", scanner_struct);
    b.method(scanner_obj, "Scan", vec![], vec![bool_t]);
    b.method(scanner_obj, "Text", vec![], vec![str_t]);
    b.method(scanner_obj, "Bytes", vec![], vec![byte_slice]);
    b.method(scanner_obj, "Err", vec![], vec![err]);

    let reader_struct = b.struct_of(vec![]);
    let (reader_obj, reader_t) = b.named("Reader", reader_struct);
    b.method(reader_obj, "ReadString", vec![("delim", byte_t)], vec![str_t, err]);
    b.method(reader_obj, "Read", vec![("p", byte_slice)], vec![int_t, err]);

    let writer_struct = b.struct_of(vec![]);
    let (writer_obj, writer_t) = b.named("Writer", writer_struct);
    b.method(writer_obj, "WriteString", vec![("s", str_t)], vec![int_t, err]);
    b.method(writer_obj, "Flush", vec![], vec![err]);

    let scanner_ptr = b.ptr(scanner_t);
    let reader_ptr = b.ptr(reader_t);
    let writer_ptr = b.ptr(writer_t);
    b.func("NewScanner", vec![("r", io_reader)], vec![scanner_ptr]);
    b.func("NewReader", vec![("rd", io_reader)], vec![reader_ptr]);
    b.func("NewWriter", vec![("w", io_writer)], vec![writer_ptr]);
    b.done()
}

fn build_runtime(ctx: &mut TypeCtx) -> PkgId {
    let empty = empty_struct(ctx);
    let mut b = PkgBuilder::new(ctx, runtime_pkg_path(), "runtime");
    let str_t = b.basic(BasicKind::Str);
    let any = b.any();
    let args = b.slice(any);
    let err = b.error_type();

    // ExecContext carries the cancellation signal; generated code reaches it
    // through GetExecContext().Done().
    let ctx_struct = b.struct_of(vec![]);
    let (ctx_obj, ctx_t) = b.named("ExecContext", ctx_struct);
    let done_chan = b.ctx.intern(TypeKind::Chan {
        dir: ChanDir::Recv,
        elem: empty,
    });
    b.method(ctx_obj, "Done", vec![], vec![done_chan]);
    b.method(ctx_obj, "Err", vec![], vec![err]);

    let state_struct = b.struct_of(vec![]);
    let (_, state_t) = b.named("ExecutionState", state_struct);
    let state_ptr = b.ptr(state_t);

    b.func("GetExecContext", vec![], vec![ctx_t]);
    b.func("ExitIfCtxDone", vec![], vec![]);
    b.var("Bailout", err);
    b.func("InitGoroutine", vec![], vec![state_ptr]);
    b.func("FinalizeGoroutine", vec![("e", state_ptr)], vec![]);
    b.func_variadic("Print", vec![("args", args)], vec![]);
    b.func("RegisterVar", vec![("name", str_t), ("p", any)], vec![]);
    b.func("ZeroClearAllVars", vec![], vec![]);
    b.done()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_cache_by_path() {
        let mut ctx = TypeCtx::new();
        let a = import(&mut ctx, "fmt").unwrap();
        let b = import(&mut ctx, "fmt").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_path_is_none() {
        let mut ctx = TypeCtx::new();
        assert!(import(&mut ctx, "no/such/pkg").is_none());
    }

    #[test]
    fn bytes_buffer_has_methods() {
        let mut ctx = TypeCtx::new();
        let bytes = import(&mut ctx, "bytes").unwrap();
        let scope = ctx.pkg(bytes).scope;
        let buffer = ctx.scope_lookup(scope, "Buffer").unwrap();
        let names: Vec<&str> = ctx
            .methods_of(buffer)
            .iter()
            .map(|m| ctx.obj(*m).name.as_str())
            .collect();
        assert!(names.contains(&"WriteString"));
        assert!(names.contains(&"String"));
    }

    #[test]
    fn runtime_package_exposes_cell_api() {
        let mut ctx = TypeCtx::new();
        let rt = import(&mut ctx, runtime_pkg_path()).unwrap();
        let scope = ctx.pkg(rt).scope;
        for name in [
            "GetExecContext",
            "ExitIfCtxDone",
            "Bailout",
            "InitGoroutine",
            "FinalizeGoroutine",
            "Print",
            "RegisterVar",
        ] {
            assert!(ctx.scope_lookup(scope, name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn fmt_println_signature_renders() {
        let mut ctx = TypeCtx::new();
        let fmt = import(&mut ctx, "fmt").unwrap();
        let scope = ctx.pkg(fmt).scope;
        let println = ctx.scope_lookup(scope, "Println").unwrap();
        let rendered = ctx.display_type(ctx.obj(println).typ);
        assert_eq!(rendered, "func(a ...interface{}) (int, error)");
    }
}

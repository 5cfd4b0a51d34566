//! Runtime support for goblet cell execution.
//!
//! Generated cell code is compiled against the host-language runtime package
//! (`goblet/runtime`); this crate implements the same contract on the host
//! side so the runner, the REPL front-end, and tests share one set of
//! semantics: an execution context with cooperative cancellation, routine
//! accounting with a bounded post-cancel grace interval, the `Bailout`
//! sentinel, printer broadcasting, and the zero-clearable variable registry.

mod context;
mod display;
mod registry;
mod state;

pub use context::{CancelHandle, ExecContext};
pub use display::DataDisplayer;
pub use registry::{
    clear_var_registry, print_args, print_line, register_printer, register_var,
    unregister_printer, zero_clear_all_vars, CellPrinter,
};
pub use state::{
    exec_entry_point, exit_if_ctx_done, finalize_goroutine, get_exec_context, init_goroutine,
    run_goroutine, Bailout, ExecError, ExecutionState,
};

/// Import path under which generated cell code addresses this runtime.
pub const SELF_PKG_PATH: &str = "goblet/runtime";

/// Default grace interval granted to user routines after cancellation.
pub const DEFAULT_EXEC_WAIT: std::time::Duration = std::time::Duration::from_secs(1);

//! Dynamic loading of built cell libraries.
//!
//! A cell's shared object is opened RTLD_NOW | RTLD_GLOBAL so later cells
//! can link against its symbols, the module initializer `<pkg>.init` runs
//! if present, and the entry point `<pkg>.lgo_init` executes under the
//! runtime's execution state. Libraries stay loaded for the session.

use std::path::Path;
use std::time::Duration;

use goblet_runtime::{exec_entry_point, ExecContext};
use libloading::Library;
use log::debug;

use crate::error::GobletError;

/// A loaded cell library. Dropping it would unload code that later cells
/// link against, so the runner holds these for the session's lifetime.
#[derive(Debug)]
pub struct CellLibrary {
    lib: Library,
}

/// Shared-object file name for a package path: `/` is escaped to `-`.
pub fn shared_lib_name(pkg_path: &str) -> String {
    format!("lib{}.so", pkg_path.replace('/', "-"))
}

#[cfg(unix)]
fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix;
    unsafe { unix::Library::open(Some(path), unix::RTLD_NOW | unix::RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

/// Open the cell's shared object and run its module initializer.
pub fn load_shared_library(
    build_pkg_dir: &Path,
    pkg_path: &str,
) -> Result<CellLibrary, GobletError> {
    let so_path = build_pkg_dir.join(shared_lib_name(pkg_path));
    debug!("loading {}", so_path.display());
    let lib = open_global(&so_path).map_err(|e| GobletError::Load {
        message: format!("failed to open {}: {}", so_path.display(), e),
    })?;

    // Module init is absent when the cell touched no external libraries.
    let init_symbol = format!("{}.init", pkg_path);
    if let Ok(init) = unsafe { lib.get::<unsafe extern "C" fn()>(init_symbol.as_bytes()) } {
        let init: unsafe extern "C" fn() = *init;
        unsafe { init() };
    }
    Ok(CellLibrary { lib })
}

/// Resolve and execute the cell entry point under a fresh execution state.
/// Declaration-only cells have no entry point and succeed immediately.
pub fn run_cell_entry(
    ctx: &ExecContext,
    cell: CellLibrary,
    pkg_path: &str,
    exec_wait: Duration,
) -> Result<CellLibrary, GobletError> {
    let entry_symbol = format!("{}.lgo_init", pkg_path);
    let entry = match unsafe { cell.lib.get::<unsafe extern "C" fn()>(entry_symbol.as_bytes()) } {
        Ok(entry) => {
            let entry: unsafe extern "C" fn() = *entry;
            Some(entry)
        }
        Err(_) => None,
    };
    if let Some(entry) = entry {
        exec_entry_point(ctx.clone(), exec_wait, move || unsafe { entry() })
            .map_err(classify_exec_error)?;
    }
    Ok(cell)
}

/// Convenience wrapper: load, init, and run in one step.
pub fn load_shared(
    ctx: &ExecContext,
    build_pkg_dir: &Path,
    pkg_path: &str,
    exec_wait: Duration,
) -> Result<CellLibrary, GobletError> {
    let cell = load_shared_library(build_pkg_dir, pkg_path)?;
    run_cell_entry(ctx, cell, pkg_path, exec_wait)
}

/// A summary mentioning failures is a runtime error; cancel-only summaries
/// surface as cancellation.
fn classify_exec_error(err: goblet_runtime::ExecError) -> GobletError {
    let message = err.0;
    if message.contains("failed") {
        GobletError::Runtime { message }
    } else {
        GobletError::Canceled { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_lib_name_escapes_slashes() {
        assert_eq!(
            shared_lib_name("goblet/sessions/sess1234/exec1"),
            "libgoblet-sessions-sess1234-exec1.so"
        );
    }

    #[test]
    fn missing_library_is_load_error() {
        let err = load_shared(
            &ExecContext::background(),
            Path::new("/nonexistent"),
            "x/y",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, GobletError::Load { .. }));
    }

    #[test]
    fn classifies_summaries() {
        let runtime = classify_exec_error(goblet_runtime::ExecError(
            "main routine failed, 1 goroutine canceled".to_string(),
        ));
        assert!(matches!(runtime, GobletError::Runtime { .. }));
        let canceled =
            classify_exec_error(goblet_runtime::ExecError("main routine canceled".to_string()));
        assert!(matches!(canceled, GobletError::Canceled { .. }));
    }
}

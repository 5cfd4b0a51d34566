//! Process-wide printer and variable registries.
//!
//! Printers receive the rendered value of a cell's trailing expression.
//! The variable registry keeps a type-erased `(ptr, reset_fn)` pair per
//! registered cell variable so `zero_clear_all_vars` can return every
//! session variable to its zero value without runtime reflection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Receives `Println`-style output from cell code.
pub trait CellPrinter: Send + Sync {
    fn println(&self, text: &str);
}

fn printers() -> &'static Mutex<Vec<Arc<dyn CellPrinter>>> {
    static PRINTERS: OnceLock<Mutex<Vec<Arc<dyn CellPrinter>>>> = OnceLock::new();
    PRINTERS.get_or_init(|| Mutex::new(Vec::new()))
}

pub fn register_printer(p: Arc<dyn CellPrinter>) {
    printers().lock().unwrap().push(p);
}

pub fn unregister_printer(p: &Arc<dyn CellPrinter>) {
    printers()
        .lock()
        .unwrap()
        .retain(|q| !Arc::ptr_eq(q, p));
}

/// Broadcast one line to every registered printer.
pub fn print_line(text: &str) {
    let printers = printers().lock().unwrap().clone();
    for p in &printers {
        p.println(text);
    }
}

/// Broadcast formatted arguments to every registered printer.
pub fn print_args(args: std::fmt::Arguments<'_>) {
    print_line(&args.to_string());
}

// ── Variable registry ────────────────────────────────────────────────────

struct VarEntry {
    ptr: *mut (),
    reset: unsafe fn(*mut ()),
}

// Entries are only dereferenced under the registry lock, and registered
// pointers must stay valid until the registry is cleared (cell variables are
// package-level and live for the session).
unsafe impl Send for VarEntry {}

fn all_vars() -> &'static Mutex<HashMap<String, Vec<VarEntry>>> {
    static ALL_VARS: OnceLock<Mutex<HashMap<String, Vec<VarEntry>>>> = OnceLock::new();
    ALL_VARS.get_or_init(|| Mutex::new(HashMap::new()))
}

unsafe fn reset_to_default<T: Default>(ptr: *mut ()) {
    *(ptr as *mut T) = T::default();
}

/// Register a variable for zero-clearing.
///
/// # Safety
///
/// `v` must remain valid (and not be moved) until `clear_var_registry` is
/// called or the process exits.
pub unsafe fn register_var<T: Default>(name: &str, v: *mut T) {
    all_vars()
        .lock()
        .unwrap()
        .entry(name.to_string())
        .or_default()
        .push(VarEntry {
            ptr: v as *mut (),
            reset: reset_to_default::<T>,
        });
}

/// Write the zero value to every registered variable.
pub fn zero_clear_all_vars() {
    let vars = all_vars().lock().unwrap();
    for entries in vars.values() {
        for entry in entries {
            unsafe { (entry.reset)(entry.ptr) };
        }
    }
}

/// Drop all registrations (used when a session ends; the backing variables
/// are about to be unloaded with their shared objects).
pub fn clear_var_registry() {
    all_vars().lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPrinter {
        lines: Mutex<Vec<String>>,
    }

    impl CellPrinter for CountingPrinter {
        fn println(&self, text: &str) {
            self.lines.lock().unwrap().push(text.to_string());
        }
    }

    #[test]
    fn print_broadcasts_to_registered_printers() {
        let p: Arc<CountingPrinter> = Arc::new(CountingPrinter {
            lines: Mutex::new(Vec::new()),
        });
        let as_dyn: Arc<dyn CellPrinter> = p.clone();
        register_printer(as_dyn.clone());
        print_line("120");
        unregister_printer(&as_dyn);
        print_line("after");
        let lines = p.lines.lock().unwrap();
        assert_eq!(&*lines, &["120".to_string()]);
    }

    #[test]
    fn zero_clear_resets_registered_vars() {
        // Box the variables so the pointers stay stable for the test.
        let mut a: Box<i64> = Box::new(42);
        let mut s: Box<String> = Box::new("hello".to_string());
        unsafe {
            register_var("zc_a", &mut *a as *mut i64);
            register_var("zc_s", &mut *s as *mut String);
        }
        zero_clear_all_vars();
        assert_eq!(*a, 0);
        assert_eq!(*s, "");
        clear_var_registry();
    }
}

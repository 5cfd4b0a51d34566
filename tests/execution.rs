//! Execution-state semantics as cell code would exercise them: the same
//! runtime calls the converter weaves into generated source, driven here
//! directly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use goblet_runtime::{
    exec_entry_point, exit_if_ctx_done, init_goroutine, run_goroutine, ExecContext,
};

const GRACE: Duration = Duration::from_millis(200);

// The execution state is process-wide; run these scenarios one at a time.
fn exec_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

#[test]
fn tight_loop_cancels_within_grace() {
    let _guard = exec_lock();
    let (ctx, cancel) = ExecContext::background().with_cancel();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        cancel.cancel();
    });
    let start = Instant::now();
    // The converted form of `for {}`: a cancellation check at the loop head.
    let result = exec_entry_point(ctx, Duration::from_secs(1), || loop {
        exit_if_ctx_done();
    });
    let err = result.unwrap_err();
    assert_eq!(err.0, "main routine canceled");
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "took {:?}",
        start.elapsed()
    );
}

#[test]
fn goroutine_panic_reports_failure_summary() {
    let _guard = exec_lock();
    // The converted form of `go func(){ panic("boom") }()`.
    let result = exec_entry_point(ExecContext::background(), GRACE, || {
        let ectx = init_goroutine();
        run_goroutine(ectx, || std::panic::panic_any("boom".to_string()));
        std::thread::sleep(Duration::from_millis(50));
    });
    let msg = result.unwrap_err().0;
    assert!(msg.contains("1 goroutine failed"), "got {:?}", msg);
}

#[test]
fn sibling_goroutines_drain_after_failure() {
    let _guard = exec_lock();
    let started = Arc::new(AtomicUsize::new(0));
    let result = {
        let started = Arc::clone(&started);
        exec_entry_point(ExecContext::background(), GRACE, move || {
            for _ in 0..3 {
                let started = Arc::clone(&started);
                let ectx = init_goroutine();
                run_goroutine(ectx, move || {
                    started.fetch_add(1, Ordering::SeqCst);
                    // Cooperative sibling: yields until canceled.
                    loop {
                        exit_if_ctx_done();
                        std::thread::sleep(Duration::from_millis(1));
                    }
                });
            }
            // Give the siblings a moment to enter their loops.
            std::thread::sleep(Duration::from_millis(30));
            let ectx = init_goroutine();
            run_goroutine(ectx, || std::panic::panic_any("die".to_string()));
        })
    };
    let msg = result.unwrap_err().0;
    assert!(msg.contains("1 goroutine failed"), "got {:?}", msg);
    assert!(msg.contains("3 goroutines canceled"), "got {:?}", msg);
    assert_eq!(started.load(Ordering::SeqCst), 3);
}

#[test]
fn successful_run_returns_ok_and_resets_state() {
    let _guard = exec_lock();
    let result = exec_entry_point(ExecContext::background(), GRACE, || {
        let ectx = init_goroutine();
        run_goroutine(ectx, || {});
        std::thread::sleep(Duration::from_millis(20));
    });
    assert!(result.is_ok());
    // With no execution in flight, stray code observes a canceled context.
    assert!(goblet_runtime::get_exec_context().is_done());
}

#[test]
fn printer_receives_trailing_expression_output() {
    let _guard = exec_lock();
    struct Capture(Mutex<Vec<String>>);
    impl goblet_runtime::CellPrinter for Capture {
        fn println(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }
    let capture = Arc::new(Capture(Mutex::new(Vec::new())));
    let as_printer: Arc<dyn goblet_runtime::CellPrinter> = capture.clone();
    goblet_runtime::register_printer(as_printer.clone());
    let result = exec_entry_point(ExecContext::background(), GRACE, || {
        // What `<runtime>.Print(120)` compiles down to.
        goblet_runtime::print_args(format_args!("{}", 120));
    });
    goblet_runtime::unregister_printer(&as_printer);
    assert!(result.is_ok());
    assert_eq!(&*capture.0.lock().unwrap(), &["120".to_string()]);
}

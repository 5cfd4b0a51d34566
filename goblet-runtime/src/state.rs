//! Per-execution control block: routine accounting and cancellation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Duration;

use crate::context::{CancelHandle, ExecContext};

/// Sentinel panic payload for cooperative cancellation. Routines that unwind
/// with this value count as canceled, not failed.
pub struct Bailout;

impl fmt::Debug for Bailout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Bailout")
    }
}

/// True while a cell execution is in flight. Read on the fast path of
/// `exit_if_ctx_done` so the common case is a single atomic load.
static IS_RUNNING: AtomicBool = AtomicBool::new(false);

fn exec_state() -> &'static Mutex<Option<Arc<ExecutionState>>> {
    static STATE: OnceLock<Mutex<Option<Arc<ExecutionState>>>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(None))
}

fn get_exec_state() -> Option<Arc<ExecutionState>> {
    exec_state().lock().unwrap().clone()
}

fn set_exec_state(e: Arc<ExecutionState>) {
    *exec_state().lock().unwrap() = Some(e);
}

fn reset_exec_state(e: &Arc<ExecutionState>) {
    let mut state = exec_state().lock().unwrap();
    if let Some(cur) = state.as_ref() {
        if Arc::ptr_eq(cur, e) {
            *state = None;
        }
    }
}

/// The context of the current execution, or a pre-canceled context when no
/// execution is active (stray routines from finished cells see "done").
pub fn get_exec_context() -> ExecContext {
    match get_exec_state() {
        Some(e) => e.context.clone(),
        None => ExecContext::canceled(),
    }
}

/// Fast no-op while an execution is running; on the slow path, panics with
/// `Bailout` if the execution context has been canceled.
pub fn exit_if_ctx_done() {
    if IS_RUNNING.load(Ordering::SeqCst) {
        return;
    }
    if get_exec_context().is_done() {
        panic::panic_any(Bailout);
    }
}

// ── Routine counters ─────────────────────────────────────────────────────

#[derive(Default)]
struct ResultCounter {
    active: usize,
    fail: usize,
    cancel: usize,
}

impl ResultCounter {
    fn add(&mut self) {
        self.active += 1;
    }

    /// Record the outcome of a routine given its unwind payload.
    fn record(&mut self, payload: Option<&(dyn Any + Send)>) {
        assert!(self.active > 0, "routine counter underflow");
        self.active -= 1;
        let payload = match payload {
            Some(p) => p,
            None => return,
        };
        if payload.is::<Bailout>() {
            self.cancel += 1;
            return;
        }
        eprintln!("panic: {}", panic_message(payload));
        self.fail += 1;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Wait group ───────────────────────────────────────────────────────────

struct WaitGroup {
    count: Mutex<usize>,
    cond: Condvar,
}

impl WaitGroup {
    fn new() -> WaitGroup {
        WaitGroup {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    fn add(&self, n: usize) {
        *self.count.lock().unwrap() += n;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap();
        assert!(*count > 0, "wait group underflow");
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    /// Wait until the count reaches zero or `timeout` elapses.
    /// Returns true if the count reached zero.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cond.wait_timeout(count, deadline - now).unwrap();
            count = guard;
        }
        true
    }
}

// ── Execution state ──────────────────────────────────────────────────────

/// Control block for one cell execution: the derived context, routine
/// counters, and the wait group the finalizer drains.
pub struct ExecutionState {
    pub context: ExecContext,
    cancel_handle: CancelHandle,
    canceled: Mutex<bool>,
    main_counter: Mutex<ResultCounter>,
    sub_counter: Mutex<ResultCounter>,
    routines: WaitGroup,
}

/// Interval at which `wait_routines` re-checks for context cancellation.
const WAIT_POLL: Duration = Duration::from_millis(10);

impl ExecutionState {
    fn new(parent: ExecContext) -> Arc<ExecutionState> {
        let (ctx, cancel_handle) = parent.with_cancel();
        Arc::new(ExecutionState {
            context: ctx,
            cancel_handle,
            canceled: Mutex::new(false),
            main_counter: Mutex::new(ResultCounter::default()),
            sub_counter: Mutex::new(ResultCounter::default()),
            routines: WaitGroup::new(),
        })
    }

    fn cancel(self: &Arc<Self>) {
        {
            let mut canceled = self.canceled.lock().unwrap();
            if *canceled {
                return;
            }
            *canceled = true;
        }
        if let Some(cur) = get_exec_state() {
            if Arc::ptr_eq(&cur, self) {
                IS_RUNNING.store(false, Ordering::SeqCst);
            }
        }
        self.cancel_handle.cancel();
    }

    /// Wait for all routines, allowing a bounded grace interval once the
    /// context has been canceled. Routines still active afterwards are
    /// reported as hanging.
    fn wait_routines(self: &Arc<Self>, grace: Duration) {
        loop {
            if self.routines.wait_timeout(WAIT_POLL) {
                self.cancel();
                return;
            }
            if self.context.is_done() {
                self.routines.wait_timeout(grace);
                return;
            }
        }
    }

    fn counter_message(&self) -> String {
        let mut msgs: Vec<String> = Vec::new();
        {
            let main = self.main_counter.lock().unwrap();
            if main.fail > 0 {
                msgs.push("main routine failed".to_string());
            } else if main.cancel > 0 {
                msgs.push("main routine canceled".to_string());
            } else if main.active > 0 {
                msgs.push("main routine is hanging".to_string());
            }
        }
        {
            let sub = self.sub_counter.lock().unwrap();
            match sub.fail {
                0 => {}
                1 => msgs.push("1 goroutine failed".to_string()),
                c => msgs.push(format!("{} goroutines failed", c)),
            }
            match sub.cancel {
                0 => {}
                1 => msgs.push("1 goroutine canceled".to_string()),
                c => msgs.push(format!("{} goroutines canceled", c)),
            }
            match sub.active {
                0 => {}
                1 => msgs.push("1 goroutine is hanging".to_string()),
                c => msgs.push(format!("{} goroutines are hanging", c)),
            }
        }
        msgs.join(", ")
    }
}

/// Summary of a failed or canceled execution, built from routine counters.
#[derive(Debug)]
pub struct ExecError(pub String);

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ExecError {}

/// Run `main` as the cell's main routine under a fresh `ExecutionState`,
/// wait for it and every routine it spawned (subject to `grace` after
/// cancellation), and summarize failed/canceled/hanging routines.
pub fn exec_entry_point<F>(parent: ExecContext, grace: Duration, main: F) -> Result<(), ExecError>
where
    F: FnOnce() + Send + 'static,
{
    let e = start_exec(parent, main);
    finalize_exec(&e, grace)
}

fn start_exec<F>(parent: ExecContext, main: F) -> Arc<ExecutionState>
where
    F: FnOnce() + Send + 'static,
{
    IS_RUNNING.store(true, Ordering::SeqCst);
    let e = ExecutionState::new(parent);
    set_exec_state(Arc::clone(&e));

    // Watcher: when the execution context is canceled (by the caller's
    // parent context or by the finalizer itself), run the state's cancel
    // path so the running flag is cleared. The context is always canceled
    // by `wait_routines`, so this thread terminates with the execution.
    {
        let e = Arc::clone(&e);
        std::thread::spawn(move || {
            e.context.wait_done();
            e.cancel();
        });
    }

    e.routines.add(1);
    e.main_counter.lock().unwrap().add();
    {
        let e = Arc::clone(&e);
        std::thread::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(main));
            let payload = result.err();
            e.main_counter
                .lock()
                .unwrap()
                .record(payload.as_ref().map(|p| p.as_ref() as &(dyn Any + Send)));
            e.routines.done();
        });
    }
    e
}

fn finalize_exec(e: &Arc<ExecutionState>, grace: Duration) -> Result<(), ExecError> {
    e.wait_routines(grace);
    reset_exec_state(e);
    let msg = e.counter_message();
    if msg.is_empty() {
        Ok(())
    } else {
        Err(ExecError(msg))
    }
}

/// Register a user goroutine with the current execution. Returns `None`
/// when no execution is active (the routine runs unaccounted).
pub fn init_goroutine() -> Option<Arc<ExecutionState>> {
    let e = get_exec_state()?;
    e.routines.add(1);
    e.sub_counter.lock().unwrap().add();
    Some(e)
}

/// Run `body` as a user goroutine: record its outcome against `handle` and
/// cancel the execution when it unwinds with anything other than `Bailout`.
/// Wraps what generated code expresses as `defer FinalizeGoroutine(ectx)`.
pub fn run_goroutine<F>(handle: Option<Arc<ExecutionState>>, body: F)
where
    F: FnOnce() + Send + 'static,
{
    std::thread::spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(body));
        let payload = result.err();
        finalize_goroutine(handle, payload.as_ref().map(|p| p.as_ref() as &(dyn Any + Send)));
    });
}

/// Record a goroutine outcome and release its wait-group slot. A non-Bailout
/// unwind cancels the execution so sibling routines shut down.
pub fn finalize_goroutine(
    handle: Option<Arc<ExecutionState>>,
    payload: Option<&(dyn Any + Send)>,
) {
    let e = match handle {
        Some(e) => e,
        None => return,
    };
    e.sub_counter.lock().unwrap().record(payload);
    e.routines.done();
    if payload.is_some() {
        e.cancel();
    }
}

//! Cancellable execution contexts handed to running cells.
//!
//! An `ExecContext` is the host-side analogue of the context value injected
//! into generated cell code as `_ctx`: it carries a cancellation signal and
//! an optional rich-output display handle. Cancellation propagates from a
//! parent context to every child derived from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::display::DataDisplayer;

struct CtxState {
    canceled: AtomicBool,
    // Children are canceled when this state is canceled. Weak so a dropped
    // child does not linger in the parent's list.
    children: Mutex<Vec<Weak<CtxState>>>,
    cond: Condvar,
    // Paired with `cond`; the boolean mirrors `canceled` for condvar waits.
    done: Mutex<bool>,
}

impl CtxState {
    fn new(canceled: bool) -> Arc<CtxState> {
        Arc::new(CtxState {
            canceled: AtomicBool::new(canceled),
            children: Mutex::new(Vec::new()),
            cond: Condvar::new(),
            done: Mutex::new(canceled),
        })
    }

    fn cancel(&self) {
        if self.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut done = self.done.lock().unwrap();
            *done = true;
        }
        self.cond.notify_all();
        let children = std::mem::take(&mut *self.children.lock().unwrap());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

/// An execution context: a cancellation signal plus a display handle.
/// Cloning is cheap and shares the underlying signal.
#[derive(Clone)]
pub struct ExecContext {
    state: Arc<CtxState>,
    display: Option<Arc<dyn DataDisplayer>>,
}

/// Cancels the associated `ExecContext` when invoked (or dropped unused;
/// dropping does not cancel, matching a held-but-unused cancel function).
pub struct CancelHandle {
    state: Arc<CtxState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }
}

impl ExecContext {
    /// A never-canceled root context.
    pub fn background() -> ExecContext {
        ExecContext {
            state: CtxState::new(false),
            display: None,
        }
    }

    /// An already-canceled context. Returned by `get_exec_context` when no
    /// execution is active, so stray routines from finished cells observe
    /// cancellation immediately.
    pub fn canceled() -> ExecContext {
        ExecContext {
            state: CtxState::new(true),
            display: None,
        }
    }

    /// Attach a display handle, keeping the same cancellation signal.
    pub fn with_display(mut self, display: Arc<dyn DataDisplayer>) -> ExecContext {
        self.display = Some(display);
        self
    }

    /// Derive a child context canceled either by the returned handle or by
    /// cancellation of `self`.
    pub fn with_cancel(&self) -> (ExecContext, CancelHandle) {
        let child = CtxState::new(self.is_done());
        if !self.is_done() {
            self.state
                .children
                .lock()
                .unwrap()
                .push(Arc::downgrade(&child));
            // Re-check: the parent may have been canceled between the first
            // check and the registration.
            if self.is_done() {
                child.cancel();
            }
        }
        (
            ExecContext {
                state: Arc::clone(&child),
                display: self.display.clone(),
            },
            CancelHandle { state: child },
        )
    }

    pub fn is_done(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    /// Block until the context is canceled.
    pub fn wait_done(&self) {
        let mut done = self.state.done.lock().unwrap();
        while !*done {
            done = self.state.cond.wait(done).unwrap();
        }
    }

    /// Block until the context is canceled or `timeout` elapses.
    /// Returns true if the context was canceled.
    pub fn wait_done_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.state.done.lock().unwrap();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .state
                .cond
                .wait_timeout(done, deadline - now)
                .unwrap();
            done = guard;
        }
        true
    }

    pub fn display(&self) -> Option<&Arc<dyn DataDisplayer>> {
        self.display.as_ref()
    }
}

//! Execution-context seam between the trigger engine and the embedding
//! runtime
//!
//! The engine never touches interpreter internals directly. Everything
//! it needs from the embedder goes through [`Runtime`]: scheduling a
//! callback at the next safe point, waking the main event loop while it
//! is parked, and installing the fatal-error / uncaught-exception
//! notification hooks.
//!
//! [`ThreadLoopRuntime`] is a bundled implementation for embedders
//! without native safe-point machinery: a plain task queue pumped on the
//! thread that owns the "main loop". The standalone binary and the
//! integration tests both run on it.

use crate::error::ReportError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Notification of an unrecoverable internal error. Expected never to
/// return control to the runtime.
pub type FatalHook = fn(location: Option<&str>, message: &str);

/// Notification of an uncaught script exception. The return value is
/// the runtime's abort decision, independent of whether a report was
/// produced.
pub type ExceptionHook = fn(error: Option<&dyn ScriptError>) -> bool;

/// A script-level error/exception value, borrowed from the runtime.
/// Only valid while the originating notification is on the stack.
pub trait ScriptError {
    fn message(&self) -> String;
    fn stack(&self) -> Option<String> {
        None
    }
}

/// Handle to the embedding runtime's main execution context.
pub trait Runtime: Send + Sync {
    /// Run `callback` the next time interpreted code reaches a safe
    /// point. May be called from any thread.
    fn request_interrupt(&self, callback: fn());

    /// Register the callback that `wake_loop` fires on the next
    /// iteration of the main event loop. Called once, when the signal
    /// trigger class is first armed.
    fn register_loop_wake(&self, callback: fn()) -> Result<(), ReportError>;

    /// Wake the main event loop so the registered callback runs even if
    /// no script is executing. May be called from any thread.
    fn wake_loop(&self);

    /// Install the fatal-error notification hook.
    fn install_fatal_hook(&self, hook: FatalHook);

    /// Install the uncaught-exception notification hook.
    /// `capture_stack_traces` asks the runtime to record detailed stack
    /// traces for uncaught exceptions and to consult the hook for its
    /// abort decision.
    fn install_exception_hook(&self, hook: ExceptionHook, capture_stack_traces: bool);
}

// =============================================================================
// Process-wide handle
// =============================================================================

/// The active execution-context handle. Set once at initialization,
/// never cleared; the watchdog thread dereferences it concurrently with
/// the main thread, so all access goes through the mutex.
static RUNTIME: Mutex<Option<Arc<dyn Runtime>>> = Mutex::new(None);

pub fn set_runtime(runtime: Arc<dyn Runtime>) {
    let mut handle = RUNTIME.lock().unwrap_or_else(|e| e.into_inner());
    *handle = Some(runtime);
}

/// Run `f` against the registered runtime, holding the handle mutex for
/// the duration. Returns None when no runtime has been registered yet.
pub fn with_runtime<R>(f: impl FnOnce(&Arc<dyn Runtime>) -> R) -> Option<R> {
    let handle = RUNTIME.lock().unwrap_or_else(|e| e.into_inner());
    handle.as_ref().map(f)
}

// =============================================================================
// ThreadLoopRuntime
// =============================================================================

/// Queue-backed [`Runtime`] for embedders without their own interrupt
/// machinery. Interrupt requests and loop wakes land on one channel;
/// the owning thread pumps them between its own units of work, which is
/// exactly what "safe point" means for such an embedder.
pub struct ThreadLoopRuntime {
    tx: Sender<fn()>,
    rx: Receiver<fn()>,
    loop_wake: Mutex<Option<fn()>>,
    fatal_hook: Mutex<Option<FatalHook>>,
    exception_hook: Mutex<Option<ExceptionHook>>,
}

impl ThreadLoopRuntime {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            loop_wake: Mutex::new(None),
            fatal_hook: Mutex::new(None),
            exception_hook: Mutex::new(None),
        }
    }

    /// Run at most one queued callback, waiting up to `timeout` for one
    /// to arrive. Returns whether a callback ran.
    pub fn pump_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Block on the queue forever, running callbacks as they arrive.
    pub fn run(&self) {
        while let Ok(callback) = self.rx.recv() {
            callback();
        }
    }

    /// Deliver a fatal-error notification the way an embedding runtime
    /// would. No-op when the fatal hook was never installed.
    pub fn fire_fatal(&self, location: Option<&str>, message: &str) {
        let hook = *self.fatal_hook.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hook) = hook {
            hook(location, message);
        }
    }

    /// Deliver an uncaught-exception notification, returning the abort
    /// decision, or None when the exception hook was never installed.
    pub fn fire_exception(&self, error: Option<&dyn ScriptError>) -> Option<bool> {
        let hook = *self
            .exception_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        hook.map(|hook| hook(error))
    }
}

impl Default for ThreadLoopRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for ThreadLoopRuntime {
    fn request_interrupt(&self, callback: fn()) {
        let _ = self.tx.send(callback);
    }

    fn register_loop_wake(&self, callback: fn()) -> Result<(), ReportError> {
        let mut slot = self.loop_wake.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(callback);
        Ok(())
    }

    fn wake_loop(&self) {
        let callback = *self.loop_wake.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(callback) = callback {
            let _ = self.tx.send(callback);
        }
    }

    fn install_fatal_hook(&self, hook: FatalHook) {
        let mut slot = self.fatal_hook.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(hook);
    }

    fn install_exception_hook(&self, hook: ExceptionHook, _capture_stack_traces: bool) {
        let mut slot = self
            .exception_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(hook);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static INTERRUPTS_RUN: AtomicUsize = AtomicUsize::new(0);
    static WAKES_RUN: AtomicUsize = AtomicUsize::new(0);

    fn count_interrupt() {
        INTERRUPTS_RUN.fetch_add(1, Ordering::SeqCst);
    }

    fn count_wake() {
        WAKES_RUN.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_pump_runs_requested_interrupt() {
        let rt = ThreadLoopRuntime::new();
        let before = INTERRUPTS_RUN.load(Ordering::SeqCst);
        rt.request_interrupt(count_interrupt);
        assert!(rt.pump_one(Duration::from_millis(100)));
        assert!(INTERRUPTS_RUN.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_wake_loop_without_registration_is_noop() {
        let rt = ThreadLoopRuntime::new();
        rt.wake_loop();
        assert!(!rt.pump_one(Duration::from_millis(10)));
    }

    #[test]
    fn test_wake_loop_fires_registered_callback() {
        let rt = ThreadLoopRuntime::new();
        let before = WAKES_RUN.load(Ordering::SeqCst);
        rt.register_loop_wake(count_wake).unwrap();
        rt.wake_loop();
        assert!(rt.pump_one(Duration::from_millis(100)));
        assert!(WAKES_RUN.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_fire_exception_without_hook() {
        let rt = ThreadLoopRuntime::new();
        assert_eq!(rt.fire_exception(None), None);
    }
}

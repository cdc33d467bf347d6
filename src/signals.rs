//! Signal relay: the raw OS signal handler
//!
//! The only code in the crate that runs in true signal-handler context.
//! The handler body does exactly two async-signal-safe things: one
//! compare-exchange on the pending-trigger slot, and - only when that
//! CAS won - one `write(2)` of a single byte to the watchdog's wake
//! pipe. No allocation, no locks, no report generation. Everything else
//! happens on the watchdog thread and the runtime's main thread.

use crate::error::ReportError;
use crate::pending::PENDING_SIGNAL;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};

/// Write end of the watchdog wake pipe. Published once by
/// `watchdog::start` before the first handler is installed; -1 until
/// then.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

pub fn set_wake_fd(fd: RawFd) {
    WAKE_FD.store(fd, Ordering::SeqCst);
}

/// Raw handler body. Runs on whichever thread the kernel picked.
extern "C" fn relay_handler(signo: libc::c_int) {
    if PENDING_SIGNAL.post(signo) {
        let fd = WAKE_FD.load(Ordering::SeqCst);
        if fd >= 0 {
            let byte = [1u8];
            // One wake per accepted signal. Short writes cannot happen
            // for a single byte; a full pipe just means wakes are
            // already queued, so the result is deliberately ignored.
            unsafe {
                libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
            }
        }
    }
}

fn signal_from(signo: i32) -> Result<Signal, ReportError> {
    Signal::try_from(signo)
        .map_err(|e| ReportError::HandlerInstall(format!("bad signal number {signo}: {e}")))
}

/// Install the relay handler for `signo`, masking all other signals for
/// the duration of the handler. Returns the previously-installed
/// disposition so it can be restored bit-for-bit on disable.
pub fn register(signo: i32) -> Result<SigAction, ReportError> {
    let signal = signal_from(signo)?;
    let action = SigAction::new(
        SigHandler::Handler(relay_handler),
        SaFlags::empty(),
        SigSet::all(),
    );
    unsafe { sigaction(signal, &action) }
        .map_err(|e| ReportError::HandlerInstall(format!("sigaction({signal}) failed: {e}")))
}

/// Reinstate a previously saved disposition, exactly as it was. Used
/// when the signal trigger class is disabled or the signal number
/// changes; deliberately not a reset to SIG_DFL, so a handler installed
/// by another component before this module survives.
pub fn restore(signo: i32, saved: &SigAction) -> Result<(), ReportError> {
    let signal = signal_from(signo)?;
    unsafe { sigaction(signal, saved) }
        .map_err(|e| ReportError::HandlerInstall(format!("sigaction({signal}) failed: {e}")))?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // SIGURG is ignored by default and harmless to redeliver, which
    // makes it a safe scratch signal for handler bookkeeping tests.
    const SCRATCH: i32 = signal_hook::consts::SIGURG;

    extern "C" fn sentinel(_signo: libc::c_int) {}

    #[test]
    fn test_register_saves_and_restore_reinstates() {
        let sentinel_action = SigAction::new(
            SigHandler::Handler(sentinel),
            SaFlags::empty(),
            SigSet::empty(),
        );
        let signal = Signal::try_from(SCRATCH).unwrap();
        let original = unsafe { sigaction(signal, &sentinel_action) }.unwrap();

        let saved = register(SCRATCH).unwrap();
        assert_eq!(saved.handler(), SigHandler::Handler(sentinel));

        restore(SCRATCH, &saved).unwrap();
        let current = unsafe { sigaction(signal, &sentinel_action) }.unwrap();
        assert_eq!(current.handler(), SigHandler::Handler(sentinel));

        // Put the process back the way we found it.
        unsafe { sigaction(signal, &original) }.unwrap();
    }

    #[test]
    fn test_register_rejects_bad_signal_number() {
        assert!(matches!(
            register(0),
            Err(ReportError::HandlerInstall(_))
        ));
    }
}

//! Watchdog thread
//!
//! A process-lifetime background thread bridging signal-handler context
//! into full-context report generation. It blocks on the read end of
//! the wake pipe; the relay writes one byte per accepted signal. On
//! each wake it asks the runtime's main thread to do the actual work,
//! both through an interrupt request (serviced at the next safe point)
//! and through a loop wake (serviced even when the main thread is idle).
//!
//! Started lazily the first time the signal trigger class is armed,
//! never stopped; disabling the trigger only restores the OS handler.

use crate::bridge;
use crate::config;
use crate::error::ReportError;
use crate::pending::PENDING_SIGNAL;
use crate::runtime;
use crate::signals;
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};
use std::os::fd::{IntoRawFd, RawFd};
use std::thread;

/// Create the wake pipe, publish its write end to the relay and spawn
/// the watchdog. Failures are logged to stderr and returned to the
/// caller arming the signal trigger class.
pub fn start() -> Result<(), ReportError> {
    let (read_end, write_end) = nix::unistd::pipe().map_err(|e| {
        eprintln!("[ripcord] initialization failed, pipe() returned {e}");
        ReportError::InitializationFailure(format!("pipe() failed: {e}"))
    })?;
    signals::set_wake_fd(write_end.into_raw_fd());
    let read_fd = read_end.into_raw_fd();

    // Block every signal around the spawn so the watchdog inherits a
    // full mask and the trigger signal is always delivered elsewhere.
    let all = SigSet::all();
    let mut previous = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&all), Some(&mut previous)).map_err(|e| {
        eprintln!("[ripcord] initialization failed, pthread_sigmask() returned {e}");
        ReportError::InitializationFailure(format!("pthread_sigmask() failed: {e}"))
    })?;

    let spawned = thread::Builder::new()
        .name("ripcord-watchdog".into())
        .spawn(move || watchdog_main(read_fd));

    let restore = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None);

    spawned.map_err(|e| {
        eprintln!("[ripcord] initialization failed, thread spawn returned {e}");
        ReportError::InitializationFailure(format!("watchdog spawn failed: {e}"))
    })?;
    restore.map_err(|e| {
        eprintln!("[ripcord] initialization failed, pthread_sigmask() returned {e}");
        ReportError::InitializationFailure(format!("pthread_sigmask() failed: {e}"))
    })?;
    Ok(())
}

fn watchdog_main(wake_fd: RawFd) {
    loop {
        let mut byte = [0u8; 1];
        let n = unsafe { libc::read(wake_fd, byte.as_mut_ptr() as *mut libc::c_void, 1) };
        if n < 0 {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            // Unrecoverable read error on our own pipe; nothing useful
            // left for this thread to do.
            eprintln!(
                "[ripcord] watchdog wake pipe read failed: {}",
                std::io::Error::last_os_error()
            );
            return;
        }
        if n == 0 {
            continue;
        }
        if config::verbose() {
            if let Some(signo) = PENDING_SIGNAL.peek() {
                eprintln!("[ripcord] signal {} received", config::signal_name(signo));
            }
        }
        // Both wake paths are issued unconditionally; the pending slot's
        // atomic claim keeps the pair from double-reporting.
        runtime::with_runtime(|rt| {
            rt.request_interrupt(bridge::safepoint_callback);
            rt.wake_loop();
        });
    }
}

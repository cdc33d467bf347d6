//! Lifecycle and configuration API
//!
//! The only writers of the configuration store live here: runtime
//! reconfiguration (`set_events`, `set_signal`, ...) and one-shot
//! initialization from environment variables. Arming a trigger class
//! installs the matching runtime hook or OS machinery on the transition,
//! never twice.

use crate::config::{self, EventClass, EventMask};
use crate::error::ReportError;
use crate::trigger;
use crate::watchdog;
use crate::{bridge, runtime, signals};
use nix::sys::signal::SigAction;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const ENV_VERBOSE: &str = "RIPCORD_VERBOSE";
pub const ENV_EVENTS: &str = "RIPCORD_EVENTS";
pub const ENV_SIGNAL: &str = "RIPCORD_SIGNAL";
pub const ENV_FILENAME: &str = "RIPCORD_FILENAME";
pub const ENV_DIRECTORY: &str = "RIPCORD_DIRECTORY";

static INIT_DONE: AtomicBool = AtomicBool::new(false);
static FATAL_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);
static EXCEPTION_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);
/// One-way flags for the lazily-built signal machinery. Split so a
/// failed loop-wake registration can be retried without spawning a
/// second watchdog; the thread is never stopped. Written only while
/// holding `SAVED_DISPOSITION`.
static WATCHDOG_STARTED: AtomicBool = AtomicBool::new(false);
static LOOP_WAKE_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Previously-installed disposition of the trigger signal, saved when
/// the relay handler is registered so disabling restores it exactly.
/// Also serializes handler switches.
static SAVED_DISPOSITION: Mutex<Option<SigAction>> = Mutex::new(None);

/// Whether the signal trigger class can be armed on this platform.
pub fn signals_supported() -> bool {
    cfg!(unix)
}

/// Parse and apply an event-mask spec, returning the previous mask.
/// Arms runtime hooks and signal machinery on newly enabled classes;
/// disabling the signal class restores the saved OS disposition.
pub fn set_events(spec: &str) -> Result<EventMask, ReportError> {
    let mask = EventMask::parse(spec)?;
    let previous = config::replace_event_mask(mask);

    if mask.contains(EventClass::FatalError) && !FATAL_HOOK_INSTALLED.load(Ordering::SeqCst) {
        let installed =
            runtime::with_runtime(|rt| rt.install_fatal_hook(trigger::on_fatal_error)).is_some();
        if installed {
            FATAL_HOOK_INSTALLED.store(true, Ordering::SeqCst);
        }
    }

    if mask.contains(EventClass::Exception) && !EXCEPTION_HOOK_INSTALLED.load(Ordering::SeqCst) {
        let installed = runtime::with_runtime(|rt| {
            rt.install_exception_hook(trigger::on_uncaught_exception, true)
        })
        .is_some();
        if installed {
            EXCEPTION_HOOK_INSTALLED.store(true, Ordering::SeqCst);
        }
    }

    if mask.contains(EventClass::Signal) && !previous.contains(EventClass::Signal) {
        if let Err(e) = arm_signal_trigger() {
            // A class that failed to arm must not read as armed, and a
            // later retry must take the arming transition again.
            config::replace_event_mask(previous);
            return Err(e);
        }
    }
    if !mask.contains(EventClass::Signal) && previous.contains(EventClass::Signal) {
        if let Err(e) = disarm_signal_trigger() {
            config::replace_event_mask(previous);
            return Err(e);
        }
    }

    Ok(previous)
}

fn arm_signal_trigger() -> Result<(), ReportError> {
    if !signals_supported() {
        return Err(ReportError::Unsupported);
    }
    // The disposition mutex serializes the whole arm, so the one-way
    // flags cannot be taken twice by concurrent callers.
    let mut slot = SAVED_DISPOSITION.lock().unwrap_or_else(|e| e.into_inner());
    if !WATCHDOG_STARTED.load(Ordering::SeqCst) {
        watchdog::start()?;
        WATCHDOG_STARTED.store(true, Ordering::SeqCst);
    }
    if !LOOP_WAKE_REGISTERED.load(Ordering::SeqCst) {
        runtime::with_runtime(|rt| rt.register_loop_wake(bridge::loop_wake_callback))
            .ok_or_else(|| {
                ReportError::InitializationFailure("no runtime registered".into())
            })??;
        LOOP_WAKE_REGISTERED.store(true, Ordering::SeqCst);
    }
    *slot = Some(signals::register(config::signal_number())?);
    Ok(())
}

fn disarm_signal_trigger() -> Result<(), ReportError> {
    let saved = {
        let mut slot = SAVED_DISPOSITION.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    };
    if let Some(saved) = saved {
        signals::restore(config::signal_number(), &saved)?;
    }
    Ok(())
}

/// Parse and apply a signal spec. When the signal class is armed and
/// the number actually changed, the installed handler is switched in
/// one critical section: restore the old signal's saved disposition,
/// register on the new one.
pub fn set_signal(spec: &str) -> Result<(), ReportError> {
    let signo = config::parse_signal_spec(spec)?;
    let mut slot = SAVED_DISPOSITION.lock().unwrap_or_else(|e| e.into_inner());
    let previous = config::signal_number();
    config::set_signal_number(signo)?;
    if config::event_mask().contains(EventClass::Signal) && signo != previous {
        if let Some(saved) = slot.take() {
            signals::restore(previous, &saved)?;
        }
        *slot = Some(signals::register(signo)?);
    }
    Ok(())
}

pub fn set_verbose(on: bool) {
    config::set_verbose(on);
}

pub fn set_filename(name: &str) -> Result<(), ReportError> {
    config::set_filename(name)
}

pub fn set_directory(path: &Path) {
    config::set_directory(path);
}

/// One-shot initialization from environment variables, applied in the
/// order verbose, events, signal, filename, directory. The signal
/// override goes through `set_signal`, so it takes effect even when the
/// events variable already armed the signal class with the default
/// number. Safe to call more than once; later calls are no-ops.
pub fn init() -> Result<(), ReportError> {
    if INIT_DONE.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    if let Ok(value) = std::env::var(ENV_VERBOSE) {
        config::set_verbose(config::parse_verbose_switch(&value));
    }
    if let Ok(value) = std::env::var(ENV_EVENTS) {
        set_events(&value)?;
    }
    if let Ok(value) = std::env::var(ENV_SIGNAL) {
        set_signal(&value)?;
    }
    if let Ok(value) = std::env::var(ENV_FILENAME) {
        config::set_filename(&value)?;
    }
    if let Ok(value) = std::env::var(ENV_DIRECTORY) {
        config::set_directory(Path::new(&value));
    }
    if config::verbose() {
        eprintln!(
            "[ripcord] initialization complete, signal {}",
            config::signal_name(config::signal_number())
        );
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_supported_on_unix() {
        #[cfg(unix)]
        assert!(signals_supported());
    }

    #[test]
    fn test_set_events_rejects_bad_spec_without_mask_change() {
        let before = config::event_mask();
        assert!(set_events("signal,nonsense").is_err());
        assert_eq!(config::event_mask(), before);
    }
}

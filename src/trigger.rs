//! Report trigger façade
//!
//! The single synchronous path every trigger class funnels through.
//! Direct API calls, the fatal-error hook, the uncaught-exception hook
//! and the interrupt bridge all end up in [`trigger`], which consults
//! the event mask and hands off to the report-generation collaborator.
//!
//! This function is safe to call from any ordinary thread, including
//! inside the runtime's fatal-error callback. It must never be called
//! from true signal-handler context; that is what the relay, watchdog
//! and bridge indirection exists for.

use crate::config::{self, EventClass};
use crate::error::ReportError;
use crate::report::{self, ReportGenerator};
use crate::runtime::ScriptError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Which trigger path produced an event. The two signal kinds differ
/// only in which bridge callback won the claim race; both gate on
/// `EventClass::Signal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKind {
    ApiCall,
    FatalError,
    Exception,
    SignalSafePoint,
    SignalLoopWake,
}

impl TriggerKind {
    pub fn event_class(self) -> EventClass {
        match self {
            TriggerKind::ApiCall => EventClass::ApiCall,
            TriggerKind::FatalError => EventClass::FatalError,
            TriggerKind::Exception => EventClass::Exception,
            TriggerKind::SignalSafePoint | TriggerKind::SignalLoopWake => EventClass::Signal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TriggerKind::ApiCall => "ApiCall",
            TriggerKind::FatalError => "FatalError",
            TriggerKind::Exception => "Exception",
            TriggerKind::SignalSafePoint => "SignalSafePoint",
            TriggerKind::SignalLoopWake => "SignalLoopWake",
        }
    }
}

/// A single trigger occurrence. The error reference is borrowed from
/// the runtime and only valid while the originating call is on the
/// stack, which is why reports are generated synchronously.
pub struct TriggerEvent<'a> {
    pub kind: TriggerKind,
    /// Human-readable trigger location ("api call", the fatal message,
    /// the signal name).
    pub location: &'a str,
    pub error: Option<&'a dyn ScriptError>,
    pub filename: Option<&'a str>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The event's class is outside the configured mask. Not an error;
    /// callers that care must check for it explicitly.
    NotTriggered,
    Written(PathBuf),
}

// =============================================================================
// Collaborator seams
// =============================================================================

static GENERATOR: Mutex<Option<Arc<dyn ReportGenerator>>> = Mutex::new(None);

/// Replace the report-generation collaborator. Defaults to
/// [`report::BasicGenerator`].
pub fn set_generator(generator: Arc<dyn ReportGenerator>) {
    let mut slot = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(generator);
}

fn generator() -> Arc<dyn ReportGenerator> {
    let mut slot = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    slot.get_or_insert_with(|| Arc::new(report::BasicGenerator) as Arc<dyn ReportGenerator>)
        .clone()
}

static TERMINATION_HOOK: Mutex<Option<fn()>> = Mutex::new(None);

/// Replace the process-termination step of the fatal-error path. Test
/// hooks can panic to observe the call; a returning hook still falls
/// through to an abort.
pub fn set_termination_hook(hook: fn()) {
    let mut slot = TERMINATION_HOOK.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(hook);
}

// =============================================================================
// Façade
// =============================================================================

/// Produce a report for `event` if its class is enabled, writing to the
/// resolved output file. Mask misses return `Ok(NotTriggered)`.
pub fn trigger(event: &TriggerEvent<'_>) -> Result<TriggerOutcome, ReportError> {
    if !config::event_mask().contains(event.kind.event_class()) {
        return Ok(TriggerOutcome::NotTriggered);
    }
    let path = report::resolve_path(event.filename);
    let file = File::create(&path)?;
    let mut out = BufWriter::new(file);
    generator().write_report(event, &mut out)?;
    out.flush()?;
    if config::verbose() {
        eprintln!(
            "[ripcord] {} report written to {}",
            event.kind.label(),
            path.display()
        );
    }
    Ok(TriggerOutcome::Written(path))
}

/// Explicit API trigger. Validates the filename parameter before
/// anything is written; a rejected name leaves the stored filename
/// configuration untouched and produces no report.
pub fn trigger_report(
    filename: Option<&str>,
    error: Option<&dyn ScriptError>,
) -> Result<TriggerOutcome, ReportError> {
    if let Some(name) = filename {
        config::validate_filename(name)?;
    }
    let event = TriggerEvent {
        kind: TriggerKind::ApiCall,
        location: "api call",
        error,
        filename,
    };
    trigger(&event)
}

/// Explicit API trigger returning the report as text instead of a file.
pub fn get_report(error: Option<&dyn ScriptError>) -> Result<String, ReportError> {
    let event = TriggerEvent {
        kind: TriggerKind::ApiCall,
        location: "api call",
        error,
        filename: None,
    };
    let mut buf = Vec::new();
    generator().write_report(&event, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// =============================================================================
// Runtime notification hooks
// =============================================================================

/// Fatal-error notification. Triggers a report if the class is armed,
/// then terminates the process abnormally. A report failure does not
/// skip termination, and this function never returns control to the
/// runtime.
pub fn on_fatal_error(location: Option<&str>, message: &str) {
    match location {
        Some(location) => eprintln!("FATAL ERROR: {location} {message}"),
        None => eprintln!("FATAL ERROR: {message}"),
    }
    let event = TriggerEvent {
        kind: TriggerKind::FatalError,
        location: message,
        error: None,
        filename: None,
    };
    if let Err(e) = trigger(&event) {
        eprintln!("[ripcord] fatal-error report failed: {e}");
    }
    let hook = *TERMINATION_HOOK.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(hook) = hook {
        hook();
    }
    let _ = nix::sys::signal::raise(nix::sys::signal::Signal::SIGABRT);
    std::process::abort();
}

/// Uncaught-exception notification. The report decision follows the
/// event mask; the returned abort decision follows only the process
/// command line. The two are orthogonal.
pub fn on_uncaught_exception(error: Option<&dyn ScriptError>) -> bool {
    let event = TriggerEvent {
        kind: TriggerKind::Exception,
        location: "uncaught exception",
        error,
        filename: None,
    };
    if let Err(e) = trigger(&event) {
        eprintln!("[ripcord] exception report failed: {e}");
    }
    abort_on_uncaught_exception()
}

/// Whether the process was started with an abort-on-uncaught-exception
/// directive.
pub fn abort_on_uncaught_exception() -> bool {
    static DIRECTIVE: OnceLock<bool> = OnceLock::new();
    *DIRECTIVE.get_or_init(|| {
        std::env::args().any(|arg| {
            arg.contains("abort-on-uncaught-exception")
                || arg.contains("abort_on_uncaught_exception")
        })
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_to_event_class() {
        assert_eq!(TriggerKind::ApiCall.event_class(), EventClass::ApiCall);
        assert_eq!(
            TriggerKind::FatalError.event_class(),
            EventClass::FatalError
        );
        assert_eq!(TriggerKind::Exception.event_class(), EventClass::Exception);
        assert_eq!(
            TriggerKind::SignalSafePoint.event_class(),
            EventClass::Signal
        );
        assert_eq!(
            TriggerKind::SignalLoopWake.event_class(),
            EventClass::Signal
        );
    }

    #[test]
    fn test_abort_directive_not_set_in_tests() {
        assert!(!abort_on_uncaught_exception());
    }

    #[test]
    fn test_api_trigger_rejects_long_filename() {
        let long = "x".repeat(config::MAX_FILENAME_LEN + 1);
        assert!(matches!(
            trigger_report(Some(long.as_str()), None),
            Err(ReportError::InvalidArgument(_))
        ));
    }
}

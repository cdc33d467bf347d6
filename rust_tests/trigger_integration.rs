//! Trigger façade integration tests
//!
//! These exercise the public trigger paths against the real process-wide
//! configuration store, so every test serializes on one lock and points
//! the output directory at its own scratch tempdir.

use ripcord::config;
use ripcord::error::ReportError;
use ripcord::lifecycle;
use ripcord::runtime::ScriptError;
use ripcord::trigger::{self, TriggerOutcome};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Point report output at a fresh scratch directory.
fn fresh_output_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    lifecycle::set_directory(dir.path());
    dir
}

fn report_files(dir: &TempDir) -> Vec<PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

struct Boom;

impl ScriptError for Boom {
    fn message(&self) -> String {
        "boom".into()
    }
    fn stack(&self) -> Option<String> {
        Some("at main:1:1".into())
    }
}

#[test]
fn test_api_trigger_with_explicit_filename() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("apicall").unwrap();

    let outcome = trigger::trigger_report(Some("out.json"), None).unwrap();
    match outcome {
        TriggerOutcome::Written(path) => {
            assert!(path.ends_with("out.json"));
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(text.contains("\"trigger\": \"ApiCall\""));
        }
        other => panic!("expected Written, got {other:?}"),
    }
    assert_eq!(report_files(&dir).len(), 1);
}

#[test]
fn test_api_trigger_default_names_are_distinct() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("apicall").unwrap();

    let first = trigger::trigger_report(None, None).unwrap();
    let second = trigger::trigger_report(None, None).unwrap();
    let (TriggerOutcome::Written(a), TriggerOutcome::Written(b)) = (first, second) else {
        panic!("expected two written reports");
    };
    assert_ne!(a, b);
    assert!(!a.file_name().unwrap().is_empty());
    assert_eq!(report_files(&dir).len(), 2);
}

#[test]
fn test_event_outside_mask_is_noop_not_error() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("apicall").unwrap();

    // Exception class is not armed: no report, no error, abort decision
    // still reported independently.
    let abort = trigger::on_uncaught_exception(Some(&Boom));
    assert!(!abort);
    assert!(report_files(&dir).is_empty());
}

#[test]
fn test_exception_trigger_when_armed() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("exception").unwrap();

    let abort = trigger::on_uncaught_exception(Some(&Boom));
    // Report produced, but no abort directive on this process.
    assert!(!abort);
    let files = report_files(&dir);
    assert_eq!(files.len(), 1);
    let text = std::fs::read_to_string(&files[0]).unwrap();
    assert!(text.contains("\"trigger\": \"Exception\""));
    assert!(text.contains("\"message\": \"boom\""));
    assert!(text.contains("at main:1:1"));

    lifecycle::set_events("apicall").unwrap();
}

static TERMINATED: AtomicBool = AtomicBool::new(false);

fn mock_terminate() {
    TERMINATED.store(true, Ordering::SeqCst);
    panic!("mock termination");
}

#[test]
fn test_fatal_error_path_reports_then_terminates() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("fatalerror").unwrap();
    trigger::set_termination_hook(mock_terminate);
    TERMINATED.store(false, Ordering::SeqCst);

    let unwound = catch_unwind(AssertUnwindSafe(|| {
        trigger::on_fatal_error(Some("allocator"), "OOM");
    }));
    assert!(unwound.is_err());
    assert!(TERMINATED.load(Ordering::SeqCst));

    let files = report_files(&dir);
    assert_eq!(files.len(), 1);
    let text = std::fs::read_to_string(&files[0]).unwrap();
    assert!(text.contains("\"trigger\": \"FatalError\""));
    assert!(text.contains("OOM"));

    lifecycle::set_events("apicall").unwrap();
}

#[test]
fn test_fatal_error_terminates_even_when_not_armed() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("apicall").unwrap();
    trigger::set_termination_hook(mock_terminate);
    TERMINATED.store(false, Ordering::SeqCst);

    let unwound = catch_unwind(AssertUnwindSafe(|| {
        trigger::on_fatal_error(None, "OOM");
    }));
    assert!(unwound.is_err());
    assert!(TERMINATED.load(Ordering::SeqCst));
    // Termination is unconditional; the report was gated off.
    assert!(report_files(&dir).is_empty());
}

#[test]
fn test_overlong_filename_rejected_nothing_written() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("apicall").unwrap();

    let before = config::filename();
    let long = "x".repeat(config::MAX_FILENAME_LEN + 1);
    let result = trigger::trigger_report(Some(long.as_str()), None);
    assert!(matches!(result, Err(ReportError::InvalidArgument(_))));
    assert_eq!(config::filename(), before);
    assert!(report_files(&dir).is_empty());
}

#[test]
fn test_get_report_returns_text() {
    let _guard = serial();
    let dir = fresh_output_dir();
    lifecycle::set_events("apicall").unwrap();

    let text = trigger::get_report(Some(&Boom)).unwrap();
    assert!(text.contains("\"trigger\": \"ApiCall\""));
    assert!(text.contains("\"message\": \"boom\""));
    // Text variant writes no file.
    assert!(report_files(&dir).is_empty());
}

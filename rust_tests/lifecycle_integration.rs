//! Lifecycle/configuration API integration tests
//!
//! Environment initialization, mask transitions and runtime hook
//! installation against the real global store. Serialized on one lock
//! because configuration and env vars are process-wide.

use ripcord::config::{self, EventClass};
use ripcord::lifecycle;
use ripcord::runtime::{self, ThreadLoopRuntime};
use ripcord::trigger::{self, TriggerOutcome};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tempfile::TempDir;

fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn loop_runtime() -> &'static Arc<ThreadLoopRuntime> {
    static RT: OnceLock<Arc<ThreadLoopRuntime>> = OnceLock::new();
    RT.get_or_init(|| {
        let rt = Arc::new(ThreadLoopRuntime::new());
        runtime::set_runtime(rt.clone());
        rt
    })
}

fn report_files(dir: &TempDir) -> Vec<PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

#[test]
fn test_env_initialization_order_and_idempotency() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();

    std::env::set_var(lifecycle::ENV_VERBOSE, "1");
    std::env::set_var(lifecycle::ENV_EVENTS, "fatalerror,exception");
    // Signal number override applies even though the events list did
    // not arm the signal class.
    std::env::set_var(lifecycle::ENV_SIGNAL, "SIGUSR1");
    std::env::set_var(lifecycle::ENV_FILENAME, "env.json");
    std::env::set_var(lifecycle::ENV_DIRECTORY, dir.path().to_str().unwrap());

    lifecycle::init().unwrap();

    assert!(config::verbose());
    let mask = config::event_mask();
    assert!(mask.contains(EventClass::FatalError));
    assert!(mask.contains(EventClass::Exception));
    assert!(!mask.contains(EventClass::Signal));
    assert_eq!(config::signal_number(), config::parse_signal_spec("usr1").unwrap());
    assert_eq!(config::filename().as_deref(), Some("env.json"));
    assert_eq!(config::directory().as_deref(), Some(dir.path()));

    // A second init is a no-op: changed env must not be re-applied.
    std::env::set_var(lifecycle::ENV_FILENAME, "other.json");
    lifecycle::init().unwrap();
    assert_eq!(config::filename().as_deref(), Some("env.json"));

    for key in [
        lifecycle::ENV_VERBOSE,
        lifecycle::ENV_EVENTS,
        lifecycle::ENV_SIGNAL,
        lifecycle::ENV_FILENAME,
        lifecycle::ENV_DIRECTORY,
    ] {
        std::env::remove_var(key);
    }
    lifecycle::set_verbose(false);
    lifecycle::set_signal("SIGUSR2").unwrap();
    lifecycle::set_events("apicall").unwrap();
}

#[test]
fn test_set_events_returns_previous_mask() {
    let _guard = serial();
    lifecycle::set_events("exception").unwrap();
    let previous = lifecycle::set_events("fatalerror").unwrap();
    assert!(previous.contains(EventClass::Exception));
    assert!(!previous.contains(EventClass::FatalError));
    lifecycle::set_events("apicall").unwrap();
}

#[test]
fn test_configured_filename_used_and_survives_bad_update() {
    let _guard = serial();
    let dir = TempDir::new().unwrap();
    lifecycle::set_directory(dir.path());
    lifecycle::set_events("apicall").unwrap();

    lifecycle::set_filename("fixed.json").unwrap();
    let outcome = trigger::trigger_report(None, None).unwrap();
    let TriggerOutcome::Written(path) = outcome else {
        panic!("expected a written report");
    };
    assert!(path.ends_with("fixed.json"));

    let long = "x".repeat(config::MAX_FILENAME_LEN + 1);
    assert!(lifecycle::set_filename(&long).is_err());
    assert_eq!(config::filename().as_deref(), Some("fixed.json"));
}

#[test]
fn test_exception_hook_installed_through_runtime() {
    let _guard = serial();
    let rt = loop_runtime();
    let dir = TempDir::new().unwrap();
    lifecycle::set_directory(dir.path());
    lifecycle::set_events("exception").unwrap();

    // The runtime delivers the notification; the hook must have been
    // installed by the arming transition above.
    let abort = rt.fire_exception(None);
    assert_eq!(abort, Some(false));
    assert_eq!(report_files(&dir).len(), 1);

    lifecycle::set_events("apicall").unwrap();
}

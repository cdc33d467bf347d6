//! Signal trigger integration tests
//!
//! End-to-end over the real machinery: raw handler, pending slot,
//! watchdog thread, loop runtime, report file. Signal dispositions and
//! the configuration store are process-global, so every test serializes
//! on one lock, arms what it needs and disarms before returning.

use nix::sys::signal::{
    raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal,
};
use ripcord::lifecycle;
use ripcord::runtime::{self, ThreadLoopRuntime};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// One loop runtime for the whole test binary, registered once. The
/// engine's runtime handle is process-lifetime and never cleared.
fn loop_runtime() -> &'static Arc<ThreadLoopRuntime> {
    static RT: OnceLock<Arc<ThreadLoopRuntime>> = OnceLock::new();
    RT.get_or_init(|| {
        let rt = Arc::new(ThreadLoopRuntime::new());
        runtime::set_runtime(rt.clone());
        rt
    })
}

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

/// Run queued loop callbacks until the queue stays quiet.
fn drain_loop(rt: &ThreadLoopRuntime) {
    while rt.pump_one(Duration::from_millis(50)) {}
}

/// Pump the loop until `dir` holds `count` reports or the deadline hits.
fn pump_until_reports(rt: &ThreadLoopRuntime, dir: &TempDir, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if report_files(dir).len() >= count {
            return true;
        }
        rt.pump_one(Duration::from_millis(50));
    }
    false
}

extern "C" fn noop_handler(_signo: libc::c_int) {}

/// Install a harmless handler for `signal`, returning what was there.
/// Keeps restored dispositions safe to actually receive the signal.
fn install_noop(signal: Signal) -> SigAction {
    let noop = SigAction::new(
        SigHandler::Handler(noop_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(signal, &noop) }.unwrap()
}

fn current_handler(signal: Signal) -> SigHandler {
    // sigaction only reports the old action while installing one, so
    // reinstall what we read back.
    let noop = SigAction::new(
        SigHandler::Handler(noop_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let current = unsafe { sigaction(signal, &noop) }.unwrap();
    unsafe { sigaction(signal, &current) }.unwrap();
    current.handler()
}

#[test]
fn test_signal_end_to_end() {
    let _guard = serial();
    let rt = loop_runtime();
    drain_loop(rt);
    let dir = fresh_output_dir();
    let original = install_noop(Signal::SIGUSR2);

    lifecycle::set_signal("SIGUSR2").unwrap();
    lifecycle::set_events("signal").unwrap();

    raise(Signal::SIGUSR2).unwrap();
    assert!(
        pump_until_reports(rt, &dir, 1),
        "no report produced for SIGUSR2"
    );
    let files = report_files(&dir);
    assert_eq!(files.len(), 1);
    let text = std::fs::read_to_string(&files[0]).unwrap();
    assert!(text.contains("\"location\": \"SIGUSR2\""));
    assert!(text.contains("Signal"));

    lifecycle::set_events("apicall").unwrap();
    unsafe { sigaction(Signal::SIGUSR2, &original) }.unwrap();
}

#[test]
fn test_signal_burst_coalesces_to_one_report() {
    let _guard = serial();
    let rt = loop_runtime();
    drain_loop(rt);
    let dir = fresh_output_dir();
    let original = install_noop(Signal::SIGUSR2);

    lifecycle::set_signal("SIGUSR2").unwrap();
    lifecycle::set_events("signal").unwrap();

    // Nothing consumes the pending slot until the loop is pumped, so a
    // burst must collapse into a single pending trigger.
    raise(Signal::SIGUSR2).unwrap();
    raise(Signal::SIGUSR2).unwrap();
    raise(Signal::SIGUSR2).unwrap();

    assert!(pump_until_reports(rt, &dir, 1));
    drain_loop(rt);
    assert_eq!(report_files(&dir).len(), 1);

    lifecycle::set_events("apicall").unwrap();
    unsafe { sigaction(Signal::SIGUSR2, &original) }.unwrap();
}

#[test]
fn test_disarm_restores_sentinel_disposition() {
    let _guard = serial();
    let rt = loop_runtime();
    drain_loop(rt);
    let _dir = fresh_output_dir();
    let original = install_noop(Signal::SIGUSR2);

    lifecycle::set_signal("SIGUSR2").unwrap();
    lifecycle::set_events("signal").unwrap();
    // Relay handler is now installed in place of the sentinel.
    assert_ne!(
        current_handler(Signal::SIGUSR2),
        SigHandler::Handler(noop_handler)
    );

    lifecycle::set_events("apicall").unwrap();
    assert_eq!(
        current_handler(Signal::SIGUSR2),
        SigHandler::Handler(noop_handler)
    );

    unsafe { sigaction(Signal::SIGUSR2, &original) }.unwrap();
}

#[test]
fn test_set_signal_switches_installed_handler() {
    let _guard = serial();
    let rt = loop_runtime();
    drain_loop(rt);
    let dir = fresh_output_dir();
    let original_usr2 = install_noop(Signal::SIGUSR2);
    let original_usr1 = install_noop(Signal::SIGUSR1);

    lifecycle::set_signal("SIGUSR2").unwrap();
    lifecycle::set_events("signal").unwrap();
    lifecycle::set_signal("SIGUSR1").unwrap();

    // Old signal no longer relays: its saved disposition is back.
    assert_eq!(
        current_handler(Signal::SIGUSR2),
        SigHandler::Handler(noop_handler)
    );
    // New signal triggers a report.
    raise(Signal::SIGUSR1).unwrap();
    assert!(pump_until_reports(rt, &dir, 1));
    let text = std::fs::read_to_string(&report_files(&dir)[0]).unwrap();
    assert!(text.contains("\"location\": \"SIGUSR1\""));

    lifecycle::set_events("apicall").unwrap();
    lifecycle::set_signal("SIGUSR2").unwrap();
    unsafe { sigaction(Signal::SIGUSR2, &original_usr2) }.unwrap();
    unsafe { sigaction(Signal::SIGUSR1, &original_usr1) }.unwrap();
}

//! Signal arming failure-path integration test
//!
//! Lives in its own binary: the scenario depends on no runtime being
//! registered when arming is first attempted, and the engine's runtime
//! handle is process-lifetime once set.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use ripcord::config::{self, EventClass};
use ripcord::error::ReportError;
use ripcord::lifecycle;
use ripcord::runtime::{self, ThreadLoopRuntime};
use std::sync::Arc;

extern "C" fn noop_handler(_signo: libc::c_int) {}

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
fn test_failed_arm_leaves_class_disarmed_and_retryable() {
    let noop = SigAction::new(
        SigHandler::Handler(noop_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let original = unsafe { sigaction(Signal::SIGUSR2, &noop) }.unwrap();

    // No runtime registered yet: arming must fail...
    let result = lifecycle::set_events("signal");
    assert!(matches!(
        result,
        Err(ReportError::InitializationFailure(_))
    ));
    // ...and the class must not read as armed afterwards, nor may the
    // relay handler have been installed.
    assert!(!config::event_mask().contains(EventClass::Signal));
    assert_eq!(
        current_handler(Signal::SIGUSR2),
        SigHandler::Handler(noop_handler)
    );

    // A retry once the runtime shows up takes the arming transition
    // for real.
    runtime::set_runtime(Arc::new(ThreadLoopRuntime::new()));
    lifecycle::set_events("signal").unwrap();
    assert!(config::event_mask().contains(EventClass::Signal));
    assert_ne!(
        current_handler(Signal::SIGUSR2),
        SigHandler::Handler(noop_handler)
    );

    lifecycle::set_events("apicall").unwrap();
    unsafe { sigaction(Signal::SIGUSR2, &original) }.unwrap();
}

//! Execution-context interrupt bridge
//!
//! Two independently scheduled callbacks with identical logic: the
//! safe-point callback runs when interpreted code next reaches a safe
//! point (full script state available), the loop-wake callback runs on
//! the next event-loop iteration (covers a main thread parked waiting
//! for work). The watchdog schedules both on every wake; whichever runs
//! first claims the pending signal atomically, the other finds nothing
//! and backs off.

use crate::config::{self, EventClass};
use crate::pending::PENDING_SIGNAL;
use crate::trigger::{self, TriggerEvent, TriggerKind};

/// Scheduled via `Runtime::request_interrupt`; runs on the main thread
/// between units of interpreted code.
pub fn safepoint_callback() {
    consume_pending(TriggerKind::SignalSafePoint);
}

/// Registered once via `Runtime::register_loop_wake`; fired by
/// `Runtime::wake_loop` on the next loop iteration.
pub fn loop_wake_callback() {
    consume_pending(TriggerKind::SignalLoopWake);
}

fn consume_pending(kind: TriggerKind) {
    // The claim is the whole de-duplication story: exactly one of the
    // two callbacks per signal occurrence gets past this line.
    let Some(signo) = PENDING_SIGNAL.claim() else {
        return;
    };
    if config::verbose() {
        eprintln!(
            "[ripcord] {} handling {}",
            kind.label(),
            config::signal_name(signo)
        );
    }
    if config::event_mask().contains(EventClass::Signal) {
        let event = TriggerEvent {
            kind,
            location: config::signal_name(signo),
            error: None,
            filename: None,
        };
        if let Err(e) = trigger::trigger(&event) {
            eprintln!("[ripcord] signal-triggered report failed: {e}");
        }
    }
    // Slot stays claimed while the report runs, so a signal burst
    // cannot start a second report; only now may a new one be accepted.
    PENDING_SIGNAL.release();
}

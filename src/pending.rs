//! Pending-trigger flag
//!
//! A single atomic slot carrying "a signal trigger is pending, with this
//! signal number" across the boundary between the raw signal handler and
//! the threads that may legally generate a report.
//!
//! Lifecycle of the slot:
//! - `post` (signal-handler context): empty -> occupied, CAS. A signal
//!   arriving while the slot is occupied is coalesced, not queued.
//! - `claim` (safe-point or loop-wake callback): occupied -> claimed,
//!   CAS. Two callbacks race for every occurrence; exactly one wins and
//!   the loser sees an empty-or-claimed slot and backs off.
//! - `release` (the claim winner, after the report ran): claimed -> empty.

use std::sync::atomic::{AtomicI32, Ordering};

const EMPTY: i32 = 0;
const CLAIMED: i32 = -1;

pub struct PendingSignal(AtomicI32);

/// The one process-wide slot shared by the signal relay and the bridge.
pub static PENDING_SIGNAL: PendingSignal = PendingSignal::new();

impl PendingSignal {
    pub const fn new() -> Self {
        PendingSignal(AtomicI32::new(EMPTY))
    }

    /// Record an incoming signal if no trigger is already pending.
    /// Returns true when this call performed the empty->occupied
    /// transition; the caller then owes exactly one watchdog wake.
    ///
    /// Async-signal-safe: a single compare-exchange, nothing else.
    pub fn post(&self, signo: i32) -> bool {
        debug_assert!(signo > 0);
        self.0
            .compare_exchange(EMPTY, signo, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Atomically take ownership of the pending signal, if any. At most
    /// one of the racing consumers observes `Some`; the slot stays
    /// unavailable to new signals until `release` is called.
    pub fn claim(&self) -> Option<i32> {
        let signo = self.0.load(Ordering::SeqCst);
        if signo <= 0 {
            return None;
        }
        self.0
            .compare_exchange(signo, CLAIMED, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| signo)
    }

    /// Read the pending signal number without consuming it. Diagnostics
    /// only (the watchdog logs it); never used to decide a report.
    pub fn peek(&self) -> Option<i32> {
        let signo = self.0.load(Ordering::SeqCst);
        (signo > 0).then_some(signo)
    }

    /// Return a claimed slot to empty so a new signal can be accepted.
    pub fn release(&self) {
        self.0.store(EMPTY, Ordering::SeqCst);
    }
}

impl Default for PendingSignal {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_claim_release_cycle() {
        let slot = PendingSignal::new();
        assert!(slot.post(10));
        assert_eq!(slot.peek(), Some(10));
        assert_eq!(slot.claim(), Some(10));
        assert_eq!(slot.claim(), None);
        slot.release();
        assert!(slot.post(12));
        assert_eq!(slot.claim(), Some(12));
    }

    #[test]
    fn test_burst_is_coalesced() {
        let slot = PendingSignal::new();
        assert!(slot.post(10));
        // Second and third signals arrive before anyone consumed the
        // first: dropped, not queued.
        assert!(!slot.post(10));
        assert!(!slot.post(12));
        assert_eq!(slot.claim(), Some(10));
    }

    #[test]
    fn test_post_blocked_while_claimed() {
        let slot = PendingSignal::new();
        assert!(slot.post(10));
        assert_eq!(slot.claim(), Some(10));
        // Report still in flight; a new signal must not sneak in.
        assert!(!slot.post(12));
        slot.release();
        assert!(slot.post(12));
    }

    #[test]
    fn test_claim_has_single_winner() {
        let slot = Arc::new(PendingSignal::new());
        for _ in 0..100 {
            assert!(slot.post(10));
            let winners = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let slot = Arc::clone(&slot);
                    let winners = Arc::clone(&winners);
                    thread::spawn(move || {
                        if slot.claim().is_some() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(winners.load(Ordering::SeqCst), 1);
            slot.release();
        }
    }
}

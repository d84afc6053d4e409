//! Cross-thread timeout registry for cooperative backend cancellation
//! (spec.md §4.7, component C12).
//!
//! One slot per worker thread. A worker CASes its slot to `Active` before
//! entering a backend call and back to `Available` on return. A separate
//! "cron" thread (the server-level periodic callback spec.md §1 treats as
//! an external collaborator) scans the slots and, for anything that's run
//! longer than the configured timeout, CASes `Active -> Invalid` and
//! invokes the captured [`Cancellable::terminate`]. The handshake:
//!
//! `Available -> Active -> (Invalid ->) Terminated -> Available`
//!
//! guarantees no termination call races with release of the cancel token,
//! and no worker ever observes a token belonging to a later run — grounded
//! directly in the state names of the original `onnx_timeout.c` handshake
//! (see `examples/original_source/`, cited in SPEC_FULL.md §F.3).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// A handle a backend hands the registry so a timed-out run can be
/// cancelled cooperatively. Backends without a terminate hook (everything
/// but ONNX, per spec.md §4.7) simply never register a slot.
pub trait Cancellable: Send + Sync {
    /// Ask the backend to abort the in-flight run this token refers to.
    fn terminate(&self);
}

/// The handshake states a slot cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// No run is using this slot.
    Available = 0,
    /// A worker is executing a backend call, timer running.
    Active = 1,
    /// The cron thread has claimed this slot for termination.
    Invalid = 2,
    /// The cron thread finished calling `terminate`; the worker may now
    /// release the slot once it returns from the backend call.
    Terminated = 3,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SlotState::Available,
            1 => SlotState::Active,
            2 => SlotState::Invalid,
            3 => SlotState::Terminated,
            other => unreachable!("invalid slot state encoding {other}"),
        }
    }
}

struct Slot {
    state: AtomicU8,
    entered_at_ms: AtomicU64,
    token: Mutex<Option<Arc<dyn Cancellable>>>,
}

impl Slot {
    fn new() -> Self {
        Slot {
            state: AtomicU8::new(SlotState::Available as u8),
            entered_at_ms: AtomicU64::new(0),
            token: Mutex::new(None),
        }
    }
}

/// The process-wide (well, per-`Database`) slot table.
pub struct TimeoutRegistry {
    slots: parking_lot::RwLock<Vec<Slot>>,
}

impl TimeoutRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        TimeoutRegistry {
            slots: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// Allocate `additional` new slots (called when a run queue spins up
    /// its worker threads) and return their ids.
    pub fn extend(&self, additional: usize) -> Vec<usize> {
        let mut slots = self.slots.write();
        let base = slots.len();
        slots.extend((0..additional).map(|_| Slot::new()));
        (base..base + additional).collect()
    }

    /// Mark `slot_id` active for a backend call that started at
    /// `now_ms`, capturing `token` so the cron thread can terminate it.
    pub fn enter(&self, slot_id: usize, now_ms: u64, token: Arc<dyn Cancellable>) {
        let slots = self.slots.read();
        let slot = &slots[slot_id];
        *slot.token.lock() = Some(token);
        slot.entered_at_ms.store(now_ms, Ordering::Release);
        slot.state.store(SlotState::Active as u8, Ordering::Release);
    }

    /// Release `slot_id` after the backend call returns. If the cron
    /// thread is mid-termination (`Invalid`), spin until it reaches
    /// `Terminated` before releasing — this is the handshake's only
    /// busy-wait, and it's bounded by the cron thread's single CAS +
    /// `terminate()` call.
    pub fn exit(&self, slot_id: usize) {
        let slots = self.slots.read();
        let slot = &slots[slot_id];
        loop {
            match slot.state.compare_exchange(
                SlotState::Active as u8,
                SlotState::Available as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) if observed == SlotState::Terminated as u8 => {
                    slot.state
                        .store(SlotState::Available as u8, Ordering::Release);
                    break;
                }
                Err(_) => std::hint::spin_loop(),
            }
        }
        *slot.token.lock() = None;
    }

    /// Current state of a slot (exposed for tests and observability).
    pub fn state(&self, slot_id: usize) -> SlotState {
        SlotState::from_u8(self.slots.read()[slot_id].state.load(Ordering::Acquire))
    }

    /// The cron-side sweep: terminate any `Active` slot that has been
    /// running longer than `timeout_ms`. Returns the number of slots
    /// terminated this pass.
    pub fn scan_and_terminate(&self, timeout_ms: u64, now_ms: u64) -> usize {
        let slots = self.slots.read();
        let mut terminated = 0;
        for slot in slots.iter() {
            if slot.state.load(Ordering::Acquire) != SlotState::Active as u8 {
                continue;
            }
            let entered = slot.entered_at_ms.load(Ordering::Acquire);
            if now_ms.saturating_sub(entered) < timeout_ms {
                continue;
            }
            if slot
                .state
                .compare_exchange(
                    SlotState::Active as u8,
                    SlotState::Invalid as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
            {
                continue; // the worker already exited on its own
            }
            if let Some(token) = slot.token.lock().clone() {
                token.terminate();
            }
            slot.state
                .store(SlotState::Terminated as u8, Ordering::Release);
            terminated += 1;
        }
        terminated
    }
}

impl Default for TimeoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FlagToken(Arc<AtomicBool>);
    impl Cancellable for FlagToken {
        fn terminate(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn enter_exit_roundtrip_leaves_slot_available() {
        let reg = TimeoutRegistry::new();
        let ids = reg.extend(1);
        let slot = ids[0];
        assert_eq!(reg.state(slot), SlotState::Available);
        let flag = Arc::new(AtomicBool::new(false));
        reg.enter(slot, 0, Arc::new(FlagToken(Arc::clone(&flag))));
        assert_eq!(reg.state(slot), SlotState::Active);
        reg.exit(slot);
        assert_eq!(reg.state(slot), SlotState::Available);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn scan_and_terminate_fires_terminate_hook_past_deadline() {
        let reg = TimeoutRegistry::new();
        let ids = reg.extend(1);
        let slot = ids[0];
        let flag = Arc::new(AtomicBool::new(false));
        reg.enter(slot, 0, Arc::new(FlagToken(Arc::clone(&flag))));
        let terminated = reg.scan_and_terminate(100, 500);
        assert_eq!(terminated, 1);
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(reg.state(slot), SlotState::Terminated);
        // The worker's exit() now observes Terminated and releases cleanly.
        reg.exit(slot);
        assert_eq!(reg.state(slot), SlotState::Available);
    }

    #[test]
    fn scan_and_terminate_ignores_runs_within_deadline() {
        let reg = TimeoutRegistry::new();
        let ids = reg.extend(1);
        let slot = ids[0];
        let flag = Arc::new(AtomicBool::new(false));
        reg.enter(slot, 400, Arc::new(FlagToken(Arc::clone(&flag))));
        let terminated = reg.scan_and_terminate(100, 450);
        assert_eq!(terminated, 0);
        assert!(!flag.load(Ordering::SeqCst));
        assert_eq!(reg.state(slot), SlotState::Active);
    }

    #[test]
    fn multiple_slots_are_independent() {
        let reg = TimeoutRegistry::new();
        let ids = reg.extend(3);
        reg.enter(ids[1], 0, Arc::new(FlagToken(Arc::new(AtomicBool::new(false)))));
        assert_eq!(reg.state(ids[0]), SlotState::Available);
        assert_eq!(reg.state(ids[1]), SlotState::Active);
        assert_eq!(reg.state(ids[2]), SlotState::Available);
    }
}

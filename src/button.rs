//! Command signal source: turns a button-style trigger into the next LED
//! command and hands it to the dispatch loop without blocking or queueing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::state::ServerState;

/// Capacity of the pending-command channel. One slot, drop on full: a press
/// that lands while a command is still pending is lost, not queued.
const COMMAND_SLOTS: usize = 1;

pub struct Button {
    slot: mpsc::Sender<u8>,
    armed: AtomicBool,
    held: AtomicBool,
    state: Arc<ServerState>,
}

impl Button {
    pub fn new(state: Arc<ServerState>) -> (Arc<Button>, mpsc::Receiver<u8>) {
        let (slot, rx) = mpsc::channel(COMMAND_SLOTS);
        let button = Arc::new(Button {
            slot,
            armed: AtomicBool::new(true),
            held: AtomicBool::new(false),
            state,
        });
        (button, rx)
    }

    /// Registers a press. Wait-free (atomics and `try_send` only), so it is
    /// safe to call from any context, interrupt-like or not.
    ///
    /// The next command is the toggle of the current indicator state. Press
    /// detection disarms itself here and stays off until the dispatch loop
    /// finishes its debounce+send cycle and calls [`rearm`](Self::rearm), so
    /// contact bounce cannot deliver duplicates.
    pub fn press(&self) {
        if !self.armed.swap(false, Ordering::AcqRel) {
            return;
        }
        self.held.store(true, Ordering::Release);
        let cmd = self.state.indicator().toggled().command_byte();
        // Full slot means a previous command is still pending; drop this one.
        let _ = self.slot.try_send(cmd);
    }

    /// Debounce re-sample: is the trigger still asserted?
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Clears the held level, as when the trigger de-asserts again before
    /// the dispatch loop re-samples it. A press whose level has dropped by
    /// the end of the debounce period is rejected as a glitch.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Re-enables press detection. Called by the dispatch loop once per
    /// consumed command, after the debounce+send cycle completes.
    pub fn rearm(&self) {
        self.held.store(false, Ordering::Release);
        self.armed.store(true, Ordering::Release);
    }
}

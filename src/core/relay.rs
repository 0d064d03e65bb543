//! Shared outcome flag for one streaming relay.
//!
//! The response body owns the SSE decode loop and, through it, the
//! upstream connection, so a client disconnect tears the relay down by
//! dropping the body. This flag exists to tell that apart after the
//! fact: it records whether the relay drained the upstream to its end,
//! hit an upstream error mid-stream, or was still active when the body
//! was dropped (a disconnect).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const ACTIVE: u8 = 0;
const COMPLETED: u8 = 1;
const FAILED: u8 = 2;

/// How a streaming relay ended, shared between the SSE decode loop and
/// the response body wrapper.
///
/// The first terminal state wins; later transitions are ignored.
#[derive(Clone, Default)]
pub struct RelayStatus {
    state: Arc<AtomicU8>,
}

impl RelayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The upstream signalled completion and every chunk was relayed.
    pub fn mark_completed(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, COMPLETED, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// The upstream stream failed mid-relay.
    pub fn mark_failed(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, FAILED, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == COMPLETED
    }

    pub fn is_failed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FAILED
    }

    /// No terminal state recorded; a drop in this state is a disconnect.
    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::SeqCst) == ACTIVE
    }
}

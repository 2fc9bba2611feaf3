//! [`SingleFlightLock`] – admission control for decision cycles.
//!
//! At most one decision cycle holds the lock.  While it runs, up to
//! `max_waiters` further callers park on a [`Notify`]; any caller beyond that
//! is turned away immediately with [`SynapseError::RejectedTrigger`] and is
//! expected to drop its trigger.
//!
//! Ownership is handed directly from the releasing holder to one parked
//! waiter, so a fresh caller arriving at the moment of release cannot barge
//! ahead of a caller that was already queued.
//!
//! # States
//!
//! | State | `active` | `waiting` |
//! |---|---|---|
//! | IDLE | `false` | `0` |
//! | RUNNING | `true` | `0` |
//! | WAITING(n) | `true` | `1..=max_waiters` |
//!
//! # Example
//!
//! ```rust
//! use synapse_kernel::decision_lock::SingleFlightLock;
//!
//! # tokio_test_block_on(async {
//! let lock = SingleFlightLock::new(1);
//! let permit = lock.acquire().await.expect("idle lock admits immediately");
//! assert!(lock.state().active);
//! drop(permit);
//! assert!(!lock.state().active);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::pin::pin;
use std::sync::Arc;

use parking_lot::Mutex;
use synapse_types::SynapseError;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// "One running, at most one queued."
pub const DEFAULT_MAX_WAITERS: usize = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Public state snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Observable state of a [`SingleFlightLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    /// `true` while a cycle holds the lock.
    pub active: bool,
    /// Callers parked behind the running cycle.
    pub waiting: usize,
    pub max_waiters: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal shared state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Slots {
    active: bool,
    waiting: usize,
    /// Set by a releasing holder when ownership is reserved for a waiter.
    /// `active` stays `true` until the waiter claims it.
    handoff: bool,
}

#[derive(Debug)]
struct Shared {
    slots: Mutex<Slots>,
    wake: Notify,
    max_waiters: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// SingleFlightLock
// ─────────────────────────────────────────────────────────────────────────────

/// Single-flight decision lock with a bounded wait queue.
///
/// Cloning is cheap; all clones share the same admission state.
#[derive(Debug, Clone)]
pub struct SingleFlightLock {
    shared: Arc<Shared>,
}

impl SingleFlightLock {
    /// Create a lock admitting one holder and `max_waiters` queued callers.
    pub fn new(max_waiters: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots::default()),
                wake: Notify::new(),
                max_waiters,
            }),
        }
    }

    pub fn max_waiters(&self) -> usize {
        self.shared.max_waiters
    }

    /// Current admission state.
    pub fn state(&self) -> LockState {
        let slots = self.shared.slots.lock();
        LockState {
            active: slots.active,
            waiting: slots.waiting,
            max_waiters: self.shared.max_waiters,
        }
    }

    /// Acquire the lock, parking behind the running cycle if a wait slot is
    /// free.
    ///
    /// The returned [`DecisionPermit`] releases the lock when dropped, on
    /// every exit path of the holder.  Dropping this future while parked
    /// frees the wait slot.
    ///
    /// # Errors
    ///
    /// Returns [`SynapseError::RejectedTrigger`] without waiting when a cycle
    /// is running and all wait slots are occupied.
    pub async fn acquire(&self) -> Result<DecisionPermit, SynapseError> {
        {
            let mut slots = self.shared.slots.lock();
            if !slots.active {
                slots.active = true;
                trace!("decision lock acquired from idle");
                return Ok(self.permit());
            }
            if slots.waiting >= self.shared.max_waiters {
                debug!(
                    waiting = slots.waiting,
                    max_waiters = self.shared.max_waiters,
                    "decision lock saturated; rejecting caller"
                );
                return Err(SynapseError::RejectedTrigger {
                    waiting: slots.waiting,
                    max_waiters: self.shared.max_waiters,
                });
            }
            slots.waiting += 1;
            trace!(waiting = slots.waiting, "parked behind running cycle");
        }

        let mut ticket = WaitTicket {
            shared: &self.shared,
            granted: false,
        };
        loop {
            // Register interest before inspecting the slots so a release
            // between the check and the await is not lost.
            let mut notified = pin!(self.shared.wake.notified());
            notified.as_mut().enable();
            if ticket.try_claim() {
                trace!("decision lock handed to parked caller");
                return Ok(self.permit());
            }
            notified.await;
        }
    }

    fn permit(&self) -> DecisionPermit {
        DecisionPermit {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SingleFlightLock {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAITERS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guards
// ─────────────────────────────────────────────────────────────────────────────

/// Proof of holding the [`SingleFlightLock`].  Dropping it releases the lock
/// and wakes exactly one parked caller.
#[derive(Debug)]
pub struct DecisionPermit {
    shared: Arc<Shared>,
}

impl Drop for DecisionPermit {
    fn drop(&mut self) {
        let mut slots = self.shared.slots.lock();
        if slots.waiting > 0 {
            slots.handoff = true;
            self.shared.wake.notify_one();
        } else {
            slots.active = false;
        }
    }
}

/// A parked caller's claim on a wait slot.
struct WaitTicket<'a> {
    shared: &'a Shared,
    granted: bool,
}

impl WaitTicket<'_> {
    fn try_claim(&mut self) -> bool {
        let mut slots = self.shared.slots.lock();
        if slots.handoff {
            slots.handoff = false;
            slots.waiting -= 1;
            self.granted = true;
        }
        self.granted
    }
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        let mut slots = self.shared.slots.lock();
        slots.waiting -= 1;
        if slots.handoff {
            // The handoff may have been meant for this caller.
            if slots.waiting == 0 {
                slots.handoff = false;
                slots.active = false;
            } else {
                self.shared.wake.notify_one();
            }
        }
    }
}

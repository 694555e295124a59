//! Arrival tracking for viewer welcomes.
//!
//! The tracker deduplicates join observations within a session. A viewer is
//! in exactly one of three sets at any instant:
//!
//! - **pending** - seen since the last welcome pass, in arrival order
//! - **in flight** - drained by a welcome pass that has not finished yet
//! - **welcomed** - greeted for the rest of the session
//!
//! Viewers in flight or welcomed are never added to pending again, so a
//! join racing with a welcome pass cannot produce a second greeting.

use crate::destination::{normalize_identity, validate_name};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Result of recording an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// Added to the pending batch.
    New,
    /// Already waiting in the pending batch.
    AlreadyPending,
    /// Currently being welcomed.
    InFlight,
    /// Already welcomed this session.
    AlreadyWelcomed,
    /// The bot's own identity.
    SelfIgnored,
    /// Not a valid user name.
    Invalid,
}

impl ArrivalOutcome {
    /// Whether the arrival added a viewer to the pending batch.
    #[must_use]
    pub fn is_new(self) -> bool {
        self == ArrivalOutcome::New
    }
}

/// Viewers drained from the tracker, awaiting [`ArrivalTracker::commit`] or
/// [`ArrivalTracker::restore`].
///
/// Dropping a batch without either leaves its viewers in flight, which means
/// they will never be welcomed.
#[derive(Debug, Default, PartialEq, Eq)]
#[must_use = "a drained batch must be committed or restored"]
pub struct WelcomeBatch {
    viewers: Vec<String>,
}

impl WelcomeBatch {
    /// Viewers in arrival order.
    #[must_use]
    pub fn viewers(&self) -> &[String] {
        &self.viewers
    }

    /// Number of viewers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Split into the first `at` viewers and the rest.
    pub fn split_at(mut self, at: usize) -> (WelcomeBatch, WelcomeBatch) {
        let rest = self.viewers.split_off(at.min(self.viewers.len()));
        (self, WelcomeBatch { viewers: rest })
    }
}

#[derive(Debug, Default)]
struct ArrivalState {
    welcomed: HashSet<String>,
    in_flight: HashSet<String>,
    pending: Vec<String>,
    pending_set: HashSet<String>,
}

/// Tracker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrivalStats {
    /// Viewers welcomed this session.
    pub welcomed: usize,
    /// Viewers being welcomed right now.
    pub in_flight: usize,
    /// Viewers awaiting a welcome pass.
    pub pending: usize,
}

/// Deduplicates viewer arrivals.
#[derive(Debug)]
pub struct ArrivalTracker {
    bot_identity: String,
    state: Mutex<ArrivalState>,
}

impl ArrivalTracker {
    /// Create a tracker that ignores the given bot identity.
    #[must_use]
    pub fn new(bot_identity: &str) -> Self {
        Self {
            bot_identity: normalize_identity(bot_identity),
            state: Mutex::new(ArrivalState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArrivalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Normalized bot identity.
    #[must_use]
    pub fn bot_identity(&self) -> &str {
        &self.bot_identity
    }

    /// Record that a viewer joined.
    pub fn record_arrival(&self, viewer: &str) -> ArrivalOutcome {
        let viewer = normalize_identity(viewer);
        if validate_name(&viewer).is_err() {
            return ArrivalOutcome::Invalid;
        }
        if viewer == self.bot_identity {
            return ArrivalOutcome::SelfIgnored;
        }

        let mut state = self.lock();
        let outcome = if state.welcomed.contains(&viewer) {
            ArrivalOutcome::AlreadyWelcomed
        } else if state.in_flight.contains(&viewer) {
            ArrivalOutcome::InFlight
        } else if state.pending_set.insert(viewer.clone()) {
            state.pending.push(viewer.clone());
            ArrivalOutcome::New
        } else {
            ArrivalOutcome::AlreadyPending
        };
        drop(state);

        trace!(viewer = %viewer, outcome = ?outcome, "Recorded arrival");
        outcome
    }

    /// Take the pending batch, moving its viewers in flight.
    pub fn drain_pending(&self) -> WelcomeBatch {
        let mut state = self.lock();
        let viewers = std::mem::take(&mut state.pending);
        state.pending_set.clear();
        state.in_flight.extend(viewers.iter().cloned());
        drop(state);

        if !viewers.is_empty() {
            debug!(count = viewers.len(), "Drained pending arrivals");
        }
        WelcomeBatch { viewers }
    }

    /// Mark a drained batch as welcomed.
    ///
    /// Returns the number of viewers committed.
    pub fn commit(&self, batch: WelcomeBatch) -> usize {
        let mut state = self.lock();
        for viewer in &batch.viewers {
            state.in_flight.remove(viewer);
            state.welcomed.insert(viewer.clone());
        }
        batch.viewers.len()
    }

    /// Return a drained batch to the front of the pending queue.
    pub fn restore(&self, batch: WelcomeBatch) {
        let mut state = self.lock();
        let mut restored = Vec::with_capacity(batch.viewers.len() + state.pending.len());
        for viewer in batch.viewers {
            state.in_flight.remove(&viewer);
            if !state.welcomed.contains(&viewer) && state.pending_set.insert(viewer.clone()) {
                restored.push(viewer);
            }
        }
        debug!(count = restored.len(), "Restored arrivals to pending");
        restored.append(&mut state.pending);
        state.pending = restored;
    }

    /// Mark viewers as already welcomed, e.g. from a persisted list.
    ///
    /// Returns the number of viewers newly added.
    pub fn seed<I, S>(&self, viewers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.lock();
        let mut added = 0;
        for viewer in viewers {
            let viewer = normalize_identity(viewer.as_ref());
            if validate_name(&viewer).is_err() || viewer == self.bot_identity {
                continue;
            }
            if state.pending_set.remove(&viewer) {
                state.pending.retain(|v| v != &viewer);
            }
            if state.welcomed.insert(viewer) {
                added += 1;
            }
        }
        added
    }

    /// Whether a viewer has been welcomed.
    #[must_use]
    pub fn is_welcomed(&self, viewer: &str) -> bool {
        self.lock().welcomed.contains(&normalize_identity(viewer))
    }

    /// Snapshot of pending viewers in arrival order.
    #[must_use]
    pub fn pending_viewers(&self) -> Vec<String> {
        self.lock().pending.clone()
    }

    /// Snapshot of welcomed viewers, sorted.
    #[must_use]
    pub fn welcomed_viewers(&self) -> Vec<String> {
        let mut viewers: Vec<_> = self.lock().welcomed.iter().cloned().collect();
        viewers.sort();
        viewers
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> ArrivalStats {
        let state = self.lock();
        ArrivalStats {
            welcomed: state.welcomed.len(),
            in_flight: state.in_flight.len(),
            pending: state.pending.len(),
        }
    }
}

//! Ownership token for an in-flight fetch.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::{CoalesceError, FetchOutcome, InFlightMap, OutcomeReceiver};
use crate::coord::TileKey;

/// Held by the single owner of an in-flight fetch.
///
/// Completing the guard removes the in-flight entry and publishes the outcome
/// to every follower under the same lock, so no request can observe the entry
/// after its outcome is known and still subscribe to it. Dropping an
/// uncompleted guard publishes [`CoalesceError::Abandoned`].
pub struct FetchGuard {
    key: TileKey,
    sender: watch::Sender<Option<FetchOutcome>>,
    in_flight: InFlightMap,
    completed: bool,
}

impl FetchGuard {
    pub(super) fn new(
        key: TileKey,
        sender: watch::Sender<Option<FetchOutcome>>,
        in_flight: InFlightMap,
    ) -> Self {
        Self {
            key,
            sender,
            in_flight,
            completed: false,
        }
    }

    /// The tile this guard owns.
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// A receiver for this fetch's outcome.
    pub fn subscribe(&self) -> OutcomeReceiver {
        self.sender.subscribe()
    }

    /// Publish the outcome and release the key.
    pub fn complete(mut self, outcome: FetchOutcome) {
        self.publish(outcome);
        self.completed = true;
    }

    fn publish(&self, outcome: FetchOutcome) {
        let mut in_flight = self.in_flight.lock();
        in_flight.remove(&self.key);
        self.sender.send_replace(Some(outcome));
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.completed {
            debug!(tile = %self.key, "Fetch guard dropped without an outcome");
            self.publish(Err(CoalesceError::Abandoned));
        }
    }
}

//! # Pending Request Table
//!
//! Maps correlation ids to the tasks waiting on them.
//!
//! The sending side inserts entries, the receive loop looks them up and
//! resolves them, and timeouts remove them. All three run concurrently, so
//! every decision that both reads and mutates an entry happens under the
//! entry's shard lock.
//!
//! ## Entry kinds
//!
//! - **One-shot**: removed from the table by the first matching frame.
//! - **Subscription**: the first frame without a body is the acknowledgment.
//!   The entry then stays and every frame with a body is pushed onto its queue.
//!
//! ## Closing
//!
//! [`PendingTable::fail_all`] closes the table for good. Registration and
//! closing are serialized by a lock, so an entry is either failed by
//! `fail_all` or refused with [`PendingError::Closed`]. Nothing can slip in
//! behind the drain.

use std::sync::PoisonError;
use std::sync::RwLock;

use chainwire::ParsedResponse;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;

/// Resolves a waiting request exactly once.
type Slot = oneshot::Sender<Result<ParsedResponse>>;

/// The receiving half of a request's completion slot.
pub type Waiter = oneshot::Receiver<Result<ParsedResponse>>;

/// The receiving half of a subscription's push queue.
pub type PushQueue = mpsc::UnboundedReceiver<Vec<u8>>;

#[derive(Debug, Clone, Error)]
pub enum PendingError {
    #[error("request id {0} is already pending")]
    DuplicateId(u32),
    /// The table was failed; carries the error its entries were failed with.
    #[error("pending table closed: {0}")]
    Closed(Error),
}

/// What the table did with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A one-shot request was resolved and removed.
    Delivered,
    /// A subscription received its acknowledgment.
    Acknowledged,
    /// A push notification was queued.
    Pushed,
    /// A subscription ended and was removed.
    Closed,
    /// No entry for the frame's id.
    Unroutable,
    /// The entry exists but the frame had nowhere to go.
    Dropped,
}

enum PendingEntry {
    OneShot {
        command: Vec<u8>,
        slot: Slot,
    },
    Subscription {
        command: Vec<u8>,
        /// Taken by the acknowledgment.
        ack: Option<Slot>,
        queue: mpsc::UnboundedSender<Vec<u8>>,
    },
}

impl PendingEntry {
    fn command(&self) -> &[u8] {
        match self {
            Self::OneShot { command, .. } | Self::Subscription { command, .. } => command,
        }
    }

    /// Still waiting for its first frame.
    fn is_awaiting(&self) -> bool {
        match self {
            Self::OneShot { .. } => true,
            Self::Subscription { ack, .. } => ack.is_some(),
        }
    }

    /// Resolves whatever is still waiting with `error`, closing any queue.
    fn fail(self, error: Error) {
        let slot = match self {
            Self::OneShot { slot, .. } => Some(slot),
            Self::Subscription { ack, .. } => ack,
        };
        if let Some(slot) = slot {
            let _ = slot.send(Err(error));
        }
    }
}

/// Shared table of in-flight requests, keyed by correlation id.
#[derive(Default)]
pub struct PendingTable {
    entries: DashMap<u32, PendingEntry>,
    /// Set by the first `fail_all`.
    closed: RwLock<Option<Error>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a one-shot request under `id`.
    pub fn register(&self, id: u32, command: &[u8]) -> std::result::Result<Waiter, PendingError> {
        let (slot, waiter) = oneshot::channel();
        self.insert(id, PendingEntry::OneShot {
            command: command.to_vec(),
            slot,
        })?;
        Ok(waiter)
    }

    /// Registers a subscription under `id` together with its push queue.
    pub fn register_subscription(
        &self,
        id: u32,
        command: &[u8],
    ) -> std::result::Result<(Waiter, PushQueue), PendingError> {
        let (slot, waiter) = oneshot::channel();
        let (queue, pushes) = mpsc::unbounded_channel();
        self.insert(id, PendingEntry::Subscription {
            command: command.to_vec(),
            ack: Some(slot),
            queue,
        })?;
        Ok((waiter, pushes))
    }

    fn insert(&self, id: u32, entry: PendingEntry) -> std::result::Result<(), PendingError> {
        // held across the insert so `fail_all` cannot drain in between
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(reason) = closed.as_ref() {
            return Err(PendingError::Closed(reason.clone()));
        }
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(PendingError::DuplicateId(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Routes a decoded frame to the entry registered under its id.
    pub fn dispatch(&self, response: ParsedResponse) -> Dispatch {
        let id = response.id;
        let mut occupied = match self.entries.entry(id) {
            Entry::Occupied(occupied) => occupied,
            Entry::Vacant(_) => {
                warn!(
                    id,
                    command = %response.command_lossy(),
                    "dropping response for unknown request id"
                );
                return Dispatch::Unroutable;
            }
        };

        if let PendingEntry::OneShot { .. } = occupied.get() {
            let PendingEntry::OneShot { slot, .. } = occupied.remove() else {
                return Dispatch::Dropped;
            };
            return match slot.send(Ok(response)) {
                Ok(()) => Dispatch::Delivered,
                Err(_) => {
                    debug!(id, "one-shot waiter went away before its response");
                    Dispatch::Dropped
                }
            };
        }

        let verdict = match occupied.get_mut() {
            PendingEntry::Subscription { ack, queue, .. } => {
                Self::route_to_subscription(ack, queue, response)
            }
            PendingEntry::OneShot { .. } => Dispatch::Dropped,
        };

        if verdict == Dispatch::Closed {
            occupied.remove();
            debug!(id, "subscription closed");
        }
        verdict
    }

    fn route_to_subscription(
        ack: &mut Option<Slot>,
        queue: &mpsc::UnboundedSender<Vec<u8>>,
        response: ParsedResponse,
    ) -> Dispatch {
        let id = response.id;
        if response.is_push_payload() {
            if queue.send(response.data).is_err() {
                debug!(id, "subscription queue dropped by its reader");
                return Dispatch::Closed;
            }
            return Dispatch::Pushed;
        }

        if let Some(slot) = ack.take() {
            // A dropped waiter means the subscribe call gave up; its timeout removes the entry.
            let _ = slot.send(Ok(response));
            return Dispatch::Acknowledged;
        }

        // After the acknowledgment, a bodiless frame carrying an error code is
        // the service ending the subscription (e.g. `service_stopped` after an
        // unsubscribe).
        if let Some(code) = response.error {
            debug!(id, %code, "subscription terminated by service");
            return Dispatch::Closed;
        }

        debug!(id, "ignoring repeated subscription acknowledgment");
        Dispatch::Dropped
    }

    /// Removes the entry for `id` if it is still waiting for its first frame.
    ///
    /// Used when a request times out. Returns `false` when the receive loop got
    /// there first, in which case the waiter has its answer.
    pub fn cancel(&self, id: u32) -> bool {
        self.entries
            .remove_if(&id, |_, entry| entry.is_awaiting())
            .is_some()
    }

    /// Removes a subscription regardless of its state, closing its queue.
    pub fn close_subscription(&self, id: u32) -> bool {
        self.entries
            .remove_if(&id, |_, entry| matches!(entry, PendingEntry::Subscription { .. }))
            .is_some()
    }

    /// Removes the entry for `id` whatever its kind.
    pub(crate) fn remove(&self, id: u32) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Number of entries still in the table.
    pub fn drain_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// The command an id was registered under.
    pub fn command_of(&self, id: u32) -> Option<Vec<u8>> {
        self.entries.get(&id).map(|entry| entry.command().to_vec())
    }

    /// The error the table was closed with, if it was.
    pub fn closed_reason(&self) -> Option<Error> {
        self.closed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Empties and closes the table, failing every waiter with `error`.
    ///
    /// Later registrations are refused with the error of the first call.
    /// Returns the number of entries that were still pending.
    pub fn fail_all(&self, error: &Error) -> usize {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        closed.get_or_insert_with(|| error.clone());

        let ids: Vec<u32> = self.entries.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                entry.fail(error.clone());
                failed += 1;
            }
        }
        failed
    }
}

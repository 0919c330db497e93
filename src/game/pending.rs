//! Parked long-poll update requests

use tokio::sync::oneshot;

use crate::http::protocol::Snapshot;

use super::error::GameError;
use super::world::ObjectId;

/// Reply channel of a waiting update request
pub type UpdateReply = oneshot::Sender<Result<Snapshot, GameError>>;

/// A player waiting for the next tick
#[derive(Debug)]
pub struct PendingUpdate {
    pub user: ObjectId,
    pub player: String,
    pub reply: UpdateReply,
}

/// Requests held until their game completes its next tick.
///
/// Entries are not deduplicated per player: a client that parks twice is
/// answered twice.
#[derive(Debug, Default)]
pub struct PendingQueue {
    queue: Vec<PendingUpdate>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a request until the next flush
    pub fn park(&mut self, update: PendingUpdate) {
        self.queue.push(update);
    }

    /// Take every parked request, leaving the queue empty
    pub fn drain(&mut self) -> Vec<PendingUpdate> {
        std::mem::take(&mut self.queue)
    }

    /// Remove the requests parked for one player
    pub fn remove_for(&mut self, user: ObjectId) -> Vec<PendingUpdate> {
        let (removed, kept) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|update| update.user == user);
        self.queue = kept;
        removed
    }

    /// Forget requests whose client has already gone away
    pub fn prune_closed(&mut self) -> usize {
        let before = self.queue.len();
        self.queue.retain(|update| !update.reply.is_closed());
        before - self.queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

//! Single-slot outbound queue: only the newest unsent document is kept.

use std::sync::Mutex;

use crate::{client::lock, dto::game::GameState};

/// A document waiting to be delivered, tagged with its enqueue sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub seq: u64,
    pub state: GameState,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<PendingUpdate>,
    next_seq: u64,
    in_flight: bool,
}

/// Coalescing slot shared by the UI thread and the drain task.
///
/// Enqueueing overwrites whatever is pending. At most one send is in flight; the
/// slot is only cleared when that send succeeds and nothing newer replaced it.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    slot: Mutex<Slot>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending document and return its sequence number.
    pub fn enqueue(&self, state: GameState) -> u64 {
        let mut slot = lock(&self.slot);
        slot.next_seq += 1;
        let seq = slot.next_seq;
        slot.pending = Some(PendingUpdate { seq, state });
        seq
    }

    /// Claim the pending document for sending. `None` if nothing is pending or a
    /// send is already in flight.
    pub fn begin_send(&self) -> Option<SendTicket<'_>> {
        let mut slot = lock(&self.slot);
        if slot.in_flight {
            return None;
        }
        let pending = slot.pending.clone()?;
        slot.in_flight = true;
        Some(SendTicket {
            queue: self,
            pending,
            finished: false,
        })
    }

    fn complete(&self, seq: u64, delivered: bool) -> bool {
        let mut slot = lock(&self.slot);
        slot.in_flight = false;
        let unchanged = slot.pending.as_ref().is_some_and(|p| p.seq == seq);
        if delivered && unchanged {
            slot.pending = None;
            true
        } else {
            false
        }
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.slot).pending.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.slot).in_flight
    }

    /// Drop the pending document, if any.
    pub fn clear(&self) {
        lock(&self.slot).pending = None;
    }
}

/// Claim on the pending document while it is being sent.
///
/// Dropping the ticket without [`SendTicket::finish`] releases the slot and keeps
/// the document for a later attempt.
pub struct SendTicket<'a> {
    queue: &'a UpdateQueue,
    pending: PendingUpdate,
    finished: bool,
}

impl SendTicket<'_> {
    pub fn seq(&self) -> u64 {
        self.pending.seq
    }

    /// Document to deliver.
    pub fn state(&self) -> &GameState {
        &self.pending.state
    }

    /// Record the outcome. Returns `true` when the slot was cleared, which only
    /// happens if the send was delivered and nothing newer was enqueued meanwhile.
    pub fn finish(mut self, delivered: bool) -> bool {
        self.finished = true;
        self.queue.complete(self.pending.seq, delivered)
    }
}

impl Drop for SendTicket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.queue.complete(self.pending.seq, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::game::Team;

    fn scored(points: i64) -> GameState {
        GameState::default().update_score(Team::TeamA, points)
    }

    #[test]
    fn enqueue_overwrites_pending_value() {
        let queue = UpdateQueue::new();
        for points in 1..=5 {
            queue.enqueue(scored(points));
        }

        let ticket = queue.begin_send().unwrap();
        assert_eq!(ticket.state(), &scored(5));
        assert!(ticket.finish(true));
        assert!(!queue.has_pending());
    }

    #[test]
    fn only_one_send_in_flight() {
        let queue = UpdateQueue::new();
        queue.enqueue(scored(1));

        let first = queue.begin_send().unwrap();
        assert!(queue.is_in_flight());
        queue.enqueue(scored(2));
        assert!(queue.begin_send().is_none());

        first.finish(true);
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn newer_value_survives_completed_send() {
        let queue = UpdateQueue::new();
        queue.enqueue(scored(1));
        let first = queue.begin_send().unwrap();

        queue.enqueue(scored(2));
        assert!(!first.finish(true));

        let second = queue.begin_send().unwrap();
        assert_eq!(second.state(), &scored(2));
    }

    #[test]
    fn failed_send_keeps_value_for_retry() {
        let queue = UpdateQueue::new();
        queue.enqueue(scored(3));
        let attempt = queue.begin_send().unwrap();

        assert!(!attempt.finish(false));
        assert_eq!(queue.begin_send().unwrap().state(), &scored(3));
    }

    #[test]
    fn dropped_ticket_releases_slot() {
        let queue = UpdateQueue::new();
        let seq = queue.enqueue(scored(4));
        let ticket = queue.begin_send().unwrap();
        assert_eq!(ticket.seq(), seq);
        drop(ticket);

        assert!(!queue.is_in_flight());
        assert!(queue.has_pending());
    }

    #[test]
    fn empty_queue_has_nothing_to_send() {
        let queue = UpdateQueue::new();
        assert!(queue.begin_send().is_none());
        queue.enqueue(scored(1));
        queue.clear();
        assert!(queue.begin_send().is_none());
    }
}

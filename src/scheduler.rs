//! Deterministic event scheduler.
//!
//! Uses a `BinaryHeap` with reversed `Ord` on `Event` to act as a
//! min-heap keyed by `(scheduled_at, event_id)`. Because event IDs are
//! strictly increasing and the heap is deterministic, two runs with the
//! same seed will always produce the same dispatch order.
//!
//! Events can be cancelled after scheduling: a cancelled event still
//! pops in order (the clock still advances to its timestamp) but its
//! dispatch is a no-op.

use std::collections::BinaryHeap;
use std::collections::BTreeSet;

use crate::event::{Event, EventId, EventIdGen, EventKind};
use crate::time::SimTime;

/// The core deterministic scheduler.
///
/// Owns the event queue and the ID generator. All scheduling goes
/// through this struct to ensure monotonic IDs and deterministic
/// ordering.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Min-heap (via reversed Ord on Event).
    queue: BinaryHeap<Event>,

    /// Monotonic event-ID generator.
    id_gen: EventIdGen,

    /// IDs of events that were cancelled before firing.
    cancelled: BTreeSet<EventId>,

    /// IDs still in the queue, so cancelling an already-fired event
    /// retains nothing.
    live: BTreeSet<EventId>,
}

impl Scheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
            cancelled: BTreeSet::new(),
            live: BTreeSet::new(),
        }
    }

    /// Schedule a new event at the given virtual time.
    ///
    /// Returns the `EventId` assigned to this event.
    pub fn schedule(&mut self, at: SimTime, kind: EventKind) -> EventId {
        let id = self.id_gen.next_id();
        self.live.insert(id);
        self.queue.push(Event::new(id, at, kind));
        id
    }

    /// Invalidate a previously scheduled event.
    ///
    /// When the event's timestamp is reached it is skipped instead of
    /// dispatched. Cancelling an event that already fired is harmless
    /// and retains no state.
    pub fn cancel(&mut self, id: EventId) {
        if self.live.contains(&id) {
            self.cancelled.insert(id);
        }
    }

    /// Check-and-clear the cancelled mark for an event being popped.
    pub(crate) fn take_cancelled(&mut self, id: EventId) -> bool {
        self.cancelled.remove(&id)
    }

    /// Pop the next event (earliest time, lowest ID).
    ///
    /// Returns `None` when the queue is empty. Callers must consult
    /// [`take_cancelled`](Self::take_cancelled) before dispatching.
    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        self.live.remove(&event.id);
        Some(event)
    }

    /// Peek at the next event without removing it.
    pub fn peek_next(&self) -> Option<&Event> {
        self.queue.peek()
    }

    /// Returns `true` if the event queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of pending events (cancelled ones included).
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns the next event ID that will be assigned.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Drain all events in deterministic order into a `Vec`, skipping
    /// cancelled ones. Useful for testing.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            self.live.remove(&e.id);
            if !self.cancelled.remove(&e.id) {
                events.push(e);
            }
        }
        events
    }
}

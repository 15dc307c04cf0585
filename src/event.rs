//! Event system for the deterministic simulation kernel.
//!
//! Every effect in the simulator is modeled as an `Event`. Events are
//! immutable records placed on the scheduler's priority queue and
//! dispatched in deterministic order.

use std::cmp::Ordering;

use crate::node::NodeId;
use crate::packet::Packet;
use crate::time::SimTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A globally unique, strictly-increasing event identifier.
///
/// The monotonic nature of `EventId` breaks ties in the scheduler:
/// two events scheduled at the same `SimTime` are ordered by their
/// `EventId`, which corresponds to creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw u64 into an `EventId`.
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    /// Return the raw value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly-increasing event-ID generator.
///
/// Each `Simulation` owns exactly one of these. Because the simulation
/// is single-threaded and there is no shared mutable state, the counter
/// is trivially deterministic.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    /// Create a generator starting at 0.
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Timer targets ─────────────────────────────────────────────────────

/// The component on a node that owns a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TimerTarget {
    /// The node's routing protocol.
    Routing,
    /// The application at the given index on the node.
    App(usize),
}

// ── Event Kind ────────────────────────────────────────────────────────

/// The payload of an event.
///
/// `Transmit` puts a frame on the shared medium; the runtime consults
/// the channel model and schedules a `Receive` per node that hears it.
/// `Timer` events drive routing protocols and applications; start/stop
/// events bound application lifetimes.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A no-op event, used in tests and as a time marker.
    Noop,

    /// Start every node's routing protocol. Scheduled once at setup.
    Boot,

    /// A frame enters the shared medium at the sender's position.
    /// `link_dst` restricts delivery to one node; `None` broadcasts.
    Transmit {
        from: NodeId,
        link_dst: Option<NodeId>,
        packet: Packet,
    },

    /// A frame arrives at a receiver after channel evaluation.
    Receive {
        from: NodeId,
        to: NodeId,
        packet: Packet,
    },

    /// A previously scheduled per-node timer has fired.
    Timer {
        node: NodeId,
        target: TimerTarget,
        token: u64,
    },

    /// Start the application at `app` on `node`.
    AppStart { node: NodeId, app: usize },

    /// Stop the application at `app` on `node`.
    AppStop { node: NodeId, app: usize },
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Noop => write!(f, "Noop"),
            EventKind::Boot => write!(f, "Boot"),
            EventKind::Transmit { from, link_dst, packet } => match link_dst {
                Some(to) => write!(f, "Transmit({} → {}, {})", from, to, packet),
                None => write!(f, "Transmit({} → *, {})", from, packet),
            },
            EventKind::Receive { from, to, packet } => {
                write!(f, "Receive({} → {}, {})", from, to, packet)
            }
            EventKind::Timer { node, target, token } => match target {
                TimerTarget::Routing => write!(f, "Timer({}, routing, #{})", node, token),
                TimerTarget::App(i) => write!(f, "Timer({}, app{}, #{})", node, i, token),
            },
            EventKind::AppStart { node, app } => write!(f, "AppStart({}, app{})", node, app),
            EventKind::AppStop { node, app } => write!(f, "AppStop({}, app{})", node, app),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single simulation event.
///
/// Events are the atomic unit of execution. The scheduler orders them
/// by `(scheduled_at, id)` to guarantee deterministic processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique identifier (monotonically increasing).
    pub id: EventId,

    /// The virtual time at which this event should be dispatched.
    pub scheduled_at: SimTime,

    /// The event payload.
    pub kind: EventKind,
}

impl Event {
    /// Convenience constructor.
    pub fn new(id: EventId, scheduled_at: SimTime, kind: EventKind) -> Self {
        Event {
            id,
            scheduled_at,
            kind,
        }
    }
}

impl Eq for Event {}

/// Ordering: smallest `(scheduled_at, id)` first.
///
/// Rust's `BinaryHeap` is a *max*-heap, so we **reverse** the natural
/// ordering here to turn it into a min-heap.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_monotonic() {
        let mut gen = EventIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        let c = gen.next_id();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(c.raw(), 2);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_event_ordering_by_time() {
        let e1 = Event::new(EventId::new(0), SimTime::from_millis(10), EventKind::Noop);
        let e2 = Event::new(EventId::new(1), SimTime::from_millis(20), EventKind::Noop);
        // e1 should come first (smaller time) → in reversed ordering e1 > e2.
        assert!(e1 > e2);
    }

    #[test]
    fn test_event_ordering_tiebreak_by_id() {
        let e1 = Event::new(EventId::new(0), SimTime::from_millis(10), EventKind::Noop);
        let e2 = Event::new(EventId::new(1), SimTime::from_millis(10), EventKind::Boot);
        // Same time → smaller ID wins → e1 > e2 in reversed ordering.
        assert!(e1 > e2);
    }

    #[test]
    fn test_event_display() {
        let e = Event::new(
            EventId::new(42),
            SimTime::from_secs(1),
            EventKind::Timer {
                node: NodeId::new(3),
                target: TimerTarget::Routing,
                token: 7,
            },
        );
        assert_eq!(format!("{}", e.id), "E#42");
        assert_eq!(format!("{}", e.kind), "Timer(N3, routing, #7)");
    }
}

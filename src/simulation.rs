//! Simulation execution loop.
//!
//! Drives the scheduler: pops events, advances virtual time, dispatches
//! to a user-supplied handler. The loop is purely synchronous and
//! single-threaded — exactly one event runs at a time, so components
//! mutate shared state without any locking discipline.
//!
//! A stop time bounds execution: events scheduled at or after it are
//! never dispatched and the clock is clamped to the stop time.

use crate::event::{Event, EventId, EventKind};
use crate::scheduler::Scheduler;
use crate::time::SimTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// User-defined event handler.
///
/// Implement this trait to react to dispatched events. The handler
/// receives a mutable reference to `SimulationContext` so it can
/// schedule follow-up events.
pub trait EventHandler {
    /// Called for every dispatched (non-cancelled) event.
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event);
}

/// A handler backed by a closure — useful for tests and one-off scripts.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event),
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        (self)(ctx, event);
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable context passed to the handler on every event dispatch.
///
/// Provides the handler with the current virtual time and the ability
/// to schedule or cancel follow-up events. The context borrows the
/// scheduler mutably, so a handler cannot interfere with dispatch
/// ordering outside of the schedule API. There is no ambient global
/// clock anywhere in the crate — all time flows through this context.
pub struct SimulationContext<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) now: SimTime,
}

impl SimulationContext<'_> {
    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule an event at an absolute virtual time.
    ///
    /// # Panics
    /// Panics if `at` is before the current time (non-causal scheduling).
    pub fn schedule_at(&mut self, at: SimTime, kind: EventKind) -> EventId {
        assert!(
            at >= self.now,
            "Cannot schedule event in the past: now={}, at={}",
            self.now,
            at
        );
        self.scheduler.schedule(at, kind)
    }

    /// Schedule an event `delay` into the future relative to now.
    pub fn schedule_after(&mut self, delay: SimTime, kind: EventKind) -> EventId {
        let at = self
            .now
            .advance(delay)
            .expect("SimTime overflow when scheduling");
        self.scheduler.schedule(at, kind)
    }

    /// Invalidate a previously scheduled event. Firing it becomes a
    /// no-op.
    pub fn cancel(&mut self, id: EventId) {
        self.scheduler.cancel(id);
    }

    /// Number of pending events in the scheduler.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the scheduler and tracks the current virtual time. Call `run`
/// to execute until the queue drains or the stop time is reached, or
/// `step` to advance by exactly one event.
#[derive(Debug, Default)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: SimTime,
    stop_time: Option<SimTime>,
    events_processed: u64,
}

impl Simulation {
    /// Create a new simulation starting at time zero, unbounded.
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: SimTime::ZERO,
            stop_time: None,
            events_processed: 0,
        }
    }

    /// Bound execution: events at or after `at` are never dispatched.
    pub fn stop_at(&mut self, at: SimTime) {
        self.stop_time = Some(at);
    }

    /// Access the scheduler directly (e.g., for initial event seeding).
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Current virtual time.
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Total events processed so far (cancelled pops included).
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Schedule an event before the simulation starts running.
    pub fn schedule(&mut self, at: SimTime, kind: EventKind) -> EventId {
        self.scheduler.schedule(at, kind)
    }

    /// Invalidate a previously scheduled event.
    pub fn cancel(&mut self, id: EventId) {
        self.scheduler.cancel(id);
    }

    /// Execute a single step: pop one event, advance time, dispatch.
    ///
    /// Returns `Some(event)` if an event was popped (even a cancelled
    /// one — its dispatch is skipped), `None` if the queue is empty or
    /// the stop time has been reached.
    pub fn step(&mut self, handler: &mut dyn EventHandler) -> Option<Event> {
        if let (Some(stop), Some(next)) = (self.stop_time, self.scheduler.peek_next()) {
            if next.scheduled_at >= stop {
                self.current_time = stop;
                return None;
            }
        }

        let event = self.scheduler.pop_next()?;

        // Virtual time must never go backward.
        assert!(
            event.scheduled_at >= self.current_time,
            "Time went backward! current={}, event={}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = event.scheduled_at;
        self.events_processed += 1;

        // A cancelled event expires silently; the clock still advanced.
        if self.scheduler.take_cancelled(event.id) {
            return Some(event);
        }

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event);

        Some(event)
    }

    /// Run until the event queue is empty or the stop time is reached.
    ///
    /// Returns the total number of events processed during this run.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> u64 {
        let start = self.events_processed;
        while self.step(handler).is_some() {}
        self.events_processed - start
    }

    /// Returns `true` if there are no more events to process.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_execution_loop() {
        let mut sim = Simulation::new();

        sim.schedule(SimTime::from_millis(10), EventKind::Noop);
        sim.schedule(SimTime::from_millis(20), EventKind::Noop);
        sim.schedule(SimTime::from_millis(30), EventKind::Noop);

        let mut times: Vec<SimTime> = Vec::new();

        let processed = sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            times.push(ctx.now());
        });

        assert_eq!(processed, 3);
        assert_eq!(
            times,
            vec![
                SimTime::from_millis(10),
                SimTime::from_millis(20),
                SimTime::from_millis(30)
            ]
        );
        assert_eq!(sim.current_time(), SimTime::from_millis(30));
    }

    #[test]
    fn test_handler_schedules_followup() {
        let mut sim = Simulation::new();
        sim.schedule(SimTime::ZERO, EventKind::Noop);

        let mut fired: Vec<u64> = Vec::new();

        sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            fired.push(ctx.now().nanos());
            // Schedule a follow-up 10ms later, up to 30ms.
            if ctx.now() < SimTime::from_millis(30) {
                ctx.schedule_after(SimTime::from_millis(10), EventKind::Noop);
            }
        });

        assert_eq!(fired, vec![0, 10_000_000, 20_000_000, 30_000_000]);
    }

    #[test]
    fn test_stop_time_bounds_execution() {
        let mut sim = Simulation::new();
        for ms in [5, 10, 15, 20, 25] {
            sim.schedule(SimTime::from_millis(ms), EventKind::Noop);
        }
        sim.stop_at(SimTime::from_millis(15));

        let mut count = 0u64;
        sim.run(&mut |_ctx: &mut SimulationContext, _event: &Event| {
            count += 1;
        });

        // Events at 5 and 10 run; 15 is at the stop bound and must not.
        assert_eq!(count, 2);
        assert_eq!(sim.current_time(), SimTime::from_millis(15));
        assert!(!sim.is_finished());
    }

    #[test]
    fn test_cancelled_event_is_noop() {
        let mut sim = Simulation::new();
        sim.schedule(SimTime::from_millis(1), EventKind::Noop);
        let victim = sim.schedule(SimTime::from_millis(2), EventKind::Noop);
        sim.schedule(SimTime::from_millis(3), EventKind::Noop);
        sim.cancel(victim);

        let mut dispatched = 0u64;
        let processed = sim.run(&mut |_ctx: &mut SimulationContext, _event: &Event| {
            dispatched += 1;
        });

        // All three pop (the clock reaches T=3ms) but only two dispatch.
        assert_eq!(processed, 3);
        assert_eq!(dispatched, 2);
        assert_eq!(sim.current_time(), SimTime::from_millis(3));
    }

    #[test]
    fn test_time_monotonicity() {
        let mut sim = Simulation::new();

        // Schedule events in reverse order — scheduler must still
        // dispatch in time-ascending order.
        for ms in [100, 50, 75, 10] {
            sim.schedule(SimTime::from_millis(ms), EventKind::Noop);
        }

        let mut times: Vec<SimTime> = Vec::new();
        sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            times.push(ctx.now());
        });

        for window in times.windows(2) {
            assert!(window[0] <= window[1], "Time went backward: {:?}", times);
        }
    }

    #[test]
    #[should_panic(expected = "in the past")]
    fn test_non_causal_scheduling_panics() {
        let mut sim = Simulation::new();
        sim.schedule(SimTime::from_millis(10), EventKind::Noop);
        sim.run(&mut |ctx: &mut SimulationContext, _event: &Event| {
            ctx.schedule_at(SimTime::from_millis(5), EventKind::Noop);
        });
    }

    #[test]
    fn test_empty_simulation() {
        let mut sim = Simulation::new();
        let mut noop = |_ctx: &mut SimulationContext, _event: &Event| {};
        assert_eq!(sim.run(&mut noop), 0);
        assert!(sim.is_finished());
    }

    #[test]
    fn test_deterministic_replay() {
        fn run_trace() -> Vec<(u64, u64)> {
            let mut sim = Simulation::new();
            for ms in [5, 5, 3, 10] {
                sim.schedule(SimTime::from_millis(ms), EventKind::Noop);
            }
            let mut trace = Vec::new();
            sim.run(&mut |ctx: &mut SimulationContext, event: &Event| {
                trace.push((event.id.raw(), ctx.now().nanos()));
            });
            trace
        }

        assert_eq!(run_trace(), run_trace(), "Simulation is not deterministic!");
    }
}

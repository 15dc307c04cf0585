//! Proactive routing: periodic destination-sequenced distance vectors.
//!
//! Every node broadcasts its full routing table on a fixed interval,
//! stamping its own entry with an even sequence number it increments
//! by two per dump. Receivers add one hop to each advertised metric
//! and install the entry if the sequence number is newer, or equal
//! with a shorter path. Entries not refreshed within the hold time are
//! aged out. Payloads with no table entry are dropped; the protocol
//! never buffers.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::trace;

use crate::node::NodeId;
use crate::packet::{FiveTuple, Packet, PacketBody};
use crate::time::SimTime;

use super::{DsdvEntry, NetIo, RoutingProtocol, DSDV_PORT};

/// Per-entry wire size plus IP/UDP headers for a table dump.
const ENTRY_BYTES: u32 = 12;
const HEADER_BYTES: u32 = 28;

/// The single periodic-update timer token.
const TOKEN_UPDATE: u64 = 0;

// ── Config ────────────────────────────────────────────────────────────

/// Tunables for the distance-vector protocol.
#[derive(Debug, Clone, Copy)]
pub struct DsdvConfig {
    /// Interval between full table broadcasts.
    pub update_interval: SimTime,
    /// Entries not refreshed within this window are discarded.
    pub hold_time: SimTime,
}

impl Default for DsdvConfig {
    fn default() -> Self {
        let update_interval = SimTime::from_secs(2);
        DsdvConfig {
            update_interval,
            // Three missed dumps before a neighbor is written off.
            hold_time: update_interval * 3,
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct TableEntry {
    next_hop: NodeId,
    metric: u32,
    seq: u32,
    /// Last time this entry was installed or refreshed.
    updated: SimTime,
}

/// Per-node distance-vector routing state machine.
#[derive(Debug)]
pub struct Dsdv {
    config: DsdvConfig,
    /// Own sequence number; always even.
    seq: u32,
    table: BTreeMap<Ipv4Addr, TableEntry>,
}

impl Dsdv {
    pub fn new(config: DsdvConfig) -> Self {
        Dsdv {
            config,
            seq: 0,
            table: BTreeMap::new(),
        }
    }

    /// Next hop for `dst`, if the table has an entry.
    pub fn route_to(&self, dst: Ipv4Addr) -> Option<NodeId> {
        self.table.get(&dst).map(|e| e.next_hop)
    }

    /// Number of known destinations (self excluded).
    pub fn route_count(&self) -> usize {
        self.table.len()
    }

    /// Own sequence number, even by construction.
    pub fn own_seq(&self) -> u32 {
        self.seq
    }

    fn broadcast_dump(&mut self, io: &mut NetIo<'_, '_>) {
        self.seq += 2;
        let mut entries = Vec::with_capacity(self.table.len() + 1);
        entries.push(DsdvEntry {
            dst: io.addr,
            seq: self.seq,
            metric: 0,
        });
        for (dst, entry) in &self.table {
            entries.push(DsdvEntry {
                dst: *dst,
                seq: entry.seq,
                metric: entry.metric,
            });
        }
        let size = HEADER_BYTES + ENTRY_BYTES * entries.len() as u32;
        let tuple = FiveTuple::udp(io.addr, DSDV_PORT, Ipv4Addr::BROADCAST, DSDV_PORT);
        // One hop only: neighbors advertise their own tables onward.
        let packet = Packet::control(tuple, size, io.now(), 1, PacketBody::DsdvUpdate(entries));
        io.broadcast(packet);
    }

    fn age_out(&mut self, now: SimTime) {
        let hold = self.config.hold_time;
        self.table.retain(|_, e| e.updated + hold > now);
    }

    fn consider_entry(&mut self, from: NodeId, advertised: DsdvEntry, now: SimTime) {
        let candidate = TableEntry {
            next_hop: from,
            metric: advertised.metric + 1,
            seq: advertised.seq,
            updated: now,
        };
        match self.table.get_mut(&advertised.dst) {
            None => {
                self.table.insert(advertised.dst, candidate);
            }
            Some(current) if advertised.seq > current.seq => {
                *current = candidate;
            }
            Some(current)
                if advertised.seq == current.seq && candidate.metric < current.metric =>
            {
                *current = candidate;
            }
            Some(current) if advertised.seq == current.seq && current.next_hop == from => {
                // Same route re-advertised: keep it alive.
                current.updated = now;
            }
            Some(_) => {}
        }
    }
}

impl Default for Dsdv {
    fn default() -> Self {
        Dsdv::new(DsdvConfig::default())
    }
}

impl RoutingProtocol for Dsdv {
    fn start(&mut self, io: &mut NetIo<'_, '_>) {
        // First dump goes out at boot so neighbors converge early.
        self.broadcast_dump(io);
        io.timer(self.config.update_interval, TOKEN_UPDATE);
    }

    fn route_output(&mut self, packet: Packet, io: &mut NetIo<'_, '_>) {
        let dst = packet.tuple.dst;
        if dst == Ipv4Addr::BROADCAST {
            io.broadcast(packet);
            return;
        }
        match self.route_to(dst) {
            Some(next_hop) => {
                io.unicast(next_hop, packet);
            }
            None => {
                trace!(dst = %dst, "no table entry, dropping");
            }
        }
    }

    fn on_control(&mut self, from: NodeId, packet: Packet, io: &mut NetIo<'_, '_>) {
        if let PacketBody::DsdvUpdate(entries) = &packet.body {
            let now = io.now();
            for advertised in entries {
                if advertised.dst == io.addr {
                    continue;
                }
                self.consider_entry(from, *advertised, now);
            }
        }
    }

    fn on_timer(&mut self, token: u64, io: &mut NetIo<'_, '_>) {
        if token != TOKEN_UPDATE {
            return;
        }
        self.age_out(io.now());
        self.broadcast_dump(io);
        io.timer(self.config.update_interval, TOKEN_UPDATE);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::scheduler::Scheduler;
    use crate::simulation::SimulationContext;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn io<'a, 'b>(ctx: &'a mut SimulationContext<'b>, node: u64, last: u8) -> NetIo<'a, 'b> {
        NetIo {
            ctx,
            node: NodeId::new(node),
            addr: addr(last),
        }
    }

    fn update(entries: Vec<DsdvEntry>) -> Packet {
        let tuple = FiveTuple::udp(addr(2), DSDV_PORT, Ipv4Addr::BROADCAST, DSDV_PORT);
        let size = HEADER_BYTES + ENTRY_BYTES * entries.len() as u32;
        Packet::control(tuple, size, SimTime::ZERO, 1, PacketBody::DsdvUpdate(entries))
    }

    #[test]
    fn test_start_broadcasts_and_schedules_timer() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        dsdv.start(&mut io(&mut ctx, 1, 1));

        let events = sched.drain_ordered();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::Transmit { link_dst: None, .. }));
        assert!(matches!(events[1].kind, EventKind::Timer { .. }));
        assert_eq!(events[1].scheduled_at, SimTime::from_secs(2));
    }

    #[test]
    fn test_own_sequence_stays_even() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        let mut h = io(&mut ctx, 1, 1);
        dsdv.start(&mut h);
        dsdv.on_timer(TOKEN_UPDATE, &mut h);
        dsdv.on_timer(TOKEN_UPDATE, &mut h);
        assert_eq!(dsdv.own_seq() % 2, 0);
        assert_eq!(dsdv.own_seq(), 6);
    }

    #[test]
    fn test_dump_advertises_self_with_metric_zero() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        dsdv.start(&mut io(&mut ctx, 1, 1));

        let events = sched.drain_ordered();
        let EventKind::Transmit { packet, .. } = &events[0].kind else {
            panic!("expected transmit");
        };
        let PacketBody::DsdvUpdate(entries) = &packet.body else {
            panic!("expected table dump");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dst, addr(1));
        assert_eq!(entries[0].metric, 0);
        assert_eq!(entries[0].seq, 2);
    }

    #[test]
    fn test_installs_new_destination_with_incremented_metric() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();

        let pkt = update(vec![DsdvEntry { dst: addr(2), seq: 2, metric: 0 }]);
        dsdv.on_control(NodeId::new(2), pkt, &mut io(&mut ctx, 1, 1));

        assert_eq!(dsdv.route_to(addr(2)), Some(NodeId::new(2)));
        assert_eq!(dsdv.table[&addr(2)].metric, 1);
    }

    #[test]
    fn test_newer_sequence_wins() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        let mut h = io(&mut ctx, 1, 1);

        dsdv.on_control(NodeId::new(2), update(vec![DsdvEntry { dst: addr(9), seq: 4, metric: 1 }]), &mut h);
        // Stale sequence from a closer neighbor: ignored.
        dsdv.on_control(NodeId::new(3), update(vec![DsdvEntry { dst: addr(9), seq: 2, metric: 0 }]), &mut h);
        assert_eq!(dsdv.route_to(addr(9)), Some(NodeId::new(2)));

        // Newer sequence replaces even with a worse metric.
        dsdv.on_control(NodeId::new(3), update(vec![DsdvEntry { dst: addr(9), seq: 6, metric: 5 }]), &mut h);
        assert_eq!(dsdv.route_to(addr(9)), Some(NodeId::new(3)));
    }

    #[test]
    fn test_equal_sequence_prefers_shorter_path() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        let mut h = io(&mut ctx, 1, 1);

        dsdv.on_control(NodeId::new(2), update(vec![DsdvEntry { dst: addr(9), seq: 4, metric: 3 }]), &mut h);
        dsdv.on_control(NodeId::new(3), update(vec![DsdvEntry { dst: addr(9), seq: 4, metric: 1 }]), &mut h);
        assert_eq!(dsdv.route_to(addr(9)), Some(NodeId::new(3)));
        assert_eq!(dsdv.table[&addr(9)].metric, 2);
    }

    #[test]
    fn test_own_address_never_installed() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();

        let pkt = update(vec![DsdvEntry { dst: addr(1), seq: 8, metric: 2 }]);
        dsdv.on_control(NodeId::new(2), pkt, &mut io(&mut ctx, 1, 1));
        assert_eq!(dsdv.route_count(), 0);
    }

    #[test]
    fn test_stale_entries_age_out() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        dsdv.on_control(
            NodeId::new(2),
            update(vec![DsdvEntry { dst: addr(9), seq: 2, metric: 0 }]),
            &mut io(&mut ctx, 1, 1),
        );
        assert_eq!(dsdv.route_count(), 1);

        // Past the hold time with no refresh.
        let mut ctx = SimulationContext {
            scheduler: &mut sched,
            now: SimTime::from_secs(7),
        };
        dsdv.on_timer(TOKEN_UPDATE, &mut io(&mut ctx, 1, 1));
        assert_eq!(dsdv.route_count(), 0);
    }

    #[test]
    fn test_refresh_keeps_entry_alive() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        let entry = DsdvEntry { dst: addr(9), seq: 2, metric: 0 };
        dsdv.on_control(NodeId::new(2), update(vec![entry]), &mut io(&mut ctx, 1, 1));

        // Re-advertised at 5s, checked at 7s: still within hold time.
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::from_secs(5) };
        dsdv.on_control(NodeId::new(2), update(vec![entry]), &mut io(&mut ctx, 1, 1));
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::from_secs(7) };
        dsdv.on_timer(TOKEN_UPDATE, &mut io(&mut ctx, 1, 1));
        assert_eq!(dsdv.route_count(), 1);
    }

    #[test]
    fn test_route_output_uses_table() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();
        let mut h = io(&mut ctx, 1, 1);
        dsdv.on_control(NodeId::new(2), update(vec![DsdvEntry { dst: addr(9), seq: 2, metric: 0 }]), &mut h);

        let tuple = FiveTuple::udp(addr(1), 49_000, addr(9), 9);
        dsdv.route_output(Packet::payload(tuple, 0, 64, SimTime::ZERO), &mut h);

        let events = sched.drain_ordered();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].kind,
            EventKind::Transmit { link_dst: Some(n), packet, .. }
                if *n == NodeId::new(2) && packet.body.is_payload()
        ));
    }

    #[test]
    fn test_route_output_drops_unknown_destination() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut dsdv = Dsdv::default();

        let tuple = FiveTuple::udp(addr(1), 49_000, addr(9), 9);
        dsdv.route_output(
            Packet::payload(tuple, 0, 64, SimTime::ZERO),
            &mut io(&mut ctx, 1, 1),
        );
        assert!(sched.is_empty());
    }
}

//! Per-flow traffic accounting.
//!
//! Payload packets are classified by five-tuple into flows at two tap
//! points: when a locally originated packet is handed to routing
//! (transmit) and when it reaches its final destination (receive).
//! Packets dropped anywhere in between — no route, out of range, TTL
//! exhausted — simply never hit the receive tap, so losses fall out of
//! the difference. Routing control traffic is not classified.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::packet::FiveTuple;
use crate::time::SimTime;

// ── FlowId ────────────────────────────────────────────────────────────

/// Identifier assigned to a flow in classification order, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowId(u32);

impl FlowId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Flow {}", self.0)
    }
}

// ── FlowStats ─────────────────────────────────────────────────────────

/// Counters accumulated for one flow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// Time the first packet was handed to routing.
    pub first_tx: Option<SimTime>,
    /// Time the last packet was handed to routing.
    pub last_tx: Option<SimTime>,
    /// Time the last packet was delivered.
    pub last_rx: Option<SimTime>,
    /// Sum of end-to-end delays over delivered packets.
    pub delay_sum: SimTime,
}

impl FlowStats {
    /// Transmitted minus delivered.
    pub fn lost_packets(&self) -> u64 {
        self.tx_packets.saturating_sub(self.rx_packets)
    }

    /// Fraction of transmitted packets never delivered.
    ///
    /// `None` before anything was transmitted.
    pub fn loss_ratio(&self) -> Option<f64> {
        if self.tx_packets == 0 {
            return None;
        }
        Some(self.lost_packets() as f64 / self.tx_packets as f64)
    }

    /// Average end-to-end delay over delivered packets.
    pub fn mean_delay(&self) -> Option<SimTime> {
        if self.rx_packets == 0 {
            return None;
        }
        Some(SimTime::from_nanos(self.delay_sum.nanos() / self.rx_packets))
    }

    /// Offered bits per second: everything handed to routing over the
    /// first-transmit to last-transmit window, delivered or not.
    pub fn offered_rate_bps(&self) -> Option<f64> {
        let first = self.first_tx?;
        let last = self.last_tx?;
        let window = last.duration_since(first)?.as_secs_f64();
        if window <= 0.0 {
            return None;
        }
        Some(self.tx_bytes as f64 * 8.0 / window)
    }

    /// Delivered bits per second over the first-transmit to
    /// last-delivery window.
    pub fn throughput_bps(&self) -> Option<f64> {
        let first = self.first_tx?;
        let last = self.last_rx?;
        let window = last.duration_since(first)?.as_secs_f64();
        if window <= 0.0 {
            return None;
        }
        Some(self.rx_bytes as f64 * 8.0 / window)
    }
}

// ── FlowMonitor ───────────────────────────────────────────────────────

/// Classifies payload traffic into flows and accumulates statistics.
#[derive(Debug, Default)]
pub struct FlowMonitor {
    index: BTreeMap<FiveTuple, FlowId>,
    flows: Vec<(FiveTuple, FlowStats)>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        FlowMonitor::default()
    }

    fn classify(&mut self, tuple: FiveTuple) -> FlowId {
        if let Some(id) = self.index.get(&tuple) {
            return *id;
        }
        let id = FlowId(self.flows.len() as u32 + 1);
        self.index.insert(tuple, id);
        self.flows.push((tuple, FlowStats::default()));
        id
    }

    fn stats_mut(&mut self, id: FlowId) -> &mut FlowStats {
        &mut self.flows[id.0 as usize - 1].1
    }

    /// Tap point for a locally originated payload entering routing.
    pub fn record_tx(&mut self, tuple: FiveTuple, bytes: u32, now: SimTime) -> FlowId {
        let id = self.classify(tuple);
        let stats = self.stats_mut(id);
        stats.tx_packets += 1;
        stats.tx_bytes += u64::from(bytes);
        if stats.first_tx.is_none() {
            stats.first_tx = Some(now);
        }
        stats.last_tx = Some(now);
        id
    }

    /// Tap point for a payload delivered at its final destination.
    pub fn record_rx(&mut self, tuple: FiveTuple, bytes: u32, sent_at: SimTime, now: SimTime) {
        let id = self.classify(tuple);
        let stats = self.stats_mut(id);
        stats.rx_packets += 1;
        stats.rx_bytes += u64::from(bytes);
        stats.last_rx = Some(now);
        if let Some(delay) = now.duration_since(sent_at) {
            stats.delay_sum = stats.delay_sum + delay;
        }
    }

    /// Zero every counter while keeping flow identities.
    ///
    /// Counters are monotonically non-decreasing between resets.
    pub fn reset(&mut self) {
        for (_, stats) in &mut self.flows {
            *stats = FlowStats::default();
        }
    }

    /// Number of classified flows.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Iterate flows in classification order.
    pub fn flows(&self) -> impl Iterator<Item = (FlowId, &FiveTuple, &FlowStats)> {
        self.flows
            .iter()
            .enumerate()
            .map(|(i, (tuple, stats))| (FlowId(i as u32 + 1), tuple, stats))
    }

    /// Stats for a given five-tuple, if classified.
    pub fn stats_for(&self, tuple: &FiveTuple) -> Option<&FlowStats> {
        let id = self.index.get(tuple)?;
        Some(&self.flows[id.0 as usize - 1].1)
    }

    /// Human-readable per-flow summary.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (id, tuple, stats) in self.flows() {
            let _ = writeln!(
                out,
                "{} ({}:{} -> {}:{})",
                id, tuple.src, tuple.src_port, tuple.dst, tuple.dst_port
            );
            let _ = writeln!(out, "  Tx Packets: {}", stats.tx_packets);
            let _ = writeln!(out, "  Tx Bytes:   {}", stats.tx_bytes);
            if let Some(bps) = stats.offered_rate_bps() {
                let _ = writeln!(out, "  TxOffered:  {:.3} kbps", bps / 1e3);
            }
            let _ = writeln!(out, "  Rx Packets: {}", stats.rx_packets);
            let _ = writeln!(out, "  Rx Bytes:   {}", stats.rx_bytes);
            let _ = writeln!(out, "  Lost Packets: {}", stats.lost_packets());
            if let Some(ratio) = stats.loss_ratio() {
                let _ = writeln!(out, "  Packet Loss Ratio: {:.2} %", ratio * 100.0);
            }
            if let Some(delay) = stats.mean_delay() {
                let _ = writeln!(out, "  Mean Delay: {:.3} ms", delay.as_secs_f64() * 1e3);
            }
            if let Some(bps) = stats.throughput_bps() {
                let _ = writeln!(out, "  Throughput: {:.3} kbps", bps / 1e3);
            }
        }
        out
    }
}

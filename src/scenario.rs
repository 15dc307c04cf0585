//! Canned topology assembly: validated configuration in, flow report out.
//!
//! A scenario is the batch-mode face of the crate: it places nodes on a
//! grid, wires up routing and a constant-bit-rate flow from the first
//! node to the last, runs the simulation to the stop time, and returns
//! the accumulated per-flow statistics. All preconditions are checked
//! at construction, before any simulation state exists.

use std::net::Ipv4Addr;

use tracing::info;

use crate::app::{OnOffApp, OnOffConfig, SinkApp};
use crate::channel::Channel;
use crate::error::{SimError, SimResult};
use crate::event::EventKind;
use crate::flow::FlowStats;
use crate::mobility::{Bounds, MobilityModel, PositionAllocator, RandomWalk2d};
use crate::node::{Node, NodeId};
use crate::packet::FiveTuple;
use crate::routing::{Aodv, Dsdv, RoutingProtocol};
use crate::runtime::Runtime;
use crate::simulation::Simulation;
use crate::time::SimTime;

/// Topology size bound; larger grids are rejected at construction.
pub const MAX_NODES: usize = 18;

/// Nodes per grid row.
const GRID_WIDTH: usize = 5;

/// Destination port of the generated flow.
const TRAFFIC_PORT: u16 = 9;

/// Which routing protocol the scenario installs on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingKind {
    Aodv,
    Dsdv,
}

impl RoutingKind {
    fn build(self) -> Box<dyn RoutingProtocol> {
        match self {
            RoutingKind::Aodv => Box::new(Aodv::default()),
            RoutingKind::Dsdv => Box::new(Dsdv::default()),
        }
    }
}

/// Whether nodes hold their grid position or wander.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MobilityKind {
    Static,
    /// Bounded random walk at the given speed in m/s.
    RandomWalk { speed: f64 },
}

/// Validated scenario parameters.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    nodes: usize,
    routing: RoutingKind,
    mobility: MobilityKind,
    seed: u64,
    duration: SimTime,
    grid_spacing: f64,
    max_range: f64,
    traffic_start: SimTime,
}

impl ScenarioConfig {
    /// Build a configuration, checking every precondition up front.
    pub fn new(
        nodes: usize,
        routing: RoutingKind,
        seed: u64,
        duration: SimTime,
    ) -> SimResult<Self> {
        if nodes < 2 {
            return Err(SimError::InvalidScenario(format!(
                "need at least 2 nodes, got {}",
                nodes
            )));
        }
        if nodes > MAX_NODES {
            return Err(SimError::InvalidScenario(format!(
                "too many nodes: {} exceeds the bound of {}",
                nodes, MAX_NODES
            )));
        }
        let traffic_start = SimTime::from_secs(10);
        if duration <= traffic_start {
            return Err(SimError::InvalidScenario(format!(
                "duration must exceed the {} warm-up",
                traffic_start
            )));
        }
        Ok(ScenarioConfig {
            nodes,
            routing,
            mobility: MobilityKind::Static,
            seed,
            duration,
            grid_spacing: 30.0,
            max_range: 35.0,
            traffic_start,
        })
    }

    /// Replace the default static placement.
    pub fn with_mobility(mut self, mobility: MobilityKind) -> Self {
        self.mobility = mobility;
        self
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn routing(&self) -> RoutingKind {
        self.routing
    }

    pub fn duration(&self) -> SimTime {
        self.duration
    }

    fn node_addr(index: usize) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, index as u8 + 1)
    }

    /// Rectangle the random walk reflects off: the grid plus one
    /// spacing of margin.
    fn walk_bounds(&self) -> Bounds {
        let cols = self.nodes.min(GRID_WIDTH);
        let rows = self.nodes.div_ceil(GRID_WIDTH);
        let s = self.grid_spacing;
        Bounds::new(-s, cols as f64 * s, -s, rows as f64 * s)
    }

    /// Assemble and run the scenario to completion.
    ///
    /// Each call builds the whole simulation from scratch, so two runs
    /// of the same configuration produce identical statistics.
    pub fn run(&self) -> SimResult<ScenarioReport> {
        let mut allocator = PositionAllocator::Grid {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: self.grid_spacing,
            delta_y: self.grid_spacing,
            width: GRID_WIDTH,
        };
        let positions = allocator.allocate(self.nodes);

        let mut runtime = Runtime::new(Channel::with_max_range(self.max_range));
        for (i, origin) in positions.into_iter().enumerate() {
            let mobility = match self.mobility {
                MobilityKind::Static => MobilityModel::ConstantPosition(origin),
                MobilityKind::RandomWalk { speed } => MobilityModel::RandomWalk2d(
                    RandomWalk2d::new(
                        origin,
                        self.walk_bounds(),
                        speed,
                        SimTime::from_secs(2),
                        self.seed.wrapping_add(i as u64),
                    ),
                ),
            };
            runtime.add_node(Node::new(
                NodeId::new(i as u64),
                Self::node_addr(i),
                mobility,
                self.routing.build(),
            ))?;
        }

        let src = NodeId::new(0);
        let dst = NodeId::new(self.nodes as u64 - 1);
        let dst_addr = Self::node_addr(self.nodes - 1);

        let source = OnOffApp::new(OnOffConfig::constant(dst_addr, TRAFFIC_PORT, 64, 1024));
        let src_app = runtime
            .node_mut(src)
            .ok_or(SimError::NodeNotFound(src))?
            .add_app(Box::new(source));
        runtime
            .node_mut(dst)
            .ok_or(SimError::NodeNotFound(dst))?
            .add_app(Box::new(SinkApp::new(TRAFFIC_PORT)));

        let mut sim = Simulation::new();
        sim.schedule(SimTime::ZERO, EventKind::Boot);
        sim.schedule(self.traffic_start, EventKind::AppStart { node: src, app: src_app });
        let traffic_stop = self
            .duration
            .duration_since(SimTime::from_secs(1))
            .unwrap_or(SimTime::ZERO);
        sim.schedule(traffic_stop, EventKind::AppStop { node: src, app: src_app });
        sim.stop_at(self.duration);

        info!(nodes = self.nodes, routing = ?self.routing, "running scenario");
        let events = sim.run(&mut runtime);

        let flows = runtime
            .monitor()
            .flows()
            .map(|(_, tuple, stats)| (*tuple, *stats))
            .collect();
        Ok(ScenarioReport {
            events,
            flows,
            text: runtime.monitor().report(),
        })
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    /// Events dispatched during the run.
    pub events: u64,
    /// Flow statistics in classification order.
    pub flows: Vec<(FiveTuple, FlowStats)>,
    text: String,
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(nodes: usize, routing: RoutingKind) -> ScenarioConfig {
        ScenarioConfig::new(nodes, routing, 1, SimTime::from_secs(30)).unwrap()
    }

    #[test]
    fn test_rejects_too_many_nodes() {
        let err = ScenarioConfig::new(19, RoutingKind::Aodv, 1, SimTime::from_secs(30));
        assert!(matches!(err, Err(SimError::InvalidScenario(_))));
        assert!(ScenarioConfig::new(18, RoutingKind::Aodv, 1, SimTime::from_secs(30)).is_ok());
    }

    #[test]
    fn test_rejects_degenerate_topologies() {
        for nodes in [0, 1] {
            let err = ScenarioConfig::new(nodes, RoutingKind::Dsdv, 1, SimTime::from_secs(30));
            assert!(matches!(err, Err(SimError::InvalidScenario(_))));
        }
    }

    #[test]
    fn test_rejects_duration_inside_warmup() {
        let err = ScenarioConfig::new(3, RoutingKind::Dsdv, 1, SimTime::from_secs(5));
        assert!(matches!(err, Err(SimError::InvalidScenario(_))));
    }

    #[test]
    fn test_dsdv_chain_delivers_everything() {
        // Three nodes in a row, adjacent pairs in range: one candidate
        // path, loss-free channel, so delivery must be total.
        let report = config(3, RoutingKind::Dsdv).run().unwrap();
        let (_, stats) = report
            .flows
            .iter()
            .find(|(t, _)| t.dst_port == TRAFFIC_PORT)
            .expect("traffic flow classified");
        assert!(stats.tx_packets > 0);
        assert_eq!(stats.rx_packets, stats.tx_packets);
        assert_eq!(stats.loss_ratio(), Some(0.0));
    }

    #[test]
    fn test_aodv_chain_delivers_everything() {
        let report = config(3, RoutingKind::Aodv).run().unwrap();
        let (_, stats) = report
            .flows
            .iter()
            .find(|(t, _)| t.dst_port == TRAFFIC_PORT)
            .expect("traffic flow classified");
        assert!(stats.tx_packets > 0);
        assert_eq!(stats.loss_ratio(), Some(0.0));
    }

    #[test]
    fn test_report_text_mentions_flow() {
        let report = config(2, RoutingKind::Dsdv).run().unwrap();
        let text = report.to_string();
        assert!(text.contains("Flow 1"));
        assert!(text.contains("Tx Packets"));
    }

    #[test]
    fn test_same_seed_same_statistics() {
        let a = config(4, RoutingKind::Aodv).run().unwrap();
        let b = config(4, RoutingKind::Aodv).run().unwrap();
        assert_eq!(a.events, b.events);
        assert_eq!(a.flows, b.flows);
    }

    #[test]
    fn test_random_walk_scenario_is_deterministic() {
        let cfg = config(4, RoutingKind::Dsdv).with_mobility(MobilityKind::RandomWalk { speed: 1.0 });
        let a = cfg.run().unwrap();
        let b = cfg.run().unwrap();
        assert_eq!(a.flows, b.flows);
    }
}

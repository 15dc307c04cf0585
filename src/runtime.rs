//! The network runtime: owns the nodes, the shared medium, and the
//! flow monitor, and dispatches every simulation event.
//!
//! The runtime is the crate's [`EventHandler`]. A `Transmit` event is
//! resolved against the channel model into per-receiver `Receive`
//! events; a `Receive` event is demultiplexed to the receiving node's
//! routing protocol (control traffic) or applications (payloads at
//! their final destination), or forwarded. Application callbacks leave
//! their outgoing packets in an outbox, which the runtime drains
//! through the flow monitor and the node's routing protocol, so a
//! callback never re-enters the node being dispatched.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::app::AppIo;
use crate::channel::{Channel, LinkDecision};
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventKind, TimerTarget};
use crate::flow::FlowMonitor;
use crate::node::{Node, NodeId};
use crate::packet::Packet;
use crate::routing::NetIo;
use crate::simulation::{EventHandler, SimulationContext};

/// Holds the simulated network and reacts to dispatched events.
pub struct Runtime {
    nodes: BTreeMap<NodeId, Node>,
    channel: Channel,
    monitor: FlowMonitor,
}

impl Runtime {
    /// Create an empty runtime over the given medium.
    pub fn new(channel: Channel) -> Self {
        Runtime {
            nodes: BTreeMap::new(),
            channel,
            monitor: FlowMonitor::new(),
        }
    }

    /// Register a node.
    ///
    /// Node IDs and interface addresses must both be unique.
    pub fn add_node(&mut self, node: Node) -> SimResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(SimError::NodeAlreadyRegistered(node.id));
        }
        if self.nodes.values().any(|n| n.addr == node.addr) {
            return Err(SimError::DuplicateAddress(node.addr));
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Registered node count.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Look a node up by interface address.
    pub fn node_by_addr(&self, addr: Ipv4Addr) -> Option<NodeId> {
        self.nodes.values().find(|n| n.addr == addr).map(|n| n.id)
    }

    /// Accumulated per-flow statistics.
    pub fn monitor(&self) -> &FlowMonitor {
        &self.monitor
    }

    /// Start every node's routing protocol.
    fn boot(&mut self, ctx: &mut SimulationContext<'_>) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        debug!(nodes = ids.len(), "booting network");
        for id in ids {
            if let Some(node) = self.nodes.get_mut(&id) {
                let addr = node.addr;
                let mut io = NetIo { ctx: &mut *ctx, node: id, addr };
                node.routing.start(&mut io);
            }
        }
    }

    /// Resolve one transmission into per-receiver arrivals.
    fn transmit(
        &mut self,
        ctx: &mut SimulationContext<'_>,
        from: NodeId,
        link_dst: Option<NodeId>,
        packet: &Packet,
    ) {
        let now = ctx.now();
        let Some(sender) = self.nodes.get_mut(&from) else {
            return;
        };
        let tx_pos = sender.position_at(now);

        let receivers: Vec<NodeId> = match link_dst {
            Some(to) => vec![to],
            None => self.nodes.keys().copied().filter(|id| *id != from).collect(),
        };

        for to in receivers {
            let Some(receiver) = self.nodes.get_mut(&to) else {
                continue;
            };
            let rx_pos = receiver.position_at(now);
            match self.channel.evaluate(from, tx_pos, to, rx_pos, packet.size) {
                LinkDecision::Received { delay, .. } => {
                    ctx.schedule_after(
                        delay,
                        EventKind::Receive {
                            from,
                            to,
                            packet: packet.clone(),
                        },
                    );
                }
                LinkDecision::Lost { rx_power_dbm } => {
                    trace!(%from, %to, rx_power_dbm, "frame below sensitivity");
                }
            }
        }
    }

    /// Demultiplex an arrived frame on the receiving node.
    fn receive(
        &mut self,
        ctx: &mut SimulationContext<'_>,
        from: NodeId,
        to: NodeId,
        packet: Packet,
    ) {
        if !packet.body.is_payload() {
            let Some(node) = self.nodes.get_mut(&to) else {
                return;
            };
            let addr = node.addr;
            let mut io = NetIo { ctx: &mut *ctx, node: to, addr };
            node.routing.on_control(from, packet, &mut io);
            return;
        }

        let Some(node) = self.nodes.get(&to) else {
            return;
        };
        let addr = node.addr;

        if packet.tuple.dst == addr {
            // Final destination: count it, then hand it to whichever
            // application listens on the port.
            self.monitor
                .record_rx(packet.tuple, packet.size, packet.sent_at, ctx.now());
            let app_idx = node
                .apps
                .iter()
                .position(|a| a.local_port() == Some(packet.tuple.dst_port));
            match app_idx {
                Some(idx) => self.with_app(ctx, to, idx, |app, io| app.on_packet(&packet, io)),
                None => trace!(node = %to, port = packet.tuple.dst_port, "no listener"),
            }
            return;
        }

        // In transit: spend a TTL hop and hand it back to routing.
        if packet.ttl <= 1 {
            trace!(node = %to, packet = %packet, "hop budget exhausted");
            return;
        }
        let mut forwarded = packet;
        forwarded.ttl -= 1;
        let Some(node) = self.nodes.get_mut(&to) else {
            return;
        };
        let mut io = NetIo { ctx: &mut *ctx, node: to, addr };
        node.routing.route_output(forwarded, &mut io);
    }

    /// Run one application callback and drain its outbox.
    fn with_app<F>(&mut self, ctx: &mut SimulationContext<'_>, node_id: NodeId, app_idx: usize, f: F)
    where
        F: FnOnce(&mut dyn crate::app::Application, &mut AppIo<'_, '_>),
    {
        let outbox = {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                return;
            };
            let addr = node.addr;
            let Some(app) = node.apps.get_mut(app_idx) else {
                return;
            };
            let mut io = AppIo::new(&mut *ctx, node_id, addr, app_idx);
            f(app.as_mut(), &mut io);
            io.outbox
        };
        self.drain_outbox(ctx, node_id, outbox);
    }

    /// Locally originated payloads enter the flow monitor and then the
    /// node's routing protocol.
    fn drain_outbox(&mut self, ctx: &mut SimulationContext<'_>, node_id: NodeId, outbox: Vec<Packet>) {
        if outbox.is_empty() {
            return;
        }
        let Runtime { nodes, monitor, .. } = self;
        let Some(node) = nodes.get_mut(&node_id) else {
            return;
        };
        let addr = node.addr;
        for packet in outbox {
            monitor.record_tx(packet.tuple, packet.size, ctx.now());
            let mut io = NetIo { ctx: &mut *ctx, node: node_id, addr };
            node.routing.route_output(packet, &mut io);
        }
    }

    fn timer(&mut self, ctx: &mut SimulationContext<'_>, node_id: NodeId, target: TimerTarget, token: u64) {
        match target {
            TimerTarget::Routing => {
                let Some(node) = self.nodes.get_mut(&node_id) else {
                    return;
                };
                let addr = node.addr;
                let mut io = NetIo { ctx: &mut *ctx, node: node_id, addr };
                node.routing.on_timer(token, &mut io);
            }
            TimerTarget::App(idx) => {
                self.with_app(ctx, node_id, idx, |app, io| app.on_timer(token, io));
            }
        }
    }
}

impl EventHandler for Runtime {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        match &event.kind {
            EventKind::Noop => {}
            EventKind::Boot => self.boot(ctx),
            EventKind::Transmit { from, link_dst, packet } => {
                self.transmit(ctx, *from, *link_dst, packet);
            }
            EventKind::Receive { from, to, packet } => {
                self.receive(ctx, *from, *to, packet.clone());
            }
            EventKind::Timer { node, target, token } => {
                self.timer(ctx, *node, *target, *token);
            }
            EventKind::AppStart { node, app } => {
                debug!(node = %node, app, "application start");
                self.with_app(ctx, *node, *app, |a, io| a.start(io));
            }
            EventKind::AppStop { node, app } => {
                debug!(node = %node, app, "application stop");
                self.with_app(ctx, *node, *app, |a, io| a.stop(io));
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.nodes.len())
            .field("channel", &self.channel)
            .finish()
    }
}

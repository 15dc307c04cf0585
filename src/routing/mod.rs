//! Pluggable ad-hoc routing protocols.
//!
//! A routing protocol is a per-node state machine. It receives locally
//! originated and forwarded packets via [`RoutingProtocol::route_output`],
//! control packets via [`RoutingProtocol::on_control`], and drives its
//! timers through [`RoutingProtocol::on_timer`]. All side effects go
//! through the [`NetIo`] handle — protocols hold no references to the
//! scheduler or to other nodes.
//!
//! # Contract
//!
//! Implementations **must**:
//! - Route all side effects through the provided `NetIo`.
//! - Be deterministic for equal inputs.
//! - Treat an unreachable destination as a silent drop; the flow
//!   monitor has already counted the packet as transmitted.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`aodv`] | on-demand request/reply discovery |
//! | [`dsdv`] | periodic distance-vector exchange |

pub mod aodv;
pub mod dsdv;

pub use aodv::{Aodv, AodvConfig};
pub use dsdv::{Dsdv, DsdvConfig};

use std::net::Ipv4Addr;

use crate::event::{EventId, EventKind, TimerTarget};
use crate::node::NodeId;
use crate::packet::Packet;
use crate::simulation::SimulationContext;
use crate::time::SimTime;

/// UDP port carrying on-demand routing control traffic.
pub const AODV_PORT: u16 = 654;

/// UDP port carrying distance-vector control traffic.
pub const DSDV_PORT: u16 = 269;

// ── Control message bodies ────────────────────────────────────────────

/// On-demand route discovery request, flooded hop by hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteRequest {
    /// Address of the node that started the discovery.
    pub origin: Ipv4Addr,
    /// Origin's sequence number at flood time.
    pub origin_seq: u32,
    /// Discovery identifier, unique per origin.
    pub request_id: u32,
    /// Address being searched for.
    pub target: Ipv4Addr,
    /// Last sequence number the origin knew for the target (0 if none).
    pub target_seq: u32,
    /// Hops traversed so far.
    pub hop_count: u32,
}

/// On-demand route discovery reply, unicast along reverse routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteReply {
    /// Discovery origin the reply travels back to.
    pub origin: Ipv4Addr,
    /// The discovered destination.
    pub target: Ipv4Addr,
    /// Destination sequence number vouching for freshness.
    pub target_seq: u32,
    /// Hops between the replier and the target.
    pub hop_count: u32,
}

/// One advertised destination in a distance-vector dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DsdvEntry {
    pub dst: Ipv4Addr,
    /// Even sequence numbers originate at the destination itself.
    pub seq: u32,
    /// Hop count via the advertising neighbor.
    pub metric: u32,
}

// ── NetIo ─────────────────────────────────────────────────────────────

/// The routing protocol's handle onto the simulation.
///
/// Wraps the [`SimulationContext`] with the identity of the node the
/// protocol instance runs on. Transmissions scheduled here enter the
/// shared medium at the current virtual time.
pub struct NetIo<'a, 'b> {
    pub(crate) ctx: &'a mut SimulationContext<'b>,
    /// The node this protocol instance runs on.
    pub node: NodeId,
    /// The node's interface address.
    pub addr: Ipv4Addr,
}

impl NetIo<'_, '_> {
    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.ctx.now()
    }

    /// Put a frame on the medium addressed to a specific neighbor.
    pub fn unicast(&mut self, next_hop: NodeId, packet: Packet) -> EventId {
        let from = self.node;
        self.ctx.schedule_after(
            SimTime::ZERO,
            EventKind::Transmit {
                from,
                link_dst: Some(next_hop),
                packet,
            },
        )
    }

    /// Put a frame on the medium for every station in range.
    pub fn broadcast(&mut self, packet: Packet) -> EventId {
        let from = self.node;
        self.ctx.schedule_after(
            SimTime::ZERO,
            EventKind::Transmit {
                from,
                link_dst: None,
                packet,
            },
        )
    }

    /// Schedule a routing timer on this node.
    pub fn timer(&mut self, delay: SimTime, token: u64) -> EventId {
        let node = self.node;
        self.ctx.schedule_after(
            delay,
            EventKind::Timer {
                node,
                target: TimerTarget::Routing,
                token,
            },
        )
    }

    /// Invalidate a previously scheduled timer or transmission.
    pub fn cancel(&mut self, id: EventId) {
        self.ctx.cancel(id);
    }
}

// ── RoutingProtocol ───────────────────────────────────────────────────

/// Trait implemented by every routing protocol.
pub trait RoutingProtocol {
    /// Called once at simulation boot; schedule periodic timers here.
    fn start(&mut self, _io: &mut NetIo<'_, '_>) {}

    /// Route a payload packet originated locally or being forwarded.
    ///
    /// The protocol either transmits it toward a next hop, buffers it
    /// pending discovery, or drops it as unreachable.
    fn route_output(&mut self, packet: Packet, io: &mut NetIo<'_, '_>);

    /// Handle a received routing control packet.
    fn on_control(&mut self, from: NodeId, packet: Packet, io: &mut NetIo<'_, '_>);

    /// Handle a routing timer scheduled through [`NetIo::timer`].
    fn on_timer(&mut self, token: u64, io: &mut NetIo<'_, '_>);

    /// Downcast support for test inspection.
    fn as_any(&self) -> &dyn std::any::Any;
}

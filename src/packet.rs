//! Packets and flow classification keys.
//!
//! A [`Packet`] is an immutable record of a datagram in flight: a
//! five-tuple classification key, sequence number, size, origin
//! timestamp, TTL, and a body. Payload bodies carry no actual bytes —
//! only their size matters to the simulation — while control bodies
//! carry the routing protocol messages.

use std::net::Ipv4Addr;

use crate::routing::{DsdvEntry, RouteReply, RouteRequest};
use crate::time::SimTime;

/// IP protocol number for UDP. All simulated traffic is datagram-based.
pub const PROTO_UDP: u8 = 17;

/// Default IP time-to-live for originated packets.
pub const DEFAULT_TTL: u8 = 64;

// ── FiveTuple ─────────────────────────────────────────────────────────

/// The flow classification key: source/destination address and port,
/// plus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FiveTuple {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl FiveTuple {
    /// Construct a UDP five-tuple.
    pub fn udp(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Self {
        FiveTuple {
            src,
            dst,
            src_port,
            dst_port,
            protocol: PROTO_UDP,
        }
    }

    /// The tuple of the reverse direction (replies).
    pub fn reversed(self) -> Self {
        FiveTuple {
            src: self.dst,
            dst: self.src,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

impl std::fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

// ── PacketBody ────────────────────────────────────────────────────────

/// The contents of a packet.
///
/// `Payload` is opaque application data (the size field of the packet
/// says how much). The remaining variants are routing control messages
/// that the runtime hands to the receiving node's routing protocol.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketBody {
    /// Opaque application payload.
    Payload,
    /// On-demand route discovery request (flooded).
    RouteRequest(RouteRequest),
    /// On-demand route discovery reply (unicast along reverse routes).
    RouteReply(RouteReply),
    /// Periodic distance-vector table advertisement.
    DsdvUpdate(Vec<DsdvEntry>),
}

impl PacketBody {
    /// Returns `true` for application data.
    pub fn is_payload(&self) -> bool {
        matches!(self, PacketBody::Payload)
    }
}

// ── Packet ────────────────────────────────────────────────────────────

/// A datagram in flight. Ownership transfers hop by hop; each
/// retransmission on the medium clones the packet per receiver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    /// Flow classification key.
    pub tuple: FiveTuple,
    /// Per-flow sequence number, assigned by the originating application.
    pub seq: u64,
    /// On-the-wire size in bytes (headers included).
    pub size: u32,
    /// Virtual time at which the packet left its originating node.
    pub sent_at: SimTime,
    /// Remaining hop budget; decremented on every forward.
    pub ttl: u8,
    /// Payload or control contents.
    pub body: PacketBody,
}

impl Packet {
    /// Construct an application payload packet.
    pub fn payload(tuple: FiveTuple, seq: u64, size: u32, sent_at: SimTime) -> Self {
        Packet {
            tuple,
            seq,
            size,
            sent_at,
            ttl: DEFAULT_TTL,
            body: PacketBody::Payload,
        }
    }

    /// Construct a routing control packet with an explicit TTL.
    pub fn control(tuple: FiveTuple, size: u32, sent_at: SimTime, ttl: u8, body: PacketBody) -> Self {
        Packet {
            tuple,
            seq: 0,
            size,
            sent_at,
            ttl,
            body,
        }
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.body {
            PacketBody::Payload => "data",
            PacketBody::RouteRequest(_) => "rreq",
            PacketBody::RouteReply(_) => "rrep",
            PacketBody::DsdvUpdate(_) => "dsdv",
        };
        write!(f, "{}[{}] #{} {}B", kind, self.tuple, self.seq, self.size)
    }
}

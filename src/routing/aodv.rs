//! On-demand routing: reactive request/reply route discovery.
//!
//! No route to a destination? Buffer the packet and flood a
//! [`RouteRequest`]. Every relay records a reverse route toward the
//! origin; the destination (or an intermediate node holding a route at
//! least as fresh as the origin asked for) unicasts a [`RouteReply`]
//! back along those reverse routes. The origin installs the forward
//! route, judged by highest destination sequence number then lowest
//! hop count, and flushes its buffer. Routes idle past their timeout
//! are purged; failed discoveries retry a bounded number of times and
//! then drop the buffered packets.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::event::EventId;
use crate::node::NodeId;
use crate::packet::{FiveTuple, Packet, PacketBody};
use crate::time::SimTime;

use super::{NetIo, RouteReply, RouteRequest, RoutingProtocol, AODV_PORT};

/// On-the-wire size of a request packet, IP/UDP headers included.
const RREQ_BYTES: u32 = 52;
/// On-the-wire size of a reply packet, IP/UDP headers included.
const RREP_BYTES: u32 = 48;

/// Routing timer token for the periodic route purge.
const TOKEN_PURGE: u64 = 0;
/// High bit marking discovery-timeout tokens; low 32 bits carry the
/// target address.
const DISCOVERY_FLAG: u64 = 1 << 32;

fn discovery_token(dst: Ipv4Addr) -> u64 {
    DISCOVERY_FLAG | u64::from(u32::from(dst))
}

fn discovery_target(token: u64) -> Ipv4Addr {
    Ipv4Addr::from((token & 0xFFFF_FFFF) as u32)
}

// ── Config ────────────────────────────────────────────────────────────

/// Tunables for the on-demand protocol.
#[derive(Debug, Clone, Copy)]
pub struct AodvConfig {
    /// Idle lifetime of an installed route.
    pub active_route_timeout: SimTime,
    /// How long to wait for a reply before retrying a discovery.
    pub discovery_timeout: SimTime,
    /// Discovery attempts before buffered packets are dropped.
    pub max_discovery_retries: u32,
    /// Hop budget for flooded requests.
    pub rreq_ttl: u8,
    /// Interval of the expired-route purge timer.
    pub purge_interval: SimTime,
}

impl Default for AodvConfig {
    fn default() -> Self {
        AodvConfig {
            active_route_timeout: SimTime::from_secs(3),
            discovery_timeout: SimTime::from_secs(1),
            max_discovery_retries: 2,
            rreq_ttl: 30,
            purge_interval: SimTime::from_secs(1),
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Route {
    next_hop: NodeId,
    hop_count: u32,
    dst_seq: u32,
    expires: SimTime,
}

#[derive(Debug)]
struct Discovery {
    /// Payload packets waiting for a route.
    packets: Vec<Packet>,
    retries: u32,
    /// Pending timeout event, cancelled on success.
    timer: EventId,
    /// Freshness the origin asks for in retried requests.
    target_seq: u32,
}

/// Per-node on-demand routing state machine.
#[derive(Debug)]
pub struct Aodv {
    config: AodvConfig,
    /// Own destination sequence number.
    seq: u32,
    /// Discovery identifier counter.
    rreq_id: u32,
    routes: BTreeMap<Ipv4Addr, Route>,
    /// Duplicate-flood suppression: (origin, request id) pairs seen.
    seen: BTreeSet<(Ipv4Addr, u32)>,
    /// In-flight discoveries keyed by target address.
    pending: BTreeMap<Ipv4Addr, Discovery>,
}

impl Aodv {
    pub fn new(config: AodvConfig) -> Self {
        Aodv {
            config,
            seq: 0,
            rreq_id: 0,
            routes: BTreeMap::new(),
            seen: BTreeSet::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Valid (unexpired) route to `dst`, if any.
    pub fn route_to(&self, dst: Ipv4Addr, now: SimTime) -> Option<NodeId> {
        self.routes
            .get(&dst)
            .filter(|r| r.expires > now)
            .map(|r| r.next_hop)
    }

    /// Number of installed routes, expired ones included.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Install `candidate` if it beats the current route: newer
    /// destination sequence wins; at equal sequence, fewer hops win.
    fn consider_route(&mut self, dst: Ipv4Addr, candidate: Route) {
        match self.routes.get(&dst) {
            Some(current)
                if current.dst_seq > candidate.dst_seq
                    || (current.dst_seq == candidate.dst_seq
                        && current.hop_count <= candidate.hop_count) =>
            {
                // Keep the current route, but refresh its lifetime.
                let expires = candidate.expires;
                if let Some(r) = self.routes.get_mut(&dst) {
                    r.expires = r.expires.max(expires);
                }
            }
            _ => {
                self.routes.insert(dst, candidate);
            }
        }
    }

    fn broadcast_rreq(&mut self, target: Ipv4Addr, target_seq: u32, io: &mut NetIo<'_, '_>) {
        self.seq += 1;
        self.rreq_id += 1;
        let req = RouteRequest {
            origin: io.addr,
            origin_seq: self.seq,
            request_id: self.rreq_id,
            target,
            target_seq,
            hop_count: 0,
        };
        // Suppress our own flood coming back around.
        self.seen.insert((io.addr, self.rreq_id));
        let tuple = FiveTuple::udp(io.addr, AODV_PORT, Ipv4Addr::BROADCAST, AODV_PORT);
        let packet = Packet::control(
            tuple,
            RREQ_BYTES,
            io.now(),
            self.config.rreq_ttl,
            PacketBody::RouteRequest(req),
        );
        trace!(target = %target, id = self.rreq_id, "originating route request");
        io.broadcast(packet);
    }

    fn send_rrep(&mut self, reply: RouteReply, next_hop: NodeId, io: &mut NetIo<'_, '_>) {
        let tuple = FiveTuple::udp(io.addr, AODV_PORT, reply.origin, AODV_PORT);
        let packet = Packet::control(
            tuple,
            RREP_BYTES,
            io.now(),
            self.config.rreq_ttl,
            PacketBody::RouteReply(reply),
        );
        io.unicast(next_hop, packet);
    }

    fn handle_rreq(&mut self, from: NodeId, packet: &Packet, req: RouteRequest, io: &mut NetIo<'_, '_>) {
        if req.origin == io.addr {
            return;
        }
        if !self.seen.insert((req.origin, req.request_id)) {
            return;
        }

        // Every relay learns a reverse route toward the origin.
        self.consider_route(
            req.origin,
            Route {
                next_hop: from,
                hop_count: req.hop_count + 1,
                dst_seq: req.origin_seq,
                expires: io.now() + self.config.active_route_timeout,
            },
        );

        if req.target == io.addr {
            // We are the destination: answer with a fresh sequence.
            self.seq = self.seq.max(req.target_seq) + 1;
            let reply = RouteReply {
                origin: req.origin,
                target: io.addr,
                target_seq: self.seq,
                hop_count: 0,
            };
            self.send_rrep(reply, from, io);
            return;
        }

        // An intermediate node may answer from a route at least as
        // fresh as the origin asked for.
        if let Some(route) = self.routes.get(&req.target) {
            if route.expires > io.now() && route.dst_seq >= req.target_seq && req.target_seq > 0 {
                let reply = RouteReply {
                    origin: req.origin,
                    target: req.target,
                    target_seq: route.dst_seq,
                    hop_count: route.hop_count,
                };
                self.send_rrep(reply, from, io);
                return;
            }
        }

        // Keep flooding while the hop budget lasts.
        if packet.ttl > 1 {
            let forwarded = RouteRequest {
                hop_count: req.hop_count + 1,
                ..req
            };
            let tuple = FiveTuple::udp(io.addr, AODV_PORT, Ipv4Addr::BROADCAST, AODV_PORT);
            let rebroadcast = Packet::control(
                tuple,
                RREQ_BYTES,
                io.now(),
                packet.ttl - 1,
                PacketBody::RouteRequest(forwarded),
            );
            io.broadcast(rebroadcast);
        }
    }

    fn handle_rrep(&mut self, from: NodeId, rep: RouteReply, io: &mut NetIo<'_, '_>) {
        // Learn the forward route the reply vouches for.
        self.consider_route(
            rep.target,
            Route {
                next_hop: from,
                hop_count: rep.hop_count + 1,
                dst_seq: rep.target_seq,
                expires: io.now() + self.config.active_route_timeout,
            },
        );

        if rep.origin == io.addr {
            // Discovery complete: flush everything buffered for the target.
            if let Some(discovery) = self.pending.remove(&rep.target) {
                io.cancel(discovery.timer);
                if let Some(next_hop) = self.route_to(rep.target, io.now()) {
                    debug!(
                        target = %rep.target,
                        packets = discovery.packets.len(),
                        "route established, flushing buffer"
                    );
                    for buffered in discovery.packets {
                        io.unicast(next_hop, buffered);
                    }
                }
            }
            return;
        }

        // Relay the reply one hop back toward the origin.
        match self.route_to(rep.origin, io.now()) {
            Some(next_hop) => {
                let relayed = RouteReply {
                    hop_count: rep.hop_count + 1,
                    ..rep
                };
                self.send_rrep(relayed, next_hop, io);
            }
            None => {
                trace!(origin = %rep.origin, "no reverse route for reply, dropping");
            }
        }
    }
}

impl Default for Aodv {
    fn default() -> Self {
        Aodv::new(AodvConfig::default())
    }
}

impl RoutingProtocol for Aodv {
    fn start(&mut self, io: &mut NetIo<'_, '_>) {
        io.timer(self.config.purge_interval, TOKEN_PURGE);
    }

    fn route_output(&mut self, packet: Packet, io: &mut NetIo<'_, '_>) {
        let dst = packet.tuple.dst;
        if dst == Ipv4Addr::BROADCAST {
            io.broadcast(packet);
            return;
        }

        if let Some(next_hop) = self.route_to(dst, io.now()) {
            // Data traffic keeps the route alive.
            let expires = io.now() + self.config.active_route_timeout;
            if let Some(route) = self.routes.get_mut(&dst) {
                route.expires = route.expires.max(expires);
            }
            io.unicast(next_hop, packet);
            return;
        }

        match self.pending.get_mut(&dst) {
            Some(discovery) => discovery.packets.push(packet),
            None => {
                let known_seq = self.routes.get(&dst).map_or(0, |r| r.dst_seq);
                let timer = io.timer(self.config.discovery_timeout, discovery_token(dst));
                self.pending.insert(
                    dst,
                    Discovery {
                        packets: vec![packet],
                        retries: 0,
                        timer,
                        target_seq: known_seq,
                    },
                );
                self.broadcast_rreq(dst, known_seq, io);
            }
        }
    }

    fn on_control(&mut self, from: NodeId, packet: Packet, io: &mut NetIo<'_, '_>) {
        match packet.body.clone() {
            PacketBody::RouteRequest(req) => self.handle_rreq(from, &packet, req, io),
            PacketBody::RouteReply(rep) => self.handle_rrep(from, rep, io),
            // Foreign control traffic is ignored.
            PacketBody::DsdvUpdate(_) | PacketBody::Payload => {}
        }
    }

    fn on_timer(&mut self, token: u64, io: &mut NetIo<'_, '_>) {
        if token == TOKEN_PURGE {
            let now = io.now();
            self.routes.retain(|_, r| r.expires > now);
            io.timer(self.config.purge_interval, TOKEN_PURGE);
            return;
        }

        if token & DISCOVERY_FLAG != 0 {
            let dst = discovery_target(token);
            let Some(discovery) = self.pending.get_mut(&dst) else {
                return;
            };
            if discovery.retries < self.config.max_discovery_retries {
                discovery.retries += 1;
                discovery.timer = io.timer(self.config.discovery_timeout, discovery_token(dst));
                let target_seq = discovery.target_seq;
                self.broadcast_rreq(dst, target_seq, io);
            } else {
                let dropped = self.pending.remove(&dst).map_or(0, |d| d.packets.len());
                debug!(target = %dst, dropped, "route discovery failed");
            }
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

//! Traffic-generating and traffic-sinking applications.
//!
//! Applications run on top of a node's routing protocol. They never
//! touch the medium directly: outgoing payloads go into the [`AppIo`]
//! outbox, which the runtime drains through the flow monitor and the
//! node's routing protocol after each callback returns.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::event::{EventId, EventKind, TimerTarget};
use crate::node::NodeId;
use crate::packet::{FiveTuple, Packet};
use crate::simulation::SimulationContext;
use crate::time::SimTime;

/// Default source port for client-style applications.
pub const CLIENT_PORT: u16 = 49_153;

// ── AppIo ─────────────────────────────────────────────────────────────

/// An application's handle onto the simulation.
///
/// Sent packets are collected in the outbox rather than transmitted
/// inline, so an application callback never re-enters the node that is
/// currently being dispatched.
pub struct AppIo<'a, 'b> {
    pub(crate) ctx: &'a mut SimulationContext<'b>,
    /// The node this application runs on.
    pub node: NodeId,
    /// The node's interface address.
    pub addr: Ipv4Addr,
    /// Index of this application on its node.
    pub app: usize,
    pub(crate) outbox: Vec<Packet>,
}

impl<'a, 'b> AppIo<'a, 'b> {
    pub(crate) fn new(
        ctx: &'a mut SimulationContext<'b>,
        node: NodeId,
        addr: Ipv4Addr,
        app: usize,
    ) -> Self {
        AppIo {
            ctx,
            node,
            addr,
            app,
            outbox: Vec::new(),
        }
    }

    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.ctx.now()
    }

    /// Hand a payload packet to the node's routing protocol.
    pub fn send(&mut self, packet: Packet) {
        self.outbox.push(packet);
    }

    /// Schedule an application timer on this node.
    pub fn timer(&mut self, delay: SimTime, token: u64) -> EventId {
        let (node, app) = (self.node, self.app);
        self.ctx.schedule_after(
            delay,
            EventKind::Timer {
                node,
                target: TimerTarget::App(app),
                token,
            },
        )
    }

    /// Invalidate a previously scheduled timer.
    pub fn cancel(&mut self, id: EventId) {
        self.ctx.cancel(id);
    }
}

// ── Application ───────────────────────────────────────────────────────

/// Trait implemented by every application.
///
/// All methods default to no-ops; a pure sink only overrides
/// [`on_packet`](Self::on_packet) and [`local_port`](Self::local_port).
pub trait Application {
    /// Called when the application's start event fires.
    fn start(&mut self, _io: &mut AppIo<'_, '_>) {}

    /// Called when the application's stop event fires.
    fn stop(&mut self, _io: &mut AppIo<'_, '_>) {}

    /// Handle a timer scheduled through [`AppIo::timer`].
    fn on_timer(&mut self, _token: u64, _io: &mut AppIo<'_, '_>) {}

    /// Handle a payload packet delivered to this application's port.
    fn on_packet(&mut self, _packet: &Packet, _io: &mut AppIo<'_, '_>) {}

    /// UDP port this application listens on, if any.
    fn local_port(&self) -> Option<u16> {
        None
    }

    /// Downcast support for test inspection.
    fn as_any(&self) -> &dyn std::any::Any;
}

// ── OnOffApp ──────────────────────────────────────────────────────────

const TOKEN_SEND: u64 = 0;
const TOKEN_PHASE: u64 = 1;

/// Constant-bit-rate source with optional on/off duty cycling.
///
/// While in an on phase the application emits fixed-size packets at
/// `data_rate_bps`. With a zero `off_time` the source stays on
/// permanently once started.
#[derive(Debug, Clone, Copy)]
pub struct OnOffConfig {
    pub dst: Ipv4Addr,
    pub dst_port: u16,
    pub packet_size: u32,
    pub data_rate_bps: u64,
    pub on_time: SimTime,
    pub off_time: SimTime,
}

impl OnOffConfig {
    /// A permanently-on source.
    pub fn constant(dst: Ipv4Addr, dst_port: u16, packet_size: u32, data_rate_bps: u64) -> Self {
        OnOffConfig {
            dst,
            dst_port,
            packet_size,
            data_rate_bps,
            on_time: SimTime::from_secs(1),
            off_time: SimTime::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct OnOffApp {
    config: OnOffConfig,
    running: bool,
    sending: bool,
    seq: u64,
    /// Packets handed to routing so far.
    pub tx_packets: u64,
    send_timer: Option<EventId>,
    phase_timer: Option<EventId>,
}

impl OnOffApp {
    pub fn new(config: OnOffConfig) -> Self {
        assert!(config.data_rate_bps > 0, "data rate must be positive");
        assert!(config.packet_size > 0, "packet size must be positive");
        OnOffApp {
            config,
            running: false,
            sending: false,
            seq: 0,
            tx_packets: 0,
            send_timer: None,
            phase_timer: None,
        }
    }

    /// Gap between packet emissions at the configured rate.
    fn send_interval(&self) -> SimTime {
        SimTime::from_secs_f64(
            self.config.packet_size as f64 * 8.0 / self.config.data_rate_bps as f64,
        )
    }

    fn emit(&mut self, io: &mut AppIo<'_, '_>) {
        let tuple = FiveTuple::udp(io.addr, CLIENT_PORT, self.config.dst, self.config.dst_port);
        let packet = Packet::payload(tuple, self.seq, self.config.packet_size, io.now());
        self.seq += 1;
        self.tx_packets += 1;
        io.send(packet);
    }

    fn enter_on(&mut self, io: &mut AppIo<'_, '_>) {
        self.sending = true;
        self.send_timer = Some(io.timer(self.send_interval(), TOKEN_SEND));
        if self.config.off_time > SimTime::ZERO {
            self.phase_timer = Some(io.timer(self.config.on_time, TOKEN_PHASE));
        }
    }
}

impl Application for OnOffApp {
    fn start(&mut self, io: &mut AppIo<'_, '_>) {
        self.running = true;
        self.enter_on(io);
    }

    fn stop(&mut self, io: &mut AppIo<'_, '_>) {
        self.running = false;
        self.sending = false;
        if let Some(id) = self.send_timer.take() {
            io.cancel(id);
        }
        if let Some(id) = self.phase_timer.take() {
            io.cancel(id);
        }
        debug!(node = %io.node, sent = self.tx_packets, "source stopped");
    }

    fn on_timer(&mut self, token: u64, io: &mut AppIo<'_, '_>) {
        if !self.running {
            return;
        }
        match token {
            TOKEN_SEND if self.sending => {
                self.emit(io);
                self.send_timer = Some(io.timer(self.send_interval(), TOKEN_SEND));
            }
            TOKEN_PHASE => {
                if self.sending {
                    self.sending = false;
                    if let Some(id) = self.send_timer.take() {
                        io.cancel(id);
                    }
                    self.phase_timer = Some(io.timer(self.config.off_time, TOKEN_PHASE));
                } else {
                    self.enter_on(io);
                }
            }
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ── Echo client / server ──────────────────────────────────────────────

/// Sends a bounded number of payloads on a fixed interval and counts
/// the echoes that come back.
#[derive(Debug)]
pub struct EchoClient {
    pub dst: Ipv4Addr,
    pub dst_port: u16,
    pub interval: SimTime,
    pub max_packets: u32,
    pub packet_size: u32,
    sent: u32,
    /// Echo replies received.
    pub rx_replies: u64,
    timer: Option<EventId>,
}

impl EchoClient {
    pub fn new(dst: Ipv4Addr, dst_port: u16, interval: SimTime, max_packets: u32, packet_size: u32) -> Self {
        EchoClient {
            dst,
            dst_port,
            interval,
            max_packets,
            packet_size,
            sent: 0,
            rx_replies: 0,
            timer: None,
        }
    }

    /// Requests sent so far.
    pub fn tx_packets(&self) -> u32 {
        self.sent
    }

    fn send_one(&mut self, io: &mut AppIo<'_, '_>) {
        let tuple = FiveTuple::udp(io.addr, CLIENT_PORT, self.dst, self.dst_port);
        let packet = Packet::payload(tuple, u64::from(self.sent), self.packet_size, io.now());
        self.sent += 1;
        io.send(packet);
        if self.sent < self.max_packets {
            self.timer = Some(io.timer(self.interval, TOKEN_SEND));
        }
    }
}

impl Application for EchoClient {
    fn start(&mut self, io: &mut AppIo<'_, '_>) {
        if self.max_packets > 0 {
            self.send_one(io);
        }
    }

    fn stop(&mut self, io: &mut AppIo<'_, '_>) {
        if let Some(id) = self.timer.take() {
            io.cancel(id);
        }
    }

    fn on_timer(&mut self, token: u64, io: &mut AppIo<'_, '_>) {
        if token == TOKEN_SEND {
            self.send_one(io);
        }
    }

    fn on_packet(&mut self, _packet: &Packet, _io: &mut AppIo<'_, '_>) {
        self.rx_replies += 1;
    }

    fn local_port(&self) -> Option<u16> {
        Some(CLIENT_PORT)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Echoes every received payload back to its sender.
#[derive(Debug)]
pub struct EchoServer {
    pub port: u16,
    pub rx_packets: u64,
}

impl EchoServer {
    pub fn new(port: u16) -> Self {
        EchoServer { port, rx_packets: 0 }
    }
}

impl Application for EchoServer {
    fn on_packet(&mut self, packet: &Packet, io: &mut AppIo<'_, '_>) {
        self.rx_packets += 1;
        let reply = Packet::payload(packet.tuple.reversed(), packet.seq, packet.size, io.now());
        io.send(reply);
    }

    fn local_port(&self) -> Option<u16> {
        Some(self.port)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ── SinkApp ───────────────────────────────────────────────────────────

/// Counts everything delivered to its port and sends nothing.
#[derive(Debug)]
pub struct SinkApp {
    pub port: u16,
    pub rx_packets: u64,
    pub rx_bytes: u64,
}

impl SinkApp {
    pub fn new(port: u16) -> Self {
        SinkApp {
            port,
            rx_packets: 0,
            rx_bytes: 0,
        }
    }
}

impl Application for SinkApp {
    fn on_packet(&mut self, packet: &Packet, _io: &mut AppIo<'_, '_>) {
        self.rx_packets += 1;
        self.rx_bytes += u64::from(packet.size);
    }

    fn local_port(&self) -> Option<u16> {
        Some(self.port)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn payload_to(port: u16) -> Packet {
        let tuple = FiveTuple::udp(addr(2), CLIENT_PORT, addr(1), port);
        Packet::payload(tuple, 3, 64, SimTime::ZERO)
    }

    #[test]
    fn test_onoff_emission_interval() {
        // 64 bytes at 1024 b/s: one packet every 500 ms.
        let app = OnOffApp::new(OnOffConfig::constant(addr(9), 9, 64, 1024));
        assert_eq!(app.send_interval(), SimTime::from_millis(500));
    }

    #[test]
    fn test_onoff_start_schedules_first_send() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut app = OnOffApp::new(OnOffConfig::constant(addr(9), 9, 64, 1024));

        app.start(&mut io);
        assert!(io.outbox.is_empty());
        let events = sched.drain_ordered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scheduled_at, SimTime::from_millis(500));
    }

    #[test]
    fn test_onoff_send_timer_emits_and_reschedules() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut app = OnOffApp::new(OnOffConfig::constant(addr(9), 9, 64, 1024));

        app.start(&mut io);
        app.on_timer(TOKEN_SEND, &mut io);
        app.on_timer(TOKEN_SEND, &mut io);

        assert_eq!(io.outbox.len(), 2);
        assert_eq!(app.tx_packets, 2);
        assert_eq!(io.outbox[0].seq, 0);
        assert_eq!(io.outbox[1].seq, 1);
        assert_eq!(io.outbox[0].tuple.dst, addr(9));
        assert_eq!(io.outbox[0].size, 64);
    }

    #[test]
    fn test_onoff_stop_silences_source() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut app = OnOffApp::new(OnOffConfig::constant(addr(9), 9, 64, 1024));

        app.start(&mut io);
        app.stop(&mut io);
        app.on_timer(TOKEN_SEND, &mut io);
        assert!(io.outbox.is_empty());
    }

    #[test]
    fn test_onoff_duty_cycle_toggles() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut app = OnOffApp::new(OnOffConfig {
            off_time: SimTime::from_secs(1),
            ..OnOffConfig::constant(addr(9), 9, 64, 1024)
        });

        app.start(&mut io);
        assert!(app.sending);
        app.on_timer(TOKEN_PHASE, &mut io);
        assert!(!app.sending);
        // Sends are suppressed while off.
        app.on_timer(TOKEN_SEND, &mut io);
        assert!(io.outbox.is_empty());
        app.on_timer(TOKEN_PHASE, &mut io);
        assert!(app.sending);
    }

    #[test]
    fn test_echo_client_stops_at_max_packets() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut client = EchoClient::new(addr(9), 9, SimTime::from_secs(1), 2, 1024);

        client.start(&mut io);
        assert_eq!(client.tx_packets(), 1);
        // One follow-up timer pending.
        client.on_timer(TOKEN_SEND, &mut io);
        assert_eq!(client.tx_packets(), 2);
        // No further timer after the last packet.
        assert_eq!(sched.drain_ordered().len(), 1);
    }

    #[test]
    fn test_echo_client_counts_replies() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut client = EchoClient::new(addr(9), 9, SimTime::from_secs(1), 1, 1024);

        client.on_packet(&payload_to(CLIENT_PORT), &mut io);
        assert_eq!(client.rx_replies, 1);
    }

    #[test]
    fn test_echo_server_reverses_tuple() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut server = EchoServer::new(9);

        let request = payload_to(9);
        server.on_packet(&request, &mut io);

        assert_eq!(server.rx_packets, 1);
        assert_eq!(io.outbox.len(), 1);
        let reply = &io.outbox[0];
        assert_eq!(reply.tuple, request.tuple.reversed());
        assert_eq!(reply.seq, request.seq);
        assert_eq!(reply.size, request.size);
    }

    #[test]
    fn test_sink_counts_bytes() {
        let mut sched = Scheduler::new();
        let mut ctx = SimulationContext { scheduler: &mut sched, now: SimTime::ZERO };
        let mut io = AppIo::new(&mut ctx, NodeId::new(0), addr(1), 0);
        let mut sink = SinkApp::new(9);

        sink.on_packet(&payload_to(9), &mut io);
        sink.on_packet(&payload_to(9), &mut io);

        assert_eq!(sink.rx_packets, 2);
        assert_eq!(sink.rx_bytes, 128);
        assert!(io.outbox.is_empty());
        assert_eq!(sink.local_port(), Some(9));
    }
}

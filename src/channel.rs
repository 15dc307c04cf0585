//! Shared-medium channel and propagation models.
//!
//! The channel is a pure mapping: given transmitter and receiver
//! identity/position and a frame size, it decides whether reception
//! succeeds and with what delay. It holds no mutable state, so every
//! transmission is evaluated independently and deterministically.

use std::collections::BTreeMap;

use crate::geom::Position;
use crate::node::NodeId;
use crate::time::SimTime;

/// Speed of light in vacuum, meters per second.
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

// ── Propagation loss models ───────────────────────────────────────────

/// Path loss between two stations, in dB.
///
/// Implementations are pure functions of the endpoints; identity is
/// included so matrix-style models can key per pair.
pub trait PropagationLoss {
    fn path_loss_db(&self, tx: NodeId, tx_pos: Position, rx: NodeId, rx_pos: Position) -> f64;
}

/// Distance-threshold model: perfect reception within `max_range`
/// meters, no link at all beyond it.
#[derive(Debug, Clone, Copy)]
pub struct RangePropagation {
    pub max_range: f64,
}

impl PropagationLoss for RangePropagation {
    fn path_loss_db(&self, _tx: NodeId, tx_pos: Position, _rx: NodeId, rx_pos: Position) -> f64 {
        if tx_pos.distance_to(rx_pos) <= self.max_range {
            0.0
        } else {
            f64::INFINITY
        }
    }
}

/// Explicit per-pair loss with a default for unlisted pairs.
///
/// Entries are directed internally; [`set_loss`](Self::set_loss)
/// installs both directions, so links are symmetric unless
/// [`set_one_way_loss`](Self::set_one_way_loss) is used.
#[derive(Debug, Clone)]
pub struct MatrixPropagation {
    default_loss_db: f64,
    pairs: BTreeMap<(NodeId, NodeId), f64>,
}

impl MatrixPropagation {
    /// Create a matrix model where unlisted pairs see `default_loss_db`.
    pub fn new(default_loss_db: f64) -> Self {
        MatrixPropagation {
            default_loss_db,
            pairs: BTreeMap::new(),
        }
    }

    /// Set a symmetric loss between two stations.
    pub fn set_loss(&mut self, a: NodeId, b: NodeId, loss_db: f64) {
        self.pairs.insert((a, b), loss_db);
        self.pairs.insert((b, a), loss_db);
    }

    /// Set a directed loss (asymmetric link).
    pub fn set_one_way_loss(&mut self, from: NodeId, to: NodeId, loss_db: f64) {
        self.pairs.insert((from, to), loss_db);
    }
}

impl PropagationLoss for MatrixPropagation {
    fn path_loss_db(&self, tx: NodeId, _tx_pos: Position, rx: NodeId, _rx_pos: Position) -> f64 {
        *self.pairs.get(&(tx, rx)).unwrap_or(&self.default_loss_db)
    }
}

/// Log-distance path loss: `L = L0 + 10 * n * log10(d / d0)`.
#[derive(Debug, Clone, Copy)]
pub struct LogDistancePropagation {
    /// Path loss exponent `n`.
    pub exponent: f64,
    /// Reference distance `d0`, meters.
    pub reference_distance: f64,
    /// Loss at the reference distance `L0`, dB.
    pub reference_loss_db: f64,
}

impl Default for LogDistancePropagation {
    fn default() -> Self {
        // Reference loss corresponds to Friis at 1 m for 5.15 GHz.
        LogDistancePropagation {
            exponent: 3.0,
            reference_distance: 1.0,
            reference_loss_db: 46.6777,
        }
    }
}

impl PropagationLoss for LogDistancePropagation {
    fn path_loss_db(&self, _tx: NodeId, tx_pos: Position, _rx: NodeId, rx_pos: Position) -> f64 {
        let d = tx_pos.distance_to(rx_pos);
        if d <= self.reference_distance {
            return self.reference_loss_db;
        }
        self.reference_loss_db + 10.0 * self.exponent * (d / self.reference_distance).log10()
    }
}

// ── Channel ───────────────────────────────────────────────────────────

/// Radio parameters shared by every station on the channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Transmit power, dBm.
    pub tx_power_dbm: f64,
    /// Minimum received power for successful reception, dBm.
    pub rx_sensitivity_dbm: f64,
    /// Link rate used for serialization delay, bits per second.
    pub data_rate_bps: u64,
    /// Signal propagation speed, meters per second.
    pub propagation_speed: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        // 802.11b-flavored defaults: 16 dBm transmit, -96 dBm energy
        // detection threshold, 2 Mb/s DSSS link rate.
        ChannelConfig {
            tx_power_dbm: 16.0206,
            rx_sensitivity_dbm: -96.0,
            data_rate_bps: 2_000_000,
            propagation_speed: SPEED_OF_LIGHT,
        }
    }
}

/// Outcome of evaluating one transmitter/receiver pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinkDecision {
    /// Frame arrives after `delay` with the given received power.
    Received { rx_power_dbm: f64, delay: SimTime },
    /// Received power below sensitivity; the frame is lost.
    Lost { rx_power_dbm: f64 },
}

impl LinkDecision {
    /// Returns `true` for successful reception.
    pub fn is_received(&self) -> bool {
        matches!(self, LinkDecision::Received { .. })
    }
}

/// The shared wireless medium.
pub struct Channel {
    config: ChannelConfig,
    loss: Box<dyn PropagationLoss>,
}

impl Channel {
    /// Create a channel with the given config and loss model.
    pub fn new(config: ChannelConfig, loss: Box<dyn PropagationLoss>) -> Self {
        Channel { config, loss }
    }

    /// Convenience: default radio parameters with a range-threshold
    /// loss model.
    pub fn with_max_range(max_range: f64) -> Self {
        Channel::new(ChannelConfig::default(), Box::new(RangePropagation { max_range }))
    }

    /// Access the radio parameters.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Evaluate one transmission toward one receiver.
    ///
    /// Pure computation: serialization delay from the link rate plus
    /// propagation delay from the distance, gated on received power.
    pub fn evaluate(
        &self,
        tx: NodeId,
        tx_pos: Position,
        rx: NodeId,
        rx_pos: Position,
        frame_bytes: u32,
    ) -> LinkDecision {
        let loss_db = self.loss.path_loss_db(tx, tx_pos, rx, rx_pos);
        let rx_power_dbm = self.config.tx_power_dbm - loss_db;

        if rx_power_dbm < self.config.rx_sensitivity_dbm {
            return LinkDecision::Lost { rx_power_dbm };
        }

        let serialization =
            SimTime::from_secs_f64(frame_bytes as f64 * 8.0 / self.config.data_rate_bps as f64);
        let propagation =
            SimTime::from_secs_f64(tx_pos.distance_to(rx_pos) / self.config.propagation_speed);

        LinkDecision::Received {
            rx_power_dbm,
            delay: serialization + propagation,
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("config", &self.config).finish()
    }
}

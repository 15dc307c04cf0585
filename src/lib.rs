//! # wavesim
//!
//! A deterministic discrete-event simulator for small ad-hoc wireless
//! networks: a virtual clock and event scheduler, a shared-medium
//! channel with pluggable propagation loss, on-demand and
//! distance-vector routing protocols, traffic-generating applications,
//! and a passive per-flow statistics monitor.
//!
//! ## Design principles
//!
//! - **Determinism**: events at equal times dispatch in creation order,
//!   and all randomness flows from explicitly seeded RNGs. Re-running a
//!   scenario with the same seed reproduces every statistic bit for bit.
//! - **No ambient state**: there is no global clock or configuration;
//!   components see time only through the [`simulation::SimulationContext`]
//!   handed to them per event.
//! - **Single-threaded dispatch**: exactly one event runs at a time, so
//!   nodes and tables are mutated without locks.
//! - **Losses are data, not errors**: a packet dropped by the channel or
//!   by routing is an expected outcome the [`flow::FlowMonitor`] counts;
//!   only configuration mistakes surface as [`error::SimError`].
//!
//! ## Quick start
//!
//! ```
//! use wavesim::scenario::{RoutingKind, ScenarioConfig};
//! use wavesim::time::SimTime;
//!
//! let config = ScenarioConfig::new(3, RoutingKind::Aodv, 1, SimTime::from_secs(30))?;
//! let report = config.run()?;
//! println!("{report}");
//! # Ok::<(), wavesim::error::SimError>(())
//! ```

pub mod app;
pub mod channel;
pub mod error;
pub mod event;
pub mod flow;
pub mod geom;
pub mod mobility;
pub mod node;
pub mod packet;
pub mod routing;
pub mod runtime;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod time;

pub use error::{SimError, SimResult};
pub use event::{Event, EventId, EventKind};
pub use flow::{FlowId, FlowMonitor, FlowStats};
pub use node::{Node, NodeId};
pub use packet::{FiveTuple, Packet};
pub use runtime::Runtime;
pub use simulation::{EventHandler, Simulation, SimulationContext};
pub use time::SimTime;

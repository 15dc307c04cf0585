//! Simulation nodes: identity, address, mobility, protocol stack.

use std::net::Ipv4Addr;

use crate::app::Application;
use crate::geom::Position;
use crate::mobility::MobilityModel;
use crate::routing::RoutingProtocol;
use crate::time::SimTime;

// ── NodeId ────────────────────────────────────────────────────────────

/// A unique identifier for a simulated node.
///
/// `NodeId` is intentionally a newtype around `u64` rather than a
/// bare integer to prevent accidental confusion with other u64 values
/// (event IDs, timer tokens, etc.) at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(u64);

impl NodeId {
    /// Create a node ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

// ── Node ──────────────────────────────────────────────────────────────

/// An addressable simulation entity: one wireless interface, a mobility
/// model, a routing protocol, and zero or more applications.
///
/// Nodes never share memory; all interaction is mediated by events
/// dispatched through the runtime.
pub struct Node {
    pub id: NodeId,
    /// Interface address on the single simulated subnet.
    pub addr: Ipv4Addr,
    /// Motion as a function of virtual time.
    pub mobility: MobilityModel,
    pub(crate) routing: Box<dyn RoutingProtocol>,
    pub(crate) apps: Vec<Box<dyn Application>>,
}

impl Node {
    /// Create a node with no applications.
    pub fn new(
        id: NodeId,
        addr: Ipv4Addr,
        mobility: MobilityModel,
        routing: Box<dyn RoutingProtocol>,
    ) -> Self {
        Node {
            id,
            addr,
            mobility,
            routing,
            apps: Vec::new(),
        }
    }

    /// Attach an application; returns its index for start/stop events.
    pub fn add_app(&mut self, app: Box<dyn Application>) -> usize {
        self.apps.push(app);
        self.apps.len() - 1
    }

    /// Position at virtual time `t`.
    pub fn position_at(&mut self, t: SimTime) -> Position {
        self.mobility.position_at(t)
    }

    /// Number of attached applications.
    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    /// Downcast an application for inspection.
    ///
    /// Returns `None` if the index is out of range or the type differs.
    pub fn app<T: Application + 'static>(&self, index: usize) -> Option<&T> {
        self.apps.get(index)?.as_any().downcast_ref::<T>()
    }

    /// Downcast the routing protocol for inspection.
    pub fn routing<T: RoutingProtocol + 'static>(&self) -> Option<&T> {
        self.routing.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("apps", &self.apps.len())
            .finish()
    }
}

//! Structured error types.
//!
//! Configuration violations are detected before any simulation state
//! exists and surface here; within a running simulation, packet loss is
//! a modeled outcome, never an error.

use thiserror::Error;

use crate::node::NodeId;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// A scenario configuration failed validation before start.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// A node ID was referenced but is not registered in the runtime.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Attempted to register a node with an ID that is already in use.
    #[error("node {0} is already registered")]
    NodeAlreadyRegistered(NodeId),

    /// Two nodes were assigned the same address.
    #[error("address {0} is already assigned")]
    DuplicateAddress(std::net::Ipv4Addr),
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = SimError::NodeNotFound(NodeId::new(5));
        assert_eq!(e.to_string(), "node N5 not found");
    }

    #[test]
    fn test_invalid_scenario_message() {
        let e = SimError::InvalidScenario("too many nodes".into());
        assert!(e.to_string().contains("too many nodes"));
    }

    #[test]
    fn test_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::NodeAlreadyRegistered(NodeId::new(1)));
        assert!(!e.to_string().is_empty());
    }
}

//! Error types.
//!
//! Only construction and spawning can fail with an error value. Evaluator
//! panics propagate to whoever triggered the evaluation. Rejected or
//! unspawnable async results are turned into data by the bridge rather than
//! returned.

use std::fmt::Display;

use thiserror::Error;

use crate::reactive::{NodeId, NodeKind};

/// A lifecycle gate was built on a host that cannot drive it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The host does not emit `Awake`/`Asleep`, so the gate could never
    /// follow it.
    #[error("lifecycle gate host {node} must be a pure memo, found {kind:?} node")]
    HostNotPure { node: NodeId, kind: NodeKind },
}

/// The reason a pending evaluation failed.
///
/// The bridge logs it and applies its error value; the reason itself is not
/// kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("async evaluation rejected: {reason}")]
pub struct Rejection {
    reason: String,
}

impl Rejection {
    pub fn new(reason: impl Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A pending evaluation could not be handed to a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_names_the_host() {
        let node = NodeId::new();
        let err = ConfigurationError::HostNotPure {
            node,
            kind: NodeKind::Source,
        };

        let message = err.to_string();
        assert!(message.contains(&node.to_string()));
        assert!(message.contains("Source"));
    }

    #[test]
    fn rejection_keeps_reason_text() {
        let rejection = Rejection::new("timed out");
        assert_eq!(rejection.reason(), "timed out");
        assert_eq!(rejection.to_string(), "async evaluation rejected: timed out");
    }

    #[test]
    fn spawn_error_carries_runtime_message() {
        let err = SpawnError::NoRuntime("not inside a runtime".into());
        assert_eq!(err.to_string(), "no async runtime available: not inside a runtime");
    }
}

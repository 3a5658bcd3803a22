//! Node identity.
//!
//! Every signal and memo gets a [`NodeId`] when it is created. Ids are used to
//! deduplicate dependencies collected during an evaluation and to name nodes
//! in logs and errors.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the reactive graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    ///
    /// Signals and memos draw from the same counter, so ids never collide
    /// across node kinds.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the reactive graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A source node (signal). Written directly, never computed.
    Source,

    /// A plain derived node. Recomputes whenever a dependency changes,
    /// whether or not anyone observes it.
    Derived,

    /// A pure (lazy) derived node. Recomputes only while it has at least one
    /// `Change` subscriber, and announces the transitions on its `Awake` and
    /// `Asleep` channels.
    Pure,
}

impl NodeKind {
    /// Whether this node emits `Awake`/`Asleep` lifecycle events.
    pub fn has_lifecycle(self) -> bool {
        matches!(self, NodeKind::Pure)
    }
}

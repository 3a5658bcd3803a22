//! Reactive Primitives
//!
//! This module implements the reactive engine the lifecycle gate and the
//! async bridge are built on: signals, plain memos, and pure memos, plus the
//! subscription machinery that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a memo evaluation), the signal registers itself
//! as a dependency of that memo. When the value changes, the signal fires its
//! `Change` channel.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result and re-evaluates when one
//! of its dependencies changes. A *plain* memo always follows its
//! dependencies. A *pure* memo only follows them while someone subscribes to
//! its `Change` channel, and announces the transitions on `Awake` and
//! `Asleep`.
//!
//! ## Subscriptions
//!
//! Every subscription returns a [`Subscription`] handle. Disposing it (or
//! dropping it) detaches the callback. Disposal is idempotent.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a value is read, we check if there is an active
//! tracking context and, if so, record the dependency.
//!
//! Notification is synchronous: a write returns only after every dependent
//! memo has re-evaluated and every subscriber has run.

mod context;
mod memo;
mod node;
mod signal;
mod subscriber;

pub use context::ReactiveContext;
pub use memo::{Memo, MemoState};
pub use node::{NodeId, NodeKind};
pub use signal::Signal;
pub use subscriber::{Callback, Channel, Observable, SubscriberId, Subscription};

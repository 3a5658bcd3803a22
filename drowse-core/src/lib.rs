//! Drowse Core
//!
//! This crate lets a computation run only while someone is watching, and
//! folds asynchronous results back into a synchronous reactive graph.
//!
//! - Reactive primitives (signals, plain memos, pure memos)
//! - [`LifecycleGate`]: keeps a side-effecting evaluator awake exactly while a
//!   host pure memo is observed
//! - [`AsyncBridge`]: exposes the newest settled result of an evaluator that
//!   may return a future, discarding results from superseded runs
//!
//! # Architecture
//!
//! - `reactive`: signals, memos, subscriptions, dependency tracking
//! - `lifecycle`: the wake/sleep gate
//! - `bridge`: the generation-checked async bridge
//! - `error`: construction errors and rejection reasons
//!
//! # Example
//!
//! ```rust
//! use drowse_core::reactive::{Channel, Observable, Signal};
//! use drowse_core::{AsyncBridge, BridgeOptions, Outcome};
//!
//! let query = Signal::new(2);
//! let query_clone = query.clone();
//! let squared = AsyncBridge::new(
//!     move || Outcome::Ready(query_clone.get() * query_clone.get()),
//!     BridgeOptions::new().initial_value(0),
//! );
//!
//! // Nothing runs until the bridge is observed.
//! assert_eq!(squared.generation(), 0);
//!
//! let _observer = squared.subscribe(Channel::Change, || {});
//! assert_eq!(squared.get(), Some(4));
//!
//! query.set(3);
//! assert_eq!(squared.get(), Some(9));
//! ```

pub mod bridge;
pub mod error;
pub mod lifecycle;
pub mod reactive;

pub use bridge::{AsyncBridge, BridgeOptions, CurrentRuntime, Outcome, Spawn};
pub use error::{ConfigurationError, Rejection, SpawnError};
pub use lifecycle::LifecycleGate;

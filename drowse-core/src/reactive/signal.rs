//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a mutable cell that
//! notifies its `Change` subscribers when its value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (a memo evaluation),
//!    the signal records itself as a dependency of that memo.
//!
//! 2. After the evaluation the memo subscribes to the `Change` channel of
//!    every dependency it read.
//!
//! 3. Setting a different value fires `Change`. Setting an equal value
//!    (by `PartialEq`) does nothing.
//!
//! # Thread Safety
//!
//! The value is protected by a `parking_lot::RwLock`, and no lock is held
//! while subscribers run.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::node::{NodeId, NodeKind};
use super::subscriber::{Callback, Channel, EventHub, Observable, Subscription};

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use drowse_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Unique identifier for this signal.
    id: NodeId,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Change subscribers.
    hub: Arc<EventHub>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: NodeId::new(),
            value: Arc::new(RwLock::new(value)),
            hub: Arc::new(EventHub::new()),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the signal
    /// as a dependency of the running computation.
    pub fn get(&self) -> T {
        ReactiveContext::track_dependency(self.id, || Arc::new(self.clone()) as Arc<dyn Observable>);
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify subscribers if it differs from the old one.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return false;
            }
            *guard = value;
        }

        self.hub.emit(Channel::Change);
        true
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&*guard)
        };
        self.set(new_value)
    }
}

impl<T> Observable for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn subscribe_callback(&self, channel: Channel, callback: Callback) -> Subscription {
        EventHub::subscribe(&self.hub, channel, callback)
    }

    fn subscriber_count(&self, channel: Channel) -> usize {
        self.hub.count(channel)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count(Channel::Change))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        assert!(signal.set(42));
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let _subscription = signal.subscribe(Channel::Change, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_skips_equal_writes() {
        let signal = Signal::new("same");
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let _subscription = signal.subscribe(Channel::Change, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!signal.set("same"));
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let mut subscription = signal.subscribe(Channel::Change, move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(signal.subscriber_count(Channel::Change), 1);

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        subscription.dispose();
        assert_eq!(signal.subscriber_count(Channel::Change), 0);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_is_a_source() {
        let signal = Signal::new(());
        assert_eq!(signal.kind(), NodeKind::Source);
        assert_eq!(signal.node_id(), signal.id());
    }
}

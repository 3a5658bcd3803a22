//! Subscriptions and event channels.
//!
//! Every node owns an [`EventHub`] holding the callbacks registered against
//! its named channels. Registering a callback yields a [`Subscription`], a
//! disposable handle that detaches the callback exactly once.
//!
//! # Channels
//!
//! - [`Channel::Change`]: the node's value changed.
//! - [`Channel::Awake`]: a pure memo went from zero to one `Change` subscriber.
//! - [`Channel::Asleep`]: a pure memo went from one to zero `Change` subscribers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::node::{NodeId, NodeKind};

/// Callback invoked when a channel fires.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a subscription.
///
/// Each registered callback gets a unique ID. The ID is what a
/// [`Subscription`] uses to find and remove its callback on disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named event channel on an observable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Change,
    Awake,
    Asleep,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Change => "change",
            Channel::Awake => "awake",
            Channel::Asleep => "asleep",
        };
        f.write_str(name)
    }
}

/// Anything that can be subscribed to: signals, memos, bridges.
///
/// This is the whole contract the lifecycle gate needs from its host.
pub trait Observable: Send + Sync {
    /// Identity of the underlying node.
    fn node_id(&self) -> NodeId;

    /// What kind of node this is. Only [`NodeKind::Pure`] nodes emit
    /// `Awake`/`Asleep`.
    fn kind(&self) -> NodeKind;

    /// Register `callback` on `channel`.
    fn subscribe_callback(&self, channel: Channel, callback: Callback) -> Subscription;

    /// Number of live subscriptions on `channel`.
    fn subscriber_count(&self, channel: Channel) -> usize;

    /// Register a closure on `channel`.
    fn subscribe<F>(&self, channel: Channel, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_callback(channel, Arc::new(f))
    }
}

/// A registered callback.
pub(crate) struct Subscriber {
    channel: Channel,
    notify: Callback,
}

impl Subscriber {
    fn new(channel: Channel, notify: Callback) -> Self {
        Self { channel, notify }
    }

    /// Notify the subscriber that its channel fired.
    fn notify(&self) {
        (self.notify)();
    }
}

/// Per-node registry of channel subscribers.
///
/// Callbacks are kept in registration order, which is also the order they
/// are notified in.
pub(crate) struct EventHub {
    subscribers: Mutex<IndexMap<SubscriberId, Subscriber>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn add(&self, channel: Channel, notify: Callback) -> SubscriberId {
        let id = SubscriberId::new();
        self.subscribers
            .lock()
            .insert(id, Subscriber::new(channel, notify));
        id
    }

    /// Remove a subscriber, returning the channel it was registered on.
    pub(crate) fn remove(&self, id: SubscriberId) -> Option<Channel> {
        self.subscribers
            .lock()
            .shift_remove(&id)
            .map(|subscriber| subscriber.channel)
    }

    pub(crate) fn count(&self, channel: Channel) -> usize {
        self.subscribers
            .lock()
            .values()
            .filter(|subscriber| subscriber.channel == channel)
            .count()
    }

    /// Invoke every callback registered on `channel`.
    ///
    /// The lock is released before any callback runs, so callbacks may
    /// subscribe or dispose freely. A callback disposed by an earlier callback
    /// in the same emission is skipped. Callbacks run untracked.
    pub(crate) fn emit(&self, channel: Channel) {
        let snapshot: SmallVec<[(SubscriberId, Subscriber); 4]> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(_, subscriber)| subscriber.channel == channel)
            .map(|(id, subscriber)| {
                (*id, Subscriber::new(channel, Arc::clone(&subscriber.notify)))
            })
            .collect();

        for (id, subscriber) in snapshot {
            let live = self.subscribers.lock().contains_key(&id);
            if live {
                ReactiveContext::untracked(|| subscriber.notify());
            }
        }
    }

    /// Register `notify` and wrap it in a handle that removes it again.
    pub(crate) fn subscribe(hub: &Arc<EventHub>, channel: Channel, notify: Callback) -> Subscription {
        let id = hub.add(channel, notify);
        let weak: Weak<EventHub> = Arc::downgrade(hub);
        Subscription::new(id, channel, move || {
            if let Some(hub) = weak.upgrade() {
                hub.remove(id);
            }
        })
    }
}

/// Disposable handle for one registered callback.
///
/// Disposal is idempotent: the first [`dispose`](Subscription::dispose)
/// detaches the callback, later calls do nothing. Dropping the handle
/// disposes it.
#[must_use = "dropping a Subscription disposes it immediately"]
pub struct Subscription {
    id: SubscriberId,
    channel: Channel,
    disposer: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new<F>(id: SubscriberId, channel: Channel, disposer: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            id,
            channel,
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Get the subscription's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer.is_none()
    }

    /// Permanently detach the callback.
    pub fn dispose(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

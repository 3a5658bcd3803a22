//! Memo Implementation
//!
//! A Memo is a derived value: it runs a computation, caches the result, and
//! re-runs when a dependency it read changes.
//!
//! # Two Flavors
//!
//! - [`Memo::new`] builds a *plain* memo. It evaluates immediately, stays
//!   subscribed to its dependencies for its whole life, and re-evaluates on
//!   every dependency change whether or not anyone observes it.
//!
//! - [`Memo::pure`] builds a *pure* memo. It is dormant while it has no
//!   `Change` subscribers: reading it evaluates on demand but subscribes to
//!   nothing. The first `Change` subscriber wakes it: it evaluates at once,
//!   subscribes to its dependencies, and fires `Awake`. When the last `Change`
//!   subscriber is disposed it drops its dependency subscriptions and fires
//!   `Asleep`.
//!
//! # Notification
//!
//! A live memo re-evaluates synchronously inside the notification of the
//! dependency that changed, and fires its own `Change` only if the new value
//! differs (by `PartialEq`). All of this completes before the write that
//! started it returns.
//!
//! A dependency can change while the memo is still evaluating, for example
//! when re-subscribing wakes a pure dependency whose value moves as it wakes.
//! That change is remembered and the memo runs again as soon as the current
//! run finishes.
//!
//! # Thread Safety
//!
//! State lives behind `parking_lot` locks inside an `Arc`. No lock is held
//! while the computation or any subscriber runs.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::context::ReactiveContext;
use super::node::{NodeId, NodeKind};
use super::subscriber::{Callback, Channel, EventHub, Observable, Subscription};

/// Back-to-back re-runs allowed before a memo gives up and stays dirty.
const MAX_RERUNS: usize = 100;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo must re-evaluate before its value can be trusted.
    Dirty,
}

/// A cached derived value.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. The `PartialEq` bound is what
///   decides whether a re-evaluation counts as a change.
///
/// Cloning a memo yields another handle to the same node.
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T> {
    id: NodeId,
    kind: NodeKind,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    state: Mutex<MemoState>,
    /// `Change` subscriptions on every dependency read by the last tracked
    /// evaluation.
    sources: Mutex<Vec<Subscription>>,
    hub: EventHub,
    awake: AtomicBool,
    evaluating: AtomicBool,
    /// A dependency changed during the current run.
    rerun: AtomicBool,
    evaluations: AtomicUsize,
}

/// Clears the `evaluating` flag even if the computation panics.
struct EvaluatingGuard<'a>(&'a AtomicBool);

impl<'a> EvaluatingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for EvaluatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a plain memo. The computation runs immediately.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let memo = Self::build(NodeKind::Derived, compute);
        memo.inner.evaluate(true, false);
        memo
    }

    /// Create a pure memo. The computation does not run until the memo is
    /// read or subscribed to.
    pub fn pure<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(NodeKind::Pure, compute)
    }

    fn build<F>(kind: NodeKind, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MemoInner {
                id: NodeId::new(),
                kind,
                compute: Box::new(compute),
                value: RwLock::new(None),
                state: Mutex::new(MemoState::Dirty),
                sources: Mutex::new(Vec::new()),
                hub: EventHub::new(),
                awake: AtomicBool::new(false),
                evaluating: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                evaluations: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, evaluating if necessary.
    ///
    /// Inside a reactive context this also records the memo as a dependency
    /// of the running computation.
    pub fn get(&self) -> T {
        ReactiveContext::track_dependency(self.inner.id, || {
            Arc::new(self.clone()) as Arc<dyn Observable>
        });
        self.inner.read()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.read()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.lock()
    }

    /// Whether the memo is currently following its dependencies.
    ///
    /// Plain memos are always awake. Pure memos are awake while they have at
    /// least one `Change` subscriber.
    pub fn is_awake(&self) -> bool {
        self.inner.is_live()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of times the computation has run.
    pub fn evaluation_count(&self) -> usize {
        self.inner.evaluations.load(Ordering::SeqCst)
    }

    /// Number of dependencies the memo is currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }
}

impl<T> MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn is_live(&self) -> bool {
        self.kind == NodeKind::Derived || self.awake.load(Ordering::SeqCst)
    }

    fn read(self: &Arc<Self>) -> T {
        let state = *self.state.lock();
        if state == MemoState::Clean {
            if let Some(value) = self.value.read().clone() {
                return value;
            }
        }
        let live = self.is_live();
        self.evaluate(live, live)
    }

    /// Run the computation, then again for as long as a dependency changed
    /// under the previous run.
    ///
    /// With `track` set, the memo re-subscribes to exactly the dependencies
    /// this run read. With `notify` set, `Change` fires if the value changed.
    /// Re-runs always notify.
    fn evaluate(self: &Arc<Self>, track: bool, notify: bool) -> T {
        let mut value = self.evaluate_once(track, notify);
        let mut reruns = 0;
        while track && self.rerun.swap(false, Ordering::SeqCst) && self.is_live() {
            if reruns == MAX_RERUNS {
                warn!(node = %self.id, reruns, "dependencies keep changing during evaluation; leaving dirty");
                *self.state.lock() = MemoState::Dirty;
                break;
            }
            reruns += 1;
            trace!(node = %self.id, reruns, "re-running after dependency changed mid-evaluation");
            value = self.evaluate_once(true, true);
        }
        value
    }

    fn evaluate_once(self: &Arc<Self>, track: bool, notify: bool) -> T {
        let evaluating = EvaluatingGuard::enter(&self.evaluating);
        self.rerun.store(false, Ordering::SeqCst);
        if track {
            *self.state.lock() = MemoState::Clean;
        }

        let ctx = ReactiveContext::enter(self.id);
        let value = (self.compute)();
        let dependencies = ctx.take_dependencies();
        drop(ctx);
        self.evaluations.fetch_add(1, Ordering::SeqCst);

        // The computation may have disposed our last subscriber.
        let track = track && self.is_live();
        if track {
            self.resubscribe(dependencies);
        } else {
            *self.state.lock() = MemoState::Dirty;
        }

        let changed = {
            let mut slot = self.value.write();
            let changed = slot.as_ref() != Some(&value);
            *slot = Some(value.clone());
            changed
        };
        drop(evaluating);

        if notify && changed {
            self.hub.emit(Channel::Change);
        }
        value
    }

    fn resubscribe(self: &Arc<Self>, dependencies: Vec<Arc<dyn Observable>>) {
        let weak = Arc::downgrade(self);
        // Subscribe to the new set before dropping the old one, so a pure
        // dependency read by both runs is never put to sleep in between.
        let fresh: Vec<Subscription> = dependencies
            .iter()
            .map(|dependency| {
                let weak = weak.clone();
                let on_change: Callback = Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.dependency_changed();
                    }
                });
                dependency.subscribe_callback(Channel::Change, on_change)
            })
            .collect();

        let stale = std::mem::replace(&mut *self.sources.lock(), fresh);
        drop(stale);
    }

    fn dependency_changed(self: &Arc<Self>) {
        if !self.is_live() {
            return;
        }
        if self.evaluating.load(Ordering::SeqCst) {
            debug!(node = %self.id, "dependency changed during evaluation; re-run queued");
            *self.state.lock() = MemoState::Dirty;
            self.rerun.store(true, Ordering::SeqCst);
            return;
        }
        self.evaluate(true, true);
    }

    fn awaken(self: &Arc<Self>) {
        if self.awake.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(node = %self.id, "pure memo awake");
        self.evaluate(true, false);
        self.hub.emit(Channel::Awake);
    }

    fn sleep_if_unobserved(&self) {
        if self.kind != NodeKind::Pure || self.hub.count(Channel::Change) != 0 {
            return;
        }
        if !self.awake.swap(false, Ordering::SeqCst) {
            return;
        }
        let stale = std::mem::take(&mut *self.sources.lock());
        drop(stale);
        *self.state.lock() = MemoState::Dirty;
        trace!(node = %self.id, "pure memo asleep");
        self.hub.emit(Channel::Asleep);
    }
}

impl<T> Observable for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.inner.id
    }

    fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    fn subscribe_callback(&self, channel: Channel, callback: Callback) -> Subscription {
        let id = self.inner.hub.add(channel, callback);
        if channel == Channel::Change && self.inner.kind == NodeKind::Pure {
            self.inner.awaken();
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(id, channel, move || {
            if let Some(inner) = weak.upgrade() {
                inner.hub.remove(id);
                if channel == Channel::Change {
                    inner.sleep_if_unobserved();
                }
            }
        })
    }

    fn subscriber_count(&self, channel: Channel) -> usize {
        self.inner.hub.count(channel)
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("awake", &self.is_awake())
            .field("value", &*self.inner.value.read())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

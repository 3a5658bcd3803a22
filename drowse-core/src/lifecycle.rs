//! Lifecycle Gate
//!
//! A gate runs a side-effecting evaluator in its own pure memo (the *inner*
//! memo) and keeps that memo awake exactly while a *host* pure memo is
//! observed.
//!
//! # States
//!
//! | State   | Wake handle | Inner memo                          |
//! |---------|-------------|-------------------------------------|
//! | Dormant | none        | asleep, evaluator does not run      |
//! | Active  | held        | awake, re-runs on dependency change |
//!
//! The gate goes Active when the host fires `Awake` (or already has `Change`
//! subscribers when the gate is built), and Dormant when the host fires
//! `Asleep`. Going Active subscribes a no-op callback to the inner memo's
//! `Change` channel, which is what wakes it and runs the evaluator once.
//! Going Dormant disposes that subscription.
//!
//! The gate's subscriptions to the host live as long as the
//! [`LifecycleGate`] value. Dropping the gate also drops the wake handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::ConfigurationError;
use crate::reactive::{Channel, Memo, NodeId, Observable, Subscription};

/// Keeps an evaluator's memo awake while a host memo is observed.
pub struct LifecycleGate<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    host: NodeId,
    state: Arc<GateState<R>>,
    _host_awake: Subscription,
    _host_asleep: Subscription,
}

struct GateState<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Memo<R>,
    status: Mutex<GateStatus>,
}

enum GateStatus {
    Dormant,
    /// The wake handle is being acquired. The inner evaluator is running.
    Waking,
    Active(Subscription),
}

impl<R> LifecycleGate<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    /// Build a gate on `host` around `evaluator`.
    ///
    /// Fails if `host` is not a pure memo. Nothing is evaluated in that case.
    pub fn new<H, F>(host: &H, evaluator: F) -> Result<Self, ConfigurationError>
    where
        H: Observable + ?Sized,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let kind = host.kind();
        if !kind.has_lifecycle() {
            return Err(ConfigurationError::HostNotPure {
                node: host.node_id(),
                kind,
            });
        }
        Ok(Self::attach(host, evaluator))
    }

    /// Build a gate on a host already known to be a pure memo.
    pub(crate) fn attach<H, F>(host: &H, evaluator: F) -> Self
    where
        H: Observable + ?Sized,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let state = Arc::new(GateState {
            inner: Memo::pure(evaluator),
            status: Mutex::new(GateStatus::Dormant),
        });

        if host.subscriber_count(Channel::Change) != 0 {
            state.wake();
        }

        let on_awake = {
            let state = Arc::clone(&state);
            host.subscribe_callback(Channel::Awake, Arc::new(move || state.wake()))
        };
        let on_asleep = {
            let state = Arc::clone(&state);
            host.subscribe_callback(Channel::Asleep, Arc::new(move || state.sleep()))
        };

        debug!(
            host = %host.node_id(),
            inner = %state.inner.id(),
            active = state.is_active(),
            "lifecycle gate created"
        );

        Self {
            host: host.node_id(),
            state,
            _host_awake: on_awake,
            _host_asleep: on_asleep,
        }
    }

    /// Like [`LifecycleGate::new`], handing `context` to the evaluator on
    /// every run.
    pub fn with_context<H, C, F>(host: &H, context: C, evaluator: F) -> Result<Self, ConfigurationError>
    where
        H: Observable + ?Sized,
        C: Send + Sync + 'static,
        F: Fn(&C) -> R + Send + Sync + 'static,
    {
        Self::new(host, move || evaluator(&context))
    }

    /// The memo wrapping the evaluator.
    pub fn inner(&self) -> &Memo<R> {
        &self.state.inner
    }

    /// The host this gate follows.
    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Acquire the wake handle. No-op if already active.
    pub fn wake(&self) {
        self.state.wake();
    }

    /// Dispose the wake handle. No-op if already dormant.
    pub fn sleep(&self) {
        self.state.sleep();
    }
}

impl<R> GateState<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    fn is_active(&self) -> bool {
        matches!(*self.status.lock(), GateStatus::Active(_))
    }

    fn wake(&self) {
        {
            let mut status = self.status.lock();
            if !matches!(*status, GateStatus::Dormant) {
                return;
            }
            *status = GateStatus::Waking;
        }

        // Subscribing runs the evaluator, which may fire host events that
        // re-enter this gate, so the lock is not held here.
        let handle = self.inner.subscribe(Channel::Change, || {});

        let mut status = self.status.lock();
        if matches!(*status, GateStatus::Waking) {
            *status = GateStatus::Active(handle);
            drop(status);
            trace!(inner = %self.inner.id(), "lifecycle gate active");
        } else {
            // Put to sleep while waking.
            drop(status);
            drop(handle);
        }
    }

    fn sleep(&self) {
        let previous = std::mem::replace(&mut *self.status.lock(), GateStatus::Dormant);
        if let GateStatus::Active(handle) = previous {
            trace!(inner = %self.inner.id(), "lifecycle gate dormant");
            drop(handle);
        }
    }
}

impl<R> fmt::Debug for LifecycleGate<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleGate")
            .field("host", &self.host)
            .field("inner", &self.state.inner.id())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{NodeKind, Signal};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_evaluator() -> (Arc<AtomicI32>, impl Fn() + Send + Sync + 'static) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        (runs, move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn rejects_signal_host() {
        let host = Signal::new(0);
        let (runs, evaluator) = counting_evaluator();

        let err = LifecycleGate::new(&host, evaluator).unwrap_err();

        assert_eq!(
            err,
            ConfigurationError::HostNotPure {
                node: host.id(),
                kind: NodeKind::Source
            }
        );
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejects_plain_memo_host() {
        let host = Memo::new(|| 1);
        let _observer = host.subscribe(Channel::Change, || {});
        let (runs, evaluator) = counting_evaluator();

        let result = LifecycleGate::new(&host, evaluator);

        assert!(matches!(
            result,
            Err(ConfigurationError::HostNotPure { kind: NodeKind::Derived, .. })
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dormant_until_host_is_observed() {
        let host = Memo::pure(|| 0);
        let (runs, evaluator) = counting_evaluator();

        let gate = LifecycleGate::new(&host, evaluator).unwrap();
        assert!(!gate.is_active());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let _observer = host.subscribe(Channel::Change, || {});
        assert!(gate.is_active());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn starts_active_when_host_already_observed() {
        let host = Memo::pure(|| 0);
        let _observer = host.subscribe(Channel::Change, || {});
        let (runs, evaluator) = counting_evaluator();

        let gate = LifecycleGate::new(&host, evaluator).unwrap();

        assert!(gate.is_active());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wake_is_idempotent() {
        let host = Memo::pure(|| 0);
        let (runs, evaluator) = counting_evaluator();
        let gate = LifecycleGate::new(&host, evaluator).unwrap();

        gate.wake();
        gate.wake();
        assert_eq!(gate.inner().subscriber_count(Channel::Change), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        gate.sleep();
        assert!(!gate.is_active());
        assert!(!gate.inner().is_awake());
        assert_eq!(gate.inner().subscriber_count(Channel::Change), 0);

        gate.sleep();
        assert!(!gate.is_active());
    }

    #[test]
    fn follows_host_lifecycle() {
        let trigger = Signal::new(0);
        let host = Memo::pure(|| ());
        let (runs, count) = counting_evaluator();
        let trigger_clone = trigger.clone();
        let gate = LifecycleGate::new(&host, move || {
            count();
            trigger_clone.get()
        })
        .unwrap();

        let mut observer = host.subscribe(Channel::Change, || {});
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(gate.inner().get(), 1);

        observer.dispose();
        assert!(!gate.is_active());
        assert_eq!(trigger.subscriber_count(Channel::Change), 0);

        trigger.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        let _again = host.subscribe(Channel::Change, || {});
        assert!(gate.is_active());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn context_reaches_evaluator() {
        let host = Memo::pure(|| 0);
        let _observer = host.subscribe(Channel::Change, || {});

        let gate = LifecycleGate::with_context(&host, String::from("ctx"), |ctx: &String| ctx.len()).unwrap();

        assert_eq!(gate.inner().get(), 3);
    }

    #[test]
    fn dropping_gate_releases_inner() {
        let host = Memo::pure(|| 0);
        let _observer = host.subscribe(Channel::Change, || {});
        let (_, evaluator) = counting_evaluator();
        let gate = LifecycleGate::new(&host, evaluator).unwrap();
        let inner = gate.inner().clone();

        assert!(inner.is_awake());
        assert_eq!(host.subscriber_count(Channel::Awake), 1);

        drop(gate);

        assert!(!inner.is_awake());
        assert_eq!(host.subscriber_count(Channel::Awake), 0);
        assert_eq!(host.subscriber_count(Channel::Asleep), 0);
    }
}

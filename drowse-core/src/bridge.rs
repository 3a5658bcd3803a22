//! Async Bridge
//!
//! An [`AsyncBridge`] exposes the latest settled result of an evaluator that
//! may finish asynchronously, as an ordinary pure memo.
//!
//! # How It Works
//!
//! 1. The bridge keeps its result in a private signal (`latest`) and exposes
//!    it through a pure memo (the *output*), so nothing outside the bridge
//!    can write it.
//!
//! 2. A [`LifecycleGate`] hosted on the output runs the evaluator whenever
//!    the output is observed and the evaluator's dependencies change.
//!
//! 3. Each run takes a new generation number *before* calling the evaluator.
//!    A [`Outcome::Ready`] result is applied at once. A [`Outcome::Pending`]
//!    result is spawned, and applied when it settles only if its generation
//!    is still the newest one issued.
//!
//! Superseded calls are not cancelled. Their futures run to completion and
//! their results are dropped.
//!
//! # Errors
//!
//! A rejected future never surfaces as an error. The output becomes the
//! configured error value, which falls back to the initial value, which
//! falls back to `None`. A pending result that cannot be spawned is treated
//! the same way.

use std::fmt;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::ReentrantMutex;
use tracing::{debug, error, trace};

use crate::error::{Rejection, SpawnError};
use crate::lifecycle::LifecycleGate;
use crate::reactive::{Callback, Channel, Memo, NodeId, NodeKind, Observable, Signal, Subscription};

/// What one evaluator run produced.
pub enum Outcome<T> {
    /// A value available now.
    Ready(T),
    /// A value that will arrive later, or a rejection.
    Pending(BoxFuture<'static, Result<T, Rejection>>),
}

impl<T> Outcome<T>
where
    T: Send + 'static,
{
    /// Wrap a fallible future. Any error is reduced to its display text.
    pub fn pending<Fut, E>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        Outcome::Pending(future.map(|result| result.map_err(Rejection::new)).boxed())
    }

    /// Wrap a future that cannot fail.
    pub fn resolving<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        Outcome::Pending(future.map(Ok).boxed())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Outcome::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Drives pending evaluations to completion.
pub trait Spawn: Send + Sync {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), SpawnError>;
}

impl Spawn for tokio::runtime::Handle {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), SpawnError> {
        drop(tokio::runtime::Handle::spawn(self, task));
        Ok(())
    }
}

/// Spawns onto whichever tokio runtime is current when a run goes pending.
///
/// Fails with [`SpawnError::NoRuntime`] outside a runtime; the bridge then
/// applies its error value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentRuntime;

impl Spawn for CurrentRuntime {
    fn spawn(&self, task: BoxFuture<'static, ()>) -> Result<(), SpawnError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| SpawnError::NoRuntime(err.to_string()))?;
        drop(handle.spawn(task));
        Ok(())
    }
}

/// Construction options for an [`AsyncBridge`].
pub struct BridgeOptions<T> {
    initial_value: Option<T>,
    error_value: Option<T>,
    spawner: Arc<dyn Spawn>,
}

impl<T> BridgeOptions<T> {
    pub fn new() -> Self {
        Self {
            initial_value: None,
            error_value: None,
            spawner: Arc::new(CurrentRuntime),
        }
    }

    /// Output value before the first result is applied.
    pub fn initial_value(mut self, value: T) -> Self {
        self.initial_value = Some(value);
        self
    }

    /// Output value after a rejection. Defaults to the initial value.
    pub fn error_value(mut self, value: T) -> Self {
        self.error_value = Some(value);
        self
    }

    /// Where pending evaluations run. Defaults to [`CurrentRuntime`].
    pub fn spawner(mut self, spawner: impl Spawn + 'static) -> Self {
        self.spawner = Arc::new(spawner);
        self
    }
}

impl<T: Clone> BridgeOptions<T> {
    fn effective_error_value(&self) -> Option<T> {
        self.error_value.clone().or_else(|| self.initial_value.clone())
    }
}

impl<T> Default for BridgeOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for BridgeOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeOptions")
            .field("initial_value", &self.initial_value)
            .field("error_value", &self.error_value)
            .finish_non_exhaustive()
    }
}

/// Generation bookkeeping for one bridge.
///
/// Every write to `latest` goes through [`CallTracker::settle`], which holds
/// `apply` across the generation check and the write. The lock is
/// re-entrant because the write notifies subscribers, which may start a new
/// synchronous run that settles on the same thread.
struct CallTracker<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    generation: AtomicU64,
    apply: ReentrantMutex<()>,
    latest: Signal<Option<T>>,
    error_value: Option<T>,
}

impl<T> CallTracker<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn run<F>(self: &Arc<Self>, evaluator: &F, spawner: &dyn Spawn)
    where
        F: Fn() -> Outcome<T>,
    {
        let generation = self.begin();
        match evaluator() {
            Outcome::Ready(value) => {
                self.settle(generation, Some(value));
            }
            Outcome::Pending(future) => {
                trace!(generation, "evaluation pending");
                let calls = Arc::clone(self);
                let spawned = spawner.spawn(
                    async move {
                        match future.await {
                            Ok(value) => {
                                calls.settle(generation, Some(value));
                            }
                            Err(rejection) => {
                                debug!(generation, %rejection, "pending evaluation rejected");
                                let fallback = calls.error_value.clone();
                                calls.settle(generation, fallback);
                            }
                        }
                    }
                    .boxed(),
                );
                if let Err(err) = spawned {
                    error!(generation, %err, "pending evaluation could not be spawned");
                    self.settle(generation, self.error_value.clone());
                }
            }
        }
    }

    /// Write `value` if `generation` is still the newest. Returns whether it
    /// was applied.
    fn settle(&self, generation: u64, value: Option<T>) -> bool {
        let _apply = self.apply.lock();
        let current = self.current();
        if generation != current {
            debug!(generation, current, "discarding superseded result");
            return false;
        }
        self.latest.set(value);
        true
    }
}

/// A pure memo holding the latest result of a possibly-async evaluator.
///
/// The bridge owns the gate that drives the evaluator; keep the bridge alive
/// for as long as its output is observed.
pub struct AsyncBridge<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    output: Memo<Option<T>>,
    calls: Arc<CallTracker<T>>,
    gate: LifecycleGate<()>,
}

impl<T> AsyncBridge<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a bridge around `evaluator`.
    ///
    /// Nothing runs until the bridge is observed.
    pub fn new<F>(evaluator: F, options: BridgeOptions<T>) -> Self
    where
        F: Fn() -> Outcome<T> + Send + Sync + 'static,
    {
        let error_value = options.effective_error_value();
        let BridgeOptions {
            initial_value,
            spawner,
            ..
        } = options;

        let latest = Signal::new(initial_value);
        let output = {
            let latest = latest.clone();
            Memo::pure(move || latest.get())
        };

        let calls = Arc::new(CallTracker {
            generation: AtomicU64::new(0),
            apply: ReentrantMutex::new(()),
            latest,
            error_value,
        });

        let gate = {
            let calls = Arc::clone(&calls);
            LifecycleGate::attach(&output, move || calls.run(&evaluator, spawner.as_ref()))
        };

        Self { output, calls, gate }
    }

    /// Like [`AsyncBridge::new`], handing `context` to the evaluator on
    /// every run.
    pub fn with_context<C, F>(context: C, evaluator: F, options: BridgeOptions<T>) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C) -> Outcome<T> + Send + Sync + 'static,
    {
        Self::new(move || evaluator(&context), options)
    }

    /// Current result. Tracked when read inside a memo.
    pub fn get(&self) -> Option<T> {
        self.output.get()
    }

    /// Read-only view of the result.
    pub fn output(&self) -> &Memo<Option<T>> {
        &self.output
    }

    /// Number of evaluator runs so far.
    pub fn generation(&self) -> u64 {
        self.calls.current()
    }

    /// Whether the evaluator is currently being driven.
    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }
}

impl<T> Observable for AsyncBridge<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.output.id()
    }

    fn kind(&self) -> NodeKind {
        self.output.kind()
    }

    fn subscribe_callback(&self, channel: Channel, callback: Callback) -> Subscription {
        self.output.subscribe_callback(channel, callback)
    }

    fn subscriber_count(&self, channel: Channel) -> usize {
        self.output.subscriber_count(channel)
    }
}

impl<T> fmt::Debug for AsyncBridge<T>
where
    T: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncBridge")
            .field("output", &self.output.id())
            .field("value", &self.calls.latest.get_untracked())
            .field("generation", &self.generation())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

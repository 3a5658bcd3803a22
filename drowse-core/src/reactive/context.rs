//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal or memo is read,
//! it is recorded as a dependency of the computation on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a memo pushes an entry for it; the
//! guard returned by [`ReactiveContext::enter`] pops it again. Nested memos
//! (a memo that reads from another memo) push nested entries, so each
//! computation only sees its own reads.
//!
//! Callbacks fired by an [`EventHub`](super::subscriber::EventHub) run under
//! an untracked entry, so a subscriber that reads a value while some memo is
//! mid-evaluation does not leak that read into the memo's dependencies.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use super::node::NodeId;
use super::subscriber::Observable;

type Dependencies = SmallVec<[(NodeId, Arc<dyn Observable>); 4]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The node being evaluated, or `None` for an untracked section.
    node: Option<NodeId>,
    /// Dependencies read during this evaluation, deduplicated by node.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    node: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given node.
    ///
    /// While this context is on top of the stack, reads register themselves
    /// as dependencies of `node`.
    pub fn enter(node: NodeId) -> Self {
        Self::push(Some(node))
    }

    /// Run `f` with dependency tracking suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _guard = Self::push(None);
        f()
    }

    fn push(node: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                node,
                dependencies: SmallVec::new(),
            });
        });

        Self { node }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_node().is_some()
    }

    /// The node currently being evaluated, if tracking is on.
    pub fn current_node() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.node))
    }

    /// Record a read of `source`.
    ///
    /// `handle` is only called the first time a given node is read within
    /// the current evaluation.
    pub fn track_dependency<F>(source: NodeId, handle: F)
    where
        F: FnOnce() -> Arc<dyn Observable>,
    {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(entry) = stack.last_mut() else {
                return;
            };
            if entry.node.is_none() || entry.node == Some(source) {
                return;
            }
            if entry.dependencies.iter().any(|(id, _)| *id == source) {
                return;
            }
            entry.dependencies.push((source, handle()));
        });
    }

    /// Take the dependencies collected so far in this context.
    pub fn take_dependencies(&self) -> Vec<Arc<dyn Observable>> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(entry) => {
                    debug_assert_eq!(entry.node, self.node, "ReactiveContext is not on top of the stack");
                    entry
                        .dependencies
                        .drain(..)
                        .map(|(_, handle)| handle)
                        .collect()
                }
                None => Vec::new(),
            }
        })
    }

    /// Node ids of the dependencies collected so far in this context.
    pub fn dependency_ids(&self) -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.iter().map(|(id, _)| *id).collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.node, self.node,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.node, entry.node
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    fn handle(signal: &Signal<i32>) -> impl FnOnce() -> Arc<dyn Observable> {
        let signal = signal.clone();
        move || Arc::new(signal) as Arc<dyn Observable>
    }

    #[test]
    fn context_tracks_node() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_node().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_node(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_node().is_none());
    }

    #[test]
    fn context_deduplicates_dependencies() {
        let a = Signal::new(1);
        let b = Signal::new(2);

        let ctx = ReactiveContext::enter(NodeId::new());
        ReactiveContext::track_dependency(a.id(), handle(&a));
        ReactiveContext::track_dependency(b.id(), handle(&b));
        ReactiveContext::track_dependency(a.id(), handle(&a));

        assert_eq!(ctx.dependency_ids(), vec![a.id(), b.id()]);
        assert_eq!(ctx.take_dependencies().len(), 2);
        assert!(ctx.dependency_ids().is_empty());
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_node(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_node(), Some(id2));
            }

            assert_eq!(ReactiveContext::current_node(), Some(id1));
        }

        assert!(ReactiveContext::current_node().is_none());
    }

    #[test]
    fn untracked_section_hides_reads() {
        let signal = Signal::new(0);
        let ctx = ReactiveContext::enter(NodeId::new());

        ReactiveContext::untracked(|| {
            assert!(!ReactiveContext::is_active());
            ReactiveContext::track_dependency(signal.id(), handle(&signal));
        });

        assert!(ReactiveContext::is_active());
        assert!(ctx.dependency_ids().is_empty());
    }
}

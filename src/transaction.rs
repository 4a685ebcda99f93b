//! The transaction call tree.
//!
//! A [`Transaction`] is one traced unit of work: a node holding a name,
//! timing, an error flag, and its position in the call tree. Handles are
//! cheap clones over a shared allocation; a parent owns strong handles to
//! its children while a child keeps only a weak back-reference to its
//! parent, so dropping the root releases the whole tree and nothing keeps a
//! discarded transaction alive through the registry.
//!
//! Lifecycle: [`enter`](Transaction::enter) stamps the start time and either
//! attaches to the parent or registers as the context's root;
//! [`exit`](Transaction::exit) stops the clock and, for a root, emits the
//! timing metric exactly once.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::{ContextId, current_context_id};
use crate::emit::RecordTiming;
use crate::naming;
use crate::registry::Registry;
use crate::time::{Time, TimeSource};

/// A traced unit of work: one node in a transaction tree.
///
/// Cloning produces another handle to the same node. Construct transactions
/// through [`Tracer`](crate::Tracer), which injects the clock, emitter, and
/// registry.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

/// Non-owning handle to a transaction.
///
/// Held by the registry and by child nodes; upgrading fails once every
/// strong handle has been dropped.
#[derive(Clone)]
pub struct WeakTransaction {
    inner: Weak<Inner>,
}

impl WeakTransaction {
    /// Attempts to recover a strong handle.
    #[must_use]
    pub fn upgrade(&self) -> Option<Transaction> {
        self.inner.upgrade().map(|inner| Transaction { inner })
    }

    /// Returns `true` while at least one strong handle is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

struct Inner {
    name: String,
    app_name: String,
    host: String,
    clock: Arc<dyn TimeSource>,
    emitter: Arc<dyn RecordTiming>,
    registry: Arc<Registry>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    start: Time,
    duration_nanos: u64,
    is_error: bool,
    emitted: bool,
    parent: Option<WeakTransaction>,
    children: Vec<Transaction>,
    registration: Option<(ContextId, u64)>,
}

impl Transaction {
    pub(crate) fn new(
        name: impl Into<String>,
        app_name: impl Into<String>,
        host: impl Into<String>,
        clock: Arc<dyn TimeSource>,
        emitter: Arc<dyn RecordTiming>,
        registry: Arc<Registry>,
        parent: Option<&Transaction>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                app_name: app_name.into(),
                host: host.into(),
                clock,
                emitter,
                registry,
                state: Mutex::new(State {
                    parent: parent.map(Transaction::downgrade),
                    ..State::default()
                }),
            }),
        }
    }

    /// Returns the caller-supplied transaction name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the application name captured at construction.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    /// Returns the start timestamp ([`Time::ZERO`] before `enter`).
    #[must_use]
    pub fn start_time(&self) -> Time {
        self.inner.state.lock().start
    }

    /// Returns the measured duration in nanoseconds (0 before `exit`).
    #[must_use]
    pub fn duration_nanos(&self) -> u64 {
        self.inner.state.lock().duration_nanos
    }

    /// Returns the measured duration in whole milliseconds (truncated).
    #[must_use]
    pub fn duration_millis(&self) -> u64 {
        self.duration_nanos() / 1_000_000
    }

    /// Returns `true` once [`error`](Self::error) has been called.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.inner.state.lock().is_error
    }

    /// Marks the transaction as failed. Idempotent.
    pub fn error(&self) {
        self.inner.state.lock().is_error = true;
    }

    /// Returns the parent, if a parent link is set and still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Transaction> {
        let parent = self.inner.state.lock().parent.clone();
        parent.and_then(|weak| weak.upgrade())
    }

    /// Returns `true` when no parent link is set.
    ///
    /// Root status is structural: it is decided by the link, not by whether
    /// the parent is still alive.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.state.lock().parent.is_none()
    }

    /// Returns handles to the children, in insertion order.
    #[must_use]
    pub fn children(&self) -> Vec<Transaction> {
        self.inner.state.lock().children.clone()
    }

    /// Returns a non-owning handle to this transaction.
    #[must_use]
    pub fn downgrade(&self) -> WeakTransaction {
        WeakTransaction {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` when both handles point at the same node.
    #[must_use]
    pub fn same(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Starts the transaction.
    ///
    /// Stamps the start time, then attaches to the parent when a parent link
    /// is set, or registers as the current context's root transaction
    /// (overwriting any previous root for this context — last writer wins).
    /// Returns `&self` for chained use.
    pub fn enter(&self) -> &Self {
        let now = self.inner.clock.now();
        let parent = {
            let mut state = self.inner.state.lock();
            state.start = now;
            state.parent.clone()
        };

        match parent {
            Some(weak) => {
                if let Some(parent) = weak.upgrade() {
                    parent.add_child(self);
                }
            }
            None => {
                let context = current_context_id();
                let generation = self.inner.registry.set_current(context, self);
                self.inner.state.lock().registration = Some((context, generation));
            }
        }

        self
    }

    /// Stops the transaction and, for a root, emits its timing metric.
    ///
    /// The duration is recomputed from the unchanged start time on a
    /// repeated call, but a root emits at most once.
    pub fn exit(&self) {
        let now = self.inner.clock.now();
        let emit = {
            let mut state = self.inner.state.lock();
            state.duration_nanos = now.duration_since(state.start);
            let is_root = state.parent.is_none();
            if is_root && !state.emitted {
                state.emitted = true;
                Some((state.is_error, state.duration_nanos / 1_000_000))
            } else {
                None
            }
        };

        if let Some((is_error, millis)) = emit {
            let name = naming::metric_name(
                &[self.name()],
                self.app_name(),
                &self.inner.host,
                is_error,
            );
            tracing::debug!(metric = %name, millis, "transaction complete");
            self.inner.emitter.record_timing(&name, millis);
        }
    }

    /// Appends `child` to this transaction's children.
    ///
    /// Sets the child's parent link to `self` when it is still unset; an
    /// existing link is never reassigned. Append order defines traversal
    /// order.
    pub fn add_child(&self, child: &Transaction) {
        {
            let mut child_state = child.inner.state.lock();
            if child_state.parent.is_none() {
                child_state.parent = Some(self.downgrade());
            }
        }
        self.inner.state.lock().children.push(child.clone());
    }

    /// Returns a lazy post-order traversal of the subtree rooted here.
    ///
    /// Every node is visited exactly once, all children (in insertion
    /// order) strictly before their parent. Re-invoking restarts the
    /// traversal.
    #[must_use]
    pub fn all_transactions(&self) -> AllTransactions {
        AllTransactions {
            stack: vec![Frame::new(self.clone())],
        }
    }

    /// Builds the dotted metric name for this node's ancestor chain.
    ///
    /// Status reflects the error flag at the moment of the call. Pure with
    /// respect to the tree: no side effects, deterministic for a given
    /// tree shape.
    #[must_use]
    pub fn metric_name(&self) -> String {
        let mut names = vec![self.inner.name.clone()];
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            names.push(node.inner.name.clone());
            cursor = node.parent();
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        naming::metric_name(&refs, self.app_name(), &self.inner.host, self.is_error())
    }

    /// Returns the context registration recorded by a root `enter`.
    pub(crate) fn registration(&self) -> Option<(ContextId, u64)> {
        self.inner.state.lock().registration
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Transaction")
            .field("name", &self.inner.name)
            .field("app_name", &self.inner.app_name)
            .field("start", &state.start)
            .field("duration_nanos", &state.duration_nanos)
            .field("is_error", &state.is_error)
            .field("children", &state.children.len())
            .finish_non_exhaustive()
    }
}

struct Frame {
    node: Transaction,
    children: std::vec::IntoIter<Transaction>,
}

impl Frame {
    fn new(node: Transaction) -> Self {
        let children = node.children().into_iter();
        Self { node, children }
    }
}

/// Post-order iterator over a transaction subtree.
///
/// Returned by [`Transaction::all_transactions`].
pub struct AllTransactions {
    stack: Vec<Frame>,
}

impl Iterator for AllTransactions {
    type Item = Transaction;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.children.next() {
                Some(child) => self.stack.push(Frame::new(child)),
                None => {
                    let frame = self.stack.pop()?;
                    return Some(frame.node);
                }
            }
        }
    }
}

//! Tracer and tracing facade.
//!
//! A [`Tracer`] bundles the dependencies every transaction needs — app name,
//! host, clock, emitter, registry — so the core never reads ambient
//! globals. Production code builds one with [`Tracer::from_config`]; tests
//! inject a manual clock and a capture emitter through [`TracerBuilder`].
//!
//! On top of the enter/exit contract the facade offers:
//!
//! - [`Tracer::start`] — RAII scope guard; exit runs on every path out of
//!   the guarded region, including unwinding.
//! - [`transaction_trace`] / [`function_trace`] — run a closure inside a
//!   root or child transaction. `function_trace` with no active transaction
//!   runs the closure untraced; that is a valid state, not an error.
//! - [`try_transaction_trace`] / [`try_function_trace`] — `Result`-aware
//!   variants that tag the error flag on `Err` and return it unchanged.
//! - [`transaction_trace_wrap`] / [`function_trace_wrap`] — higher-order
//!   builders returning an instrumented closure (the decorator analog).
//!
//! Tracing is observationally transparent: panics and error values from
//! guarded code propagate with type and payload untouched.

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{Config, ConfigError, KEY_APP_NAME};
use crate::context::{ContextId, current_context_id};
use crate::emit::{self, EmitError, NullEmitter, RecordTiming};
use crate::naming;
use crate::registry::Registry;
use crate::time::{TimeSource, WallClock};
use crate::transaction::Transaction;

/// Error constructing a [`Tracer`] from configuration.
#[derive(Debug, Error)]
pub enum TracerError {
    /// Required configuration is absent or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The statsd emitter could not be constructed.
    #[error(transparent)]
    Emit(#[from] EmitError),
}

struct Shared {
    app_name: String,
    host: String,
    clock: Arc<dyn TimeSource>,
    emitter: Arc<dyn RecordTiming>,
    registry: Arc<Registry>,
}

/// Entry point for creating and looking up transactions.
///
/// Cheap to clone; all clones share the same registry and emitter.
#[derive(Clone)]
pub struct Tracer {
    shared: Arc<Shared>,
}

impl Tracer {
    /// Builds a tracer from process configuration.
    ///
    /// Requires `APP_NAME`; wires the process-wide statsd client from
    /// `STATSD_HOST`/`STATSD_PORT` (constructed on first use, first
    /// success wins). Fails fast on missing configuration — nothing here is
    /// retried silently.
    pub fn from_config(config: &Config) -> Result<Self, TracerError> {
        let app_name = config.require(KEY_APP_NAME)?.to_string();
        let emitter = emit::global_client(config)?;
        Ok(Self::builder(app_name).emitter(emitter).build())
    }

    /// Starts building a tracer with explicit dependencies.
    #[must_use]
    pub fn builder(app_name: impl Into<String>) -> TracerBuilder {
        TracerBuilder {
            app_name: app_name.into(),
            host: None,
            clock: None,
            emitter: None,
        }
    }

    /// Returns the application name stamped on every transaction.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.shared.app_name
    }

    /// Returns the host name used in metric names.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.shared.host
    }

    /// Returns the active-transaction registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Constructs a root-candidate transaction. No registry side effect.
    #[must_use]
    pub fn transaction(&self, name: impl Into<String>) -> Transaction {
        self.new_transaction(name, None)
    }

    /// Constructs a transaction parented under `parent`.
    ///
    /// The attachment happens on `enter`.
    #[must_use]
    pub fn child(&self, name: impl Into<String>, parent: &Transaction) -> Transaction {
        self.new_transaction(name, Some(parent))
    }

    /// Returns the transaction active in the current execution context.
    ///
    /// `None` when nothing is registered or the previously registered root
    /// has been discarded by its owner.
    #[must_use]
    pub fn current(&self) -> Option<Transaction> {
        self.shared.registry.get_current(current_context_id())
    }

    /// Enters a new root transaction and returns its scope guard.
    ///
    /// The guard exits the transaction and releases its registry slot when
    /// dropped, on every path out of the scope.
    #[must_use]
    pub fn start(&self, name: impl Into<String>) -> TransactionGuard {
        let transaction = self.transaction(name);
        transaction.enter();
        let registration = transaction.registration();
        TransactionGuard {
            transaction,
            registration,
            registry: self.shared.registry.clone(),
            _not_send: PhantomData,
        }
    }

    /// Enters a new child transaction under `parent` and returns its guard.
    #[must_use]
    pub fn start_child(&self, name: impl Into<String>, parent: &Transaction) -> TransactionGuard {
        let transaction = self.child(name, parent);
        transaction.enter();
        TransactionGuard {
            transaction,
            registration: None,
            registry: self.shared.registry.clone(),
            _not_send: PhantomData,
        }
    }

    fn new_transaction(&self, name: impl Into<String>, parent: Option<&Transaction>) -> Transaction {
        Transaction::new(
            name,
            self.shared.app_name.clone(),
            self.shared.host.clone(),
            self.shared.clock.clone(),
            self.shared.emitter.clone(),
            self.shared.registry.clone(),
            parent,
        )
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("app_name", &self.shared.app_name)
            .field("host", &self.shared.host)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Tracer`] with injected dependencies.
///
/// Defaults: host from [`naming::local_host_name`], [`WallClock`], and a
/// [`NullEmitter`] sink. Production code normally goes through
/// [`Tracer::from_config`] instead.
pub struct TracerBuilder {
    app_name: String,
    host: Option<String>,
    clock: Option<Arc<dyn TimeSource>>,
    emitter: Option<Arc<dyn RecordTiming>>,
}

impl TracerBuilder {
    /// Overrides the host name used in metric names.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Injects the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Injects the metrics emitter.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<dyn RecordTiming>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the tracer.
    #[must_use]
    pub fn build(self) -> Tracer {
        Tracer {
            shared: Arc::new(Shared {
                app_name: self.app_name,
                host: self.host.unwrap_or_else(naming::local_host_name),
                clock: self.clock.unwrap_or_else(|| Arc::new(WallClock::new())),
                emitter: self.emitter.unwrap_or_else(|| Arc::new(NullEmitter)),
                registry: Arc::new(Registry::new()),
            }),
        }
    }
}

/// Scope guard for an entered transaction.
///
/// On drop: tags the transaction as failed if the thread is unwinding,
/// exits it (emitting the metric for a root), and releases the registry
/// slot if this guard's registration is still the current one. Not `Send`;
/// the guard must be dropped in the context that entered the transaction.
pub struct TransactionGuard {
    transaction: Transaction,
    registration: Option<(ContextId, u64)>,
    registry: Arc<Registry>,
    _not_send: PhantomData<Rc<()>>,
}

impl TransactionGuard {
    /// Returns the guarded transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Marks the guarded transaction as failed.
    pub fn error(&self) {
        self.transaction.error();
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.transaction.error();
        }
        self.transaction.exit();
        if let Some((context, generation)) = self.registration.take() {
            self.registry.clear_if_current(context, generation);
        }
    }
}

impl std::fmt::Debug for TransactionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGuard")
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

/// Runs `f` inside a new root transaction named `name`.
///
/// The transaction exits when `f` returns or unwinds; panics propagate
/// unchanged with the transaction tagged as failed.
pub fn transaction_trace<R>(tracer: &Tracer, name: &str, f: impl FnOnce() -> R) -> R {
    let _guard = tracer.start(name);
    f()
}

/// Runs `f` inside a child of the currently active transaction.
///
/// With no active transaction in this context, `f` runs untraced — callers
/// are expected to start a transaction higher in the stack with
/// [`transaction_trace`] or [`Tracer::start`].
pub fn function_trace<R>(tracer: &Tracer, name: &str, f: impl FnOnce() -> R) -> R {
    match tracer.current() {
        None => f(),
        Some(parent) => {
            let _guard = tracer.start_child(name, &parent);
            f()
        }
    }
}

/// [`transaction_trace`] for fallible closures.
///
/// An `Err` marks the transaction as failed before release and is returned
/// unchanged.
pub fn try_transaction_trace<T, E>(
    tracer: &Tracer,
    name: &str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let guard = tracer.start(name);
    let result = f();
    if result.is_err() {
        guard.error();
    }
    result
}

/// [`function_trace`] for fallible closures.
pub fn try_function_trace<T, E>(
    tracer: &Tracer,
    name: &str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    match tracer.current() {
        None => f(),
        Some(parent) => {
            let guard = tracer.start_child(name, &parent);
            let result = f();
            if result.is_err() {
                guard.error();
            }
            result
        }
    }
}

/// Wraps `f` so every invocation runs inside a root transaction.
///
/// The returned closure is the decorator analog: apply once, call many
/// times.
pub fn transaction_trace_wrap<R>(
    tracer: &Tracer,
    name: impl Into<String>,
    mut f: impl FnMut() -> R,
) -> impl FnMut() -> R {
    let tracer = tracer.clone();
    let name = name.into();
    move || transaction_trace(&tracer, &name, &mut f)
}

/// Wraps `f` so every invocation runs inside a child of the active
/// transaction, or untraced when none is active.
pub fn function_trace_wrap<R>(
    tracer: &Tracer,
    name: impl Into<String>,
    mut f: impl FnMut() -> R,
) -> impl FnMut() -> R {
    let tracer = tracer.clone();
    let name = name.into();
    move || function_trace(&tracer, &name, &mut f)
}

//! Carpy: lightweight call tracing with hierarchical timing metrics.
//!
//! # Overview
//!
//! Application code marks a unit of work — an HTTP request handler, a job —
//! as a *transaction*; nested calls attach themselves as children of the
//! transaction active in their execution context. When the outermost
//! transaction completes, its duration is reported to a statsd-style
//! backend under a dotted name encoding application, host, call path, and
//! success status:
//!
//! ```text
//! carpy.<app>.<host>.<root>[.children.<node>]*.<ok|err>
//! ```
//!
//! # Core guarantees
//!
//! - **One active transaction per context**: the registry maps each OS
//!   thread (or cooperative task) to its current root; lookups from one
//!   context never observe another's.
//! - **Leak-free cleanup**: the registry holds only weak references plus a
//!   generation counter; discarding a root makes its entry stop resolving
//!   without any explicit teardown call.
//! - **Exactly-once emission**: only a root transaction's completion emits,
//!   carrying only its own name and status.
//! - **Observational transparency**: panics and error values from traced
//!   code propagate unchanged; tracing adds no output on the happy path.
//!
//! # Module structure
//!
//! - [`time`]: timestamp type and injectable time sources
//! - [`context`]: execution-context identity (threads, cooperative tasks)
//! - [`config`]: process-wide key/value configuration
//! - [`transaction`]: the transaction call tree
//! - [`registry`]: active-transaction registry
//! - [`naming`]: metric name construction
//! - [`emit`]: metrics emitter boundary and statsd client
//! - [`trace`](mod@trace): tracer, scope guards, and the wrapping facade
//!
//! # Example
//!
//! ```no_run
//! use carpy::{Config, Tracer, function_trace, transaction_trace};
//!
//! # fn main() -> Result<(), carpy::TracerError> {
//! let mut config = Config::new();
//! config.set("APP_NAME", "shop");
//! config.set("STATSD_HOST", "127.0.0.1");
//! config.set("STATSD_PORT", "8125");
//! let tracer = Tracer::from_config(&config)?;
//!
//! transaction_trace(&tracer, "checkout", || {
//!     function_trace(&tracer, "charge_card", || {
//!         // traced as a child of "checkout"
//!     });
//! });
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod emit;
pub mod naming;
pub mod registry;
pub mod time;
pub mod trace;
pub mod transaction;

pub use config::{Config, ConfigError, KEY_APP_NAME, KEY_STATSD_HOST, KEY_STATSD_PORT};
pub use context::{ContextId, TaskProbe, current_context_id, install_task_probe};
pub use emit::{EmitError, NullEmitter, RecordTiming, StatsdClient};
pub use registry::Registry;
pub use time::{ManualClock, Time, TimeSource, WallClock};
pub use trace::{
    Tracer, TracerBuilder, TracerError, TransactionGuard, function_trace, function_trace_wrap,
    transaction_trace, transaction_trace_wrap, try_function_trace, try_transaction_trace,
};
pub use transaction::{AllTransactions, Transaction, WeakTransaction};

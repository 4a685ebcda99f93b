//! Execution context identity.
//!
//! A [`ContextId`] names "the current logical thread of control": an OS
//! thread, or a cooperative task when the hosting runtime exposes one. It is
//! the lookup key for the active-transaction registry.
//!
//! Task awareness is a capability selected at startup: a runtime that
//! multiplexes cooperative tasks over OS threads installs a probe with
//! [`install_task_probe`]. The probe reports the current task's identity, or
//! `None` when no task is running or the current task is its thread's
//! top-level task. Without a probe, resolution falls back to plain thread
//! identity.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one logical thread of control.
///
/// Stable for the lifetime of the thread or task it names, and distinct
/// across concurrently running ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// An OS thread.
    Thread(u64),
    /// A cooperative task multiplexed over an OS thread.
    Task(u64),
}

/// Probe reporting the current cooperative task, if any.
///
/// Must return `None` when no task is active or when the active task is the
/// top-level task of its OS thread. Must never block.
pub type TaskProbe = fn() -> Option<u64>;

static TASK_PROBE: OnceLock<TaskProbe> = OnceLock::new();

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Installs the cooperative-task probe.
///
/// Intended to be called once at startup by the embedding runtime. The first
/// installation wins; returns `false` if a probe was already installed.
pub fn install_task_probe(probe: TaskProbe) -> bool {
    TASK_PROBE.set(probe).is_ok()
}

/// Resolves the identity of the current execution context.
///
/// Returns the current cooperative task's identity when a probe is installed
/// and reports one, otherwise the calling OS thread's identity. Never blocks
/// and has no error conditions.
#[must_use]
pub fn current_context_id() -> ContextId {
    if let Some(probe) = TASK_PROBE.get() {
        if let Some(task) = probe() {
            return ContextId::Task(task);
        }
    }
    ContextId::Thread(THREAD_CONTEXT_ID.with(|id| *id))
}

//! Cooperative-task context resolution: probe-driven identity and per-task
//! registry isolation.
//!
//! The probe is installed once per process, so these tests live in their own
//! binary and never rely on the thread-identity fallback being the only
//! resolution path.

use std::cell::Cell;

use carpy::{ContextId, Tracer, current_context_id, install_task_probe};

thread_local! {
    static CURRENT_TASK: Cell<Option<u64>> = const { Cell::new(None) };
}

// Stands in for a runtime's "current task" lookup. `None` means no task is
// running on this thread.
fn probe() -> Option<u64> {
    CURRENT_TASK.get()
}

fn switch_to(task: Option<u64>) {
    CURRENT_TASK.set(task);
}

fn install() {
    // First installation wins; every test in this binary wants the same one.
    let _ = install_task_probe(probe);
}

#[test]
fn probe_selects_task_identity_and_falls_back_to_thread() {
    install();

    switch_to(Some(7));
    assert_eq!(current_context_id(), ContextId::Task(7));

    switch_to(Some(8));
    assert_eq!(current_context_id(), ContextId::Task(8));

    // No task on this thread: resolution falls back to thread identity.
    switch_to(None);
    assert!(matches!(current_context_id(), ContextId::Thread(_)));
}

#[test]
fn tasks_multiplexed_on_one_thread_get_isolated_roots() {
    install();

    let tracer = Tracer::builder("Test App").host("test.host.name").build();

    switch_to(Some(1));
    let first = tracer.start("task-one");
    assert_eq!(tracer.current().expect("task 1 root").name(), "task-one");

    // A second task on the same OS thread sees no active transaction and
    // registers its own root without touching the first task's slot.
    switch_to(Some(2));
    assert!(tracer.current().is_none());
    let second = tracer.start("task-two");
    assert_eq!(tracer.current().expect("task 2 root").name(), "task-two");

    switch_to(Some(1));
    let current = tracer.current().expect("task 1 root still registered");
    assert!(current.same(first.transaction()));

    drop(second);
    drop(first);
    assert!(tracer.registry().is_empty());

    switch_to(None);
}

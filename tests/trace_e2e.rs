//! End-to-end tracing tests: full trees, injected clock, capture emitter.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use carpy::{
    Config, ManualClock, RecordTiming, Tracer, function_trace, transaction_trace,
    try_function_trace,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct CaptureEmitter {
    timings: Mutex<Vec<(String, u64)>>,
}

impl CaptureEmitter {
    fn timings(&self) -> Vec<(String, u64)> {
        self.timings.lock().clone()
    }
}

impl RecordTiming for CaptureEmitter {
    fn record_timing(&self, name: &str, millis: u64) {
        self.timings.lock().push((name.to_string(), millis));
    }
}

fn test_tracer() -> (Tracer, Arc<ManualClock>, Arc<CaptureEmitter>) {
    init_logging();
    let clock = Arc::new(ManualClock::new());
    let emitter = Arc::new(CaptureEmitter::default());
    let tracer = Tracer::builder("Test App")
        .host("test.host.name")
        .clock(clock.clone())
        .emitter(emitter.clone())
        .build();
    (tracer, clock, emitter)
}

#[test]
fn request_handler_tree_emits_root_timing_once() {
    let (tracer, clock, emitter) = test_tracer();

    transaction_trace(&tracer, "GET /", || {
        clock.advance_millis(10);
        function_trace(&tracer, "load_session", || {
            clock.advance_millis(5);
        });
        function_trace(&tracer, "render", || {
            clock.advance_millis(3);
            // Helpers parent on the context's root, so this nests as
            // another child of "GET /".
            function_trace(&tracer, "render", || {
                clock.advance_millis(1);
            });
        });
    });

    let timings = emitter.timings();
    assert_eq!(timings.len(), 1);
    assert_eq!(
        timings[0],
        ("carpy.Test_App.test_host_name.GET /.ok".to_string(), 19)
    );
    assert!(tracer.current().is_none());
    assert!(tracer.registry().is_empty());
}

#[test]
fn helpers_attach_as_children_of_the_root() {
    let (tracer, _, _) = test_tracer();

    transaction_trace(&tracer, "handler", || {
        function_trace(&tracer, "outer_helper", || {
            // function_trace parents on the context's root transaction, so
            // a helper inside a helper is a sibling, not a grandchild.
        });
        function_trace(&tracer, "inner_helper", || {});

        let root = tracer.current().expect("root active");
        let order: Vec<String> = root
            .all_transactions()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(order, ["outer_helper", "inner_helper", "handler"]);
    });
}

#[test]
fn millisecond_truncation_end_to_end() {
    let (tracer, clock, emitter) = test_tracer();

    transaction_trace(&tracer, "fast", || {
        // 2.999999 ms must report as 2.
        clock.advance(2_999_999);
    });

    assert_eq!(emitter.timings()[0].1, 2);
}

#[test]
fn failure_in_helper_marks_child_and_propagates() {
    let (tracer, _, emitter) = test_tracer();

    let result: Result<(), String> = transaction_trace(&tracer, "handler", || {
        let root = tracer.current().expect("active");
        let outcome: Result<(), String> =
            try_function_trace(&tracer, "charge", || Err("card declined".to_string()));
        assert!(matches!(outcome.as_ref(), Err(e) if e == "card declined"));

        // The child carries the failure; the root is untouched.
        let child = &root.children()[0];
        assert!(child.is_error());
        assert!(!root.is_error());
        outcome
    });
    assert!(result.is_err());

    assert_eq!(
        emitter.timings()[0].0,
        "carpy.Test_App.test_host_name.handler.ok"
    );
}

#[test]
fn panic_propagates_unchanged_and_emits_err() {
    let (tracer, _, emitter) = test_tracer();

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        transaction_trace(&tracer, "handler", || panic!("kaboom"));
    }))
    .unwrap_err();
    assert_eq!(caught.downcast_ref::<&str>(), Some(&"kaboom"));

    assert_eq!(
        emitter.timings()[0].0,
        "carpy.Test_App.test_host_name.handler.err"
    );
    assert!(tracer.current().is_none());
}

#[test]
fn concurrent_contexts_do_not_interfere() {
    let (tracer, _, emitter) = test_tracer();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let tracer = tracer.clone();
            std::thread::spawn(move || {
                transaction_trace(&tracer, &format!("worker-{i}"), || {
                    let current = tracer.current().expect("own root");
                    assert_eq!(current.name(), format!("worker-{i}"));
                    function_trace(&tracer, "step", || {});
                });
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    // One emission per root, none for children, no leaked registrations.
    let timings = emitter.timings();
    assert_eq!(timings.len(), 8);
    assert!(timings.iter().all(|(name, _)| name.ends_with(".ok")));
    assert!(tracer.registry().is_empty());
}

#[test]
fn tracer_from_json_config_file() {
    init_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"APP_NAME": "file.app", "STATSD_HOST": "127.0.0.1", "STATSD_PORT": 8125}}"#
    )
    .unwrap();

    let mut config = Config::new();
    config.from_json_file(file.path()).unwrap();
    let tracer = Tracer::from_config(&config).unwrap();
    assert_eq!(tracer.app_name(), "file.app");

    // The dotted app name sanitizes into the metric name.
    let tx = tracer.transaction("t");
    tx.enter();
    assert!(tx.metric_name().starts_with("carpy.file_app."));
    tx.exit();
}

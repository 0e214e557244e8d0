//! Composite services running inside a dependency graph.

use std::sync::Arc;

use orrery_extension::{BoxError, CompositeService, Extension, ExtensionError};
use orrery_graph::{DependencyGraph, GraphError, LifecycleEvent, NodeDescriptor, NodeState};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

struct Cache {
    entries: Mutex<Vec<u32>>,
}

/// Fills the cache on start and clears it on stop. Needs the `metrics` node.
struct Warmup {
    log: Log,
}

impl Extension<Cache> for Warmup {
    fn start(&self, cache: &Cache) -> Result<(), BoxError> {
        cache.entries.lock().extend([1, 2, 3]);
        self.log.lock().push("warmup.start".into());
        Ok(())
    }

    fn stop(&self, cache: &Cache) -> Result<(), BoxError> {
        cache.entries.lock().clear();
        self.log.lock().push("warmup.stop".into());
        Ok(())
    }

    fn name(&self) -> &str {
        "warmup"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["metrics".into()]
    }
}

fn leaf(graph: &DependencyGraph, name: &'static str, log: &Log) {
    let start_log = Arc::clone(log);
    let stop_log = Arc::clone(log);
    graph
        .register(
            NodeDescriptor::new(name, move |_| {
                start_log.lock().push(format!("{name}.up"));
                Ok(())
            })
            .with_disposer(move |_: &()| {
                stop_log.lock().push(format!("{name}.down"));
                Ok(())
            }),
        )
        .unwrap();
}

fn cache_service(log: &Log) -> CompositeService<Cache> {
    let dispose_log = Arc::clone(log);
    CompositeService::new("cache", |_| {
        Ok(Cache {
            entries: Mutex::new(Vec::new()),
        })
    })
    .depends_on(["store"])
    .extension(Warmup {
        log: Arc::clone(log),
    })
    .with_disposer(move |cache: &Cache| {
        dispose_log
            .lock()
            .push(format!("cache.dispose({})", cache.entries.lock().len()));
        Ok(())
    })
}

#[test]
fn extension_dependencies_start_first() {
    let log: Log = Arc::default();
    let graph = DependencyGraph::new();
    leaf(&graph, "store", &log);
    leaf(&graph, "metrics", &log);
    graph.register(cache_service(&log).into_node()).unwrap();

    graph.start("cache").unwrap();
    assert_eq!(graph.status("metrics"), Some(NodeState::Up));
    let cache = graph.value::<Cache>("cache").unwrap();
    assert_eq!(*cache.entries.lock(), [1, 2, 3]);
    drop(cache);

    graph.stop("metrics").unwrap();
    assert_eq!(
        *log.lock(),
        [
            "store.up",
            "metrics.up",
            "warmup.start",
            "warmup.stop",
            "cache.dispose(0)",
            "metrics.down",
        ]
    );
    assert_eq!(graph.status("store"), Some(NodeState::Up));
}

#[test]
fn composite_restarts_cleanly() {
    let log: Log = Arc::default();
    let graph = DependencyGraph::new();
    leaf(&graph, "store", &log);
    leaf(&graph, "metrics", &log);
    graph.register(cache_service(&log).into_node()).unwrap();

    for _ in 0..3 {
        graph.start("cache").unwrap();
        let report = graph.stop("cache").unwrap();
        assert!(report.is_clean());
        assert_eq!(report.stopped, ["cache"]);
    }

    let warmups = log
        .lock()
        .iter()
        .filter(|entry| entry.as_str() == "warmup.start")
        .count();
    assert_eq!(warmups, 3);
}

#[test]
fn failing_extension_rolls_back_the_whole_start() {
    let log: Log = Arc::default();
    let graph = DependencyGraph::new();
    leaf(&graph, "store", &log);
    leaf(&graph, "metrics", &log);

    let hook_log = Arc::clone(&log);
    graph
        .register(
            cache_service(&log)
                .hook(
                    "verify",
                    |cache: &Cache| {
                        if cache.entries.lock().len() > 2 {
                            Err("cache too large".into())
                        } else {
                            Ok(())
                        }
                    },
                    move |_| {
                        hook_log.lock().push("verify.stop".into());
                        Ok(())
                    },
                )
                .into_node(),
        )
        .unwrap();

    let events: Log = Arc::default();
    let sink = Arc::clone(&events);
    graph
        .register_listener("recorder", move |event: &LifecycleEvent| {
            sink.lock().push(event.to_string());
        })
        .unwrap();

    let err = graph.start("cache").unwrap_err();
    assert_eq!(err.failed_node(), Some("cache"));
    let GraphError::StartFailure { source, .. } = &err else {
        panic!("expected StartFailure, got {err:?}");
    };
    let cause = source
        .downcast_ref::<ExtensionError>()
        .expect("extension error as cause");
    assert!(matches!(cause, ExtensionError::StartFailed { hook, .. } if hook == "verify"));

    // The cache value was torn down, then the dependencies it pulled up.
    assert_eq!(
        *log.lock(),
        [
            "store.up",
            "metrics.up",
            "warmup.start",
            "warmup.stop",
            "cache.dispose(0)",
            "metrics.down",
            "store.down",
        ]
    );
    assert!(events.lock().contains(&"cache start failed".to_string()));
    for name in ["store", "metrics", "cache"] {
        assert_eq!(graph.status(name), Some(NodeState::Down));
    }
}

//! Start/stop ordering and rollback through the public graph API.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use orrery_graph::{
    BoxError, DependencyGraph, GraphError, LifecycleEvent, NodeDescriptor, NodeState,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

/// Registers a node that records `start:<name>` and `stop:<name>` in `log`.
fn tracked(graph: &DependencyGraph, log: &Log, name: &'static str, deps: &[&'static str]) {
    tracked_with(graph, log, name, deps, false);
}

fn tracked_with(
    graph: &DependencyGraph,
    log: &Log,
    name: &'static str,
    deps: &[&'static str],
    fail_start: bool,
) {
    let start_log = Arc::clone(log);
    let stop_log = Arc::clone(log);
    graph
        .register(
            NodeDescriptor::new(name, move |_| {
                if fail_start {
                    return Err(format!("{name} refused to start").into());
                }
                start_log.lock().push(format!("start:{name}"));
                Ok(name)
            })
            .depends_on(deps.iter().copied())
            .with_disposer(move |_: &&'static str| {
                stop_log.lock().push(format!("stop:{name}"));
                Ok(())
            }),
        )
        .unwrap();
}

fn chain(fail_b: bool) -> (DependencyGraph, Log) {
    let graph = DependencyGraph::new();
    let log: Log = Arc::default();
    tracked(&graph, &log, "A", &["B"]);
    tracked_with(&graph, &log, "B", &["C"], fail_b);
    tracked(&graph, &log, "C", &[]);
    (graph, log)
}

#[test]
fn chain_starts_dependencies_first() {
    let (graph, log) = chain(false);
    graph.start("A").unwrap();

    assert_eq!(*log.lock(), ["start:C", "start:B", "start:A"]);
    for name in ["A", "B", "C"] {
        assert_eq!(graph.status(name), Some(NodeState::Up));
    }
}

#[test]
fn stopping_a_dependency_stops_dependents_first() {
    let (graph, log) = chain(false);
    graph.start("A").unwrap();
    log.lock().clear();

    let report = graph.stop("C").unwrap();
    assert_eq!(*log.lock(), ["stop:A", "stop:B", "stop:C"]);
    assert_eq!(report.stopped, ["A", "B", "C"]);
    assert!(report.is_clean());
}

#[test]
fn stopping_a_leaf_leaves_dependencies_up() {
    let (graph, _log) = chain(false);
    graph.start("A").unwrap();

    graph.stop("A").unwrap();
    assert_eq!(graph.status("A"), Some(NodeState::Down));
    assert_eq!(graph.status("B"), Some(NodeState::Up));
    assert_eq!(graph.status("C"), Some(NodeState::Up));
}

#[test]
fn failed_start_rolls_back_nodes_started_by_the_call() {
    let (graph, log) = chain(true);

    let err = graph.start("A").unwrap_err();
    assert!(matches!(err, GraphError::StartFailure { .. }));
    assert_eq!(err.failed_node(), Some("B"));

    assert_eq!(*log.lock(), ["start:C", "stop:C"]);
    for name in ["A", "B", "C"] {
        assert_eq!(graph.status(name), Some(NodeState::Down));
    }
}

#[test]
fn rollback_leaves_previously_up_nodes_untouched() {
    let (graph, log) = chain(true);
    graph.start("C").unwrap();
    log.lock().clear();

    graph.start("A").unwrap_err();
    assert!(log.lock().is_empty(), "C was up before the call: {:?}", log.lock());
    assert_eq!(graph.status("C"), Some(NodeState::Up));
}

#[test]
fn rollback_unwinds_in_reverse_start_order() {
    let graph = DependencyGraph::new();
    let log: Log = Arc::default();
    tracked(&graph, &log, "db", &[]);
    tracked(&graph, &log, "cache", &[]);
    tracked(&graph, &log, "repo", &["db", "cache"]);
    tracked_with(&graph, &log, "api", &["repo"], true);

    graph.start("api").unwrap_err();
    assert_eq!(
        *log.lock(),
        [
            "start:db",
            "start:cache",
            "start:repo",
            "stop:repo",
            "stop:cache",
            "stop:db"
        ]
    );
}

#[test]
fn disposer_failure_does_not_stop_teardown() {
    let graph = DependencyGraph::new();
    let log: Log = Arc::default();
    tracked(&graph, &log, "base", &[]);
    graph
        .register(
            NodeDescriptor::new("leaky", |_| Ok(()))
                .depends_on(["base"])
                .with_disposer(|_: &()| Err("handle leaked".into())),
        )
        .unwrap();
    tracked(&graph, &log, "top", &["leaky"]);

    graph.start("top").unwrap();
    log.lock().clear();

    let report = graph.stop("base").unwrap();
    assert_eq!(report.stopped, ["top", "leaky", "base"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node, "leaky");
    assert_eq!(*log.lock(), ["stop:top", "stop:base"]);
}

/// Runs `f` on its own thread and fails the test if it does not return.
fn within_deadline<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(Duration::from_secs(10)).expect("graph call did not return")
}

#[test]
fn panicking_factory_fails_the_start_and_rolls_back() {
    let graph = Arc::new(DependencyGraph::new());
    let log: Log = Arc::default();
    tracked(&graph, &log, "A", &["B"]);
    graph
        .register(
            NodeDescriptor::new("B", |_| -> Result<(), BoxError> { panic!("B exploded") })
                .depends_on(["C"]),
        )
        .unwrap();
    tracked(&graph, &log, "C", &[]);

    let err = graph.start("A").unwrap_err();
    assert_eq!(err.failed_node(), Some("B"));
    let GraphError::StartFailure { source, .. } = &err else {
        panic!("expected StartFailure, got {err:?}");
    };
    assert_eq!(source.to_string(), "factory panicked: B exploded");
    assert_eq!(*log.lock(), ["start:C", "stop:C"]);
    for name in ["A", "B", "C"] {
        assert_eq!(graph.status(name), Some(NodeState::Down));
    }

    // B settled and released its pin on C, so neither call blocks.
    let shared = Arc::clone(&graph);
    within_deadline(move || {
        shared.start("C").unwrap();
        shared.stop("C").unwrap();
        shared.unregister("A").unwrap();
        shared.unregister("B").unwrap();
        shared.unregister("C").unwrap();
    });
    assert!(graph.is_empty());
}

#[test]
fn panicking_disposer_is_reported_and_the_node_goes_down() {
    let graph = Arc::new(DependencyGraph::new());
    let log: Log = Arc::default();
    tracked(&graph, &log, "base", &[]);
    graph
        .register(
            NodeDescriptor::new("fragile", |_| Ok(()))
                .depends_on(["base"])
                .with_disposer(|_: &()| -> Result<(), BoxError> {
                    std::panic::panic_any(String::from("socket gone"))
                }),
        )
        .unwrap();

    graph.start("fragile").unwrap();
    log.lock().clear();

    let shared = Arc::clone(&graph);
    let report = within_deadline(move || shared.stop("base").unwrap());
    assert_eq!(report.stopped, ["fragile", "base"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node, "fragile");
    assert_eq!(
        report.failures[0].error.to_string(),
        "disposer panicked: socket gone"
    );
    assert_eq!(*log.lock(), ["stop:base"]);
    assert_eq!(graph.status("fragile"), Some(NodeState::Down));

    graph.start("fragile").unwrap();
    assert_eq!(graph.status("fragile"), Some(NodeState::Up));
}

#[test]
fn listeners_observe_rollback() {
    let (graph, _log) = chain(true);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    graph
        .register_listener("events", move |event: &LifecycleEvent| {
            sink.lock().push(event.to_string());
        })
        .unwrap();

    graph.start("A").unwrap_err();
    assert_eq!(
        *events.lock(),
        [
            "C starting",
            "C up",
            "B starting",
            "B start failed",
            "C stopping",
            "C down"
        ]
    );
}

#[test]
fn start_failure_event_carries_cause() {
    let (graph, _log) = chain(true);
    let failure = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&failure);
    graph
        .register_listener("failures", move |event: &LifecycleEvent| {
            if let LifecycleEvent::StartFailed { node, error } = event {
                *sink.lock() = Some((node.clone(), error.clone()));
            }
        })
        .unwrap();

    graph.start("A").unwrap_err();
    let (node, error) = failure.lock().clone().unwrap();
    assert_eq!(node, "B");
    assert!(error.contains("B refused to start"), "{error}");
}

#[test]
fn nodes_restart_after_stop() {
    let (graph, log) = chain(false);
    graph.start("A").unwrap();
    graph.stop("C").unwrap();
    log.lock().clear();

    graph.start("A").unwrap();
    assert_eq!(*log.lock(), ["start:C", "start:B", "start:A"]);
}

#[test]
fn forward_reference_resolves_once_registered() {
    let graph = DependencyGraph::new();
    graph
        .register(NodeDescriptor::new("app", |_| Ok(())).depends_on(["store"]))
        .unwrap();
    assert!(matches!(
        graph.start("app"),
        Err(GraphError::MissingDependency { .. })
    ));

    graph.register(NodeDescriptor::new("store", |_| Ok(()))).unwrap();
    graph.start("app").unwrap();
    assert_eq!(graph.dependents("store"), ["app"]);
}

#[test]
fn cycle_through_forward_reference_is_rejected() {
    let graph = DependencyGraph::new();
    graph
        .register(NodeDescriptor::new("a", |_| Ok(())).depends_on(["b"]))
        .unwrap();
    graph
        .register(NodeDescriptor::new("b", |_| Ok(())).depends_on(["c"]))
        .unwrap();

    let err = graph
        .register(NodeDescriptor::new("c", |_| Ok(())).depends_on(["a"]))
        .unwrap_err();
    assert_eq!(err.to_string(), "dependency cycle: c -> a -> b -> c");
    assert_eq!(graph.len(), 2);
}

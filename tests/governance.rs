// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Governance tests: retry, per-node timeout, fallback, and the global
//! deadline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashdag::{DagGraph, Error, Governance, NodeValue};

fn string_of(node: &'static str) -> impl Fn(&String, &HashMap<String, NodeValue>) -> dashdag::Result<String>
       + Send
       + Sync {
    move |_request: &String, results: &HashMap<String, NodeValue>| {
        Ok(results
            .get(node)
            .and_then(|v| v.downcast_ref::<String>())
            .cloned()
            .unwrap_or_default())
    }
}

#[tokio::test]
async fn test_retry_until_success() {
    // Fails twice, succeeds on the third attempt; budget allows three retries
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_with_governance(
            "unstable",
            dashdag::FunctionProcessor::new("unstable", move |_request: Arc<String>, _input| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt <= 2 {
                        Err(Error::Generic("simulated network flake".to_string()))
                    } else {
                        Ok(NodeValue::of("SuccessData".to_string()))
                    }
                })
            }),
            Some(
                Governance::new()
                    .with_max_retries(3)
                    .with_retry_backoff(Duration::from_millis(50)),
            ),
        )
        .set_terminal_strategy(string_of("unstable"));

    let dag = graph.compile().unwrap();
    let result = dag.apply("req".to_string()).await.unwrap();

    assert_eq!(result, "SuccessData");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_exhausted_then_fallback() {
    // Always fails; after 1 + 2 attempts the fallback takes over
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_with_governance(
            "broken",
            dashdag::FunctionProcessor::new("broken", move |_request: Arc<String>, _input| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Generic("db connection failed".to_string()))
                })
            }),
            Some(
                Governance::new()
                    .with_max_retries(2)
                    .with_retry_backoff(Duration::from_millis(10))
                    .with_fallback(|_request, _input, _cause| {
                        Ok(NodeValue::of("MockData".to_string()))
                    }),
            ),
        )
        .set_terminal_strategy(string_of("broken"));

    let dag = graph.compile().unwrap();
    let result = dag.apply("req".to_string()).await.unwrap();

    assert_eq!(result, "MockData");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_node_timeout_triggers_fallback() {
    // Sleeps 1s against a 200ms cap; fallback answers well under the sleep
    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_with_governance(
            "slow",
            dashdag::FunctionProcessor::new("slow", |_request: Arc<String>, _input| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    Ok(NodeValue::of("SlowData".to_string()))
                })
            }),
            Some(
                Governance::new()
                    .with_timeout(Duration::from_millis(200))
                    .with_fallback(|_request, _input, cause| {
                        assert!(matches!(cause, Error::NodeTimeout { .. }));
                        Ok(NodeValue::of("TimeoutFallback".to_string()))
                    }),
            ),
        )
        .set_terminal_strategy(string_of("slow"));

    let dag = graph.compile().unwrap();
    let start = Instant::now();
    let result = dag.apply("req".to_string()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result, "TimeoutFallback");
    assert!(
        elapsed < Duration::from_millis(800),
        "timeout + fallback should beat the node's sleep, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_default_governance_timeout_applies_to_plain_nodes() {
    // No per-node governance: the 200ms default cap fails the 500ms node
    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .set_default_governance(Governance::new().with_timeout(Duration::from_millis(200)))
        .add_node_from_fn("slow", |_request, _input| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(NodeValue::of("SlowResult".to_string()))
            })
        })
        .set_terminal_strategy(|_request, _results| Ok("OK".to_string()));

    let dag = graph.compile().unwrap();
    let start = Instant::now();
    let err = dag.apply("req".to_string()).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, Error::NodeTimeout { ref node, .. } if node == "slow"));
    assert!(
        elapsed < Duration::from_millis(450),
        "the cap should interrupt the node, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_fallback_receives_empty_view_and_root_cause() {
    let saw_empty_view = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&saw_empty_view);

    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_from_fn("parent", |_request, _input| {
            Box::pin(async move { Ok(NodeValue::of("ParentData".to_string())) })
        })
        .add_node_with_governance(
            "failing",
            dashdag::FunctionProcessor::new("failing", |_request: Arc<String>, _input| {
                Box::pin(async move { Err(Error::Generic("boom".to_string())) })
            }),
            Some(Governance::new().with_fallback(move |_request, input, cause| {
                // Parent outputs are withheld from fallbacks, and the cause
                // arrives already unwrapped to the processor's own error
                observed.store(input.is_empty(), Ordering::SeqCst);
                assert!(matches!(cause, Error::Generic(msg) if msg == "boom"));
                Ok(NodeValue::of("Recovered".to_string()))
            })),
        )
        .add_route("parent", "failing")
        .set_terminal_strategy(string_of("failing"));

    let dag = graph.compile().unwrap();
    let result = dag.apply("req".to_string()).await.unwrap();

    assert_eq!(result, "Recovered");
    assert!(saw_empty_view.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_failing_fallback_surfaces_the_fallback_error() {
    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_with_governance(
            "doomed",
            dashdag::FunctionProcessor::new("doomed", |_request: Arc<String>, _input| {
                Box::pin(async move { Err(Error::Generic("primary failed".to_string())) })
            }),
            Some(Governance::new().with_fallback(|_request, _input, _cause| {
                Err(Error::Generic("fallback also failed".to_string()))
            })),
        )
        .set_terminal_strategy(string_of("doomed"));

    let dag = graph.compile().unwrap();
    let err = dag.apply("req".to_string()).await.unwrap_err();

    // Neither the primary failure nor the fallback wrapper surfaces; the
    // fallback's own error is the root cause
    assert!(matches!(err, Error::Generic(ref msg) if msg == "fallback also failed"));
}

#[tokio::test]
async fn test_unrecovered_failure_surfaces_and_cancels_siblings() {
    // One node fails immediately; a slow sibling must be cancelled rather
    // than run to completion.
    let sibling_finished = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&sibling_finished);

    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_from_fn("failing", |_request, _input| {
            Box::pin(async move { Err(Error::Generic("unrecoverable".to_string())) })
        })
        .add_node_from_fn("slow_sibling", move |_request, _input| {
            let observed = Arc::clone(&observed);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(2000)).await;
                observed.store(true, Ordering::SeqCst);
                Ok(NodeValue::of("TooLate".to_string()))
            })
        })
        .set_terminal_strategy(|_request, _results| Ok("OK".to_string()));

    let dag = graph.compile().unwrap();
    let start = Instant::now();
    let err = dag.apply("req".to_string()).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, Error::Generic(ref msg) if msg == "unrecoverable"));
    assert!(
        elapsed < Duration::from_millis(1000),
        "failure must not wait for the slow sibling, took {elapsed:?}"
    );

    // Give any stray task a moment; the cancelled sibling must not complete
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!sibling_finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_global_timeout_aborts_the_invocation() {
    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_from_fn("endless", |_request, _input| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(NodeValue::of("Never".to_string()))
            })
        })
        .set_global_timeout(Duration::from_millis(200))
        .set_terminal_strategy(string_of("endless"));

    let dag = graph.compile().unwrap();
    let start = Instant::now();
    let err = dag.apply("req".to_string()).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, Error::Timeout(t) if t == Duration::from_millis(200)));
    assert!(elapsed < Duration::from_millis(800));
}

#[tokio::test]
async fn test_failure_cascades_to_descendants() {
    // The failing parent's error is what surfaces, and the child never runs
    let child_ran = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&child_ran);

    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_from_fn("parent", |_request, _input| {
            Box::pin(async move { Err(Error::Generic("parent died".to_string())) })
        })
        .add_node_from_fn("child", move |_request, _input| {
            let observed = Arc::clone(&observed);
            Box::pin(async move {
                observed.store(true, Ordering::SeqCst);
                Ok(NodeValue::of("ChildData".to_string()))
            })
        })
        .add_route("parent", "child")
        .set_terminal_strategy(string_of("child"));

    let dag = graph.compile().unwrap();
    let err = dag.apply("req".to_string()).await.unwrap_err();

    // The parent's own error surfaces, not a wrapper naming the child chain
    assert!(matches!(err, Error::Generic(ref msg) if msg == "parent died"));
    assert!(!child_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_retry_does_not_consume_the_node_timeout_budget_alone() {
    // Retries happen inside the task; the timeout caps the whole composite.
    // Two quick failures + backoff stay inside the cap and the third attempt
    // lands.
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let mut graph: DagGraph<String, String> = DagGraph::new();
    graph
        .add_node_with_governance(
            "flaky",
            dashdag::FunctionProcessor::new("flaky", move |_request: Arc<String>, _input| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt <= 2 {
                        Err(Error::Generic("flake".to_string()))
                    } else {
                        Ok(NodeValue::of("ThirdTime".to_string()))
                    }
                })
            }),
            Some(
                Governance::new()
                    .with_timeout(Duration::from_millis(500))
                    .with_max_retries(3)
                    .with_retry_backoff(Duration::from_millis(20)),
            ),
        )
        .set_terminal_strategy(string_of("flaky"));

    let dag = graph.compile().unwrap();
    let result = dag.apply("req".to_string()).await.unwrap();

    assert_eq!(result, "ThirdTime");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

// Concurrent execution clones Arcs extensively into spawned tasks
#![allow(clippy::clone_on_ref_ptr)]

//! Execution engine for compiled DAGs
//!
//! Each invocation of [`CompiledDag::apply`] builds one task per node,
//! memoized in a per-invocation table so a node runs at most once no matter
//! how many children await it. A task waits for its parents, propagates skip,
//! evaluates edge predicates, runs the node body under its governance, and
//! publishes a [`NodeOutcome`] to every waiter. A global barrier gathers all
//! tasks under the whole-invocation deadline, cancels outstanding work on the
//! first unmasked failure (surfacing its root cause to the caller), and hands
//! the successes to the terminal strategy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::governance::Governance;
use crate::input::UpstreamInput;
use crate::plan::ExecutionPlan;
use crate::value::NodeValue;

/// Whole-invocation deadline applied when none is configured
pub const DEFAULT_GLOBAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Reducer collapsing successful node values into the caller's final result
pub type TerminalFn<Req, Res> =
    Arc<dyn Fn(&Req, &HashMap<String, NodeValue>) -> Result<Res> + Send + Sync>;

/// Terminal state of one node's task within one invocation
///
/// Failure is not an outcome: failures travel on the task's error channel,
/// where fallbacks can intercept them. Skip is a normal outcome that
/// short-circuits children silently.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The node ran (or its fallback did) and produced an optional value
    Success(Option<NodeValue>),
    /// The node was skipped by an edge predicate, a node condition, or a
    /// skipped parent
    Skipped,
}

type TaskResult = Result<NodeOutcome>;

/// Memoized per-node task: one underlying execution, many awaiters
type NodeTask = Shared<BoxFuture<'static, TaskResult>>;

/// An executable DAG produced by [`DagGraph::compile`](crate::DagGraph::compile)
///
/// Immutable and cheap to share: one compiled DAG serves any number of
/// concurrent invocations.
///
/// # Example
///
/// ```rust,ignore
/// let dag = graph.compile()?;
/// let result = dag.apply(request).await?;
/// ```
pub struct CompiledDag<Req, Res> {
    plan: Arc<ExecutionPlan<Req>>,
    terminal: TerminalFn<Req, Res>,
    global_timeout: Duration,
    runtime: Option<Handle>,
    name: Option<String>,
}

impl<Req, Res> CompiledDag<Req, Res>
where
    Req: Send + Sync + 'static,
{
    pub(crate) fn new(
        plan: Arc<ExecutionPlan<Req>>,
        terminal: TerminalFn<Req, Res>,
        global_timeout: Duration,
        runtime: Option<Handle>,
        name: Option<String>,
    ) -> Self {
        Self {
            plan,
            terminal,
            global_timeout,
            runtime,
            name,
        }
    }

    /// The immutable plan this DAG executes
    pub fn plan(&self) -> &ExecutionPlan<Req> {
        &self.plan
    }

    /// The whole-invocation deadline
    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    /// Execute the DAG against one request
    ///
    /// Every node is scheduled exactly once; independent nodes run
    /// concurrently on the worker pool. The call returns a single result from
    /// the terminal strategy or a single error — partial results never escape.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] - the invocation exceeded the global deadline
    /// - the root cause of the first task failure not masked by a fallback,
    ///   with the engine's node-naming wrapper layers stripped: a raising
    ///   processor's or predicate's own error, or an [`Error::NodeTimeout`].
    ///   Outstanding work is cancelled before the error is returned.
    /// - any error raised by the terminal strategy, unwrapped
    pub async fn apply(&self, request: Req) -> Result<Res> {
        let request = Arc::new(request);
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "dag.apply",
            request_id = %request_id,
            dag.name = self.name.as_deref().unwrap_or("dag"),
            dag.nodes = self.plan.len()
        );

        async move {
            let handle = match &self.runtime {
                Some(handle) => handle.clone(),
                None => Handle::current(),
            };

            // Per-invocation task table; lives exactly as long as this call.
            let mut tasks: HashMap<String, NodeTask> = HashMap::with_capacity(self.plan.len());
            let mut abort_handles: Vec<AbortHandle> = Vec::with_capacity(self.plan.len());
            let mut ordered: Vec<(String, NodeTask)> = Vec::with_capacity(self.plan.len());
            for id in self.plan.node_ids() {
                let task = get_or_create_task(
                    id,
                    &self.plan,
                    &request,
                    &handle,
                    &mut tasks,
                    &mut abort_handles,
                );
                ordered.push((id.clone(), task));
            }

            let barrier =
                futures::future::try_join_all(ordered.iter().map(|(_, task)| task.clone()));
            let outcomes = match tokio::time::timeout(self.global_timeout, barrier).await {
                Err(_) => {
                    cancel_all(&abort_handles);
                    tracing::error!(
                        timeout = ?self.global_timeout,
                        "invocation exceeded the global deadline, cancelling outstanding tasks"
                    );
                    return Err(Error::Timeout(self.global_timeout));
                }
                Ok(Err(err)) => {
                    cancel_all(&abort_handles);
                    // The wrapper names the failing node for the log; the
                    // caller receives the bare root cause.
                    let cause = err.unwrapped();
                    tracing::error!(
                        error = %err,
                        cause = %cause,
                        "task failed, cancelling outstanding tasks"
                    );
                    return Err(cause);
                }
                Ok(Ok(outcomes)) => outcomes,
            };

            // Only value-carrying successes reach the terminal strategy.
            let mut results: HashMap<String, NodeValue> = HashMap::new();
            for ((id, _), outcome) in ordered.iter().zip(outcomes) {
                if let NodeOutcome::Success(Some(value)) = outcome {
                    results.insert(id.clone(), value);
                }
            }

            let terminal = self.terminal.as_ref();
            terminal(&request, &results)
        }
        .instrument(span)
        .await
    }
}

impl<Req, Res> std::fmt::Debug for CompiledDag<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledDag")
            .field("plan", &self.plan)
            .field("global_timeout", &self.global_timeout)
            .field("name", &self.name)
            .finish()
    }
}

fn cancel_all(abort_handles: &[AbortHandle]) {
    for handle in abort_handles {
        handle.abort();
    }
}

/// Return the memoized task for `node`, creating (and spawning) it on first
/// request
///
/// Expansion runs on the calling thread before any task is awaited, so the
/// table needs no synchronization; the spawned work itself runs on the worker
/// pool.
fn get_or_create_task<Req>(
    node: &str,
    plan: &Arc<ExecutionPlan<Req>>,
    request: &Arc<Req>,
    handle: &Handle,
    tasks: &mut HashMap<String, NodeTask>,
    abort_handles: &mut Vec<AbortHandle>,
) -> NodeTask
where
    Req: Send + Sync + 'static,
{
    if let Some(task) = tasks.get(node) {
        return task.clone();
    }

    let parent_ids: Vec<String> = plan.parents(node).to_vec();
    let mut parent_tasks = Vec::with_capacity(parent_ids.len());
    for parent in &parent_ids {
        parent_tasks.push(get_or_create_task(
            parent,
            plan,
            request,
            handle,
            tasks,
            abort_handles,
        ));
    }

    let governance = plan.governance(node).cloned();
    let join_handle = handle.spawn(run_node(
        Arc::clone(plan),
        Arc::clone(request),
        node.to_string(),
        governance,
        parent_ids,
        parent_tasks,
    ));
    abort_handles.push(join_handle.abort_handle());

    let node_name = node.to_string();
    let task: NodeTask = async move {
        match join_handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(Error::Internal(format!(
                "task for node '{node_name}' was cancelled"
            ))),
            Err(join_err) => Err(Error::Internal(format!(
                "task for node '{node_name}' panicked: {join_err}"
            ))),
        }
    }
    .boxed()
    .shared();

    tasks.insert(node.to_string(), task.clone());
    task
}

/// One node's task: the composite body under its governance decorations
///
/// The timeout decorates the whole composite (parent wait included); the
/// fallback sits outside the timeout so it sees timeouts, intrinsic failures,
/// and failures cascaded from upstream alike. The fallback receives the
/// failure's root cause, not the engine's transport wrapper.
async fn run_node<Req>(
    plan: Arc<ExecutionPlan<Req>>,
    request: Arc<Req>,
    node: String,
    governance: Option<Governance<Req>>,
    parent_ids: Vec<String>,
    parent_tasks: Vec<NodeTask>,
) -> TaskResult
where
    Req: Send + Sync + 'static,
{
    let timeout = governance.as_ref().and_then(Governance::timeout);
    let body = node_body(plan, Arc::clone(&request), node.clone(), parent_ids, parent_tasks);

    let outcome = match timeout {
        Some(timeout) => match tokio::time::timeout(timeout, body).await {
            Ok(result) => result,
            Err(_) => Err(Error::NodeTimeout {
                node: node.clone(),
                timeout,
            }),
        },
        None => body.await,
    };

    let cause = match outcome {
        Err(cause) => cause,
        ok => return ok,
    };

    let Some(fallback) = governance.as_ref().and_then(Governance::fallback) else {
        return Err(cause);
    };

    tracing::warn!(node = %node, error = %cause, "task failed, invoking fallback");
    let fallback = fallback.as_ref();
    let root_cause = cause.unwrapped();
    match fallback(&request, &UpstreamInput::empty(), &root_cause) {
        Ok(value) => Ok(NodeOutcome::Success(value)),
        Err(fallback_err) => Err(Error::FallbackFailed {
            node,
            source: Arc::new(fallback_err),
        }),
    }
}

/// The composite body: await parents, short-circuit on skip, gate on
/// predicates, then run the processor
async fn node_body<Req>(
    plan: Arc<ExecutionPlan<Req>>,
    request: Arc<Req>,
    node: String,
    parent_ids: Vec<String>,
    parent_tasks: Vec<NodeTask>,
) -> TaskResult
where
    Req: Send + Sync + 'static,
{
    // Cascade failure: a failed parent fails this task with the same error.
    let mut parent_outcomes = Vec::with_capacity(parent_tasks.len());
    for task in parent_tasks {
        parent_outcomes.push(task.await?);
    }

    // Strict cascade skip: the first skipped parent, in declared order,
    // short-circuits before any predicate is evaluated.
    let mut parent_results: HashMap<String, NodeValue> =
        HashMap::with_capacity(parent_ids.len());
    for (parent_id, outcome) in parent_ids.iter().zip(&parent_outcomes) {
        match outcome {
            NodeOutcome::Skipped => {
                tracing::debug!(node = %node, parent = %parent_id, "parent skipped, skipping node");
                return Ok(NodeOutcome::Skipped);
            }
            NodeOutcome::Success(Some(value)) => {
                parent_results.insert(parent_id.clone(), value.clone());
            }
            NodeOutcome::Success(None) => {}
        }
    }

    let view = UpstreamInput::new(parent_results);

    // Incoming edge predicates, in declared parent order; first false wins.
    for parent_id in &parent_ids {
        let Some(predicate) = plan.edge_predicate(parent_id, &node) else {
            continue;
        };
        let predicate = predicate.as_ref();
        match predicate(&request, &view) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(node = %node, from = %parent_id, "edge condition returned false, skipping node");
                return Ok(NodeOutcome::Skipped);
            }
            Err(err) => {
                return Err(Error::EdgeCondition {
                    from: parent_id.clone(),
                    to: node,
                    source: Arc::new(err),
                });
            }
        }
    }

    // Node execution condition, if one guards this node.
    if let Some(condition) = plan.node_condition(&node) {
        let condition = condition.as_ref();
        match condition(&request, &view) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(node = %node, "execution condition returned false, skipping node");
                return Ok(NodeOutcome::Skipped);
            }
            Err(err) => {
                return Err(Error::Condition {
                    node,
                    source: Arc::new(err),
                });
            }
        }
    }

    let Some(processor) = plan.processor(&node).cloned() else {
        return Err(Error::Internal(format!(
            "no processor registered for node '{node}'"
        )));
    };

    let span = info_span!("node.process", node = %node);
    match processor.process(request, view).instrument(span).await {
        Ok(value) => Ok(NodeOutcome::Success(value)),
        Err(err) => Err(Error::NodeExecution {
            node,
            source: Arc::new(err),
        }),
    }
}

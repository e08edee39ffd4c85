// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

// Builder methods take owned values for chaining
#![allow(clippy::needless_pass_by_value)]

//! `DagGraph` - Core graph builder
//!
//! `DagGraph` is the main interface for building DAGs. You register nodes,
//! declare routes between them, attach governance, then compile the graph
//! into a [`CompiledDag`] for execution.
//!
//! # Example
//!
//! ```rust,ignore
//! use dashdag::{DagGraph, NodeValue};
//!
//! let mut graph: DagGraph<String, String> = DagGraph::new();
//! graph
//!     .add_node_from_fn("base", |_request, _input| {
//!         Box::pin(async move { Ok(NodeValue::of("Base".to_string())) })
//!     })
//!     .add_node_from_fn("copy", |_request, input| {
//!         Box::pin(async move {
//!             let base = input.get_as::<String>("base")?.cloned().unwrap_or_default();
//!             Ok(NodeValue::of(format!("{base}Copy")))
//!         })
//!     })
//!     .add_route("base", "copy")
//!     .set_terminal_strategy(|_request, results| {
//!         Ok(results
//!             .get("copy")
//!             .and_then(|v| v.downcast_ref::<String>())
//!             .cloned()
//!             .unwrap_or_default())
//!     });
//!
//! let dag = graph.compile()?;
//! let result = dag.apply("request".to_string()).await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::edge::{edge_key, Edge, EdgePredicateFn};
use crate::error::{Error, Result};
use crate::executor::{CompiledDag, TerminalFn, DEFAULT_GLOBAL_TIMEOUT};
use crate::governance::Governance;
use crate::input::UpstreamInput;
use crate::node::{BoxedProcessor, FunctionProcessor, Processor, ProcessorFuture};
use crate::plan::ExecutionPlan;
use crate::retry::ResilientProcessor;
use crate::value::NodeValue;

/// A graph of processors and routes with per-node governance
///
/// `DagGraph` is the mutable accumulator for a DAG declaration. Add nodes and
/// routes, set the terminal strategy, then compile. Compilation validates the
/// declaration, rejects cycles, and freezes an immutable plan; the resulting
/// [`CompiledDag`] can be applied to many requests concurrently.
///
/// All builder methods return `&mut Self` for fluent chaining.
///
/// # See Also
///
/// - [`CompiledDag`] - The compiled form ready for execution
/// - [`Processor`] - The trait for node units of work
/// - [`Governance`] - Per-node timeout / retry / fallback knobs
pub struct DagGraph<Req, Res> {
    /// Registered processors
    processors: HashMap<String, BoxedProcessor<Req>>,
    /// Node ids in registration order
    node_order: Vec<String>,
    /// Routes in insertion order
    edges: Vec<Edge>,
    /// Edge predicates keyed by `"from->to"` (last declaration wins)
    edge_predicates: HashMap<String, EdgePredicateFn<Req>>,
    /// Per-node execution conditions
    node_conditions: HashMap<String, EdgePredicateFn<Req>>,
    /// Explicit governance declarations; `None` opts a node out of the default
    governance: HashMap<String, Option<Governance<Req>>>,
    /// Governance inherited by nodes without an explicit declaration
    default_governance: Option<Governance<Req>>,
    /// Reducer producing the caller's final result
    terminal: Option<TerminalFn<Req, Res>>,
    /// Whole-invocation deadline
    global_timeout: Option<Duration>,
    /// Worker pool to spawn node tasks on; ambient runtime when unset
    runtime: Option<Handle>,
    /// Graph name carried into tracing spans
    name: Option<String>,
}

impl<Req, Res> DagGraph<Req, Res>
where
    Req: Send + Sync + 'static,
{
    /// Create a new empty graph
    #[must_use]
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
            node_order: Vec::new(),
            edges: Vec::new(),
            edge_predicates: HashMap::new(),
            node_conditions: HashMap::new(),
            governance: HashMap::new(),
            default_governance: None,
            terminal: None,
            global_timeout: None,
            runtime: None,
            name: None,
        }
    }

    /// Register a node
    ///
    /// The node inherits the graph's default governance (if one is set) at
    /// compile time. If a node with the same id already exists it is
    /// overwritten, its previous governance declaration included, and a
    /// warning is logged.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        processor: impl Processor<Req> + 'static,
    ) -> &mut Self {
        let id = id.into();
        if self.processors.contains_key(&id) {
            tracing::warn!(node = %id, "node '{}' already exists, overwriting", id);
            self.governance.remove(&id);
        } else {
            self.node_order.push(id.clone());
        }
        self.processors.insert(id, Arc::new(processor));
        self
    }

    /// Register a node with an explicit governance declaration
    ///
    /// Passing `None` opts the node out of governance entirely: no timeout,
    /// no retry, no fallback, regardless of the graph's default.
    pub fn add_node_with_governance(
        &mut self,
        id: impl Into<String>,
        processor: impl Processor<Req> + 'static,
        governance: Option<Governance<Req>>,
    ) -> &mut Self {
        let id = id.into();
        self.add_node(id.clone(), processor);
        self.governance.insert(id, governance);
        self
    }

    /// Register a node from an async closure
    ///
    /// Convenience wrapper around [`FunctionProcessor`].
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// graph.add_node_from_fn("greet", |_request, _input| {
    ///     Box::pin(async move { Ok(NodeValue::of("hello".to_string())) })
    /// });
    /// ```
    pub fn add_node_from_fn<F>(&mut self, id: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(Arc<Req>, UpstreamInput) -> ProcessorFuture + Send + Sync + 'static,
    {
        let id = id.into();
        let processor = FunctionProcessor::new(id.clone(), func);
        self.add_node(id, processor)
    }

    /// Declare a route from `from` to `to`
    ///
    /// The edge is always connected. Re-declaring an existing route clears
    /// any predicate previously attached to it.
    pub fn add_route(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.insert_route(from.into(), to.into(), None);
        self
    }

    /// Declare a route gated by a predicate
    ///
    /// The predicate is evaluated once the parent has completed, against the
    /// request and the child's upstream view. Returning `false` skips the
    /// child (and, transitively, everything downstream of it). Re-declaring
    /// an existing route replaces its predicate; the adjacency is not
    /// duplicated.
    pub fn add_route_when<F>(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        predicate: F,
    ) -> &mut Self
    where
        F: Fn(&Req, &UpstreamInput) -> Result<bool> + Send + Sync + 'static,
    {
        self.insert_route(from.into(), to.into(), Some(Arc::new(predicate)));
        self
    }

    fn insert_route(&mut self, from: String, to: String, predicate: Option<EdgePredicateFn<Req>>) {
        let exists = self.edges.iter().any(|e| e.from == from && e.to == to);
        if !exists {
            self.edges.push(Edge::new(from.clone(), to.clone()));
        }
        let key = edge_key(&from, &to);
        match predicate {
            Some(predicate) => {
                self.edge_predicates.insert(key, predicate);
            }
            None => {
                self.edge_predicates.remove(&key);
            }
        }
    }

    /// Guard a node with an execution condition
    ///
    /// Evaluated after the node's incoming edge predicates and before its
    /// body; `false` skips the node.
    pub fn set_node_condition<F>(&mut self, id: impl Into<String>, condition: F) -> &mut Self
    where
        F: Fn(&Req, &UpstreamInput) -> Result<bool> + Send + Sync + 'static,
    {
        self.node_conditions.insert(id.into(), Arc::new(condition));
        self
    }

    /// Set the governance inherited by nodes without an explicit declaration
    pub fn set_default_governance(&mut self, governance: Governance<Req>) -> &mut Self {
        self.default_governance = Some(governance);
        self
    }

    /// Set the reducer that collapses successful node values into the final
    /// result
    ///
    /// Mandatory: compilation fails without one. The reducer receives the
    /// request and a map holding every node that completed with a value;
    /// skipped and value-less nodes are absent.
    pub fn set_terminal_strategy<F>(&mut self, terminal: F) -> &mut Self
    where
        F: Fn(&Req, &HashMap<String, NodeValue>) -> Result<Res> + Send + Sync + 'static,
    {
        self.terminal = Some(Arc::new(terminal));
        self
    }

    /// Cap the wall time of a whole invocation (default: 60 seconds)
    pub fn set_global_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.global_timeout = Some(timeout);
        self
    }

    /// Spawn node tasks on a specific runtime instead of the ambient one
    ///
    /// The engine never creates threads of its own and never shuts the
    /// runtime down.
    pub fn with_runtime(&mut self, runtime: Handle) -> &mut Self {
        self.runtime = Some(runtime);
        self
    }

    /// Name the graph for log correlation
    pub fn with_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Compile the graph into an executable DAG
    ///
    /// Validates the declaration, drops routes referencing unregistered
    /// nodes, rejects cycles, derives the reverse dependency map, resolves
    /// governance, and wraps retry-configured processors. The compiled form
    /// is immutable and reusable across invocations.
    ///
    /// # Errors
    ///
    /// - [`Error::NoTerminalStrategy`] - no terminal strategy was set
    /// - [`Error::Validation`] - a node was registered under an empty id
    /// - [`Error::CycleDetected`] - the routes form a cycle
    pub fn compile(self) -> Result<CompiledDag<Req, Res>> {
        let terminal = self.terminal.ok_or(Error::NoTerminalStrategy)?;

        if self.node_order.iter().any(String::is_empty) {
            return Err(Error::Validation(
                "node id must be a non-empty string".to_string(),
            ));
        }

        // Routes referencing unregistered nodes are dropped, not rejected:
        // a declaration may wire in nodes that a given deployment leaves out.
        let mut edges = Vec::with_capacity(self.edges.len());
        for edge in self.edges {
            if self.processors.contains_key(&edge.from) && self.processors.contains_key(&edge.to) {
                edges.push(edge);
            } else {
                tracing::warn!(
                    from = %edge.from,
                    to = %edge.to,
                    "route references an unregistered node, dropping"
                );
            }
        }

        Self::check_acyclic(&self.node_order, &edges)?;

        // Reverse dependency map, parent order = edge insertion order
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &edges {
            parents
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
        }

        // Resolve effective governance: explicit declaration wins, an explicit
        // `None` suppresses the default.
        let mut governance: HashMap<String, Governance<Req>> = HashMap::new();
        for id in &self.node_order {
            let resolved = match self.governance.get(id) {
                Some(explicit) => explicit.clone(),
                None => self.default_governance.clone(),
            };
            if let Some(resolved) = resolved {
                governance.insert(id.clone(), resolved);
            }
        }

        // Wrap retry-configured processors
        let mut processors: HashMap<String, BoxedProcessor<Req>> = HashMap::new();
        for (id, processor) in self.processors {
            let wrapped = match governance.get(&id) {
                Some(g) if g.max_retries() > 0 => Arc::new(ResilientProcessor::new(
                    id.clone(),
                    processor,
                    g.max_retries(),
                    g.retry_backoff(),
                )) as BoxedProcessor<Req>,
                _ => processor,
            };
            processors.insert(id, wrapped);
        }

        let plan = ExecutionPlan::new(
            self.node_order,
            parents,
            processors,
            governance,
            self.edge_predicates,
            self.node_conditions,
        );

        Ok(CompiledDag::new(
            Arc::new(plan),
            terminal,
            self.global_timeout.unwrap_or(DEFAULT_GLOBAL_TIMEOUT),
            self.runtime,
            self.name,
        ))
    }

    /// Kahn's algorithm over the registered-node edge set
    ///
    /// Every node must drain; anything left over sits on a cycle.
    fn check_acyclic(node_order: &[String], edges: &[Edge]) -> Result<()> {
        let mut in_degree: HashMap<&str, usize> =
            node_order.iter().map(|id| (id.as_str(), 0)).collect();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in edges {
            if let Some(degree) = in_degree.get_mut(edge.to.as_str()) {
                *degree += 1;
            }
            children
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }

        let mut queue: VecDeque<&str> = node_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();

        let mut drained = 0usize;
        while let Some(node) = queue.pop_front() {
            drained += 1;
            let Some(node_children) = children.get(node) else {
                continue;
            };
            for child in node_children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if drained != node_order.len() {
            let mut undrained: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| *id)
                .collect();
            undrained.sort_unstable();
            return Err(Error::CycleDetected(undrained.join(", ")));
        }
        Ok(())
    }
}

impl<Req, Res> Default for DagGraph<Req, Res>
where
    Req: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Res> fmt::Debug for DagGraph<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagGraph")
            .field("nodes", &self.node_order)
            .field("edges", &self.edges.len())
            .field("gated_edges", &self.edge_predicates.len())
            .field("has_default_governance", &self.default_governance.is_some())
            .field("has_terminal", &self.terminal.is_some())
            .field("name", &self.name)
            .finish()
    }
}

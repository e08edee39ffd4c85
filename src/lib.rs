// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

#![warn(missing_docs)]

//! # `DashDAG` - Compile-once, execute-many DAG execution
//!
//! `DashDAG` orchestrates heterogeneous, dependency-linked units of work as a
//! directed acyclic graph. A static declaration of nodes, routes, and
//! per-node governance compiles into an immutable plan; each invocation runs
//! the plan against a request and returns a single caller-chosen result.
//! Typical uses are RPC fan-out aggregation, multi-stage validation
//! pipelines, and business workflow composition.
//!
//! ## Key Concepts
//!
//! - **[`DagGraph`]**: Builder for nodes, routes, governance, and hooks
//! - **[`Processor`]**: The unit of work attached to each node
//! - **Routes**: Parent-to-child dependencies, optionally gated by predicates
//! - **[`Governance`]**: Per-node timeout, bounded retry, and fallback
//! - **[`CompiledDag`]**: The compiled, reusable execution engine
//!
//! ## Example
//!
//! ```rust,ignore
//! use dashdag::{DagGraph, NodeValue};
//!
//! let mut graph: DagGraph<String, String> = DagGraph::new();
//! graph
//!     .add_node_from_fn("base", |_request, _input| {
//!         Box::pin(async move { Ok(NodeValue::of("Base".to_string())) })
//!     })
//!     .add_node_from_fn("enrich", |_request, input| {
//!         Box::pin(async move {
//!             let base = input.get_as::<String>("base")?.cloned().unwrap_or_default();
//!             Ok(NodeValue::of(format!("{base}Copy")))
//!         })
//!     })
//!     .add_route("base", "enrich")
//!     .set_terminal_strategy(|_request, results| {
//!         Ok(results
//!             .get("enrich")
//!             .and_then(|v| v.downcast_ref::<String>())
//!             .cloned()
//!             .unwrap_or_default())
//!     });
//!
//! let dag = graph.compile()?;
//! let result = dag.apply("Request-001".to_string()).await?;
//! assert_eq!(result, "BaseCopy");
//! ```
//!
//! ## Failure model
//!
//! Skip and failure travel on different channels. A skipped node (false edge
//! predicate, false node condition, or skipped parent) silently
//! short-circuits its descendants and is simply absent from the result map. A
//! failed node fails every task downstream of it with the same error; per-node
//! fallbacks may intercept the failure and substitute a value, otherwise the
//! first unmasked error cancels the invocation and its root cause - the
//! failing processor's or predicate's own error, stripped of the engine's
//! transport wrappers - is returned to the caller.

pub mod edge;
pub mod error;
pub mod executor;
pub mod governance;
pub mod graph;
pub mod input;
pub mod node;
pub mod plan;
pub mod retry;
pub mod value;

pub use edge::{Edge, EdgePredicateFn};
pub use error::{Error, Result};
pub use executor::{CompiledDag, NodeOutcome, TerminalFn, DEFAULT_GLOBAL_TIMEOUT};
pub use governance::{FallbackFn, Governance};
pub use graph::DagGraph;
pub use input::UpstreamInput;
pub use node::{BoxedProcessor, FunctionProcessor, Processor, ProcessorFuture};
pub use plan::ExecutionPlan;
pub use retry::ResilientProcessor;
pub use value::NodeValue;

// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Immutable execution plan
//!
//! The plan is the compiled form of a graph: the node set, the reverse
//! dependency map, the (retry-wrapped) processors, and the governance and
//! predicate tables. It is frozen at compile time and shared unchanged across
//! every invocation.

use std::collections::HashMap;
use std::fmt;

use crate::edge::{edge_key, EdgePredicateFn};
use crate::governance::Governance;
use crate::node::BoxedProcessor;

/// Compiled, immutable snapshot of a graph
///
/// Produced by [`DagGraph::compile`](crate::DagGraph::compile); consumed by
/// the executor on every invocation.
pub struct ExecutionPlan<Req> {
    /// Node ids in registration order
    nodes: Vec<String>,
    /// Reverse dependency map: child id -> parent ids in edge-insertion order
    parents: HashMap<String, Vec<String>>,
    /// Per-node processors, wrapped with retry where governance asks for it
    processors: HashMap<String, BoxedProcessor<Req>>,
    /// Effective per-node governance (explicit or inherited default)
    governance: HashMap<String, Governance<Req>>,
    /// Edge predicates keyed by `"from->to"`
    edge_predicates: HashMap<String, EdgePredicateFn<Req>>,
    /// Per-node execution conditions
    node_conditions: HashMap<String, EdgePredicateFn<Req>>,
}

impl<Req> ExecutionPlan<Req> {
    pub(crate) fn new(
        nodes: Vec<String>,
        parents: HashMap<String, Vec<String>>,
        processors: HashMap<String, BoxedProcessor<Req>>,
        governance: HashMap<String, Governance<Req>>,
        edge_predicates: HashMap<String, EdgePredicateFn<Req>>,
        node_conditions: HashMap<String, EdgePredicateFn<Req>>,
    ) -> Self {
        Self {
            nodes,
            parents,
            processors,
            governance,
            edge_predicates,
            node_conditions,
        }
    }

    /// All node ids, in registration order
    pub fn node_ids(&self) -> &[String] {
        &self.nodes
    }

    /// Number of nodes in the plan
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the plan has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parent ids of `node`, in edge-insertion order
    pub fn parents(&self, node: &str) -> &[String] {
        self.parents.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The (possibly retry-wrapped) processor of `node`
    pub fn processor(&self, node: &str) -> Option<&BoxedProcessor<Req>> {
        self.processors.get(node)
    }

    /// The effective governance of `node`
    pub fn governance(&self, node: &str) -> Option<&Governance<Req>> {
        self.governance.get(node)
    }

    /// The predicate gating the `from -> to` edge, if one was declared
    pub fn edge_predicate(&self, from: &str, to: &str) -> Option<&EdgePredicateFn<Req>> {
        self.edge_predicates.get(&edge_key(from, to))
    }

    /// The execution condition guarding `node`, if one was declared
    pub fn node_condition(&self, node: &str) -> Option<&EdgePredicateFn<Req>> {
        self.node_conditions.get(node)
    }
}

impl<Req> fmt::Debug for ExecutionPlan<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("nodes", &self.nodes)
            .field("parents", &self.parents)
            .field("gated_edges", &self.edge_predicates.len())
            .field("guarded_nodes", &self.node_conditions.len())
            .finish()
    }
}

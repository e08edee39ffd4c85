// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Edges and edge predicates
//!
//! An edge is an ordered `(from, to)` dependency between registered nodes,
//! optionally gated by a predicate evaluated at runtime against the request
//! and the child's upstream view. An edge without a predicate is always
//! connected.

use std::sync::Arc;

use crate::error::Result;
use crate::input::UpstreamInput;

/// A directed dependency from a parent node to a child node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Parent node id
    pub from: String,
    /// Child node id
    pub to: String,
}

impl Edge {
    /// Create a new edge
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// The key under which this edge's predicate is stored
    pub fn key(&self) -> String {
        edge_key(&self.from, &self.to)
    }
}

/// Predicate gating an edge (or guarding a node)
///
/// Evaluated with the invocation request and the child's upstream view.
/// Returning `false` skips the child; raising fails the child's task.
pub type EdgePredicateFn<Req> =
    Arc<dyn Fn(&Req, &UpstreamInput) -> Result<bool> + Send + Sync>;

/// Build the `"from->to"` predicate-table key for an edge
pub(crate) fn edge_key(from: &str, to: &str) -> String {
    format!("{from}->{to}")
}

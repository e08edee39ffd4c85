// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for DashDAG
//!
//! Every failure mode of compilation and execution has its own variant so
//! callers can pattern-match on what went wrong. Error sources are held as
//! `Arc` rather than `Box`: a single upstream failure fans out to every
//! dependent task in the graph, and each of them carries a clone of the
//! originating error instead of a fresh wrapper.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// DashDAG error types
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Graph validation error
    #[error("Graph validation error: {0}")]
    Validation(String),

    /// Cycle detected during compilation
    #[error("Cycle detected in graph involving nodes: {0}")]
    CycleDetected(String),

    /// Graph has no terminal strategy
    #[error("Graph has no terminal strategy defined")]
    NoTerminalStrategy,

    /// Node processor error
    #[error("Node execution error in '{node}': {source}")]
    NodeExecution {
        /// Name of the node that failed.
        node: String,
        /// The underlying error that occurred.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Per-node deadline exceeded
    #[error("Node '{node}' timed out after {timeout:?}")]
    NodeTimeout {
        /// Name of the node that timed out.
        node: String,
        /// The configured deadline.
        timeout: Duration,
    },

    /// Edge condition raised while being evaluated
    #[error("Edge condition failed on '{from}->{to}': {source}")]
    EdgeCondition {
        /// Parent side of the edge.
        from: String,
        /// Child side of the edge.
        to: String,
        /// The underlying error that occurred.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Node execution condition raised while being evaluated
    #[error("Execution condition failed on node '{node}': {source}")]
    Condition {
        /// Name of the guarded node.
        node: String,
        /// The underlying error that occurred.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Fallback raised after intercepting a task failure
    #[error("Fallback for node '{node}' failed: {source}")]
    FallbackFailed {
        /// Name of the node whose fallback failed.
        node: String,
        /// The error raised by the fallback itself.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Whole-graph deadline exceeded
    #[error("Execution timeout after {0:?}")]
    Timeout(Duration),

    /// Typed upstream accessor disagreed with the stored value
    #[error("Upstream value of '{node}' is not a '{expected}' (actual type: '{actual}')")]
    TypeMismatch {
        /// Node whose value was requested.
        node: String,
        /// Type the caller asked for.
        expected: &'static str,
        /// Type recorded when the value was produced.
        actual: &'static str,
    },

    /// Internal execution error (should not happen in normal operation)
    #[error("Internal execution error: {0}")]
    Internal(String),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}

/// Result type for DashDAG operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Walk the source chain to the innermost cause.
    ///
    /// Engine variants such as [`Error::NodeExecution`] name the failing node
    /// and keep the user error underneath; this returns that innermost error
    /// for callers that want the bare cause.
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current
    }

    /// Strip engine wrapper layers and return the root cause as an owned
    /// error.
    ///
    /// Wrapper variants ([`Error::NodeExecution`], [`Error::EdgeCondition`],
    /// [`Error::Condition`], [`Error::FallbackFailed`]) exist to name the
    /// failing node on the task-to-task error channel and in logs; what an
    /// invocation raises to the caller is the innermost cause underneath
    /// them. A source that is not an engine error is surfaced as
    /// [`Error::Generic`] carrying its message. Errors without a source
    /// (timeouts included) are their own root cause.
    pub fn unwrapped(&self) -> Error {
        let mut current = self;
        loop {
            let source = match current {
                Error::NodeExecution { source, .. }
                | Error::EdgeCondition { source, .. }
                | Error::Condition { source, .. }
                | Error::FallbackFailed { source, .. } => source,
                _ => return current.clone(),
            };
            match source.downcast_ref::<Error>() {
                Some(inner) => current = inner,
                None => return Error::Generic(source.to_string()),
            }
        }
    }
}

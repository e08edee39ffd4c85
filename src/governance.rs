// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Per-node governance: timeout, retry, and fallback
//!
//! A [`Governance`] record controls how one node's task behaves under
//! failure. Records are attached per node at registration, or inherited from
//! the builder's default governance when a node declares none.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::input::UpstreamInput;
use crate::value::NodeValue;

/// Fallback producing a substitute value after a task failure
///
/// Invoked with the original request, an **empty** upstream view, and the
/// error that failed the task. On success the task is rewritten to a normal
/// success carrying the fallback value.
pub type FallbackFn<Req> =
    Arc<dyn Fn(&Req, &UpstreamInput, &Error) -> Result<Option<NodeValue>> + Send + Sync>;

/// Control knobs for one node's task
///
/// All knobs are optional:
///
/// - `timeout` caps the task's wall time (zero means no cap)
/// - `max_retries` bounds in-place retry of the processor (zero disables the
///   retry wrapper entirely)
/// - `retry_backoff` sleeps between attempts
/// - `fallback` intercepts any task failure, including timeouts and failures
///   cascaded from upstream
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use dashdag::{Governance, NodeValue};
///
/// let governance = Governance::new()
///     .with_timeout(Duration::from_millis(200))
///     .with_max_retries(2)
///     .with_retry_backoff(Duration::from_millis(50))
///     .with_fallback(|_request, _input, _cause| Ok(NodeValue::of("cached".to_string())));
/// ```
pub struct Governance<Req> {
    timeout: Option<Duration>,
    max_retries: u32,
    retry_backoff: Duration,
    fallback: Option<FallbackFn<Req>>,
}

impl<Req> Governance<Req> {
    /// Create a governance record with no timeout, no retry, no fallback
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: None,
            max_retries: 0,
            retry_backoff: Duration::ZERO,
            fallback: None,
        }
    }

    /// Cap the node's task wall time
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retry the processor up to `max_retries` extra attempts
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sleep between retry attempts
    #[must_use]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Produce a substitute value when the task fails
    #[must_use]
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&Req, &UpstreamInput, &Error) -> Result<Option<NodeValue>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// The configured wall-time cap; zero-duration caps count as none
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// The configured retry budget
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The configured sleep between retry attempts
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// The configured fallback, if any
    pub fn fallback(&self) -> Option<&FallbackFn<Req>> {
        self.fallback.as_ref()
    }
}

impl<Req> Default for Governance<Req> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impl: deriving Clone would demand Req: Clone, but only the Arc'd
// fallback is actually cloned.
impl<Req> Clone for Governance<Req> {
    fn clone(&self) -> Self {
        Self {
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
            fallback: self.fallback.clone(),
        }
    }
}

impl<Req> fmt::Debug for Governance<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governance")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Bounded retry decorator for processors
//!
//! The compiler wraps a node's processor in a [`ResilientProcessor`] when its
//! governance declares a positive retry budget. Retry is the innermost
//! recovery layer: it runs inside the node's task, underneath the per-node
//! timeout and the fallback, and it only re-runs the user processor.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::input::UpstreamInput;
use crate::node::{BoxedProcessor, Processor};
use crate::value::NodeValue;

/// Processor decorator adding bounded retry with backoff
///
/// Attempts the wrapped processor up to `1 + max_retries` times, sleeping
/// `retry_backoff` between attempts. On exhaustion the last error is raised
/// unchanged.
pub struct ResilientProcessor<Req> {
    node_id: String,
    delegate: BoxedProcessor<Req>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<Req> ResilientProcessor<Req> {
    /// Wrap `delegate` with a retry budget
    pub fn new(
        node_id: impl Into<String>,
        delegate: BoxedProcessor<Req>,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            delegate,
            max_retries,
            retry_backoff,
        }
    }
}

#[async_trait]
impl<Req> Processor<Req> for ResilientProcessor<Req>
where
    Req: Send + Sync + 'static,
{
    async fn process(&self, request: Arc<Req>, input: UpstreamInput) -> Result<Option<NodeValue>> {
        let mut failures = 0u32;
        loop {
            match self
                .delegate
                .process(Arc::clone(&request), input.clone())
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failures += 1;
                    if failures > self.max_retries {
                        tracing::error!(
                            node = %self.node_id,
                            retries = self.max_retries,
                            "node failed after exhausting retries"
                        );
                        return Err(err);
                    }
                    tracing::warn!(
                        node = %self.node_id,
                        attempt = failures,
                        max_retries = self.max_retries,
                        error = %err,
                        "node failed, retrying"
                    );
                    if !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }
    }

    fn name(&self) -> String {
        self.delegate.name()
    }
}

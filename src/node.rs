// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Processor trait and implementations
//!
//! Processors are the computational units in a DashDAG graph. Each processor
//! receives the invocation request and a read-only view of its parents'
//! results, and produces an optional output value.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::input::UpstreamInput;
use crate::value::NodeValue;

/// Boxed future returned by function processors
pub type ProcessorFuture = Pin<Box<dyn Future<Output = Result<Option<NodeValue>>> + Send>>;

/// A unit of work attached to a node
///
/// Processors run on the worker pool once all the node's parents have
/// completed. They see an immutable snapshot of upstream results and the
/// shared request; the engine provides no mutable context.
///
/// # Example
///
/// ```rust,ignore
/// use dashdag::{NodeValue, Processor, UpstreamInput};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct PriceLookup;
///
/// #[async_trait]
/// impl Processor<Order> for PriceLookup {
///     async fn process(
///         &self,
///         request: Arc<Order>,
///         input: UpstreamInput,
///     ) -> dashdag::Result<Option<NodeValue>> {
///         let sku = input.get_as::<String>("resolve_sku")?;
///         let price = lookup(&request, sku).await?;
///         Ok(NodeValue::of(price))
///     }
/// }
/// ```
///
/// # See Also
///
/// - [`FunctionProcessor`] - Use closures as processors without implementing
///   the trait
/// - [`BoxedProcessor`] - Type-erased processor for dynamic dispatch
/// - [`DagGraph`](crate::DagGraph) - Builder that registers processors
#[async_trait]
pub trait Processor<Req>: Send + Sync
where
    Req: Send + Sync,
{
    /// Execute this node's unit of work
    ///
    /// # Arguments
    ///
    /// * `request` - The shared invocation request
    /// * `input` - Read-only view over parent results
    ///
    /// # Returns
    ///
    /// The node's output value, or `None` for a value-less success. A
    /// value-less success contributes nothing to downstream views or the
    /// final result map.
    async fn process(&self, request: Arc<Req>, input: UpstreamInput) -> Result<Option<NodeValue>>;

    /// Get the name of this processor (for debugging and tracing)
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Processor")
            .to_string()
    }
}

/// Type-erased processor for dynamic dispatch
///
/// This is `Arc<dyn Processor<Req>>`, allowing processors of different
/// concrete types to be stored in the same plan. The `Arc` wrapper enables
/// shared ownership across invocations and cheap cloning into spawned tasks.
pub type BoxedProcessor<Req> = Arc<dyn Processor<Req>>;

/// A processor that wraps an async function
///
/// This allows using closures or functions as processors without implementing
/// the [`Processor`] trait directly.
///
/// # Example
///
/// ```rust,ignore
/// // Using add_node_from_fn (recommended)
/// graph.add_node_from_fn("greet", |_request, _input| {
///     Box::pin(async move { Ok(NodeValue::of("hello".to_string())) })
/// });
/// ```
pub struct FunctionProcessor<Req, F>
where
    Req: Send + Sync + 'static,
    F: Fn(Arc<Req>, UpstreamInput) -> ProcessorFuture + Send + Sync + 'static,
{
    func: F,
    name: String,
    _phantom: std::marker::PhantomData<fn(Req)>,
}

impl<Req, F> FunctionProcessor<Req, F>
where
    Req: Send + Sync + 'static,
    F: Fn(Arc<Req>, UpstreamInput) -> ProcessorFuture + Send + Sync + 'static,
{
    /// Create a new function processor
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            func,
            name: name.into(),
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<Req, F> Processor<Req> for FunctionProcessor<Req, F>
where
    Req: Send + Sync + 'static,
    F: Fn(Arc<Req>, UpstreamInput) -> ProcessorFuture + Send + Sync + 'static,
{
    async fn process(&self, request: Arc<Req>, input: UpstreamInput) -> Result<Option<NodeValue>> {
        (self.func)(request, input).await
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<Req, F> fmt::Debug for FunctionProcessor<Req, F>
where
    Req: Send + Sync + 'static,
    F: Fn(Arc<Req>, UpstreamInput) -> ProcessorFuture + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionProcessor")
            .field("name", &self.name)
            .finish()
    }
}

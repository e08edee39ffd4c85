// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Dynamic node output container
//!
//! Nodes in a DAG produce values of different types, so node outputs travel
//! through the engine as [`NodeValue`]: a shared `Any` tagged with the type
//! name captured at construction. The tag makes type mismatches reportable
//! with both sides of the disagreement.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased node output
///
/// Cloning is cheap (an `Arc` clone); the contained value is immutable and
/// shared between every downstream reader.
///
/// # Example
///
/// ```rust
/// use dashdag::NodeValue;
///
/// let value = NodeValue::new(42_i64);
/// assert_eq!(value.downcast_ref::<i64>(), Some(&42));
/// assert!(value.downcast_ref::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct NodeValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl NodeValue {
    /// Wrap a value, recording its type name for diagnostics
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Convenience for processor return values: `Ok(NodeValue::of(x))`
    pub fn of<T: Any + Send + Sync>(value: T) -> Option<Self> {
        Some(Self::new(value))
    }

    /// Borrow the contained value as `T`, or `None` if the type differs
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the contained value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// The type name recorded when the value was produced
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

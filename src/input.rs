// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Read-only view over upstream results
//!
//! Each node body receives an [`UpstreamInput`]: an immutable projection of
//! its parents' outputs, keyed by node id. A parent that was skipped, or that
//! completed with no value, has no entry in the view.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::NodeValue;

/// Immutable, typed accessor over parent results
///
/// Cloning is cheap; the underlying map is shared.
///
/// # Example
///
/// ```rust,ignore
/// // Inside a processor for a node with parent "fetch_user":
/// let user: Option<&User> = input.get_as::<User>("fetch_user")?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct UpstreamInput {
    results: Arc<HashMap<String, NodeValue>>,
}

impl UpstreamInput {
    pub(crate) fn new(results: HashMap<String, NodeValue>) -> Self {
        Self {
            results: Arc::new(results),
        }
    }

    /// A view with no upstream entries
    ///
    /// This is what fallbacks receive: on a cascaded failure parent outputs
    /// are generally unavailable, so fallbacks see only the request and the
    /// cause.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the raw value of an upstream node, if present
    pub fn get(&self, node: &str) -> Option<&NodeValue> {
        self.results.get(node)
    }

    /// Get the value of an upstream node as `T`
    ///
    /// Returns `Ok(None)` when the node contributed no value (absent,
    /// skipped, or completed with no output).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when a value is present but is not a
    /// `T`.
    pub fn get_as<T: Any>(&self, node: &str) -> Result<Option<&T>> {
        match self.results.get(node) {
            None => Ok(None),
            Some(value) => match value.downcast_ref::<T>() {
                Some(typed) => Ok(Some(typed)),
                None => Err(Error::TypeMismatch {
                    node: node.to_string(),
                    expected: std::any::type_name::<T>(),
                    actual: value.type_name(),
                }),
            },
        }
    }

    /// Whether an upstream node contributed a value
    pub fn contains(&self, node: &str) -> bool {
        self.results.contains_key(node)
    }

    /// Number of upstream entries in the view
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the view has no entries
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate the node ids present in the view
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_with(entries: Vec<(&str, NodeValue)>) -> UpstreamInput {
        UpstreamInput::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_get_present_value() {
        let view = view_with(vec![("a", NodeValue::new(10_i64))]);
        assert!(view.get("a").is_some());
        assert!(view.contains("a"));
    }

    #[test]
    fn test_get_absent_value_is_none() {
        let view = view_with(vec![("a", NodeValue::new(10_i64))]);
        assert!(view.get("missing").is_none());
        assert!(!view.contains("missing"));
    }

    #[test]
    fn test_get_as_matching_type() {
        let view = view_with(vec![("a", NodeValue::new("Base".to_string()))]);
        let value = view.get_as::<String>("a").unwrap();
        assert_eq!(value.map(String::as_str), Some("Base"));
    }

    #[test]
    fn test_get_as_absent_is_ok_none() {
        let view = view_with(vec![]);
        assert!(view.get_as::<String>("a").unwrap().is_none());
    }

    #[test]
    fn test_get_as_wrong_type_is_mismatch() {
        let view = view_with(vec![("a", NodeValue::new("Base".to_string()))]);
        let result = view.get_as::<i64>("a");
        assert!(matches!(
            result,
            Err(Error::TypeMismatch { ref node, .. }) if node == "a"
        ));
    }

    #[test]
    fn test_empty_view() {
        let view = UpstreamInput::empty();
        assert!(view.is_empty());
        assert_eq!(view.len(), 0);
        assert_eq!(view.node_ids().count(), 0);
    }

    #[test]
    fn test_clone_shares_entries() {
        let view = view_with(vec![("a", NodeValue::new(1_u8))]);
        let cloned = view.clone();
        assert_eq!(cloned.len(), 1);
        assert!(cloned.contains("a"));
    }
}

//! Attribute filters scoping which events a trigger forwards.
//!
//! A [`FilterSet`] is an ordered list of exact-match [`AttributeFilter`]s.
//! An event passes the set when every filter finds its key in the event
//! attributes with an identical value. There is no wildcard or pattern
//! matching.
//!
//! Two sets are equivalent when they hold the same `(key, value)` pairs,
//! regardless of order. Equivalence is what the reconciler uses to detect
//! duplicate and superseded routes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Attribute carrying the event type.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Attribute carrying the event source.
pub const SOURCE_ATTRIBUTE: &str = "source";

/// A single exact-match condition on an event attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeFilter {
  pub key: String,
  pub value: String,
}

impl AttributeFilter {
  /// Build a filter matching events whose `key` attribute equals `value`.
  pub fn exact(key: impl Into<String>, value: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      value: value.into(),
    }
  }

  pub fn matches(&self, attributes: &BTreeMap<String, String>) -> bool {
    attributes.get(&self.key).is_some_and(|v| *v == self.value)
  }
}

impl fmt::Display for AttributeFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={}", self.key, self.value)
  }
}

/// Ordered AND-combination of attribute filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(Vec<AttributeFilter>);

impl FilterSet {
  pub fn new(filters: Vec<AttributeFilter>) -> Self {
    Self(filters)
  }

  /// A set holding a single exact-match filter.
  pub fn exact(key: impl Into<String>, value: impl Into<String>) -> Self {
    Self(vec![AttributeFilter::exact(key, value)])
  }

  pub fn filters(&self) -> &[AttributeFilter] {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Returns true when every filter matches. An empty set matches everything.
  pub fn matches(&self, attributes: &BTreeMap<String, String>) -> bool {
    self.0.iter().all(|filter| filter.matches(attributes))
  }

  /// Value equality over the `(key, value)` pairs, ignoring order.
  pub fn equivalent(&self, other: &FilterSet) -> bool {
    self.canonical() == other.canonical()
  }

  /// The filters as a sorted, de-duplicated set.
  pub fn canonical(&self) -> BTreeSet<&AttributeFilter> {
    self.0.iter().collect()
  }
}

impl From<AttributeFilter> for FilterSet {
  fn from(filter: AttributeFilter) -> Self {
    Self(vec![filter])
  }
}

impl fmt::Display for FilterSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      return write!(f, "*");
    }
    let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
    write!(f, "{}", parts.join(","))
  }
}

/// Build a single exact-match filter.
pub fn build_exact_filter(key: &str, value: &str) -> AttributeFilter {
  AttributeFilter::exact(key, value)
}

/// Returns true when `attributes` pass every filter in `filters`.
pub fn matches(filters: &FilterSet, attributes: &BTreeMap<String, String>) -> bool {
  filters.matches(attributes)
}

/// Set-equality of two filter sets.
pub fn equivalent(a: &FilterSet, b: &FilterSet) -> bool {
  a.equivalent(b)
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::component::Role;
use crate::consts::TRIGGER_HASH_LEN;
use crate::filter::FilterSet;
use crate::manifest::ManifestRecord;
use crate::util::hash::short_hash;

use super::reconcile::BrokerError;

/// Manifest kind of trigger records.
pub const TRIGGER_KIND: &str = "Trigger";

/// Where a trigger delivers: a consumer component and its reachable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerTarget {
  pub name: String,
  pub url: String,
}

impl TriggerTarget {
  pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      url: url.into(),
    }
  }
}

/// A named route from the broker to a consumer, scoped by a filter set.
#[derive(Debug, Clone)]
pub struct Trigger {
  pub name: String,
  pub broker: String,
  pub filters: FilterSet,
  pub target: TriggerTarget,
}

/// Payload of a trigger record in the manifest.
#[derive(Debug, Serialize, Deserialize)]
struct TriggerSpec {
  broker: String,
  #[serde(default)]
  filters: FilterSet,
  target: TriggerTarget,
}

impl Trigger {
  /// True when both triggers route the same events to the same consumer.
  ///
  /// The target is compared by component name; its URL changes whenever the
  /// consumer's container is replaced.
  pub fn same_route(&self, other: &Trigger) -> bool {
    self.target.name == other.target.name && self.filters.equivalent(&other.filters)
  }

  pub fn from_record(record: &ManifestRecord) -> Result<Self, BrokerError> {
    let spec: TriggerSpec =
      serde_json::from_value(record.spec.clone()).map_err(|e| BrokerError::InvalidTrigger {
        name: record.name().to_string(),
        message: e.to_string(),
      })?;
    Ok(Self {
      name: record.name().to_string(),
      broker: spec.broker,
      filters: spec.filters,
      target: spec.target,
    })
  }

  pub fn to_record(&self) -> ManifestRecord {
    let spec = TriggerSpec {
      broker: self.broker.clone(),
      filters: self.filters.clone(),
      target: self.target.clone(),
    };
    // A struct of strings and string pairs always serializes.
    let spec = serde_json::to_value(spec).unwrap_or_default();
    ManifestRecord::new(Role::Trigger.api_version(), TRIGGER_KIND, &self.name, spec)
  }

  /// Name for a new route, derived from its content and made unique against
  /// `taken`.
  pub(crate) fn generate_name(target: &str, filters: &FilterSet, taken: &BTreeSet<&str>) -> String {
    let canonical: Vec<String> = filters.canonical().iter().map(ToString::to_string).collect();
    let seed = format!("{}|{}", canonical.join(","), target);
    let base = format!("{}-trigger-{}", target, short_hash(seed.as_bytes(), TRIGGER_HASH_LEN));

    if !taken.contains(base.as_str()) {
      return base;
    }
    (2..)
      .map(|n| format!("{}-{}", base, n))
      .find(|candidate| !taken.contains(candidate.as_str()))
      .unwrap_or(base)
  }
}

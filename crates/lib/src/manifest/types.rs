//! Manifest record types and in-memory operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{CapabilityError, Component, Role};

use super::store::ManifestError;

/// Object metadata. Only the name takes part in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
  pub name: String,
}

/// One manifest entry, `{apiVersion, kind, metadata.name, spec}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
  pub api_version: String,
  pub kind: String,
  pub metadata: Metadata,
  #[serde(default)]
  pub spec: Value,
}

impl ManifestRecord {
  pub fn new(api_version: &str, kind: &str, name: &str, spec: Value) -> Self {
    Self {
      api_version: api_version.to_string(),
      kind: kind.to_string(),
      metadata: Metadata { name: name.to_string() },
      spec,
    }
  }

  pub fn name(&self) -> &str {
    &self.metadata.name
  }

  pub fn is(&self, kind: &str, name: &str) -> bool {
    self.kind == kind && self.metadata.name == name
  }
}

/// Ordered set of records, unique by `(kind, name)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
  records: Vec<ManifestRecord>,
}

impl Manifest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_records(records: Vec<ManifestRecord>) -> Self {
    let mut manifest = Self::new();
    for record in records {
      manifest.add(record);
    }
    manifest
  }

  pub fn records(&self) -> &[ManifestRecord] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Insert or replace a record.
  ///
  /// Returns `true` when a record with the same identity already existed and
  /// its content changed, meaning a running adapter must be restarted to pick
  /// up the new specification.
  pub fn add(&mut self, record: ManifestRecord) -> bool {
    match self.position(&record.kind, record.name()) {
      Some(idx) if self.records[idx] == record => false,
      Some(idx) => {
        self.records[idx] = record;
        true
      }
      None => {
        self.records.push(record);
        false
      }
    }
  }

  pub fn remove(&mut self, kind: &str, name: &str) -> Result<ManifestRecord, ManifestError> {
    let idx = self.position(kind, name).ok_or_else(|| ManifestError::NotFound {
      kind: kind.to_string(),
      name: name.to_string(),
    })?;
    Ok(self.records.remove(idx))
  }

  pub fn get(&self, kind: &str, name: &str) -> Option<&ManifestRecord> {
    self.records.iter().find(|r| r.is(kind, name))
  }

  pub fn by_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ManifestRecord> + 'a {
    self.records.iter().filter(move |r| r.kind == kind)
  }

  /// Find the component named `name`, whatever its kind. Triggers are routes,
  /// not components, and are never returned.
  pub fn component(&self, name: &str) -> Result<Component, ManifestError> {
    let record = self
      .records
      .iter()
      .find(|r| r.kind != "Trigger" && r.name() == name)
      .ok_or_else(|| ManifestError::ComponentNotFound(name.to_string()))?;
    decode(record)
  }

  /// Every component record decoded, in manifest order. Triggers excluded.
  pub fn components(&self) -> Result<Vec<Component>, ManifestError> {
    self.records.iter().filter(|r| r.kind != "Trigger").map(decode).collect()
  }

  /// The first broker record, if the manifest declares one.
  pub fn broker(&self) -> Option<Component> {
    self
      .records
      .iter()
      .filter_map(|r| Component::from_record(r).ok())
      .find(|c| c.role() == Role::Broker)
  }

  fn position(&self, kind: &str, name: &str) -> Option<usize> {
    self.records.iter().position(|r| r.is(kind, name))
  }
}

fn decode(record: &ManifestRecord) -> Result<Component, ManifestError> {
  Component::from_record(record).map_err(|e: CapabilityError| ManifestError::Decode {
    kind: record.kind.clone(),
    name: record.name().to_string(),
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn source(name: &str, spec: Value) -> ManifestRecord {
    ManifestRecord::new("sources.triggermesh.io/v1alpha1", "PingSource", name, spec)
  }

  #[test]
  fn add_new_record_needs_no_restart() {
    let mut manifest = Manifest::new();
    assert!(!manifest.add(source("ping", json!({}))));
    assert_eq!(manifest.len(), 1);
  }

  #[test]
  fn add_identical_record_is_noop() {
    let mut manifest = Manifest::new();
    manifest.add(source("ping", json!({ "schedule": "1m" })));
    assert!(!manifest.add(source("ping", json!({ "schedule": "1m" }))));
    assert_eq!(manifest.len(), 1);
  }

  #[test]
  fn add_changed_record_replaces_in_place() {
    let mut manifest = Manifest::new();
    manifest.add(source("a", json!({})));
    manifest.add(source("b", json!({})));
    assert!(manifest.add(source("a", json!({ "schedule": "5m" }))));
    assert_eq!(manifest.records()[0].spec, json!({ "schedule": "5m" }));
    assert_eq!(manifest.len(), 2);
  }

  #[test]
  fn identity_includes_kind() {
    let mut manifest = Manifest::new();
    manifest.add(source("x", json!({})));
    manifest.add(ManifestRecord::new("eventing.triggermesh.io/v1alpha1", "Trigger", "x", json!({})));
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.component("x").unwrap().kind(), "PingSource");
  }

  #[test]
  fn remove_missing_record_fails() {
    let mut manifest = Manifest::new();
    let err = manifest.remove("PingSource", "ghost").unwrap_err();
    assert!(matches!(err, ManifestError::NotFound { .. }));
  }

  #[test]
  fn component_lookup_reports_unknown_kind() {
    let mut manifest = Manifest::new();
    manifest.add(ManifestRecord::new("apps/v1", "Deployment", "web", json!({})));
    let err = manifest.component("web").unwrap_err();
    assert!(matches!(err, ManifestError::Decode { .. }));
  }
}

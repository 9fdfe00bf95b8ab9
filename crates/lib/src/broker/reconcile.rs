//! Trigger reconciliation.
//!
//! A reconciliation transaction:
//! 1. serializes against other transactions in this process and takes the
//!    context's file lock,
//! 2. loads the manifest and decodes its triggers,
//! 3. applies the requested mutation set in memory and checks that no two
//!    triggers route the same filters to the same consumer,
//! 4. writes the broker configuration, then the manifest.
//!
//! Nothing is written when any step before 4 fails. If the manifest write
//! fails after the configuration was replaced, the previous configuration is
//! restored so the two never disagree.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::component::Component;
use crate::context::ContextPaths;
use crate::filter::FilterSet;
use crate::lock::{ContextLock, LockError};
use crate::manifest::{Manifest, ManifestError};
use crate::util::fs::write_atomic;

use super::config::BrokerConfig;
use super::trigger::{TRIGGER_KIND, Trigger, TriggerTarget};

#[derive(Debug, Error)]
pub enum BrokerError {
  #[error("route {trigger:?} duplicates existing trigger {existing:?}")]
  RouteConflict { trigger: String, existing: String },

  #[error("trigger {0:?} not found")]
  TriggerNotFound(String),

  #[error("invalid trigger {name:?}: {message}")]
  InvalidTrigger { name: String, message: String },

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("failed to read broker config {}: {source}", path.display())]
  ConfigRead {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write broker config {}: {source}", path.display())]
  ConfigWrite {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot parse broker config: {0}")]
  ConfigParse(#[source] serde_yaml::Error),

  #[error("cannot serialize broker config: {0}")]
  ConfigSerialize(#[source] serde_yaml::Error),
}

/// Result of routing with supersession.
#[derive(Debug, Clone)]
pub struct SupersedeOutcome {
  pub trigger: Trigger,
  pub removed: Vec<Trigger>,
}

/// Keeps the manifest's triggers and the broker configuration in step.
pub struct Reconciler {
  paths: ContextPaths,
  broker: String,
  guard: Mutex<()>,
}

impl Reconciler {
  pub fn new(paths: ContextPaths, broker: impl Into<String>) -> Self {
    Self {
      paths,
      broker: broker.into(),
      guard: Mutex::new(()),
    }
  }

  pub fn broker(&self) -> &str {
    &self.broker
  }

  pub fn paths(&self) -> &ContextPaths {
    &self.paths
  }

  /// Every trigger in the manifest.
  pub fn triggers(&self) -> Result<Vec<Trigger>, BrokerError> {
    let manifest = Manifest::load(&self.paths.manifest)?;
    load_triggers(&manifest)
  }

  /// Triggers delivering to the consumer named `target`.
  pub fn target_triggers(&self, target: &str) -> Result<Vec<Trigger>, BrokerError> {
    Ok(
      self
        .triggers()?
        .into_iter()
        .filter(|t| t.target.name == target)
        .collect(),
    )
  }

  /// Route events matching `filters` to `target`.
  ///
  /// When an equivalent route already exists it is returned instead of a new
  /// one, with its URL refreshed if the consumer moved.
  pub async fn route(&self, target: TriggerTarget, filters: FilterSet) -> Result<Trigger, BrokerError> {
    self.route_named(None, target, filters).await
  }

  /// Like [`route`](Self::route) with a caller-chosen trigger name.
  ///
  /// Fails with [`BrokerError::RouteConflict`] when the name belongs to a
  /// different route, or when the route exists under another name.
  pub async fn route_named(
    &self,
    name: Option<&str>,
    target: TriggerTarget,
    filters: FilterSet,
  ) -> Result<Trigger, BrokerError> {
    self
      .transact("route", |routes| routes.route(name, target, filters))
      .await
  }

  /// Route `filters` to `target` and drop every trigger that sent the same
  /// filters to `downstream`, in one transaction.
  pub async fn route_superseding(
    &self,
    target: TriggerTarget,
    filters: FilterSet,
    downstream: &str,
  ) -> Result<SupersedeOutcome, BrokerError> {
    self
      .transact("route", |routes| {
        let trigger = routes.route(None, target, filters.clone())?;
        let removed = routes.remove_where(|t| {
          t.name != trigger.name && t.target.name == downstream && t.filters.equivalent(&filters)
        });
        Ok(SupersedeOutcome { trigger, removed })
      })
      .await
  }

  /// Point the named triggers at `target`, keeping their filters. No trigger
  /// is created or removed.
  pub async fn retarget(&self, names: &[String], target: TriggerTarget) -> Result<Vec<Trigger>, BrokerError> {
    self
      .transact("retarget", |routes| routes.retarget(names, &target))
      .await
  }

  /// Remove one trigger by name.
  pub async fn remove_trigger(&self, name: &str) -> Result<Trigger, BrokerError> {
    self
      .transact("remove trigger", |routes| {
        routes
          .remove_where(|t| t.name == name)
          .pop()
          .ok_or_else(|| BrokerError::TriggerNotFound(name.to_string()))
      })
      .await
  }

  /// Point triggers at the current URL of their consumers.
  ///
  /// `endpoints` maps consumer names to URLs; triggers to other consumers
  /// are left alone. Returns the triggers that changed.
  pub async fn refresh_endpoints(&self, endpoints: &BTreeMap<String, String>) -> Result<Vec<Trigger>, BrokerError> {
    self
      .transact("refresh endpoints", |routes| {
        let mut refreshed = Vec::new();
        for trigger in &mut routes.triggers {
          if let Some(url) = endpoints.get(&trigger.target.name)
            && *url != trigger.target.url
          {
            debug!(trigger = %trigger.name, url = %url, "refreshing trigger endpoint");
            trigger.target.url = url.clone();
            refreshed.push(trigger.clone());
          }
        }
        Ok(refreshed)
      })
      .await
  }

  /// Store a component record.
  ///
  /// Returns `true` when a record of the same kind and name existed with a
  /// different specification.
  pub async fn save_component(&self, component: &Component) -> Result<bool, BrokerError> {
    let record = component.to_record();
    self
      .transact_with("save component", |manifest, _| Ok(manifest.add(record)))
      .await
  }

  /// Remove a component record together with every trigger delivering to it.
  pub async fn delete_component(&self, name: &str) -> Result<(Component, Vec<Trigger>), BrokerError> {
    self
      .transact_with("delete component", |manifest, routes| {
        let component = manifest.component(name)?;
        manifest.remove(component.kind(), name)?;
        let removed = routes.remove_where(|t| t.target.name == name);
        Ok((component, removed))
      })
      .await
  }

  /// Rewrite the broker configuration from the manifest.
  pub async fn sync(&self) -> Result<BrokerConfig, BrokerError> {
    let _guard = self.guard.lock().await;
    let _lock = ContextLock::acquire(&self.paths.dir, "sync")?;
    let manifest = Manifest::load(&self.paths.manifest)?;
    let triggers = load_triggers(&manifest)?;
    let config = BrokerConfig::project(&self.broker, &triggers);
    config.save(&self.paths.broker_config)?;
    debug!(triggers = config.triggers.len(), "broker config synchronized");
    Ok(config)
  }

  async fn transact<T, F>(&self, command: &str, mutate: F) -> Result<T, BrokerError>
  where
    F: FnOnce(&mut Routes) -> Result<T, BrokerError>,
  {
    self.transact_with(command, |_, routes| mutate(routes)).await
  }

  /// Run `mutate` over the manifest's component records and its routes, then
  /// commit both files if anything changed.
  async fn transact_with<T, F>(&self, command: &str, mutate: F) -> Result<T, BrokerError>
  where
    F: FnOnce(&mut Manifest, &mut Routes) -> Result<T, BrokerError>,
  {
    let _guard = self.guard.lock().await;
    let _lock = ContextLock::acquire(&self.paths.dir, command)?;

    let mut manifest = Manifest::load(&self.paths.manifest)?;
    let original = manifest.clone();
    let before = load_triggers(&manifest)?;
    let mut routes = Routes {
      broker: self.broker.clone(),
      triggers: before.clone(),
    };

    let output = mutate(&mut manifest, &mut routes)?;
    routes.check_duplicates()?;

    let kept: BTreeSet<&str> = routes.triggers.iter().map(|t| t.name.as_str()).collect();
    for old in &before {
      if !kept.contains(old.name.as_str()) {
        manifest.remove(TRIGGER_KIND, &old.name)?;
      }
    }
    for trigger in &routes.triggers {
      manifest.add(trigger.to_record());
    }

    if manifest == original {
      debug!(command, "nothing to commit");
      return Ok(output);
    }

    self.commit(&manifest, &routes.triggers)?;
    info!(command, triggers = routes.triggers.len(), "changes committed");
    Ok(output)
  }

  fn commit(&self, manifest: &Manifest, triggers: &[Trigger]) -> Result<(), BrokerError> {
    let config_path = &self.paths.broker_config;
    let previous = std::fs::read(config_path).ok();

    BrokerConfig::project(&self.broker, triggers).save(config_path)?;

    if let Err(err) = manifest.save(&self.paths.manifest) {
      let restored = match previous {
        Some(bytes) => write_atomic(config_path, &bytes),
        None => std::fs::remove_file(config_path),
      };
      if let Err(restore_err) = restored {
        warn!(error = %restore_err, "failed to restore broker config after manifest write failure");
      }
      return Err(err.into());
    }
    Ok(())
  }
}

/// In-memory trigger set a transaction mutates.
struct Routes {
  broker: String,
  triggers: Vec<Trigger>,
}

impl Routes {
  fn route(&mut self, name: Option<&str>, target: TriggerTarget, filters: FilterSet) -> Result<Trigger, BrokerError> {
    let candidate = Trigger {
      name: String::new(),
      broker: self.broker.clone(),
      filters,
      target,
    };

    if let Some(existing) = self.triggers.iter_mut().find(|t| t.same_route(&candidate)) {
      if let Some(requested) = name
        && requested != existing.name
      {
        return Err(BrokerError::RouteConflict {
          trigger: requested.to_string(),
          existing: existing.name.clone(),
        });
      }
      if existing.target.url != candidate.target.url {
        info!(trigger = %existing.name, url = %candidate.target.url, "refreshing trigger endpoint");
        existing.target.url = candidate.target.url;
      }
      return Ok(existing.clone());
    }

    let name = match name {
      Some(requested) => {
        if self.triggers.iter().any(|t| t.name == requested) {
          return Err(BrokerError::RouteConflict {
            trigger: requested.to_string(),
            existing: requested.to_string(),
          });
        }
        requested.to_string()
      }
      None => {
        let taken: BTreeSet<&str> = self.triggers.iter().map(|t| t.name.as_str()).collect();
        Trigger::generate_name(&candidate.target.name, &candidate.filters, &taken)
      }
    };

    let trigger = Trigger { name, ..candidate };
    info!(
      trigger = %trigger.name,
      target = %trigger.target.name,
      filters = %trigger.filters,
      "route created"
    );
    self.triggers.push(trigger.clone());
    Ok(trigger)
  }

  fn retarget(&mut self, names: &[String], target: &TriggerTarget) -> Result<Vec<Trigger>, BrokerError> {
    let mut rewritten = Vec::with_capacity(names.len());
    for name in names {
      let trigger = self
        .triggers
        .iter_mut()
        .find(|t| &t.name == name)
        .ok_or_else(|| BrokerError::TriggerNotFound(name.clone()))?;
      info!(trigger = %trigger.name, from = %trigger.target.name, to = %target.name, "retargeting trigger");
      trigger.target = target.clone();
      rewritten.push(trigger.clone());
    }
    Ok(rewritten)
  }

  fn remove_where(&mut self, predicate: impl Fn(&Trigger) -> bool) -> Vec<Trigger> {
    let (removed, kept): (Vec<_>, Vec<_>) = self.triggers.drain(..).partition(|t| predicate(t));
    self.triggers = kept;
    for trigger in &removed {
      info!(trigger = %trigger.name, target = %trigger.target.name, "route removed");
    }
    removed
  }

  fn check_duplicates(&self) -> Result<(), BrokerError> {
    for (i, a) in self.triggers.iter().enumerate() {
      if let Some(b) = self.triggers[i + 1..].iter().find(|b| a.same_route(b)) {
        return Err(BrokerError::RouteConflict {
          trigger: b.name.clone(),
          existing: a.name.clone(),
        });
      }
    }
    Ok(())
  }
}

fn load_triggers(manifest: &Manifest) -> Result<Vec<Trigger>, BrokerError> {
  manifest.by_kind(TRIGGER_KIND).map(Trigger::from_record).collect()
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tempfile::TempDir;

  use super::*;
  use crate::filter::AttributeFilter;
  use crate::manifest::ManifestRecord;

  fn setup() -> (TempDir, Reconciler) {
    let temp = TempDir::new().unwrap();
    let paths = ContextPaths::new(temp.path().join("local"));
    (temp, Reconciler::new(paths, "local"))
  }

  fn target(name: &str, port: u16) -> TriggerTarget {
    TriggerTarget::new(name, format!("http://host.docker.internal:{}", port))
  }

  #[tokio::test]
  async fn route_is_idempotent() {
    let (_temp, reconciler) = setup();

    let first = reconciler
      .route(target("sink", 1), FilterSet::exact("type", "ping.tick"))
      .await
      .unwrap();
    let second = reconciler
      .route(target("sink", 1), FilterSet::exact("type", "ping.tick"))
      .await
      .unwrap();

    assert_eq!(first.name, second.name);
    assert_eq!(reconciler.triggers().unwrap().len(), 1);
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    assert_eq!(config.triggers.len(), 1);
  }

  #[tokio::test]
  async fn route_with_reordered_filters_is_the_same_route() {
    let (_temp, reconciler) = setup();
    let ab = FilterSet::new(vec![AttributeFilter::exact("type", "t"), AttributeFilter::exact("source", "s")]);
    let ba = FilterSet::new(vec![AttributeFilter::exact("source", "s"), AttributeFilter::exact("type", "t")]);

    reconciler.route(target("sink", 1), ab).await.unwrap();
    reconciler.route(target("sink", 1), ba).await.unwrap();

    assert_eq!(reconciler.triggers().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn route_refreshes_moved_endpoint() {
    let (_temp, reconciler) = setup();
    reconciler.route(target("sink", 1), FilterSet::exact("type", "x")).await.unwrap();
    let moved = reconciler.route(target("sink", 2), FilterSet::exact("type", "x")).await.unwrap();

    assert_eq!(moved.target.url, "http://host.docker.internal:2");
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    assert_eq!(config.triggers[0].target.url, "http://host.docker.internal:2");
  }

  #[tokio::test]
  async fn explicit_name_collision_is_a_conflict() {
    let (_temp, reconciler) = setup();
    reconciler
      .route_named(Some("mine"), target("sink", 1), FilterSet::exact("type", "a"))
      .await
      .unwrap();

    let err = reconciler
      .route_named(Some("mine"), target("sink", 1), FilterSet::exact("type", "b"))
      .await
      .unwrap_err();
    assert!(matches!(err, BrokerError::RouteConflict { .. }));

    let err = reconciler
      .route_named(Some("other"), target("sink", 1), FilterSet::exact("type", "a"))
      .await
      .unwrap_err();
    assert!(matches!(err, BrokerError::RouteConflict { existing, .. } if existing == "mine"));
    assert_eq!(reconciler.triggers().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn supersede_removes_only_equivalent_routes_to_downstream() {
    let (_temp, reconciler) = setup();
    reconciler.route(target("sink", 1), FilterSet::exact("source", "ping")).await.unwrap();
    reconciler.route(target("sink", 1), FilterSet::exact("source", "other")).await.unwrap();
    reconciler.route(target("audit", 3), FilterSet::exact("source", "ping")).await.unwrap();

    let outcome = reconciler
      .route_superseding(target("tr", 2), FilterSet::exact("source", "ping"), "sink")
      .await
      .unwrap();

    assert_eq!(outcome.removed.len(), 1);
    assert_eq!(outcome.removed[0].target.name, "sink");
    let triggers = reconciler.triggers().unwrap();
    assert_eq!(triggers.len(), 3);
    assert!(triggers.iter().any(|t| t.target.name == "tr"));
    assert!(triggers.iter().any(|t| t.target.name == "audit"));
    assert!(
      triggers
        .iter()
        .any(|t| t.target.name == "sink" && t.filters.equivalent(&FilterSet::exact("source", "other")))
    );
  }

  #[tokio::test]
  async fn retarget_rewrites_in_place() {
    let (_temp, reconciler) = setup();
    let original = reconciler.route(target("sink", 1), FilterSet::exact("source", "ping")).await.unwrap();

    let rewritten = reconciler
      .retarget(std::slice::from_ref(&original.name), target("tr", 2))
      .await
      .unwrap();

    assert_eq!(rewritten.len(), 1);
    let triggers = reconciler.triggers().unwrap();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].name, original.name);
    assert_eq!(triggers[0].target, target("tr", 2));
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    assert_eq!(config.get(&original.name).unwrap().target.name, "tr");
  }

  #[tokio::test]
  async fn retarget_into_duplicate_is_rejected_without_writes() {
    let (_temp, reconciler) = setup();
    let old = reconciler.route(target("sink", 1), FilterSet::exact("source", "ping")).await.unwrap();
    reconciler.route(target("tr", 2), FilterSet::exact("source", "ping")).await.unwrap();
    let manifest_before = std::fs::read_to_string(&reconciler.paths().manifest).unwrap();

    let err = reconciler
      .retarget(std::slice::from_ref(&old.name), target("tr", 2))
      .await
      .unwrap_err();

    assert!(matches!(err, BrokerError::RouteConflict { .. }));
    assert_eq!(std::fs::read_to_string(&reconciler.paths().manifest).unwrap(), manifest_before);
  }

  #[tokio::test]
  async fn retarget_unknown_trigger_fails() {
    let (_temp, reconciler) = setup();
    let err = reconciler
      .retarget(&["ghost".to_string()], target("tr", 2))
      .await
      .unwrap_err();
    assert!(matches!(err, BrokerError::TriggerNotFound(name) if name == "ghost"));
  }

  #[tokio::test]
  async fn remove_trigger_by_name() {
    let (_temp, reconciler) = setup();
    let doomed = reconciler.route(target("sink", 1), FilterSet::exact("type", "a")).await.unwrap();
    reconciler.route(target("sink", 1), FilterSet::exact("type", "b")).await.unwrap();

    let removed = reconciler.remove_trigger(&doomed.name).await.unwrap();

    assert_eq!(removed.name, doomed.name);
    let remaining = reconciler.triggers().unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].filters.equivalent(&FilterSet::exact("type", "b")));
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    assert_eq!(config.triggers.len(), 1);
    assert_ne!(config.triggers[0].name, doomed.name);
  }

  #[tokio::test]
  async fn remove_unknown_trigger_fails() {
    let (_temp, reconciler) = setup();
    assert!(matches!(
      reconciler.remove_trigger("ghost").await,
      Err(BrokerError::TriggerNotFound(_))
    ));
  }

  #[tokio::test]
  async fn triggers_do_not_disturb_component_records() {
    let (_temp, reconciler) = setup();
    let mut manifest = Manifest::new();
    manifest.add(ManifestRecord::new(
      "sources.triggermesh.io/v1alpha1",
      "PingSource",
      "ping",
      json!({ "schedule": "1m" }),
    ));
    manifest.save(&reconciler.paths().manifest).unwrap();

    reconciler.route(target("sink", 1), FilterSet::exact("source", "ping")).await.unwrap();

    let manifest = Manifest::load(&reconciler.paths().manifest).unwrap();
    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.records()[0].kind, "PingSource");
  }

  #[tokio::test]
  async fn concurrent_routes_are_serialized() {
    let (_temp, reconciler) = setup();
    let reconciler = std::sync::Arc::new(reconciler);

    let mut handles = Vec::new();
    for i in 0..8 {
      let reconciler = reconciler.clone();
      handles.push(tokio::spawn(async move {
        reconciler
          .route(target("sink", 1), FilterSet::exact("type", format!("t{}", i)))
          .await
      }));
    }
    for handle in handles {
      handle.await.unwrap().unwrap();
    }

    assert_eq!(reconciler.triggers().unwrap().len(), 8);
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    assert_eq!(config.triggers.len(), 8);
  }

  #[tokio::test]
  async fn sync_projects_manifest_triggers() {
    let (_temp, reconciler) = setup();
    reconciler.route(target("sink", 1), FilterSet::exact("type", "a")).await.unwrap();
    std::fs::remove_file(&reconciler.paths().broker_config).unwrap();

    let config = reconciler.sync().await.unwrap();

    assert_eq!(config.triggers.len(), 1);
    assert!(reconciler.paths().broker_config.exists());
  }

  #[tokio::test]
  async fn save_component_reports_changed_spec() {
    let (_temp, reconciler) = setup();
    let ping = Component::new("PingSource", "ping", json!({ "schedule": "1m" })).unwrap();
    let updated = Component::new("PingSource", "ping", json!({ "schedule": "5m" })).unwrap();

    assert!(!reconciler.save_component(&ping).await.unwrap());
    assert!(!reconciler.save_component(&ping).await.unwrap());
    assert!(reconciler.save_component(&updated).await.unwrap());

    let manifest = Manifest::load(&reconciler.paths().manifest).unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.records()[0].spec, json!({ "schedule": "5m" }));
  }

  #[tokio::test]
  async fn delete_component_drops_its_routes() {
    let (_temp, reconciler) = setup();
    let sink = Component::new("CloudEventsTarget", "sink", json!({})).unwrap();
    reconciler.save_component(&sink).await.unwrap();
    reconciler.route(target("sink", 1), FilterSet::exact("type", "a")).await.unwrap();
    reconciler.route(target("other", 2), FilterSet::exact("type", "a")).await.unwrap();

    let (deleted, removed) = reconciler.delete_component("sink").await.unwrap();

    assert_eq!(deleted.kind(), "CloudEventsTarget");
    assert_eq!(removed.len(), 1);
    let manifest = Manifest::load(&reconciler.paths().manifest).unwrap();
    assert!(manifest.get("CloudEventsTarget", "sink").is_none());
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    assert_eq!(config.triggers.len(), 1);
    assert_eq!(config.triggers[0].target.name, "other");
  }

  #[tokio::test]
  async fn delete_unknown_component_fails() {
    let (_temp, reconciler) = setup();
    assert!(matches!(
      reconciler.delete_component("ghost").await,
      Err(BrokerError::Manifest(ManifestError::ComponentNotFound(_)))
    ));
  }

  #[tokio::test]
  async fn refresh_endpoints_rewrites_moved_consumers() {
    let (_temp, reconciler) = setup();
    reconciler.route(target("sink", 1), FilterSet::exact("type", "a")).await.unwrap();
    reconciler.route(target("other", 2), FilterSet::exact("type", "a")).await.unwrap();

    let endpoints = BTreeMap::from([
      ("sink".to_string(), "http://host.docker.internal:9".to_string()),
      ("other".to_string(), "http://host.docker.internal:2".to_string()),
    ]);
    let refreshed = reconciler.refresh_endpoints(&endpoints).await.unwrap();

    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].target.url, "http://host.docker.internal:9");
    let config = BrokerConfig::load(&reconciler.paths().broker_config).unwrap();
    let sink = config.triggers.iter().find(|t| t.target.name == "sink").unwrap();
    assert_eq!(sink.target.url, "http://host.docker.internal:9");
  }
}

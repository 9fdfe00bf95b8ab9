//! Whole-context operations: delete, start, stop, status, and logs.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::broker::Trigger;
use crate::component::Component;
use crate::filter::AttributeFilter;
use crate::manifest::Manifest;
use crate::runtime::{AdapterContainer, ContainerState, LogStream, RuntimeError};

use super::{Platform, WorkflowError};

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
  pub name: String,
  pub kind: String,
  pub state: ContainerState,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerStatus {
  pub name: String,
  pub target: String,
  pub url: String,
  pub filters: Vec<AttributeFilter>,
}

impl From<&Trigger> for TriggerStatus {
  fn from(trigger: &Trigger) -> Self {
    Self {
      name: trigger.name.clone(),
      target: trigger.target.name.clone(),
      url: trigger.target.url.clone(),
      filters: trigger.filters.filters().to_vec(),
    }
  }
}

/// Snapshot of a context.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
  pub context: String,
  pub components: Vec<ComponentStatus>,
  pub triggers: Vec<TriggerStatus>,
}

impl Platform {
  /// Stop a component's adapter, then drop it and every route delivering to
  /// it from the manifest and the broker configuration.
  pub async fn delete(&self, name: &str) -> Result<(Component, Vec<Trigger>), WorkflowError> {
    Manifest::load(&self.paths.manifest)?.component(name)?;
    self.orchestrator.stop(name).await?;
    let (component, removed) = self.reconciler.delete_component(name).await?;
    info!(component = %name, routes = removed.len(), "component deleted");
    Ok((component, removed))
  }

  /// Drop one route from the manifest and the broker configuration. The
  /// components on either side keep running.
  pub async fn delete_trigger(&self, name: &str) -> Result<Trigger, WorkflowError> {
    let removed = self.reconciler.remove_trigger(name).await?;
    info!(trigger = %name, target = %removed.target.name, "trigger deleted");
    Ok(removed)
  }

  /// Start every component of the manifest and point routes at the new
  /// endpoints.
  ///
  /// When some adapters fail, routes to the ones that started are still
  /// refreshed before the aggregated error is returned.
  pub async fn start_all(&self, restart_existing: bool) -> Result<Vec<AdapterContainer>, WorkflowError> {
    let components = Manifest::load(&self.paths.manifest)?.components()?;
    if components.is_empty() {
      return Ok(Vec::new());
    }
    if !self.paths.broker_config.exists() {
      self.reconciler.sync().await?;
    }

    match self.orchestrator.start_all(&components, restart_existing).await {
      Ok(started) => {
        self.refresh_endpoints(&started).await?;
        Ok(started)
      }
      Err(RuntimeError::Batch(batch)) => {
        if let Err(err) = self.refresh_endpoints(&batch.started).await {
          warn!(error = %err, "failed to refresh routes after partial start");
        }
        Err(RuntimeError::Batch(batch).into())
      }
      Err(err) => Err(err.into()),
    }
  }

  /// Point routes delivering to `started` at their current endpoints.
  pub(super) async fn refresh_endpoints(&self, started: &[AdapterContainer]) -> Result<Vec<Trigger>, WorkflowError> {
    let endpoints: BTreeMap<String, String> = started.iter().map(|c| (c.name.clone(), c.endpoint())).collect();
    let refreshed = self.reconciler.refresh_endpoints(&endpoints).await?;
    if !refreshed.is_empty() {
      info!(count = refreshed.len(), "routes pointed at new endpoints");
    }
    Ok(refreshed)
  }

  /// Stop every component's adapter, in manifest order. Returns the names
  /// stopped.
  pub async fn stop_all(&self) -> Result<Vec<String>, WorkflowError> {
    let names: Vec<String> = Manifest::load(&self.paths.manifest)?
      .components()?
      .iter()
      .map(|c| c.name().to_string())
      .collect();
    self.orchestrator.stop_all(&names).await?;
    Ok(names)
  }

  pub async fn status(&self) -> Result<StatusReport, WorkflowError> {
    let manifest = Manifest::load(&self.paths.manifest)?;
    let mut components = Vec::new();
    for component in manifest.components()? {
      let state = self.orchestrator.status(component.name()).await?;
      let host_port = match state {
        ContainerState::Ready => self.orchestrator.host_port(component.name()).await.ok(),
        _ => None,
      };
      components.push(ComponentStatus {
        name: component.name().to_string(),
        kind: component.kind().to_string(),
        state,
        host_port,
      });
    }
    let triggers = self.reconciler.triggers()?.iter().map(TriggerStatus::from).collect();
    Ok(StatusReport {
      context: self.context.clone(),
      components,
      triggers,
    })
  }

  /// Follow the logs of a declared component.
  pub async fn logs(&self, name: &str) -> Result<LogStream, WorkflowError> {
    Manifest::load(&self.paths.manifest)?.component(name)?;
    Ok(self.orchestrator.stream_logs(name).await?)
  }
}

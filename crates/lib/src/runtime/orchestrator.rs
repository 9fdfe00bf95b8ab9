//! Adapter lifecycle.
//!
//! Per adapter: `absent -> starting -> {ready | unready} -> stopped`.
//! `unready` ends a start attempt; the caller retries by starting again.
//! A ready adapter only stops through [`Orchestrator::stop`] or a replacing
//! start.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::component::Component;
use crate::component::endpoint_url;
use crate::consts::{
  ADAPTER_PORT, BROKER_CONFIG_ENV, BROKER_CONFIG_FILENAME, BROKER_CONFIG_MOUNT, DEFAULT_REGISTRY, DEFAULT_VERSION,
};

use super::logs::{ErrorReporter, LogStream};
use super::probe::{ProbeConfig, ProbeError, probe_port};
use super::types::{BatchError, BatchFailure, ContainerRuntime, ContainerSpec, Mount, RuntimeError};

/// Lifecycle state of an adapter container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
  Absent,
  Starting,
  Ready,
  Unready,
  Stopped,
}

impl ContainerState {
  pub fn as_str(self) -> &'static str {
    match self {
      ContainerState::Absent => "absent",
      ContainerState::Starting => "starting",
      ContainerState::Ready => "ready",
      ContainerState::Unready => "unready",
      ContainerState::Stopped => "stopped",
    }
  }
}

impl fmt::Display for ContainerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A running adapter bound to one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContainer {
  pub name: String,
  pub image: String,
  pub host_port: u16,
  pub state: ContainerState,
}

impl AdapterContainer {
  /// URL the broker uses to reach this adapter.
  pub fn endpoint(&self) -> String {
    endpoint_url(self.host_port)
  }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
  pub registry: String,
  pub version: String,
  pub adapter_port: u16,
  pub probe: ProbeConfig,
  /// Directory holding the routing table, mounted into broker adapters.
  pub broker_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      registry: DEFAULT_REGISTRY.to_string(),
      version: DEFAULT_VERSION.to_string(),
      adapter_port: ADAPTER_PORT,
      probe: ProbeConfig::default(),
      broker_dir: None,
    }
  }
}

/// State shared by the orchestrator and its batch tasks.
#[derive(Clone)]
struct Shared {
  runtime: Arc<dyn ContainerRuntime>,
  config: Arc<OrchestratorConfig>,
  states: Arc<Mutex<HashMap<String, ContainerState>>>,
}

impl Shared {
  fn set_state(&self, name: &str, state: ContainerState) {
    if let Ok(mut states) = self.states.lock() {
      states.insert(name.to_string(), state);
    }
  }

  fn forget(&self, name: &str) {
    if let Ok(mut states) = self.states.lock() {
      states.remove(name);
    }
  }

  fn tracked_state(&self, name: &str) -> Option<ContainerState> {
    self.states.lock().ok().and_then(|states| states.get(name).copied())
  }

  fn container_spec(&self, component: &Component) -> Result<ContainerSpec, RuntimeError> {
    let runnable = component.as_runnable()?;
    let mut env = runnable.environment();
    let mut mounts = Vec::new();
    if runnable.mounts_broker_config()
      && let Some(dir) = &self.config.broker_dir
    {
      mounts.push(Mount {
        host: dir.clone(),
        container: BROKER_CONFIG_MOUNT.to_string(),
        read_only: true,
      });
      env.push((
        BROKER_CONFIG_ENV.to_string(),
        format!("{}/{}", BROKER_CONFIG_MOUNT, BROKER_CONFIG_FILENAME),
      ));
    }
    Ok(ContainerSpec {
      name: runnable.name().to_string(),
      image: runnable.image_ref(&self.config.registry, &self.config.version),
      env,
      internal_port: self.config.adapter_port,
      mounts,
    })
  }

  async fn start(
    &self,
    component: &Component,
    restart_existing: bool,
    cancel: &CancellationToken,
  ) -> Result<AdapterContainer, RuntimeError> {
    let spec = self.container_spec(component)?;
    let name = spec.name.as_str();

    if !restart_existing
      && let Some(existing) = self.runtime.inspect(name).await?
      && existing.running
      && let Some(host_port) = existing.host_port
    {
      info!(component = %name, port = host_port, "reusing running adapter");
      self.set_state(name, ContainerState::Ready);
      return Ok(AdapterContainer {
        name: spec.name.clone(),
        image: existing.image,
        host_port,
        state: ContainerState::Ready,
      });
    }

    self.runtime.remove(name).await?;
    self.set_state(name, ContainerState::Starting);
    info!(component = %name, image = %spec.image, "starting adapter");

    let started = match self.runtime.run(&spec).await {
      Ok(info) => info,
      Err(err) => {
        self.forget(name);
        return Err(err);
      }
    };
    let Some(host_port) = started.host_port else {
      self.set_state(name, ContainerState::Unready);
      return Err(RuntimeError::PortNotPublished {
        name: spec.name.clone(),
        port: spec.internal_port,
      });
    };

    match probe_port(host_port, &self.config.probe, cancel).await {
      Ok(attempt) => {
        info!(component = %name, port = host_port, attempt, "adapter ready");
        self.set_state(name, ContainerState::Ready);
        Ok(AdapterContainer {
          name: spec.name.clone(),
          image: spec.image.clone(),
          host_port,
          state: ContainerState::Ready,
        })
      }
      Err(ProbeError::Exhausted { attempts }) => {
        warn!(component = %name, port = host_port, attempts, "adapter did not become ready");
        self.set_state(name, ContainerState::Unready);
        Err(RuntimeError::Unready {
          name: spec.name.clone(),
          attempts,
        })
      }
      Err(ProbeError::Cancelled) => {
        self.set_state(name, ContainerState::Unready);
        Err(RuntimeError::Cancelled)
      }
    }
  }
}

/// Starts, stops, and watches adapter containers through one shared runtime
/// handle.
///
/// The orchestrator owns a cancellation token: cancelling it (or calling
/// [`shutdown`](Self::shutdown)) aborts in-flight readiness probes and stops
/// the error reporter.
pub struct Orchestrator {
  shared: Shared,
  cancel: CancellationToken,
  reporter: ErrorReporter,
}

impl Orchestrator {
  /// Create an orchestrator. Must be called within a Tokio runtime.
  pub fn new(runtime: Arc<dyn ContainerRuntime>, config: OrchestratorConfig) -> Self {
    let cancel = CancellationToken::new();
    let reporter = ErrorReporter::spawn(cancel.child_token());
    Self {
      shared: Shared {
        runtime,
        config: Arc::new(config),
        states: Arc::new(Mutex::new(HashMap::new())),
      },
      cancel,
      reporter,
    }
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.shared.config
  }

  /// Token cancelling every operation of this orchestrator.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Start the adapter of `component`.
  ///
  /// With `restart_existing` false a running container of the same name is
  /// reused as is. Otherwise any existing container is replaced and the new
  /// one must answer on its port within the probe budget.
  pub async fn start(&self, component: &Component, restart_existing: bool) -> Result<AdapterContainer, RuntimeError> {
    self.shared.start(component, restart_existing, &self.cancel).await
  }

  /// Remove the named container. Succeeds when it does not exist.
  pub async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
    self.shared.runtime.remove(name).await?;
    self.shared.set_state(name, ContainerState::Stopped);
    info!(component = %name, "adapter stopped");
    Ok(())
  }

  /// Current lifecycle state of the named adapter.
  pub async fn status(&self, name: &str) -> Result<ContainerState, RuntimeError> {
    let tracked = self.shared.tracked_state(name);
    if let Some(state @ (ContainerState::Starting | ContainerState::Unready)) = tracked {
      return Ok(state);
    }
    Ok(match self.shared.runtime.inspect(name).await? {
      None if tracked == Some(ContainerState::Stopped) => ContainerState::Stopped,
      None => ContainerState::Absent,
      Some(info) if info.running => ContainerState::Ready,
      Some(_) => ContainerState::Stopped,
    })
  }

  /// Host port of a running adapter.
  pub async fn host_port(&self, name: &str) -> Result<u16, RuntimeError> {
    match self.shared.runtime.inspect(name).await? {
      Some(info) if info.running => info.host_port.ok_or_else(|| RuntimeError::PortNotPublished {
        name: name.to_string(),
        port: self.shared.config.adapter_port,
      }),
      _ => Err(RuntimeError::NotRunning(name.to_string())),
    }
  }

  /// Start every component concurrently and wait for all of them.
  ///
  /// The first failure cancels the probes of the remaining tasks. The call
  /// returns only after every task finished; on failure the error lists
  /// every component that did not become ready, and the adapters that did
  /// start stay tracked.
  pub async fn start_all(
    &self,
    components: &[Component],
    restart_existing: bool,
  ) -> Result<Vec<AdapterContainer>, RuntimeError> {
    let batch = self.cancel.child_token();
    let mut tasks = JoinSet::new();

    for (index, component) in components.iter().cloned().enumerate() {
      let shared = self.shared.clone();
      let cancel = batch.clone();
      tasks.spawn(async move {
        let result = shared.start(&component, restart_existing, &cancel).await;
        if result.is_err() {
          cancel.cancel();
        }
        (index, result)
      });
    }

    let mut started: Vec<Option<AdapterContainer>> = vec![None; components.len()];
    let mut reported = vec![false; components.len()];
    let mut failures = Vec::new();

    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((index, Ok(container))) => {
          reported[index] = true;
          started[index] = Some(container);
        }
        Ok((index, Err(error))) => {
          reported[index] = true;
          error!(component = %components[index].name(), error = %error, "adapter failed to start");
          failures.push(BatchFailure {
            index,
            name: components[index].name().to_string(),
            error,
          });
        }
        Err(join_error) => {
          error!(error = %join_error, "adapter start task aborted");
          batch.cancel();
        }
      }
    }

    for (index, done) in reported.iter().enumerate() {
      if !done {
        let name = components[index].name().to_string();
        failures.push(BatchFailure {
          index,
          error: RuntimeError::TaskLost(name.clone()),
          name,
        });
      }
    }

    let started: Vec<AdapterContainer> = started.into_iter().flatten().collect();
    if failures.is_empty() {
      debug!(count = started.len(), "all adapters ready");
      return Ok(started);
    }
    failures.sort_by_key(|f| f.index);
    Err(RuntimeError::Batch(BatchError {
      total: components.len(),
      started,
      failures,
    }))
  }

  /// Stop every named adapter in order.
  pub async fn stop_all(&self, names: &[String]) -> Result<(), RuntimeError> {
    for name in names {
      self.stop(name).await?;
    }
    Ok(())
  }

  /// Follow the logs of the named adapter. Error entries are also sent to
  /// the orchestrator's error reporter.
  pub async fn stream_logs(&self, name: &str) -> Result<LogStream, RuntimeError> {
    let lines = self.shared.runtime.logs(name).await?;
    Ok(LogStream::new(name, lines, Some(self.reporter.sender())))
  }

  /// Cancel outstanding work, join the error reporter, and close the
  /// runtime handle.
  pub async fn shutdown(self) -> Result<usize, RuntimeError> {
    self.cancel.cancel();
    let reported = self.reporter.shutdown().await;
    self.shared.runtime.close().await?;
    Ok(reported)
  }
}

//! Types shared by the container runtime and the orchestrator.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::component::CapabilityError;

use super::orchestrator::AdapterContainer;

/// Errors from container operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
  /// The container engine is unreachable or misconfigured.
  #[error("container runtime unavailable: {0}")]
  Infra(String),

  #[error("docker {operation} failed: {source}")]
  Docker {
    operation: &'static str,
    #[source]
    source: bollard::errors::Error,
  },

  #[error("adapter {name:?} did not become ready after {attempts} attempts")]
  Unready { name: String, attempts: u32 },

  #[error("container {0:?} is not running")]
  NotRunning(String),

  #[error("container {name:?} does not publish port {port}")]
  PortNotPublished { name: String, port: u16 },

  #[error("operation cancelled")]
  Cancelled,

  #[error("start task for {0:?} did not complete")]
  TaskLost(String),

  #[error(transparent)]
  Capability(#[from] CapabilityError),

  #[error(transparent)]
  Batch(#[from] BatchError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// One component of a batch that did not reach `ready`.
#[derive(Debug)]
pub struct BatchFailure {
  pub index: usize,
  pub name: String,
  pub error: RuntimeError,
}

/// Aggregated outcome of a batch start with at least one failure.
///
/// Adapters that did start are kept in `started` so the caller can stop
/// them or carry on.
#[derive(Debug)]
pub struct BatchError {
  pub total: usize,
  pub started: Vec<AdapterContainer>,
  pub failures: Vec<BatchFailure>,
}

impl BatchError {
  pub fn failed_names(&self) -> Vec<&str> {
    self.failures.iter().map(|f| f.name.as_str()).collect()
  }
}

impl fmt::Display for BatchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} of {} adapters failed to start", self.failures.len(), self.total)?;
    for failure in &self.failures {
      write!(f, "; {}: {}", failure.name, failure.error)?;
    }
    Ok(())
  }
}

impl std::error::Error for BatchError {}

/// Host path mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
  pub host: PathBuf,
  pub container: String,
  pub read_only: bool,
}

/// Everything needed to create an adapter container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
  pub name: String,
  pub image: String,
  pub env: Vec<(String, String)>,
  pub internal_port: u16,
  pub mounts: Vec<Mount>,
}

/// What the engine reports about a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
  pub name: String,
  pub image: String,
  pub running: bool,
  /// Host port mapped to the adapter's internal port.
  pub host_port: Option<u16>,
}

/// Container engine operations the orchestrator needs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
  /// Look up a container by name. `None` when it does not exist.
  async fn inspect(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError>;

  /// Create and start a container, pulling the image if needed.
  async fn run(&self, spec: &ContainerSpec) -> Result<ContainerInfo, RuntimeError>;

  /// Force-remove a container. Removing a missing container succeeds.
  async fn remove(&self, name: &str) -> Result<(), RuntimeError>;

  /// Follow the container's output, one line per message.
  async fn logs(&self, name: &str) -> Result<mpsc::Receiver<String>, RuntimeError>;

  /// Release the handle.
  async fn close(&self) -> Result<(), RuntimeError> {
    Ok(())
  }
}

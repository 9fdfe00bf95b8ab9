//! End-to-end operations on a context: creating and deleting components,
//! starting and stopping the whole setup, and reporting its status.
//!
//! A [`Platform`] binds one context directory to an [`Orchestrator`] and a
//! [`Reconciler`]. Creation follows the same order everywhere: validate the
//! request against the manifest, record the component, start its adapter,
//! then reconcile routes.

mod create;
mod input;
mod lifecycle;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::broker::{BrokerError, Reconciler};
use crate::component::CapabilityError;
use crate::context::ContextPaths;
use crate::manifest::ManifestError;
use crate::runtime::{ContainerRuntime, Orchestrator, OrchestratorConfig, RuntimeError};

pub use create::{CreateOutcome, RouteRequest, TransformationRequest};
pub use input::{EXAMPLE_TRANSFORMATION, parse_interactive, parse_spec, read_spec_file, read_until_blank};
pub use lifecycle::{ComponentStatus, StatusReport, TriggerStatus};

/// Manifest kind of the broker every context runs.
pub const BROKER_KIND: &str = "MemoryBroker";

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("invalid specification: {0}")]
  Spec(String),

  #[error("cannot read {}: {source}", path.display())]
  Input {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Routing one incoming filter failed. Routes created for earlier
  /// filters are kept.
  #[error("cannot route {filter}: {source}")]
  Route {
    filter: String,
    #[source]
    source: BrokerError,
  },

  #[error(transparent)]
  Capability(#[from] CapabilityError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Broker(#[from] BrokerError),

  #[error(transparent)]
  Runtime(#[from] RuntimeError),
}

/// One context wired to a container runtime.
pub struct Platform {
  context: String,
  paths: ContextPaths,
  orchestrator: Orchestrator,
  reconciler: Reconciler,
}

impl Platform {
  /// Bind `paths` to `runtime`. The context name doubles as the broker's
  /// name. Must be called within a Tokio runtime.
  pub fn new(
    context: &str,
    paths: ContextPaths,
    runtime: Arc<dyn ContainerRuntime>,
    mut config: OrchestratorConfig,
  ) -> Self {
    config.broker_dir = Some(paths.broker_dir.clone());
    Self {
      context: context.to_string(),
      orchestrator: Orchestrator::new(runtime, config),
      reconciler: Reconciler::new(paths.clone(), context),
      paths,
    }
  }

  pub fn context(&self) -> &str {
    &self.context
  }

  pub fn paths(&self) -> &ContextPaths {
    &self.paths
  }

  pub fn orchestrator(&self) -> &Orchestrator {
    &self.orchestrator
  }

  pub fn reconciler(&self) -> &Reconciler {
    &self.reconciler
  }

  /// Cancel outstanding work and release the runtime. Returns the number of
  /// adapter errors reported while the platform was up.
  pub async fn shutdown(self) -> Result<usize, RuntimeError> {
    self.orchestrator.shutdown().await
  }
}

//! Local adapter containers.
//!
//! This module turns runnable components into running adapter containers:
//! - [`ContainerRuntime`]: the seam to the container engine, with
//!   [`DockerRuntime`] (Docker Engine API) as the production implementation
//! - [`Orchestrator`]: start/stop/status of single adapters and concurrent
//!   batch start with readiness probing
//! - [`LogStream`] and [`ErrorReporter`]: adapter log classification
//!
//! One runtime handle is opened at startup and shared by every operation;
//! implementations must be safe to call concurrently.

mod docker;
mod logs;
mod orchestrator;
mod probe;
mod types;

pub use docker::DockerRuntime;
pub use logs::{ErrorReporter, LogEntry, LogStream};
pub use orchestrator::{AdapterContainer, ContainerState, Orchestrator, OrchestratorConfig};
pub use probe::{ProbeConfig, ProbeError, probe_port, probe_with};
pub use types::{BatchError, BatchFailure, ContainerInfo, ContainerRuntime, ContainerSpec, Mount, RuntimeError};

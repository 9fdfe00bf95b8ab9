mod create;
mod delete;
mod logs;
mod start;
mod status;
mod stop;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use meshctl_lib::context::ContextPaths;
use meshctl_lib::manifest::Manifest;
use meshctl_lib::runtime::{DockerRuntime, OrchestratorConfig, ProbeConfig};
use meshctl_lib::workflow::{Platform, RouteRequest};

use crate::output::print_warning;
use crate::{GlobalArgs, RouteArgs};

pub use create::cmd_create;
pub use delete::{cmd_delete, cmd_delete_trigger};
pub use logs::cmd_logs;
pub use start::cmd_start;
pub use status::cmd_status;
pub use stop::cmd_stop;

impl GlobalArgs {
  pub fn paths(&self) -> ContextPaths {
    ContextPaths::for_context(&self.context)
  }

  pub fn orchestrator_config(&self) -> OrchestratorConfig {
    let defaults = OrchestratorConfig::default();
    OrchestratorConfig {
      registry: self.registry.clone(),
      version: self.image_version.clone(),
      probe: ProbeConfig {
        interval: self.probe_interval.unwrap_or(defaults.probe.interval),
        ..defaults.probe
      },
      ..defaults
    }
  }

  /// The context's manifest, empty when nothing was created yet.
  pub fn manifest(&self) -> Result<Manifest> {
    let paths = self.paths();
    Manifest::load(&paths.manifest).with_context(|| format!("Failed to read context {:?}", self.context))
  }
}

impl From<RouteArgs> for RouteRequest {
  fn from(args: RouteArgs) -> Self {
    RouteRequest {
      sources: args.sources,
      event_types: args.event_types,
    }
  }
}

/// Run `f` against the context on a fresh runtime, shutting the platform
/// down afterwards whatever the outcome.
fn with_platform<T, F, Fut>(global: &GlobalArgs, f: F) -> Result<T>
where
  F: FnOnce(Arc<Platform>) -> Fut,
  Fut: Future<Output = Result<T>>,
{
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    let config = global.orchestrator_config();
    let runtime = DockerRuntime::connect(config.adapter_port)
      .await
      .context("Cannot reach the container runtime")?;
    let platform = Arc::new(Platform::new(&global.context, global.paths(), Arc::new(runtime), config));

    let result = f(platform.clone()).await;

    match Arc::try_unwrap(platform) {
      Ok(platform) => match platform.shutdown().await {
        Ok(0) => {}
        Ok(reported) => print_warning(&format!("{} adapter error(s) reported", reported)),
        Err(err) => warn!(error = %err, "failed to shut down cleanly"),
      },
      Err(_) => warn!("platform still in use at shutdown"),
    }
    result
  })
}

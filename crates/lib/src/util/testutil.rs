//! Test helpers shared across modules.
//!
//! [`MockRuntime`] stands in for the container engine. Ready containers are
//! backed by a real loopback listener so readiness probes behave as they
//! would against an adapter.

use std::collections::HashMap;
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::context::ContextPaths;
use crate::runtime::{
  ContainerInfo, ContainerRuntime, ContainerSpec, OrchestratorConfig, ProbeConfig, RuntimeError,
};
use crate::workflow::Platform;

/// How a mock container reacts to `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
  /// Listens on its published port.
  Ready,
  /// Publishes a port nobody listens on.
  NeverReady,
  /// `run` itself fails.
  FailRun,
}

struct MockContainer {
  info: ContainerInfo,
  _listener: Option<TcpListener>,
}

#[derive(Default)]
pub struct MockRuntime {
  containers: Mutex<HashMap<String, MockContainer>>,
  behaviors: Mutex<HashMap<String, Behavior>>,
  specs: Mutex<HashMap<String, ContainerSpec>>,
  logs: Mutex<HashMap<String, Vec<String>>>,
  removed: Mutex<Vec<String>>,
  runs: AtomicUsize,
}

impl MockRuntime {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_behavior(&self, name: &str, behavior: Behavior) {
    self.behaviors.lock().unwrap().insert(name.to_string(), behavior);
  }

  pub fn set_logs(&self, name: &str, lines: &[&str]) {
    let lines = lines.iter().map(|l| l.to_string()).collect();
    self.logs.lock().unwrap().insert(name.to_string(), lines);
  }

  pub fn run_count(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }

  pub fn removed(&self) -> Vec<String> {
    self.removed.lock().unwrap().clone()
  }

  pub fn last_spec(&self, name: &str) -> Option<ContainerSpec> {
    self.specs.lock().unwrap().get(name).cloned()
  }

  pub fn running(&self) -> Vec<String> {
    let mut names: Vec<_> = self.containers.lock().unwrap().keys().cloned().collect();
    names.sort();
    names
  }

  pub fn host_port(&self, name: &str) -> Option<u16> {
    self.containers.lock().unwrap().get(name).and_then(|c| c.info.host_port)
  }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
  async fn inspect(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
    Ok(self.containers.lock().unwrap().get(name).map(|c| c.info.clone()))
  }

  async fn run(&self, spec: &ContainerSpec) -> Result<ContainerInfo, RuntimeError> {
    self.runs.fetch_add(1, Ordering::SeqCst);
    self.specs.lock().unwrap().insert(spec.name.clone(), spec.clone());
    let behavior = self
      .behaviors
      .lock()
      .unwrap()
      .get(&spec.name)
      .copied()
      .unwrap_or(Behavior::Ready);

    let listener = match behavior {
      Behavior::FailRun => {
        return Err(RuntimeError::Docker {
          operation: "create container",
          source: bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: format!("cannot start {}", spec.image),
          },
        });
      }
      Behavior::Ready => Some(TcpListener::bind("127.0.0.1:0")?),
      Behavior::NeverReady => None,
    };
    let host_port = match &listener {
      Some(listener) => listener.local_addr()?.port(),
      None => TcpListener::bind("127.0.0.1:0")?.local_addr()?.port(),
    };

    let info = ContainerInfo {
      name: spec.name.clone(),
      image: spec.image.clone(),
      running: true,
      host_port: Some(host_port),
    };
    self.containers.lock().unwrap().insert(
      spec.name.clone(),
      MockContainer {
        info: info.clone(),
        _listener: listener,
      },
    );
    Ok(info)
  }

  async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
    self.removed.lock().unwrap().push(name.to_string());
    self.containers.lock().unwrap().remove(name);
    Ok(())
  }

  async fn logs(&self, name: &str) -> Result<mpsc::Receiver<String>, RuntimeError> {
    let lines = self.logs.lock().unwrap().get(name).cloned().unwrap_or_default();
    let (tx, rx) = mpsc::channel(lines.len().max(1));
    for line in lines {
      let _ = tx.try_send(line);
    }
    Ok(rx)
  }
}

/// Context paths rooted in a test directory.
pub fn context_in(dir: &Path) -> ContextPaths {
  ContextPaths::new(dir.join("local"))
}

/// A platform on a fresh context directory and a mock runtime with a short
/// probe budget. Must be called within a Tokio runtime.
pub fn test_platform() -> (TempDir, Arc<MockRuntime>, Platform) {
  let temp = TempDir::new().unwrap();
  let runtime = Arc::new(MockRuntime::new());
  let config = OrchestratorConfig {
    probe: ProbeConfig {
      attempts: 3,
      interval: Duration::from_millis(5),
    },
    ..OrchestratorConfig::default()
  };
  let platform = Platform::new("local", context_in(temp.path()), runtime.clone(), config);
  (temp, runtime, platform)
}

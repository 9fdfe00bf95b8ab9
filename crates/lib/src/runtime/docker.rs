//! [`ContainerRuntime`] backed by the Docker Engine API.

use std::collections::HashMap;
use std::pin::pin;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
  Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
  StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, HostConfig, PortBinding};
use futures_util::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::consts::HOST_GATEWAY;

use super::types::{ContainerInfo, ContainerRuntime, ContainerSpec, Mount, RuntimeError};

const LOG_BUFFER: usize = 256;
const NOT_FOUND: u16 = 404;
const LOOPBACK: &str = "127.0.0.1";

/// Talks to the local Docker engine over its API socket.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
  docker: Docker,
  adapter_port: u16,
}

impl DockerRuntime {
  /// Connect with the local defaults (`DOCKER_HOST` or the platform socket)
  /// and verify the engine answers.
  ///
  /// Fails with [`RuntimeError::Infra`] when the daemon is unreachable.
  pub async fn connect(adapter_port: u16) -> Result<Self, RuntimeError> {
    let docker = Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Infra(e.to_string()))?;
    let version = docker.version().await.map_err(|e| RuntimeError::Infra(e.to_string()))?;
    debug!(server = version.version.as_deref().unwrap_or("unknown"), "connected to docker");
    Ok(Self { docker, adapter_port })
  }

  async fn create(&self, spec: &ContainerSpec) -> Result<(), DockerError> {
    let options = CreateContainerOptions {
      name: spec.name.as_str(),
      platform: None,
    };
    let created = self.docker.create_container(Some(options), container_config(spec)).await?;
    debug!(container = %spec.name, id = %created.id, "container created");
    Ok(())
  }

  async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
    info!(image = %image, "pulling image");
    let options = CreateImageOptions {
      from_image: image,
      ..Default::default()
    };
    self
      .docker
      .create_image(Some(options), None, None)
      .try_collect::<Vec<_>>()
      .await
      .map_err(api("pull image"))?;
    Ok(())
  }
}

fn api(operation: &'static str) -> impl FnOnce(DockerError) -> RuntimeError {
  move |source| RuntimeError::Docker { operation, source }
}

fn is_not_found(err: &DockerError) -> bool {
  matches!(err, DockerError::DockerResponseServerError { status_code, .. } if *status_code == NOT_FOUND)
}

fn port_key(port: u16) -> String {
  format!("{}/tcp", port)
}

fn bind(mount: &Mount) -> String {
  let mut bind = format!("{}:{}", mount.host.display(), mount.container);
  if mount.read_only {
    bind.push_str(":ro");
  }
  bind
}

/// Container creation body: the adapter port published on a random
/// loopback port, the host gateway alias, env and bind mounts.
fn container_config(spec: &ContainerSpec) -> Config<String> {
  let port = port_key(spec.internal_port);
  let binding = PortBinding {
    host_ip: Some(LOOPBACK.to_string()),
    host_port: None,
  };
  Config {
    image: Some(spec.image.clone()),
    env: Some(spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
    exposed_ports: Some(HashMap::from([(port.clone(), HashMap::new())])),
    host_config: Some(HostConfig {
      port_bindings: Some(HashMap::from([(port, Some(vec![binding]))])),
      binds: Some(spec.mounts.iter().map(bind).collect()),
      extra_hosts: Some(vec![format!("{}:host-gateway", HOST_GATEWAY)]),
      ..Default::default()
    }),
    ..Default::default()
  }
}

fn container_info(name: &str, adapter_port: u16, response: &ContainerInspectResponse) -> ContainerInfo {
  let running = response.state.as_ref().and_then(|s| s.running).unwrap_or(false);
  let image = response
    .config
    .as_ref()
    .and_then(|c| c.image.clone())
    .unwrap_or_default();
  let host_port = response
    .network_settings
    .as_ref()
    .and_then(|n| n.ports.as_ref())
    .and_then(|ports| ports.get(&port_key(adapter_port)))
    .and_then(|bindings| bindings.as_ref())
    .and_then(|bindings| {
      bindings
        .iter()
        .find_map(|b| b.host_port.as_deref().and_then(|p| p.parse().ok()))
    });
  ContainerInfo {
    name: name.to_string(),
    image,
    running,
    host_port,
  }
}

/// Split one log frame into its non-empty lines.
fn log_lines(output: &LogOutput) -> Vec<String> {
  output
    .to_string()
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(str::to_string)
    .collect()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
  async fn inspect(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
    match self
      .docker
      .inspect_container(name, None::<InspectContainerOptions>)
      .await
    {
      Ok(response) => Ok(Some(container_info(name, self.adapter_port, &response))),
      Err(err) if is_not_found(&err) => Ok(None),
      Err(err) => Err(api("inspect container")(err)),
    }
  }

  async fn run(&self, spec: &ContainerSpec) -> Result<ContainerInfo, RuntimeError> {
    match self.create(spec).await {
      Ok(()) => {}
      // Missing image.
      Err(err) if is_not_found(&err) => {
        self.pull(&spec.image).await?;
        self.create(spec).await.map_err(api("create container"))?;
      }
      Err(err) => return Err(api("create container")(err)),
    }
    self
      .docker
      .start_container(&spec.name, None::<StartContainerOptions<String>>)
      .await
      .map_err(api("start container"))?;
    info!(container = %spec.name, image = %spec.image, "container started");

    self
      .inspect(&spec.name)
      .await?
      .ok_or_else(|| RuntimeError::NotRunning(spec.name.clone()))
  }

  async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
    let options = RemoveContainerOptions {
      force: true,
      ..Default::default()
    };
    match self.docker.remove_container(name, Some(options)).await {
      Ok(()) => Ok(()),
      Err(err) if is_not_found(&err) => Ok(()),
      Err(err) => Err(api("remove container")(err)),
    }
  }

  async fn logs(&self, name: &str) -> Result<mpsc::Receiver<String>, RuntimeError> {
    if self.inspect(name).await?.is_none() {
      return Err(RuntimeError::NotRunning(name.to_string()));
    }

    let (tx, rx) = mpsc::channel(LOG_BUFFER);
    let docker = self.docker.clone();
    let container = name.to_string();
    tokio::spawn(async move {
      let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        ..Default::default()
      };
      let mut frames = pin!(docker.logs(&container, Some(options)));
      loop {
        let frame = tokio::select! {
          frame = frames.next() => frame,
          _ = tx.closed() => break,
        };
        match frame {
          Some(Ok(output)) => {
            for line in log_lines(&output) {
              if tx.send(line).await.is_err() {
                return;
              }
            }
          }
          Some(Err(e)) => {
            warn!(container = %container, error = %e, "log stream failed");
            break;
          }
          None => break,
        }
      }
      debug!(container = %container, "log follower exited");
    });
    Ok(rx)
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use bollard::models::{ContainerConfig, ContainerState as EngineState, NetworkSettings};

  use super::*;

  fn broker_spec() -> ContainerSpec {
    ContainerSpec {
      name: "local".to_string(),
      image: "gcr.io/triggermesh/memory-broker:latest".to_string(),
      env: vec![("COMPONENT_NAME".to_string(), "local".to_string())],
      internal_port: 8080,
      mounts: vec![Mount {
        host: PathBuf::from("/ctx/broker"),
        container: "/etc/broker".to_string(),
        read_only: true,
      }],
    }
  }

  fn inspected(running: bool, ports: Option<Vec<PortBinding>>) -> ContainerInspectResponse {
    ContainerInspectResponse {
      state: Some(EngineState {
        running: Some(running),
        ..Default::default()
      }),
      config: Some(ContainerConfig {
        image: Some("gcr.io/triggermesh/pingsource-adapter:latest".to_string()),
        ..Default::default()
      }),
      network_settings: Some(NetworkSettings {
        ports: Some(HashMap::from([("8080/tcp".to_string(), ports)])),
        ..Default::default()
      }),
      ..Default::default()
    }
  }

  #[test]
  fn config_publishes_adapter_port_on_loopback() {
    let config = container_config(&broker_spec());

    assert_eq!(config.image.as_deref(), Some("gcr.io/triggermesh/memory-broker:latest"));
    assert_eq!(config.env, Some(vec!["COMPONENT_NAME=local".to_string()]));
    assert!(config.exposed_ports.unwrap().contains_key("8080/tcp"));

    let host = config.host_config.unwrap();
    let bindings = host.port_bindings.unwrap();
    let binding = &bindings["8080/tcp"].as_ref().unwrap()[0];
    assert_eq!(binding.host_ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(binding.host_port, None);
    assert_eq!(host.binds, Some(vec!["/ctx/broker:/etc/broker:ro".to_string()]));
    assert_eq!(
      host.extra_hosts,
      Some(vec!["host.docker.internal:host-gateway".to_string()])
    );
  }

  #[test]
  fn parses_running_container() {
    let binding = PortBinding {
      host_ip: Some("127.0.0.1".to_string()),
      host_port: Some("49153".to_string()),
    };
    let info = container_info("ping", 8080, &inspected(true, Some(vec![binding])));

    assert!(info.running);
    assert_eq!(info.image, "gcr.io/triggermesh/pingsource-adapter:latest");
    assert_eq!(info.host_port, Some(49153));
  }

  #[test]
  fn stopped_container_has_no_port() {
    let info = container_info("ping", 8080, &inspected(false, None));
    assert!(!info.running);
    assert_eq!(info.host_port, None);
  }

  #[test]
  fn port_of_other_internal_port_is_ignored() {
    let binding = PortBinding {
      host_ip: None,
      host_port: Some("49153".to_string()),
    };
    let info = container_info("ping", 9090, &inspected(true, Some(vec![binding])));
    assert_eq!(info.host_port, None);
  }

  #[test]
  fn empty_response_is_a_stopped_container() {
    let info = container_info("ping", 8080, &ContainerInspectResponse::default());
    assert!(!info.running);
    assert_eq!(info.image, "");
    assert_eq!(info.host_port, None);
  }

  #[test]
  fn not_found_is_recognized_by_status_code() {
    let missing = DockerError::DockerResponseServerError {
      status_code: 404,
      message: "no container with name or ID ghost found".to_string(),
    };
    let denied = DockerError::DockerResponseServerError {
      status_code: 500,
      message: "No such container: ghost".to_string(),
    };
    assert!(is_not_found(&missing));
    assert!(!is_not_found(&denied));
  }

  #[test]
  fn log_frames_split_into_lines() {
    let frame = LogOutput::StdOut {
      message: "{\"severity\":\"INFO\",\"message\":\"a\"}\n\n{\"severity\":\"ERROR\",\"message\":\"b\"}\n".into(),
    };
    assert_eq!(
      log_lines(&frame),
      vec![
        r#"{"severity":"INFO","message":"a"}"#,
        r#"{"severity":"ERROR","message":"b"}"#,
      ]
    );
  }
}

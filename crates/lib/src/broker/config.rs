//! The broker's routing table on disk.
//!
//! ```yaml
//! triggers:
//! - name: sink-trigger-1a2b3c4d
//!   filters:
//!   - key: type
//!     value: ping.tick
//!   target:
//!     name: sink
//!     url: http://host.docker.internal:49153
//! ```

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::filter::FilterSet;
use crate::util::fs::write_atomic;

use super::reconcile::BrokerError;
use super::trigger::{Trigger, TriggerTarget};

/// One routing entry as the broker reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTrigger {
  pub name: String,
  #[serde(default)]
  pub filters: FilterSet,
  pub target: TriggerTarget,
}

/// Projection of the manifest's triggers for one broker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
  #[serde(default)]
  pub triggers: Vec<ConfigTrigger>,
}

impl BrokerConfig {
  /// Project the triggers that belong to `broker`.
  pub fn project<'a>(broker: &str, triggers: impl IntoIterator<Item = &'a Trigger>) -> Self {
    let triggers = triggers
      .into_iter()
      .filter(|t| t.broker == broker)
      .map(|t| ConfigTrigger {
        name: t.name.clone(),
        filters: t.filters.clone(),
        target: t.target.clone(),
      })
      .collect();
    Self { triggers }
  }

  /// Load the configuration at `path`. A missing file is an empty table.
  pub fn load(path: &Path) -> Result<Self, BrokerError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
      Err(source) => {
        return Err(BrokerError::ConfigRead {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    if content.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(&content).map_err(BrokerError::ConfigParse)
  }

  pub fn save(&self, path: &Path) -> Result<(), BrokerError> {
    let content = serde_yaml::to_string(self).map_err(BrokerError::ConfigSerialize)?;
    write_atomic(path, content.as_bytes()).map_err(|source| BrokerError::ConfigWrite {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn get(&self, name: &str) -> Option<&ConfigTrigger> {
    self.triggers.iter().find(|t| t.name == name)
  }
}

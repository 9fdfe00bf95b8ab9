//! Reading and writing the manifest file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::util::fs::write_atomic;

use super::types::{Manifest, ManifestRecord};

/// Errors from manifest access.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("{kind} {name:?} not found in manifest")]
  NotFound { kind: String, name: String },

  #[error("component {0:?} not found in manifest")]
  ComponentNotFound(String),

  #[error("cannot decode {kind} {name:?}: {message}")]
  Decode { kind: String, name: String, message: String },

  #[error("failed to read manifest {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write manifest {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot parse manifest: {0}")]
  Parse(#[source] serde_yaml::Error),

  #[error("cannot serialize manifest: {0}")]
  Serialize(#[source] serde_yaml::Error),
}

impl Manifest {
  /// Load the manifest at `path`. A missing file is an empty manifest.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Manifest::new()),
      Err(source) => {
        return Err(ManifestError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    Self::parse(&content)
  }

  /// Parse a multi-document YAML manifest. Empty documents are skipped.
  pub fn parse(content: &str) -> Result<Self, ManifestError> {
    if content.trim().is_empty() {
      return Ok(Manifest::new());
    }
    let mut records = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
      if let Some(record) = Option::<ManifestRecord>::deserialize(document).map_err(ManifestError::Parse)? {
        records.push(record);
      }
    }
    Ok(Manifest::from_records(records))
  }

  /// Render the manifest as `---`-separated YAML documents.
  pub fn render(&self) -> Result<String, ManifestError> {
    let mut documents = Vec::with_capacity(self.len());
    for record in self.records() {
      documents.push(serde_yaml::to_string(record).map_err(ManifestError::Serialize)?);
    }
    Ok(documents.join("---\n"))
  }

  /// Write the manifest to `path` atomically.
  pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
    let content = self.render()?;
    write_atomic(path, content.as_bytes()).map_err(|source| ManifestError::Write {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), records = self.len(), "manifest saved");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tempfile::TempDir;

  use super::*;

  const SAMPLE: &str = r#"
apiVersion: eventing.triggermesh.io/v1alpha1
kind: MemoryBroker
metadata:
  name: local
---
apiVersion: sources.triggermesh.io/v1alpha1
kind: PingSource
metadata:
  name: ping
spec:
  schedule: "*/1 * * * *"
---
"#;

  #[test]
  fn missing_file_is_empty_manifest() {
    let temp = TempDir::new().unwrap();
    let manifest = Manifest::load(&temp.path().join("manifest.yaml")).unwrap();
    assert!(manifest.is_empty());
  }

  #[test]
  fn parses_multi_document_yaml() {
    let manifest = Manifest::parse(SAMPLE).unwrap();
    assert_eq!(manifest.len(), 2);
    let ping = manifest.get("PingSource", "ping").unwrap();
    assert_eq!(ping.spec, json!({ "schedule": "*/1 * * * *" }));
    // A record without spec gets a null payload.
    assert!(manifest.get("MemoryBroker", "local").unwrap().spec.is_null());
  }

  #[test]
  fn save_then_load_preserves_order() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("manifest.yaml");

    let manifest = Manifest::parse(SAMPLE).unwrap();
    manifest.save(&path).unwrap();

    let loaded = Manifest::load(&path).unwrap();
    assert_eq!(loaded, manifest);
    assert_eq!(loaded.records()[0].kind, "MemoryBroker");
  }

  #[test]
  fn malformed_yaml_is_a_parse_error() {
    let err = Manifest::parse("kind: [unterminated").unwrap_err();
    assert!(matches!(err, ManifestError::Parse(_)));
  }
}

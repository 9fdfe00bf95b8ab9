//! Typed capability views over a [`Component`].

use serde_json::{Map, Value, json};

use crate::consts::HOST_GATEWAY;
use crate::filter::TYPE_ATTRIBUTE;

use super::types::{Component, Role};

/// A component that emits events.
#[derive(Debug, Clone, Copy)]
pub struct Producer<'a> {
  pub(super) component: &'a Component,
}

impl<'a> Producer<'a> {
  pub fn name(&self) -> &'a str {
    self.component.name()
  }

  /// Event types this producer declares.
  ///
  /// Transformations declare them through `add` operations on the `type`
  /// context attribute; other producers list them under `eventTypes`.
  pub fn event_types(&self) -> Vec<String> {
    let spec = &self.component.spec;
    match self.component.role() {
      Role::Transformation => context_type_values(spec),
      _ => spec
        .get("eventTypes")
        .and_then(Value::as_array)
        .map(|types| types.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default(),
    }
  }

  /// Value of the `source` attribute on emitted events.
  pub fn event_source(&self) -> String {
    self
      .component
      .spec
      .get("source")
      .and_then(Value::as_str)
      .map(str::to_string)
      .unwrap_or_else(|| self.component.name().to_string())
  }
}

/// Mutable producer view for setting event attributes.
#[derive(Debug)]
pub struct ProducerMut<'a> {
  pub(super) component: &'a mut Component,
}

impl ProducerMut<'_> {
  /// Make the producer stamp `event_type` on every event it emits.
  pub fn set_event_type(&mut self, event_type: &str) {
    let role = self.component.role();
    let mut spec = match std::mem::take(&mut self.component.spec) {
      Value::Object(map) => map,
      _ => Map::new(),
    };
    match role {
      Role::Transformation => {
        let context = spec.entry("context").or_insert_with(|| Value::Array(Vec::new()));
        if !context.is_array() {
          *context = Value::Array(Vec::new());
        }
        if let Value::Array(ops) = context {
          ops.retain(|op| !is_type_add(op));
          ops.push(json!({
            "operation": "add",
            "paths": [{ "key": TYPE_ATTRIBUTE, "value": event_type }],
          }));
        }
      }
      _ => {
        spec.insert("eventTypes".to_string(), json!([event_type]));
      }
    }
    self.component.spec = Value::Object(spec);
  }
}

/// A component that accepts events on a reachable port.
#[derive(Debug, Clone, Copy)]
pub struct Consumer<'a> {
  pub(super) component: &'a Component,
}

impl<'a> Consumer<'a> {
  pub fn name(&self) -> &'a str {
    self.component.name()
  }

  /// URL the broker uses to deliver to this consumer published on `host_port`.
  pub fn endpoint(&self, host_port: u16) -> String {
    endpoint_url(host_port)
  }
}

/// A component that maps to an adapter image.
#[derive(Debug, Clone, Copy)]
pub struct Runnable<'a> {
  pub(super) component: &'a Component,
}

impl<'a> Runnable<'a> {
  pub fn name(&self) -> &'a str {
    self.component.name()
  }

  /// Image name without registry or tag, e.g. `kafkasource-adapter`.
  pub fn adapter_image(&self) -> String {
    match self.component.role() {
      Role::Broker => "memory-broker".to_string(),
      _ => format!("{}-adapter", self.component.kind().to_lowercase()),
    }
  }

  /// Full image reference `<registry>/<image>:<version>`.
  pub fn image_ref(&self, registry: &str, version: &str) -> String {
    format!("{}/{}:{}", registry.trim_end_matches('/'), self.adapter_image(), version)
  }

  /// Environment handed to the adapter process.
  pub fn environment(&self) -> Vec<(String, String)> {
    vec![
      ("COMPONENT_NAME".to_string(), self.component.name().to_string()),
      ("COMPONENT_KIND".to_string(), self.component.kind().to_string()),
      ("COMPONENT_SPEC".to_string(), self.component.spec.to_string()),
    ]
  }

  /// Whether the adapter reads the broker routing table.
  pub fn mounts_broker_config(&self) -> bool {
    self.component.role() == Role::Broker
  }
}

pub(crate) fn endpoint_url(host_port: u16) -> String {
  format!("http://{}:{}", HOST_GATEWAY, host_port)
}

fn is_type_add(op: &Value) -> bool {
  op.get("operation").and_then(Value::as_str) == Some("add")
    && op
      .get("paths")
      .and_then(Value::as_array)
      .is_some_and(|paths| paths.iter().any(|p| p.get("key").and_then(Value::as_str) == Some(TYPE_ATTRIBUTE)))
}

fn context_type_values(spec: &Value) -> Vec<String> {
  let Some(ops) = spec.get("context").and_then(Value::as_array) else {
    return Vec::new();
  };
  ops
    .iter()
    .filter(|op| op.get("operation").and_then(Value::as_str) == Some("add"))
    .filter_map(|op| op.get("paths").and_then(Value::as_array))
    .flatten()
    .filter(|path| path.get("key").and_then(Value::as_str) == Some(TYPE_ATTRIBUTE))
    .filter_map(|path| path.get("value").and_then(Value::as_str).map(str::to_string))
    .collect()
}

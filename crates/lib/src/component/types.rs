use serde_json::Value;
use thiserror::Error;

use crate::manifest::ManifestRecord;

use super::capability::{Consumer, Producer, ProducerMut, Runnable};

/// Errors raised when a component is used for something its role cannot do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
  #[error("{0:?} is not an event producer")]
  NotProducer(String),

  #[error("{0:?} is not an event consumer")]
  NotConsumer(String),

  #[error("{0:?} cannot be run as an adapter")]
  NotRunnable(String),

  #[error("unsupported component kind {0:?}")]
  UnknownKind(String),
}

/// What a component is, derived from its manifest kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
  Source,
  Transformation,
  Target,
  Broker,
  Trigger,
}

impl Role {
  /// Resolve the role from a kind such as `KafkaSource` or `Transformation`.
  pub fn from_kind(kind: &str) -> Result<Self, CapabilityError> {
    match kind {
      "Transformation" => Ok(Role::Transformation),
      "Trigger" => Ok(Role::Trigger),
      k if k.len() > "Source".len() && k.ends_with("Source") => Ok(Role::Source),
      k if k.len() > "Target".len() && k.ends_with("Target") => Ok(Role::Target),
      k if k.ends_with("Broker") => Ok(Role::Broker),
      other => Err(CapabilityError::UnknownKind(other.to_string())),
    }
  }

  pub fn api_version(self) -> &'static str {
    match self {
      Role::Source => "sources.triggermesh.io/v1alpha1",
      Role::Transformation => "flow.triggermesh.io/v1alpha1",
      Role::Target => "targets.triggermesh.io/v1alpha1",
      Role::Broker | Role::Trigger => "eventing.triggermesh.io/v1alpha1",
    }
  }

  pub fn capabilities(self) -> Capabilities {
    match self {
      Role::Source => Capabilities {
        producer: true,
        consumer: false,
        runnable: true,
      },
      Role::Transformation => Capabilities {
        producer: true,
        consumer: true,
        runnable: true,
      },
      Role::Target | Role::Broker => Capabilities {
        producer: false,
        consumer: true,
        runnable: true,
      },
      Role::Trigger => Capabilities::default(),
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Role::Source => "source",
      Role::Transformation => "transformation",
      Role::Target => "target",
      Role::Broker => "broker",
      Role::Trigger => "trigger",
    }
  }
}

/// The capability set of a component, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
  pub producer: bool,
  pub consumer: bool,
  pub runnable: bool,
}

/// A declared integration component.
///
/// The specification payload is opaque to everything but the capability
/// views, which know where each role keeps its event attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
  kind: String,
  name: String,
  role: Role,
  capabilities: Capabilities,
  pub(super) spec: Value,
}

impl Component {
  pub fn new(kind: &str, name: &str, spec: Value) -> Result<Self, CapabilityError> {
    let role = Role::from_kind(kind)?;
    Ok(Self::with_role(role, kind, name, spec))
  }

  /// A transformation with the given Bumblebee specification.
  pub fn transformation(name: &str, spec: Value) -> Self {
    Self::with_role(Role::Transformation, "Transformation", name, spec)
  }

  fn with_role(role: Role, kind: &str, name: &str, spec: Value) -> Self {
    let spec = if spec.is_null() {
      Value::Object(Default::default())
    } else {
      spec
    };
    Self {
      kind: kind.to_string(),
      name: name.to_string(),
      role,
      capabilities: role.capabilities(),
      spec,
    }
  }

  pub fn from_record(record: &ManifestRecord) -> Result<Self, CapabilityError> {
    Self::new(&record.kind, &record.metadata.name, record.spec.clone())
  }

  pub fn to_record(&self) -> ManifestRecord {
    ManifestRecord::new(self.role.api_version(), &self.kind, &self.name, self.spec.clone())
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> &str {
    &self.kind
  }

  pub fn role(&self) -> Role {
    self.role
  }

  pub fn spec(&self) -> &Value {
    &self.spec
  }

  pub fn capabilities(&self) -> Capabilities {
    self.capabilities
  }

  pub fn as_producer(&self) -> Result<Producer<'_>, CapabilityError> {
    if !self.capabilities.producer {
      return Err(CapabilityError::NotProducer(self.name.clone()));
    }
    Ok(Producer { component: self })
  }

  pub fn as_producer_mut(&mut self) -> Result<ProducerMut<'_>, CapabilityError> {
    if !self.capabilities.producer {
      return Err(CapabilityError::NotProducer(self.name.clone()));
    }
    Ok(ProducerMut { component: self })
  }

  pub fn as_consumer(&self) -> Result<Consumer<'_>, CapabilityError> {
    if !self.capabilities.consumer {
      return Err(CapabilityError::NotConsumer(self.name.clone()));
    }
    Ok(Consumer { component: self })
  }

  pub fn as_runnable(&self) -> Result<Runnable<'_>, CapabilityError> {
    if !self.capabilities.runnable {
      return Err(CapabilityError::NotRunnable(self.name.clone()));
    }
    Ok(Runnable { component: self })
  }
}

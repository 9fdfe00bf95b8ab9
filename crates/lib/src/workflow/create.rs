//! Component creation and the routing it implies.

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::broker::{TRIGGER_KIND, Trigger, TriggerTarget};
use crate::component::{Component, Role};
use crate::filter::{FilterSet, SOURCE_ATTRIBUTE, TYPE_ATTRIBUTE};
use crate::manifest::Manifest;
use crate::runtime::AdapterContainer;

use super::{BROKER_KIND, Platform, WorkflowError};

/// Incoming routing for a new consumer: one dedicated trigger per named
/// source and per event type.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
  pub sources: Vec<String>,
  pub event_types: Vec<String>,
}

impl RouteRequest {
  pub fn is_empty(&self) -> bool {
    self.sources.is_empty() && self.event_types.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct TransformationRequest {
  pub name: String,
  pub spec: Value,
  /// Consumer receiving the transformation's output.
  pub target: Option<String>,
  pub routes: RouteRequest,
}

/// What a creation did.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
  pub container: AdapterContainer,
  /// Event type the new component emits, if it is a producer.
  pub event_type: Option<String>,
  /// Triggers created or confirmed, in creation order.
  pub routes: Vec<Trigger>,
  /// Triggers removed because a new route replaced them.
  pub superseded: Vec<Trigger>,
  /// Existing triggers pointed at the new component.
  pub retargeted: Vec<Trigger>,
  /// Triggers already delivering to the component, moved to its replaced
  /// container's endpoint.
  pub refreshed: Vec<Trigger>,
}

impl CreateOutcome {
  fn new(container: AdapterContainer, event_type: Option<String>) -> Self {
    Self {
      container,
      event_type,
      routes: Vec::new(),
      superseded: Vec::new(),
      retargeted: Vec::new(),
      refreshed: Vec::new(),
    }
  }
}

impl Platform {
  /// Create or update a transformation and wire it between its sources and
  /// its target.
  ///
  /// With explicit sources or event types, each one gets a dedicated route
  /// into the transformation and any route that delivered the same filter
  /// straight to the target is dropped. Without them, every route that
  /// delivered to the target before this call now delivers to the
  /// transformation instead.
  pub async fn create_transformation(&self, request: TransformationRequest) -> Result<CreateOutcome, WorkflowError> {
    validate_name(&request.name)?;
    let manifest = Manifest::load(&self.paths.manifest)?;
    let target = match &request.target {
      Some(name) => Some(self.lookup_target(&manifest, name).await?),
      None => None,
    };
    let filters = incoming_filters(&manifest, &request.routes)?;

    let mut component = Component::transformation(&request.name, request.spec);
    self.claim_name(&manifest, &component)?;
    let event_type = default_event_type(&mut component)?;

    self.ensure_broker(&manifest).await?;
    let mut outcome = self.save_and_start(&component, Some(event_type.clone())).await?;
    let endpoint = TriggerTarget::new(outcome.container.name.clone(), outcome.container.endpoint());

    let mut upstream = Vec::new();
    if let Some(target) = &target {
      // Captured before the output route exists so it is never retargeted
      // onto the transformation itself.
      upstream = self.reconciler.target_triggers(&target.name)?;
      let output = self
        .reconciler
        .route(target.clone(), FilterSet::exact(TYPE_ATTRIBUTE, event_type.as_str()))
        .await?;
      upstream.retain(|t| t.name != output.name);
      outcome.routes.push(output);
    }

    if filters.is_empty() {
      if !upstream.is_empty() {
        let names: Vec<String> = upstream.into_iter().map(|t| t.name).collect();
        outcome.retargeted = self.reconciler.retarget(&names, endpoint).await?;
        info!(transformation = %request.name, count = outcome.retargeted.len(), "retargeted upstream routes");
      }
      return Ok(outcome);
    }

    let downstream = target.as_ref().map(|t| t.name.as_str());
    let (routes, superseded) = self.route_incoming(&endpoint, filters, downstream).await?;
    outcome.routes.extend(routes);
    outcome.superseded = superseded;
    Ok(outcome)
  }

  /// Create or update a source.
  pub async fn create_source(&self, kind: &str, name: &str, spec: Value) -> Result<CreateOutcome, WorkflowError> {
    validate_name(name)?;
    let component = Component::new(kind, name, spec)?;
    expect_role(&component, Role::Source)?;
    let manifest = Manifest::load(&self.paths.manifest)?;
    self.claim_name(&manifest, &component)?;

    self.ensure_broker(&manifest).await?;
    let event_type = component.as_producer()?.event_types().into_iter().next();
    self.save_and_start(&component, event_type).await
  }

  /// Create or update a target, optionally routing sources and event types
  /// to it.
  pub async fn create_target(
    &self,
    kind: &str,
    name: &str,
    spec: Value,
    routes: RouteRequest,
  ) -> Result<CreateOutcome, WorkflowError> {
    validate_name(name)?;
    let component = Component::new(kind, name, spec)?;
    expect_role(&component, Role::Target)?;
    let manifest = Manifest::load(&self.paths.manifest)?;
    self.claim_name(&manifest, &component)?;
    let filters = incoming_filters(&manifest, &routes)?;

    self.ensure_broker(&manifest).await?;
    let mut outcome = self.save_and_start(&component, None).await?;
    let endpoint = TriggerTarget::new(outcome.container.name.clone(), outcome.container.endpoint());
    (outcome.routes, _) = self.route_incoming(&endpoint, filters, None).await?;
    Ok(outcome)
  }

  /// Route sources and event types to an existing consumer.
  pub async fn create_trigger(&self, target: &str, routes: RouteRequest) -> Result<Vec<Trigger>, WorkflowError> {
    if routes.is_empty() {
      return Err(WorkflowError::Spec(
        "a trigger needs at least one source or event type filter".to_string(),
      ));
    }
    let manifest = Manifest::load(&self.paths.manifest)?;
    let target = self.lookup_target(&manifest, target).await?;
    let filters = incoming_filters(&manifest, &routes)?;

    self.ensure_broker(&manifest).await?;
    let (routes, _) = self.route_incoming(&target, filters, None).await?;
    Ok(routes)
  }

  /// Record `component` and start its adapter, replacing a running one
  /// when the specification changed. Routes already delivering to the
  /// component follow it to the new endpoint.
  async fn save_and_start(
    &self,
    component: &Component,
    event_type: Option<String>,
  ) -> Result<CreateOutcome, WorkflowError> {
    let restart = self.reconciler.save_component(component).await?;
    let container = self.orchestrator.start(component, restart).await?;
    let refreshed = self.refresh_endpoints(std::slice::from_ref(&container)).await?;
    let mut outcome = CreateOutcome::new(container, event_type);
    outcome.refreshed = refreshed;
    Ok(outcome)
  }

  /// Container names are component names: a name belongs to one runnable
  /// component, and the context's name belongs to its broker.
  fn claim_name(&self, manifest: &Manifest, component: &Component) -> Result<(), WorkflowError> {
    let name = component.name();
    if name == self.context && component.kind() != BROKER_KIND {
      return Err(WorkflowError::Spec(format!(
        "name {:?} is reserved for the context's broker",
        name
      )));
    }
    let taken = manifest
      .records()
      .iter()
      .find(|r| r.name() == name && r.kind != TRIGGER_KIND && r.kind != component.kind());
    match taken {
      Some(record) => Err(WorkflowError::Spec(format!(
        "name {:?} is already used by {} {:?}",
        name, record.kind, name
      ))),
      None => Ok(()),
    }
  }

  /// Resolve a consumer in the manifest to the URL of its running adapter.
  async fn lookup_target(&self, manifest: &Manifest, name: &str) -> Result<TriggerTarget, WorkflowError> {
    let component = manifest.component(name)?;
    let consumer = component.as_consumer()?;
    let port = self.orchestrator.host_port(consumer.name()).await?;
    Ok(TriggerTarget::new(consumer.name(), consumer.endpoint(port)))
  }

  /// Create one route per filter to `endpoint`, stopping at the first
  /// failure. With a `downstream` consumer, routes that sent the same filter
  /// there are superseded.
  ///
  /// Returns the routes and the superseded triggers.
  async fn route_incoming(
    &self,
    endpoint: &TriggerTarget,
    filters: Vec<FilterSet>,
    downstream: Option<&str>,
  ) -> Result<(Vec<Trigger>, Vec<Trigger>), WorkflowError> {
    let mut routes = Vec::with_capacity(filters.len());
    let mut superseded = Vec::new();
    for filter in filters {
      let label = filter.to_string();
      let routed = match downstream {
        Some(downstream) => self
          .reconciler
          .route_superseding(endpoint.clone(), filter, downstream)
          .await
          .map(|o| (o.trigger, o.removed)),
        None => self
          .reconciler
          .route(endpoint.clone(), filter)
          .await
          .map(|t| (t, Vec::new())),
      };
      let (trigger, removed) = routed.map_err(|source| WorkflowError::Route { filter: label, source })?;
      debug!(trigger = %trigger.name, superseded = removed.len(), "incoming route ready");
      routes.push(trigger);
      superseded.extend(removed);
    }
    Ok((routes, superseded))
  }

  /// Make sure the context's broker is declared and running. Its routing
  /// table is written first so the mounted directory exists.
  pub(super) async fn ensure_broker(&self, manifest: &Manifest) -> Result<AdapterContainer, WorkflowError> {
    let broker = match manifest.broker() {
      Some(broker) => broker,
      None => {
        let broker = Component::new(BROKER_KIND, &self.context, json!({}))?;
        self.reconciler.save_component(&broker).await?;
        info!(broker = %self.context, "broker declared");
        broker
      }
    };
    if !self.paths.broker_config.exists() {
      self.reconciler.sync().await?;
    }
    Ok(self.orchestrator.start(&broker, false).await?)
  }
}

/// Event type a new transformation emits: its first declared type, or
/// `<name>.output` stamped into its specification when it declares none.
fn default_event_type(component: &mut Component) -> Result<String, WorkflowError> {
  if let Some(declared) = component.as_producer()?.event_types().into_iter().next() {
    return Ok(declared);
  }
  let event_type = format!("{}.output", component.name());
  component.as_producer_mut()?.set_event_type(&event_type);
  Ok(event_type)
}

/// Filters for incoming routes: event types first, then sources translated
/// to the `source` attribute their producers stamp.
fn incoming_filters(manifest: &Manifest, routes: &RouteRequest) -> Result<Vec<FilterSet>, WorkflowError> {
  let mut filters: Vec<FilterSet> = routes
    .event_types
    .iter()
    .map(|t| FilterSet::exact(TYPE_ATTRIBUTE, t.as_str()))
    .collect();
  for name in &routes.sources {
    let component = manifest.component(name)?;
    let source = component.as_producer()?.event_source();
    filters.push(FilterSet::exact(SOURCE_ATTRIBUTE, source));
  }
  Ok(filters)
}

fn expect_role(component: &Component, role: Role) -> Result<(), WorkflowError> {
  if component.role() == role {
    return Ok(());
  }
  Err(WorkflowError::Spec(format!(
    "{} is a {}, not a {}",
    component.kind(),
    component.role().as_str(),
    role.as_str()
  )))
}

/// Component names become container names.
fn validate_name(name: &str) -> Result<(), WorkflowError> {
  let mut chars = name.chars();
  let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
    && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
  if valid {
    Ok(())
  } else {
    Err(WorkflowError::Spec(format!("invalid component name {:?}", name)))
  }
}

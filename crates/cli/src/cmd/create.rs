//! Implementation of the `meshctl create` commands.

use std::io::{self, IsTerminal};
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde_json::Value;

use meshctl_lib::workflow::{
  CreateOutcome, EXAMPLE_TRANSFORMATION, TransformationRequest, parse_interactive, read_spec_file, read_until_blank,
};

use crate::output::{print_info, print_route, print_stat, print_success, symbols};
use crate::{CreateCommand, GlobalArgs};

use super::with_platform;

pub fn cmd_create(global: &GlobalArgs, command: CreateCommand) -> Result<()> {
  match command {
    CreateCommand::Transformation {
      name,
      from,
      target,
      routes,
    } => {
      let spec = match from {
        Some(path) => read_spec_file(&path)?,
        None => spec_from_stdin()?,
      };
      let request = TransformationRequest {
        name,
        spec,
        target,
        routes: routes.into(),
      };
      let outcome = with_platform(global, |platform| async move {
        Ok(platform.create_transformation(request).await?)
      })?;
      report("Transformation", &outcome);
    }
    CreateCommand::Source { kind, name, from } => {
      let spec = optional_spec(from.as_deref())?;
      let outcome = with_platform(global, |platform| async move {
        Ok(platform.create_source(&kind, &name, spec).await?)
      })?;
      report("Source", &outcome);
    }
    CreateCommand::Target {
      kind,
      name,
      from,
      routes,
    } => {
      let spec = optional_spec(from.as_deref())?;
      let outcome = with_platform(global, |platform| async move {
        Ok(platform.create_target(&kind, &name, spec, routes.into()).await?)
      })?;
      report("Target", &outcome);
    }
    CreateCommand::Trigger { target, routes } => {
      let created = with_platform(global, |platform| async move {
        Ok(platform.create_trigger(&target, routes.into()).await?)
      })?;
      print_success(&format!("{} route(s) ready", created.len()));
      for trigger in &created {
        print_route(symbols::PLUS, trigger);
      }
    }
  }
  Ok(())
}

fn optional_spec(from: Option<&Path>) -> Result<Value> {
  match from {
    Some(path) => Ok(read_spec_file(path)?),
    None => Ok(Value::Object(Default::default())),
  }
}

/// Read a transformation from stdin, showing an example first when a user
/// is typing it.
fn spec_from_stdin() -> Result<Value> {
  let stdin = io::stdin();
  if stdin.is_terminal() {
    eprintln!(
      "Transformation example:\n\n{}",
      EXAMPLE_TRANSFORMATION.if_supports_color(Stream::Stderr, |s| s.dimmed())
    );
    eprintln!("Insert the transformation below.\nPress Enter twice to finish:");
  }
  let text = read_until_blank(stdin.lock()).context("Failed to read specification from stdin")?;
  Ok(parse_interactive(&text)?)
}

fn report(what: &str, outcome: &CreateOutcome) {
  print_success(&format!(
    "{} {} ready at {}",
    what,
    outcome.container.name,
    outcome.container.endpoint()
  ));
  print_stat("Image", &outcome.container.image);
  if let Some(event_type) = &outcome.event_type {
    print_stat("Event type", event_type);
  }
  for trigger in &outcome.routes {
    print_route(symbols::PLUS, trigger);
  }
  for trigger in &outcome.superseded {
    print_route(symbols::MINUS, trigger);
  }
  for trigger in outcome.retargeted.iter().chain(&outcome.refreshed) {
    print_route(symbols::TILDE, trigger);
  }
  if outcome.routes.is_empty() && outcome.retargeted.is_empty() && outcome.refreshed.is_empty() {
    print_info("No routes changed");
  }
}

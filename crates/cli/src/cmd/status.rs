use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use meshctl_lib::workflow::StatusReport;

use crate::GlobalArgs;
use crate::output::{format_state, print_info, print_json, symbols};

use super::with_platform;

pub fn cmd_status(global: &GlobalArgs, json: bool) -> Result<()> {
  let report = if global.manifest()?.is_empty() {
    StatusReport {
      context: global.context.clone(),
      components: Vec::new(),
      triggers: Vec::new(),
    }
  } else {
    with_platform(global, |platform| async move { Ok(platform.status().await?) })?
  };

  if json {
    return print_json(&report);
  }

  if report.components.is_empty() {
    print_info(&format!("Context {} has no components", report.context));
    return Ok(());
  }

  println!(
    "{}",
    format!("Context {}", report.context).if_supports_color(Stream::Stdout, |s| s.bold())
  );
  println!();
  println!("Components:");
  let width = report.components.iter().map(|c| c.name.len()).max().unwrap_or(0);
  for component in &report.components {
    let port = component
      .host_port
      .map(|port| format!("127.0.0.1:{}", port))
      .unwrap_or_default();
    println!(
      "  {:<width$}  {:<24} {:<16} {}",
      component.name,
      component.kind,
      port,
      format_state(component.state),
      width = width
    );
  }

  if !report.triggers.is_empty() {
    println!();
    println!("Routes:");
    for trigger in &report.triggers {
      let filters: Vec<String> = trigger.filters.iter().map(ToString::to_string).collect();
      let filters = if filters.is_empty() { "*".to_string() } else { filters.join(",") };
      println!(
        "  {} {} {}  {}",
        filters,
        symbols::ARROW,
        trigger.target,
        trigger.name.if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
  }
  Ok(())
}

use anyhow::{Result, bail};

use meshctl_lib::broker::TRIGGER_KIND;

use crate::GlobalArgs;
use crate::output::{print_info, print_route, print_success, symbols};
use crate::prompts::confirm;

use super::with_platform;

pub fn cmd_delete(global: &GlobalArgs, name: &str, force: bool) -> Result<()> {
  let component = global.manifest()?.component(name)?;

  if !confirm(
    &format!("Delete {} {} and every route to it?", component.kind(), name),
    force,
  )? {
    bail!("Aborted");
  }

  let (component, removed) = with_platform(global, |platform| async move { Ok(platform.delete(name).await?) })?;

  print_success(&format!("Deleted {} {}", component.kind(), component.name()));
  if removed.is_empty() {
    print_info("No routes removed");
  }
  for trigger in &removed {
    print_route(symbols::MINUS, trigger);
  }
  Ok(())
}

pub fn cmd_delete_trigger(global: &GlobalArgs, name: &str, force: bool) -> Result<()> {
  let known = global
    .manifest()?
    .records()
    .iter()
    .any(|r| r.kind == TRIGGER_KIND && r.name() == name);
  if !known {
    bail!("Trigger {:?} not found", name);
  }

  if !confirm(&format!("Delete trigger {}?", name), force)? {
    bail!("Aborted");
  }

  let removed = with_platform(global, |platform| async move { Ok(platform.delete_trigger(name).await?) })?;

  print_success(&format!("Deleted trigger {}", removed.name));
  print_route(symbols::MINUS, &removed);
  Ok(())
}

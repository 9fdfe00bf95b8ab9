use anyhow::Result;

use crate::GlobalArgs;
use crate::output::{print_info, print_success};

use super::with_platform;

pub fn cmd_stop(global: &GlobalArgs) -> Result<()> {
  if global.manifest()?.is_empty() {
    print_info(&format!("Context {} has no components", global.context));
    return Ok(());
  }

  let stopped = with_platform(global, |platform| async move { Ok(platform.stop_all().await?) })?;
  print_success(&format!("Stopped {} component(s)", stopped.len()));
  Ok(())
}

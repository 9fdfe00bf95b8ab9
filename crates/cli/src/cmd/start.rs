use std::time::Instant;

use anyhow::Result;

use meshctl_lib::runtime::RuntimeError;
use meshctl_lib::workflow::WorkflowError;

use crate::GlobalArgs;
use crate::output::{format_duration, print_error, print_info, print_stat, print_success};

use super::with_platform;

pub fn cmd_start(global: &GlobalArgs, restart: bool) -> Result<()> {
  if global.manifest()?.is_empty() {
    print_info(&format!("Context {} has no components", global.context));
    return Ok(());
  }

  let started_at = Instant::now();
  let result = with_platform(global, |platform| async move { Ok(platform.start_all(restart).await) })?;

  match result {
    Ok(started) => {
      print_success(&format!(
        "Started {} component(s) in {}",
        started.len(),
        format_duration(started_at.elapsed())
      ));
      for container in &started {
        print_stat(&container.name, &container.endpoint());
      }
      Ok(())
    }
    Err(WorkflowError::Runtime(RuntimeError::Batch(batch))) => {
      for failure in &batch.failures {
        print_error(&format!("{}: {}", failure.name, failure.error));
      }
      Err(RuntimeError::Batch(batch).into())
    }
    Err(err) => Err(err.into()),
  }
}

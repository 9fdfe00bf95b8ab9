use anyhow::Result;
use tracing::debug;

use crate::GlobalArgs;
use crate::output::print_log;

use super::with_platform;

/// Follow a component's logs until the adapter exits or Ctrl-C.
pub fn cmd_logs(global: &GlobalArgs, name: &str) -> Result<()> {
  global.manifest()?.component(name)?;

  with_platform(global, |platform| async move {
    let mut stream = platform.logs(name).await?;
    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => {
          debug!(component = %name, "interrupted");
          break;
        }
        entry = stream.next_entry() => match entry {
          Some(entry) => print_log(&entry),
          None => break,
        },
      }
    }
    Ok(())
  })
}

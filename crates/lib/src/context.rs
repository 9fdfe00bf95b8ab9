//! Where a context keeps its state.
//!
//! A context is one local setup: a manifest, the broker's routing table, and
//! a lock file, all inside one directory under the configuration root.

use std::path::PathBuf;

use crate::consts::{APP_NAME, BROKER_CONFIG_FILENAME, BROKER_DIRNAME, HOME_ENV, MANIFEST_FILENAME};

/// Files belonging to one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPaths {
  pub dir: PathBuf,
  pub manifest: PathBuf,
  /// Mounted into the broker container.
  pub broker_dir: PathBuf,
  pub broker_config: PathBuf,
}

impl ContextPaths {
  pub fn new(dir: PathBuf) -> Self {
    let broker_dir = dir.join(BROKER_DIRNAME);
    Self {
      manifest: dir.join(MANIFEST_FILENAME),
      broker_config: broker_dir.join(BROKER_CONFIG_FILENAME),
      broker_dir,
      dir,
    }
  }

  /// Paths of the named context under [`config_root`].
  pub fn for_context(name: &str) -> Self {
    Self::new(config_root().join(name))
  }
}

/// Root directory holding every context.
///
/// `$MESHCTL_HOME` wins when set; otherwise the platform configuration
/// directory is used.
pub fn config_root() -> PathBuf {
  if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
    return PathBuf::from(home);
  }
  platform_config_dir().join(APP_NAME)
}

#[cfg(windows)]
fn platform_config_dir() -> PathBuf {
  std::env::var_os("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(not(windows))]
fn platform_config_dir() -> PathBuf {
  if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
    return PathBuf::from(config_home);
  }
  std::env::var_os("HOME")
    .map(|home| PathBuf::from(home).join(".config"))
    .unwrap_or_else(|| PathBuf::from(".config"))
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn home_override_takes_precedence() {
    temp_env::with_vars(
      [
        (HOME_ENV, Some("/tmp/meshctl-home")),
        ("XDG_CONFIG_HOME", Some("/custom/config")),
      ],
      || {
        assert_eq!(config_root(), PathBuf::from("/tmp/meshctl-home"));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_config_home_used_without_override() {
    temp_env::with_vars(
      [
        (HOME_ENV, None::<&str>),
        ("XDG_CONFIG_HOME", Some("/custom/config")),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(config_root(), PathBuf::from("/custom/config").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn falls_back_to_home_config() {
    temp_env::with_vars(
      [
        (HOME_ENV, None::<&str>),
        ("XDG_CONFIG_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(
          config_root(),
          PathBuf::from("/home/user/.config").join(APP_NAME)
        );
      },
    );
  }

  #[test]
  #[serial]
  fn context_files_live_in_context_dir() {
    temp_env::with_var(HOME_ENV, Some("/state"), || {
      let paths = ContextPaths::for_context("dev");
      assert_eq!(paths.dir, PathBuf::from("/state/dev"));
      assert_eq!(paths.manifest, PathBuf::from("/state/dev/manifest.yaml"));
      assert_eq!(paths.broker_dir, PathBuf::from("/state/dev/broker"));
      assert_eq!(paths.broker_config, PathBuf::from("/state/dev/broker/config.yaml"));
    });
  }
}

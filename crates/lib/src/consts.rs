/// Application name, used for directory names and the lock file.
pub const APP_NAME: &str = "meshctl";

/// Environment variable that overrides the workspace directory.
pub const HOME_ENV: &str = "MESHCTL_HOME";

/// Context used when none is given.
pub const DEFAULT_CONTEXT: &str = "local";

/// Registry adapter images are pulled from.
pub const DEFAULT_REGISTRY: &str = "gcr.io/triggermesh";

/// Image tag used when no version is configured.
pub const DEFAULT_VERSION: &str = "latest";

/// Port every adapter listens on inside its container.
pub const ADAPTER_PORT: u16 = 8080;

/// Connection attempts made before an adapter is declared unready.
pub const PROBE_ATTEMPTS: u32 = 10;

/// Delay between two readiness probe attempts, in milliseconds.
pub const PROBE_INTERVAL_MS: u64 = 1000;

/// Host name adapters use to reach ports published on the host.
pub const HOST_GATEWAY: &str = "host.docker.internal";

/// Manifest file name inside a context directory.
pub const MANIFEST_FILENAME: &str = "manifest.yaml";

/// Directory inside a context holding the broker's routing table. The
/// broker mounts the directory, not the file, so atomic replacements of the
/// table stay visible to a running broker.
pub const BROKER_DIRNAME: &str = "broker";

/// Routing table file name inside the broker directory.
pub const BROKER_CONFIG_FILENAME: &str = "config.yaml";

/// Where the broker container sees the broker directory.
pub const BROKER_CONFIG_MOUNT: &str = "/etc/broker";

/// Environment variable telling the broker where its routing table is.
pub const BROKER_CONFIG_ENV: &str = "BROKER_CONFIG_PATH";

/// Length of the hash suffix in generated trigger names.
pub const TRIGGER_HASH_LEN: usize = 8;

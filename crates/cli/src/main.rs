mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meshctl_lib::consts::{DEFAULT_CONTEXT, DEFAULT_REGISTRY, DEFAULT_VERSION};

/// meshctl - run event integrations on the local machine
#[derive(Parser)]
#[command(name = "meshctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  pub verbose: bool,

  /// Context to operate on
  #[arg(long, global = true, default_value = DEFAULT_CONTEXT)]
  pub context: String,

  /// Adapter image tag
  #[arg(long, global = true, default_value = DEFAULT_VERSION)]
  pub image_version: String,

  /// Registry adapter images are pulled from
  #[arg(long, global = true, default_value = DEFAULT_REGISTRY)]
  pub registry: String,

  /// Delay between readiness probe attempts (e.g. 500ms, 2s)
  #[arg(long, global = true, value_parser = humantime::parse_duration)]
  pub probe_interval: Option<Duration>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create or update a component
  Create {
    #[command(subcommand)]
    component: CreateCommand,
  },

  /// Stop a component and remove it with every route delivering to it
  Delete {
    /// Component name, or trigger name with --trigger
    name: String,

    /// Remove a single trigger instead of a component
    #[arg(long)]
    trigger: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    force: bool,
  },

  /// Start every component of the context
  Start {
    /// Replace running adapters
    #[arg(long)]
    restart: bool,
  },

  /// Stop every component of the context
  Stop,

  /// Show components and routes
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Follow a component's logs until interrupted
  Logs {
    /// Component name
    name: String,
  },
}

/// Incoming routing filters.
#[derive(Args, Debug, Clone, Default)]
pub struct RouteArgs {
  /// Source components whose events are routed here
  #[arg(long = "source", value_delimiter = ',')]
  pub sources: Vec<String>,

  /// Event types routed here
  #[arg(long = "eventTypes", value_delimiter = ',')]
  pub event_types: Vec<String>,
}

#[derive(Subcommand)]
pub enum CreateCommand {
  /// Create a transformation, reading its specification from a file or stdin
  Transformation {
    /// Transformation name
    #[arg(long)]
    name: String,

    /// Specification file
    #[arg(short, long)]
    from: Option<PathBuf>,

    /// Component receiving the transformed events
    #[arg(long)]
    target: Option<String>,

    #[command(flatten)]
    routes: RouteArgs,
  },

  /// Create an event source
  Source {
    /// Source kind, e.g. PingSource
    #[arg(long)]
    kind: String,

    /// Source name
    #[arg(long)]
    name: String,

    /// Specification file
    #[arg(short, long)]
    from: Option<PathBuf>,
  },

  /// Create an event target
  Target {
    /// Target kind, e.g. CloudEventsTarget
    #[arg(long)]
    kind: String,

    /// Target name
    #[arg(long)]
    name: String,

    /// Specification file
    #[arg(short, long)]
    from: Option<PathBuf>,

    #[command(flatten)]
    routes: RouteArgs,
  },

  /// Route sources or event types to a consumer
  Trigger {
    /// Consumer receiving the events
    #[arg(long)]
    target: String,

    #[command(flatten)]
    routes: RouteArgs,
  },
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::from_default_env()
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.global.verbose);

  match cli.command {
    Commands::Create { component } => cmd::cmd_create(&cli.global, component),
    Commands::Delete { name, trigger: true, force } => cmd::cmd_delete_trigger(&cli.global, &name, force),
    Commands::Delete { name, trigger: false, force } => cmd::cmd_delete(&cli.global, &name, force),
    Commands::Start { restart } => cmd::cmd_start(&cli.global, restart),
    Commands::Stop => cmd::cmd_stop(&cli.global),
    Commands::Status { json } => cmd::cmd_status(&cli.global, json),
    Commands::Logs { name } => cmd::cmd_logs(&cli.global, &name),
  }
}

//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, route lines, durations, and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use meshctl_lib::broker::Trigger;
use meshctl_lib::runtime::{ContainerState, LogEntry};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const PLUS: &str = "+";
  pub const MINUS: &str = "-";
  pub const TILDE: &str = "~";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// One-line rendering of a route: `filters → target`.
pub fn format_route(trigger: &Trigger) -> String {
  format!("{} {} {}", trigger.filters, symbols::ARROW, trigger.target.name)
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Print a route change prefixed with `+`, `-`, or `~`.
pub fn print_route(symbol: &str, trigger: &Trigger) {
  let colored = match symbol {
    symbols::PLUS => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    symbols::MINUS => symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    _ => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
  };
  println!(
    "  {} {} {}",
    colored,
    format_route(trigger),
    trigger.name.if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn format_state(state: ContainerState) -> String {
  match state {
    ContainerState::Ready => state.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    ContainerState::Starting => state.if_supports_color(Stream::Stdout, |s| s.cyan()).to_string(),
    ContainerState::Unready => state.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    ContainerState::Stopped | ContainerState::Absent => state.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
  }
}

pub fn print_log(entry: &LogEntry) {
  let severity = if entry.is_error() {
    entry.severity.if_supports_color(Stream::Stdout, |s| s.red()).to_string()
  } else if entry.severity == "WARNING" {
    entry.severity.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string()
  } else {
    entry.severity.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string()
  };
  println!("{} {}", severity, entry.message);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

//! Adapter log classification and error reporting.
//!
//! Adapters write one JSON object per line with at least `severity` and
//! `message`. Lines that do not parse are skipped. Entries whose severity is
//! neither `INFO` nor `WARNING` are errors; a [`LogStream`] forwards those to
//! the [`ErrorReporter`] in addition to yielding them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const REPORTER_CAPACITY: usize = 64;

/// One classified log record of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  #[serde(skip_deserializing, default)]
  pub component: String,
  #[serde(default)]
  pub severity: String,
  #[serde(default)]
  pub message: String,
}

impl LogEntry {
  pub fn is_error(&self) -> bool {
    self.severity != "INFO" && self.severity != "WARNING"
  }

  /// Parse one output line of `component`. `None` for non-JSON lines.
  pub fn parse(component: &str, line: &str) -> Option<Self> {
    let mut entry: LogEntry = serde_json::from_str(line.trim()).ok()?;
    entry.component = component.to_string();
    Some(entry)
  }
}

/// Lazy sequence of log entries from one adapter.
pub struct LogStream {
  component: String,
  lines: mpsc::Receiver<String>,
  errors: Option<mpsc::Sender<LogEntry>>,
}

impl LogStream {
  pub fn new(component: &str, lines: mpsc::Receiver<String>, errors: Option<mpsc::Sender<LogEntry>>) -> Self {
    Self {
      component: component.to_string(),
      lines,
      errors,
    }
  }

  pub fn component(&self) -> &str {
    &self.component
  }

  /// Wait for the next structured entry. `None` once the output ends.
  pub async fn next_entry(&mut self) -> Option<LogEntry> {
    while let Some(line) = self.lines.recv().await {
      let Some(entry) = LogEntry::parse(&self.component, &line) else {
        debug!(component = %self.component, line = %line, "unstructured adapter output");
        continue;
      };
      if entry.is_error()
        && let Some(errors) = &self.errors
      {
        let delivered = errors.send(entry.clone()).await.is_ok();
        if !delivered {
          // Reporter is gone; keep streaming without it.
          self.errors = None;
        }
      }
      return Some(entry);
    }
    None
  }
}

/// Background task logging adapter errors until cancelled.
pub struct ErrorReporter {
  sender: mpsc::Sender<LogEntry>,
  cancel: CancellationToken,
  handle: JoinHandle<usize>,
}

impl ErrorReporter {
  /// Spawn the reporter. It stops when `cancel` fires.
  pub fn spawn(cancel: CancellationToken) -> Self {
    let (sender, mut receiver) = mpsc::channel::<LogEntry>(REPORTER_CAPACITY);
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
      let mut reported = 0;
      loop {
        tokio::select! {
          _ = token.cancelled() => break,
          entry = receiver.recv() => match entry {
            Some(entry) => {
              error!(component = %entry.component, severity = %entry.severity, "adapter error: {}", entry.message);
              reported += 1;
            }
            None => break,
          },
        }
      }
      reported
    });
    Self { sender, cancel, handle }
  }

  pub fn sender(&self) -> mpsc::Sender<LogEntry> {
    self.sender.clone()
  }

  /// Stop the reporter and wait for it. Returns how many errors it reported.
  pub async fn shutdown(self) -> usize {
    self.cancel.cancel();
    drop(self.sender);
    self.handle.await.unwrap_or(0)
  }
}

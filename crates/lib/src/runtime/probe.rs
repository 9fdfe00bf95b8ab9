//! Readiness probing of adapter ports.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::consts::{PROBE_ATTEMPTS, PROBE_INTERVAL_MS};

/// Retry budget of the readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
  pub attempts: u32,
  pub interval: Duration,
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      attempts: PROBE_ATTEMPTS,
      interval: Duration::from_millis(PROBE_INTERVAL_MS),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
  /// Every attempt failed.
  Exhausted { attempts: u32 },
  Cancelled,
}

/// Run `attempt` until it reports success, at most `config.attempts` times,
/// sleeping `config.interval` between attempts.
///
/// Returns the 1-based number of the successful attempt. Cancellation is
/// checked before every attempt and during every sleep.
pub async fn probe_with<F, Fut>(config: &ProbeConfig, cancel: &CancellationToken, mut attempt: F) -> Result<u32, ProbeError>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = bool>,
{
  for n in 1..=config.attempts {
    if cancel.is_cancelled() {
      return Err(ProbeError::Cancelled);
    }
    if attempt(n).await {
      return Ok(n);
    }
    debug!(attempt = n, of = config.attempts, "probe attempt failed");
    if n < config.attempts {
      tokio::select! {
        _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
        _ = tokio::time::sleep(config.interval) => {}
      }
    }
  }
  Err(ProbeError::Exhausted {
    attempts: config.attempts,
  })
}

/// Probe a port on the loopback interface until it accepts a connection.
pub async fn probe_port(port: u16, config: &ProbeConfig, cancel: &CancellationToken) -> Result<u32, ProbeError> {
  let connect_timeout = config.interval.max(Duration::from_millis(100));
  probe_with(config, cancel, |_| async move {
    matches!(
      tokio::time::timeout(connect_timeout, TcpStream::connect(("127.0.0.1", port))).await,
      Ok(Ok(_))
    )
  })
  .await
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  fn fast(attempts: u32) -> ProbeConfig {
    ProbeConfig {
      attempts,
      interval: Duration::from_millis(5),
    }
  }

  #[tokio::test]
  async fn succeeds_on_the_attempt_that_answers() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = probe_with(&fast(5), &CancellationToken::new(), move |n| {
      counter.fetch_add(1, Ordering::SeqCst);
      async move { n == 3 }
    })
    .await;

    assert_eq!(result, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn answer_on_last_attempt_counts() {
    let result = probe_with(&fast(4), &CancellationToken::new(), |n| async move { n == 4 }).await;
    assert_eq!(result, Ok(4));
  }

  #[tokio::test]
  async fn exhausts_after_exactly_the_budget() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = probe_with(&fast(7), &CancellationToken::new(), move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      async { false }
    })
    .await;

    assert_eq!(result, Err(ProbeError::Exhausted { attempts: 7 }));
    assert_eq!(calls.load(Ordering::SeqCst), 7);
  }

  #[tokio::test]
  async fn cancellation_interrupts_the_wait() {
    let cancel = CancellationToken::new();
    let config = ProbeConfig {
      attempts: 100,
      interval: Duration::from_secs(60),
    };
    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = probe_with(&config, &cancel, |_| async { false }).await;

    assert_eq!(result, Err(ProbeError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[tokio::test]
  async fn already_cancelled_makes_no_attempt() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = probe_with(&fast(3), &cancel, move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      async { true }
    })
    .await;

    assert_eq!(result, Err(ProbeError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn listening_port_is_ready() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert_eq!(probe_port(port, &fast(3), &CancellationToken::new()).await, Ok(1));
  }

  #[tokio::test]
  async fn closed_port_is_unready() {
    let port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };
    assert_eq!(
      probe_port(port, &fast(2), &CancellationToken::new()).await,
      Err(ProbeError::Exhausted { attempts: 2 })
    );
  }
}

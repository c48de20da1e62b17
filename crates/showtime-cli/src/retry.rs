//! Whole-batch retry for transient store failures.
//!
//! A batch is always retried as a unit; individual records are never
//! replayed on their own.

use std::{future::Future, time::Duration};

/// Delay before attempt `attempt + 1`: 50ms, 100ms, 200ms, capped at 1s.
pub fn backoff(attempt: u32) -> Duration {
  let ms = 50u64.saturating_mul(1 << attempt.saturating_sub(1).min(5));
  Duration::from_millis(ms.min(1_000))
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// `max_attempts` attempts have been made.
pub async fn retry_transient<T, E, F, Fut>(
  max_attempts: u32,
  is_transient: impl Fn(&E) -> bool,
  mut op: F,
) -> Result<T, E>
where
  E: std::fmt::Display,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let mut attempt = 1;
  loop {
    match op().await {
      Err(e) if is_transient(&e) && attempt < max_attempts => {
        tracing::warn!(attempt, max_attempts, error = %e, "transient failure, retrying batch");
        tokio::time::sleep(backoff(attempt)).await;
        attempt += 1;
      }
      result => return result,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;

  #[derive(Debug, PartialEq)]
  enum Fail {
    Busy,
    Fatal,
  }

  impl std::fmt::Display for Fail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      write!(f, "{self:?}")
    }
  }

  #[test]
  fn backoff_grows_then_caps() {
    assert_eq!(backoff(1), Duration::from_millis(50));
    assert_eq!(backoff(2), Duration::from_millis(100));
    assert_eq!(backoff(3), Duration::from_millis(200));
    assert_eq!(backoff(30), Duration::from_secs(1));
  }

  #[tokio::test]
  async fn retries_transient_until_success() {
    let calls = Cell::new(0);
    let result = retry_transient(3, |e| *e == Fail::Busy, || {
      calls.set(calls.get() + 1);
      let n = calls.get();
      async move { if n < 3 { Err(Fail::Busy) } else { Ok(n) } }
    })
    .await;
    assert_eq!(result, Ok(3));
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let calls = Cell::new(0);
    let result: Result<(), _> = retry_transient(2, |e| *e == Fail::Busy, || {
      calls.set(calls.get() + 1);
      async { Err(Fail::Busy) }
    })
    .await;
    assert_eq!(result, Err(Fail::Busy));
    assert_eq!(calls.get(), 2);
  }

  #[tokio::test]
  async fn fatal_errors_are_not_retried() {
    let calls = Cell::new(0);
    let result: Result<(), _> = retry_transient(5, |e| *e == Fail::Busy, || {
      calls.set(calls.get() + 1);
      async { Err(Fail::Fatal) }
    })
    .await;
    assert_eq!(result, Err(Fail::Fatal));
    assert_eq!(calls.get(), 1);
  }
}

//! Retry policy and injectable delays

use std::time::Duration;
use std::sync::{Arc, Mutex};
use log::debug;

/// Bounded attempts with a fixed delay between them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy
{   pub max_attempts: usize
  , pub delay: Duration
}

impl RetryPolicy
{   /// Create a new retry policy; `max_attempts` is clamped to 1
    pub fn new(
      max_attempts: usize
    , delay_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_attempts: max_attempts.max(1)
          , delay: Duration::from_millis(delay_ms)
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based)
    pub fn should_retry(&self, attempt: usize) -> bool
    {   let more = attempt < self.max_attempts;
        debug!(
          "Attempt {}/{} done, retry: {}",
          attempt, self.max_attempts, more
        );
        more
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(1, 5_000)
    }
}

/// Something that can wait
#[allow(async_fn_in_trait)]
pub trait Sleeper
{   async fn sleep(&self, duration: Duration);
}

/// Real delays on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper
{   async fn sleep(&self, duration: Duration)
    {   tokio::time::sleep(duration).await
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper
{   slept: Arc<Mutex<Vec<Duration>>>
}

impl RecordingSleeper
{   pub fn new() -> Self
    {   RecordingSleeper::default()
    }

    pub fn slept(&self) -> Vec<Duration>
    {   self.slept.lock()
          .map(|v| v.clone())
          .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper
{   async fn sleep(&self, duration: Duration)
    {   if let Ok(mut slept) = self.slept.lock()
        {   slept.push(duration);
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn attempts_are_bounded()
    {   let policy = RetryPolicy::new(3, 10);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn zero_is_one_attempt()
    {   let policy = RetryPolicy::new(0, 10);
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn recording_sleeper_shares_its_log()
    {   let sleeper = RecordingSleeper::new();
        let handle = sleeper.clone();
        tokio_test::block_on(sleeper.sleep(Duration::from_secs(5)));
        assert_eq!(handle.slept(), vec![Duration::from_secs(5)]);
    }
}

//! Outbound call throttling.
//!
//! [`Throttle`] paces deferred operations so that no more than
//! `max_per_interval` of them start within any rolling `interval`. Excess
//! submissions wait in a FIFO queue and start in submission order; nothing is
//! dropped or retried here.
//!
//! # Example
//!
//! ```
//! use shared::config::ThrottleConfig;
//! use shared::throttle::Throttle;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let throttle = Throttle::new(ThrottleConfig::new(10, Duration::from_secs(1)));
//! let answer = throttle.run(|| async { 42 }).await;
//! assert_eq!(answer, 42);
//! # }
//! ```

use crate::config::ThrottleConfig;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Rolling-window rate limiter shared by every upstream call.
#[derive(Debug)]
pub struct Throttle {
    config: ThrottleConfig,
    /// Start times within the current window, oldest first.
    ///
    /// Tokio's mutex is fair, so waiting on it is the submission queue.
    starts: Mutex<VecDeque<Instant>>,
}

impl Throttle {
    /// Creates a new throttle.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        let capacity = usize::try_from(config.max_per_interval).unwrap_or(usize::MAX);
        Self {
            config,
            starts: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Returns the throttle configuration.
    #[must_use]
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Waits until a call may start and records the start.
    ///
    /// Dropping the returned future while it waits gives up the place in the
    /// queue without consuming quota.
    pub async fn acquire(&self) {
        let mut starts = self.starts.lock().await;
        loop {
            let now = Instant::now();
            while starts
                .front()
                .is_some_and(|&oldest| now.duration_since(oldest) >= self.config.interval)
            {
                starts.pop_front();
            }

            match self.next_slot(&starts) {
                Some(at) if at > now => sleep_until(at).await,
                _ => break,
            }
        }
        starts.push_back(Instant::now());
    }

    /// Runs `operation` once quota is available.
    ///
    /// The operation is only constructed after its turn comes, so the work it
    /// represents (e.g. building and sending a request) starts on schedule.
    pub async fn run<F, Fut>(&self, operation: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.acquire().await;
        operation().await
    }

    /// Earliest instant the next call may start, if it has to wait at all.
    fn next_slot(&self, starts: &VecDeque<Instant>) -> Option<Instant> {
        let quota = usize::try_from(self.config.max_per_interval.max(1)).unwrap_or(usize::MAX);
        if starts.len() >= quota {
            return starts.front().map(|&oldest| oldest + self.config.interval);
        }
        if self.config.evenly_spaced {
            return starts.back().map(|&last| last + self.config.spacing());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait_for_rollover() {
        let throttle = Arc::new(Throttle::new(ThrottleConfig::new(5, Duration::from_secs(1))));
        let origin = Instant::now();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..12 {
            let throttle = Arc::clone(&throttle);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                throttle
                    .run(|| async {
                        log.lock().unwrap().push((i, Instant::now() - origin));
                    })
                    .await;
            }));
            // Submit strictly in index order.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        let order: Vec<usize> = log.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, (0..12).collect::<Vec<_>>());

        let in_first = log
            .iter()
            .filter(|(_, at)| *at < Duration::from_secs(1))
            .count();
        assert_eq!(in_first, 5);

        let in_second = log
            .iter()
            .filter(|(_, at)| *at >= Duration::from_secs(1) && *at < Duration::from_secs(2))
            .count();
        assert_eq!(in_second, 5);

        let later = log
            .iter()
            .filter(|(_, at)| *at >= Duration::from_secs(2))
            .count();
        assert_eq!(later, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evenly_spaced_starts() {
        let throttle =
            Throttle::new(ThrottleConfig::new(4, Duration::from_secs(1)).with_evenly_spaced(true));
        let origin = Instant::now();

        let mut offsets = Vec::new();
        for _ in 0..4 {
            throttle.acquire().await;
            offsets.push(Instant::now() - origin);
        }

        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_does_not_consume_quota() {
        let throttle = Throttle::new(ThrottleConfig::new(1, Duration::from_secs(1)));
        throttle.acquire().await;

        // Give up waiting before the window rolls over.
        let waited = tokio::time::timeout(Duration::from_millis(100), throttle.acquire()).await;
        assert!(waited.is_err());

        let origin = Instant::now();
        throttle.acquire().await;
        assert!(Instant::now() - origin <= Duration::from_secs(1));
        assert_eq!(throttle.starts.lock().await.len(), 1);
    }
}

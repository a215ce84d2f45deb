//! Minimum-interval gate for one external system

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Serializes all calls to one external system to a fixed maximum rate
///
/// The lock is held across the sleep, so concurrent callers queue behind one
/// another and no two calls are ever issued closer than `min_interval`.
pub struct Throttle {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait if necessary to comply with the interval, then stamp the call time
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!(wait_ms = wait_time.as_millis() as u64, "Throttling");
                sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_timing() {
        let throttle = Throttle::new(Duration::from_millis(500));
        let start = Instant::now();

        // First call - no wait
        throttle.wait().await;
        let first_elapsed = start.elapsed();

        throttle.wait().await;
        let second_elapsed = start.elapsed();

        throttle.wait().await;
        let third_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(10));
        assert!(second_elapsed >= Duration::from_millis(500));
        assert!(third_elapsed >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(1)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let throttle = Arc::clone(&throttle);
            handles.push(tokio::spawn(async move {
                throttle.wait().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}

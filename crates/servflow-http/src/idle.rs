//! Idle shutdown timer for on-demand deployments.
//!
//! Every incoming request pushes the deadline forward; when it passes
//! with no traffic, the server shuts down gracefully.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Process-wide idle deadline, reset on every request.
pub struct IdleTimer {
    timeout: Duration,
    last_activity: Mutex<Instant>,
}

impl IdleTimer {
    /// Create a timer with the given idle timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Push the deadline forward. Called on every incoming request.
    pub fn reset(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
        debug!("idle timer reset");
    }

    /// Resolve when the idle deadline passes with no intervening reset.
    pub async fn expired(&self) {
        loop {
            let deadline = self
                .last_activity
                .lock()
                .map(|last| *last + self.timeout)
                .unwrap_or_else(|_| Instant::now());
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn expires_after_quiet_period() {
        let timer = Arc::new(IdleTimer::new(Duration::from_secs(5)));
        let waiter = Arc::clone(&timer);
        let handle = tokio::spawn(async move { waiter.expired().await });
        tokio::time::advance(Duration::from_secs(6)).await;
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reset_pushes_deadline_forward() {
        let timer = Arc::new(IdleTimer::new(Duration::from_secs(5)));
        let waiter = Arc::clone(&timer);
        let handle = tokio::spawn(async move { waiter.expired().await });

        tokio::time::advance(Duration::from_secs(3)).await;
        timer.reset();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!handle.is_finished(), "reset should have deferred expiry");

        tokio::time::advance(Duration::from_secs(3)).await;
        handle.await.unwrap();
    }
}

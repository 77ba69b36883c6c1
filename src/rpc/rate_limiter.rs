//! Cooperative request throttle. It lowers how often public endpoints answer
//! with throttling errors; the endpoints themselves remain the enforcement point.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::info;

#[derive(Debug)]
struct RateWindow {
    count: u32,
    started_at: Instant,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
            state: Mutex::new(RateWindow { count: 0, started_at: Instant::now() }),
        }
    }

    /// Consume one request slot, waiting for the next window when the current one is spent.
    ///
    /// The lock is held across the wait so queued callers are released in order
    /// once the window rolls over.
    pub async fn check_limit(&self) {
        let mut w = self.state.lock().await;

        if w.started_at.elapsed() >= self.window {
            w.count = 0;
            w.started_at = Instant::now();
        }

        if w.count >= self.max_requests {
            let resume_at = w.started_at + self.window;
            info!(
                requests = w.count,
                wait_ms = resume_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "[RATE] request budget spent, waiting for window rollover"
            );
            sleep_until(resume_at).await;
            w.count = 0;
            w.started_at = Instant::now();
        }

        w.count += 1;
    }
}

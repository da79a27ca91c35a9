use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Rolling-window quota: at most `calls` acquisitions in any `window`.
///
/// Callers that find the quota exhausted wait (while holding the lock, so later callers
/// queue behind them) until the oldest call leaves the window. Waits can last up to the
/// full window length.
pub struct RateLimiter {
    calls: usize,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(calls: usize, window: Duration) -> Self {
        let calls = calls.max(1);
        Self {
            calls,
            window,
            sent: Mutex::new(VecDeque::with_capacity(calls)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn acquire(&self) {
        let mut sent = self.sent.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = sent.front() {
                if now.duration_since(oldest) >= self.window {
                    sent.pop_front();
                } else {
                    break;
                }
            }

            if sent.len() < self.calls {
                sent.push_back(now);
                return;
            }

            let Some(&oldest) = sent.front() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!("rate limit quota exhausted, waiting {:?}", wait);
            sleep(wait).await;
        }
    }
}

//! Per-client sliding-window request limiter.
//!
//! Each client keeps the instants of its admitted requests inside the
//! trailing window. Expired instants are evicted lazily on every check, so
//! the count is exact rather than bucketed.

use std::collections::{ HashMap, VecDeque };
use std::time::{ Duration, Instant };
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a request from `client_id` at `now` if the client is under its quota.
    pub async fn admit(&self, client_id: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock().await;
        let requests = clients.entry(client_id.to_string()).or_default();

        // A request exactly one window old no longer counts.
        while let Some(&oldest) = requests.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() >= self.max_requests {
            return false;
        }
        requests.push_back(now);
        true
    }

    /// Number of distinct clients being tracked.
    pub async fn size(&self) -> usize {
        self.clients.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

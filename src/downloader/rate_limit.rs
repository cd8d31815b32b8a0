//! Per-site request spacing
//!
//! Every request to a site passes through [`RateLimiter::acquire`] with the
//! site's key. Callers for the same key are admitted one at a time, in arrival
//! order, no sooner than `min_delay` after the previous admission. Different
//! keys never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep_until, Instant};

/// Minimum-spacing gate keyed by site
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_delay: Duration,
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<Option<Instant>>>>>>,
}

impl RateLimiter {
    /// Create a limiter enforcing `min_delay` between requests per key
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configured spacing
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<Option<Instant>>> {
        // Entries stay valid even if a holder panicked.
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Wait until a request for `key` may be issued
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, key: &str) -> Duration {
        let slot = self.slot(key);
        let started = Instant::now();

        // tokio's mutex is fair, so waiters are admitted in arrival order.
        let mut last_issue = slot.lock().await;
        if let Some(last) = *last_issue {
            let earliest = last + self.min_delay;
            if earliest > Instant::now() {
                sleep_until(earliest).await;
            }
        }
        *last_issue = Some(Instant::now());

        let waited = started.elapsed();
        crate::metrics::record_rate_limit_wait(key, waited);
        waited
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            crate::downloader::config::DEFAULT_REQUEST_DELAY_MS,
        ))
    }
}

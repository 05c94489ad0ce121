//! services/api/src/web/rate_limit.rs
//!
//! Token-bucket admission control for outbound directory-photo uploads.
//!
//! One process-wide instance is shared by every sync job: the write quota it
//! guards belongs to the directory API, not to any single user.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between two upload grants (~40 per minute).
pub const GRANT_INTERVAL: Duration = Duration::from_millis(1500);

/// A token bucket with capacity 1: tokens never accumulate, so grants are
/// strictly spaced by the refill interval even after long idle periods.
pub struct UploadLimiter {
    interval: Duration,
    next_grant: Mutex<Instant>,
}

impl UploadLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_grant: Mutex::new(Instant::now()),
        }
    }

    /// Waits for the next token. Never fails, only delays.
    pub async fn acquire(&self) {
        let grant = {
            let mut next = self.next_grant.lock().unwrap();
            let now = Instant::now();
            let grant = (*next).max(now);
            *next = grant + self.interval;
            grant
        };
        tokio::time::sleep_until(grant).await;
    }
}

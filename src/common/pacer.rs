//! Minimum-gap request pacing
//!
//! Binance weights every REST endpoint against a per-minute budget; a
//! simple minimum gap between consecutive requests keeps the bot far below
//! it without tracking weights. All clones share the same schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces requests at least `min_gap` apart.
#[derive(Debug, Clone)]
pub struct RequestPacer {
    next_slot: Arc<Mutex<Instant>>,
    min_gap: Duration,
}

impl RequestPacer {
    pub fn new(min_gap: Duration) -> Self {
        RequestPacer {
            next_slot: Arc::new(Mutex::new(Instant::now())),
            min_gap,
        }
    }

    /// Wait until the next request slot, then claim it.
    pub async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep_until(*next).await;
        }
        *next = Instant::now() + self.min_gap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let pacer = RequestPacer::new(Duration::from_millis(50));
        let start = Instant::now();
        pacer.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_consecutive_acquires_are_spaced() {
        let pacer = RequestPacer::new(Duration::from_millis(30));
        let start = Instant::now();
        pacer.acquire().await;
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_clones_share_schedule() {
        let pacer = RequestPacer::new(Duration::from_millis(30));
        let clone = pacer.clone();
        let start = Instant::now();
        pacer.acquire().await;
        clone.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

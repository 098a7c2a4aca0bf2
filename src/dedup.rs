//! Short-window suppression of repeated host operations (double-tapped buttons)

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct OpDeduper {
    /// (connection, session code, operation) -> time first seen
    seen: Arc<RwLock<HashMap<String, Instant>>>,
    window: Duration,
}

impl Default for OpDeduper {
    fn default() -> Self {
        Self::new(Duration::from_millis(2000))
    }
}

impl OpDeduper {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: Arc::new(RwLock::new(HashMap::new())),
            window,
        }
    }

    fn key(connection: &str, code: &str, op: &str) -> String {
        format!("{}:{}:{}", connection, code, op)
    }

    /// Returns true if the operation should run, false if it repeats one inside the window
    pub async fn check(&self, connection: &str, code: &str, op: &str) -> bool {
        let now = Instant::now();
        let key = Self::key(connection, code, op);
        let mut seen = self.seen.write().await;

        match seen.get(&key) {
            Some(first) if now.duration_since(*first) < self.window => false,
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }

    /// Drop the record of an attempt so an immediate retry is not suppressed
    pub async fn forget(&self, connection: &str, code: &str, op: &str) {
        self.seen
            .write()
            .await
            .remove(&Self::key(connection, code, op));
    }

        /// Clean up expired entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut seen = self.seen.write().await;
        seen.retain(|_, first| now.duration_since(*first) < self.window);
    }

    pub async fn tracked(&self) -> usize {
        self.seen.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_suppresses_within_window() {
        let dedup = OpDeduper::new(Duration::from_secs(60));
        assert!(dedup.check("conn-1", "4821", "start").await);
        assert!(!dedup.check("conn-1", "4821", "start").await);

        // different operation, connection or session passes
        assert!(dedup.check("conn-1", "4821", "advance").await);
        assert!(dedup.check("conn-2", "4821", "start").await);
        assert!(dedup.check("conn-1", "5555", "start").await);
    }

    #[tokio::test]
    async fn test_forgotten_attempt_can_retry() {
        let dedup = OpDeduper::new(Duration::from_secs(60));
        assert!(dedup.check("conn-1", "4821", "start").await);
        dedup.forget("conn-1", "4821", "start").await;
        assert!(dedup.check("conn-1", "4821", "start").await);
        assert!(!dedup.check("conn-1", "4821", "start").await);
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let dedup = OpDeduper::new(Duration::from_millis(20));
        assert!(dedup.check("conn-1", "4821", "start").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(dedup.check("conn-1", "4821", "start").await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        dedup.cleanup().await;
        assert_eq!(dedup.tracked().await, 0);
    }
}

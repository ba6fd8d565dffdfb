use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use outreach_common::{ActionType, RateWindow};

use crate::traits::PersistentStore;

/// Stateless rate limiter: every check recounts persisted history, so a
/// restart can never reset the budget.
pub struct RateLimiter {
    store: Arc<dyn PersistentStore>,
    action: ActionType,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn PersistentStore>, action: ActionType) -> Self {
        Self { store, action }
    }

    /// True iff every window has room for one more action at `now`.
    pub async fn may_act(&self, now: DateTime<Utc>, windows: &[RateWindow]) -> Result<bool> {
        for window in windows {
            let count = self
                .store
                .count_since(self.action, window.start(now))
                .await?;
            if count >= u64::from(window.max_count) {
                info!(
                    action = %self.action,
                    window = %window,
                    count,
                    "Rate window exhausted"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Actions left in the tightest window at `now`.
    pub async fn remaining(&self, now: DateTime<Utc>, windows: &[RateWindow]) -> Result<u64> {
        let mut remaining = u64::MAX;
        for window in windows {
            let count = self
                .store
                .count_since(self.action, window.start(now))
                .await?;
            remaining = remaining.min(u64::from(window.max_count).saturating_sub(count));
        }
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use outreach_common::HistoryEntry;

    use super::*;
    use crate::testing::{candidate, MockStore};

    async fn seed(store: &MockStore, n: usize, age: Duration) {
        let at = Utc::now() - age;
        for i in 0..n {
            let c = candidate(&format!("seed-{}-{i}", age.num_minutes()), 20);
            let entry =
                HistoryEntry::new(&c, ActionType::Comment, None, "text".into(), "feed", at);
            store.insert(&entry).await.unwrap();
        }
    }

    #[tokio::test]
    async fn full_window_blocks() {
        let store = Arc::new(MockStore::new());
        seed(&store, 25, Duration::hours(1)).await;
        let limiter = RateLimiter::new(store, ActionType::Comment);
        let windows = [RateWindow::new(24, 25)];
        assert!(!limiter.may_act(Utc::now(), &windows).await.unwrap());
        assert_eq!(limiter.remaining(Utc::now(), &windows).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn entries_outside_window_do_not_count() {
        let store = Arc::new(MockStore::new());
        seed(&store, 24, Duration::hours(1)).await;
        seed(&store, 1, Duration::hours(25)).await;
        let limiter = RateLimiter::new(store, ActionType::Comment);
        let windows = [RateWindow::new(24, 25)];
        assert!(limiter.may_act(Utc::now(), &windows).await.unwrap());
        assert_eq!(limiter.remaining(Utc::now(), &windows).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn every_window_must_have_room() {
        let store = Arc::new(MockStore::new());
        seed(&store, 3, Duration::minutes(30)).await;
        let limiter = RateLimiter::new(store, ActionType::Comment);
        let windows = [RateWindow::new(24, 25), RateWindow::new(1, 3)];
        assert!(!limiter.may_act(Utc::now(), &windows).await.unwrap());
    }

    #[tokio::test]
    async fn other_actions_do_not_count() {
        let store = Arc::new(MockStore::new());
        seed(&store, 5, Duration::hours(1)).await;
        let limiter = RateLimiter::new(store, ActionType::Connection);
        assert!(limiter
            .may_act(Utc::now(), &[RateWindow::new(168, 5)])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn huge_window_counts_everything_without_overflow() {
        let store = Arc::new(MockStore::new());
        seed(&store, 2, Duration::days(400)).await;
        let limiter = RateLimiter::new(store, ActionType::Comment);
        let windows = [RateWindow::new(u32::MAX, 2)];
        assert!(!limiter.may_act(Utc::now(), &windows).await.unwrap());
        assert_eq!(limiter.remaining(Utc::now(), &windows).await.unwrap(), 0);
    }
}

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use outreach_common::HistoryEntry;

use crate::traits::PersistentStore;

/// Persists completed actions. Only successful actions reach the recorder.
pub struct OutcomeRecorder {
    store: Arc<dyn PersistentStore>,
}

impl OutcomeRecorder {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// Write `entry`. Returns `false` if an entry for the same candidate and
    /// action already existed; the existing row is left untouched.
    pub async fn record(&self, entry: &HistoryEntry) -> Result<bool> {
        let inserted = self.store.insert(entry).await?;
        if inserted {
            info!(
                action = %entry.action_type,
                candidate_id = %entry.candidate_id,
                strategy = entry.strategy.as_deref().unwrap_or("-"),
                "Recorded action"
            );
        } else {
            warn!(
                action = %entry.action_type,
                candidate_id = %entry.candidate_id,
                "Action was already recorded, keeping existing entry"
            );
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use outreach_common::ActionType;

    use super::*;
    use crate::testing::{candidate, MockStore};

    #[tokio::test]
    async fn second_record_for_same_candidate_is_a_no_op() {
        let store = Arc::new(MockStore::new());
        let recorder = OutcomeRecorder::new(store.clone());
        let c = candidate("p1", 20);

        let first = HistoryEntry::new(&c, ActionType::Comment, None, "one".into(), "feed", Utc::now());
        let second =
            HistoryEntry::new(&c, ActionType::Comment, None, "two".into(), "feed", Utc::now());
        assert!(recorder.record(&first).await.unwrap());
        assert!(!recorder.record(&second).await.unwrap());

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].generated_text, "one");
    }
}

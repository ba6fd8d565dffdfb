use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use outreach_common::{ActionType, Candidate};

use crate::traits::PersistentStore;

/// Drops candidates that already have a history entry for this loop's action.
pub struct DedupStore {
    store: Arc<dyn PersistentStore>,
    action: ActionType,
}

impl DedupStore {
    pub fn new(store: Arc<dyn PersistentStore>, action: ActionType) -> Self {
        Self { store, action }
    }

    /// Keep candidates never acted on, in input order. One store lookup per
    /// call. Repeated ids within `candidates` keep their first occurrence.
    pub async fn filter_unseen(&self, candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let mut ids = HashSet::new();
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| ids.insert(c.id.clone()))
            .collect();
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let seen = self.store.find_by_ids(self.action, &ids).await?;

        Ok(candidates
            .into_iter()
            .filter(|c| !seen.contains(&c.id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use outreach_common::HistoryEntry;

    use super::*;
    use crate::testing::{candidate, MockStore};

    #[tokio::test]
    async fn acted_on_candidates_are_filtered() {
        let store = Arc::new(MockStore::new());
        let done = candidate("p2", 30);
        store
            .insert(&HistoryEntry::new(
                &done,
                ActionType::Comment,
                Some("insight".into()),
                "Nice".into(),
                "feed",
                Utc::now(),
            ))
            .await
            .unwrap();

        let dedup = DedupStore::new(store.clone(), ActionType::Comment);
        let kept: Vec<_> = dedup
            .filter_unseen(vec![candidate("p1", 10), done, candidate("p3", 5)])
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(kept, ["p1", "p3"]);
    }

    #[tokio::test]
    async fn history_is_scoped_per_action() {
        let store = Arc::new(MockStore::new());
        let c = candidate("person-1", 0);
        store
            .insert(&HistoryEntry::new(
                &c,
                ActionType::Connection,
                None,
                "Hi".into(),
                "founder",
                Utc::now(),
            ))
            .await
            .unwrap();

        let comments = DedupStore::new(store.clone(), ActionType::Comment);
        assert_eq!(comments.filter_unseen(vec![c]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_ids_keep_first() {
        let store = Arc::new(MockStore::new());
        let dedup = DedupStore::new(store, ActionType::Comment);
        let kept = dedup
            .filter_unseen(vec![candidate("p1", 10), candidate("p1", 99)])
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].popularity, 10);
    }
}

// Trait abstractions for the engagement loop's collaborators.
//
// Actuator + ActuatorSession: the browser session that lists candidates,
//   performs actions and reads back activity.
// ContentGenerator: produces comment bodies and connection notes.
// PersistentStore: action history, rate-window counts and sync markers.
//
// The loop only ever sees these traits, so every test runs against the
// in-memory mocks in `testing.rs`: no browser, no model, no database.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use outreach_common::{
    ActionType, Candidate, HistoryEntry, Metrics, ObservedActivity, StrategyPerformance,
    SyncMarker,
};

// ---------------------------------------------------------------------------
// Actuator
// ---------------------------------------------------------------------------

/// Result of asking the actuator to perform an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Ok,
    /// The action could not be performed on this candidate (e.g. the control
    /// was missing). Nothing was sent; the loop moves on.
    SoftFail(String),
    /// The session is unusable. The run stops.
    HardFail(String),
}

/// Opens browser sessions. One session per run.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn start_session(&self) -> Result<Box<dyn ActuatorSession>>;
}

/// A live browser session. Methods take `&mut self`: one operation at a time.
#[async_trait]
pub trait ActuatorSession: Send {
    /// List raw candidates for `query`, at most `limit`.
    async fn list_candidates(
        &mut self,
        action: ActionType,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>>;

    /// Perform `action` on `candidate` with `content`. Never retried.
    async fn perform_action(
        &mut self,
        action: ActionType,
        candidate: &Candidate,
        content: &str,
    ) -> ActionOutcome;

    /// The account's own recent activity with engagement counters.
    async fn recent_activity(&mut self, limit: usize) -> Result<Vec<ObservedActivity>>;

    /// Release the session. Called exactly once, on every exit path.
    async fn close(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// ContentGenerator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate content for `candidate`. `Ok(None)` means the candidate should
    /// be skipped.
    async fn generate(
        &self,
        action: ActionType,
        candidate: &Candidate,
        strategy: Option<&str>,
    ) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// PersistentStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Which of `candidate_ids` already have a history entry for `action`.
    async fn find_by_ids(
        &self,
        action: ActionType,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>>;

    /// Insert a history entry. Returns `false` when an entry for the same
    /// `(action_type, candidate_id)` already exists; nothing is written then.
    async fn insert(&self, entry: &HistoryEntry) -> Result<bool>;

    /// Entries for `action` with `performed_at >= since`.
    async fn count_since(&self, action: ActionType, since: DateTime<Utc>) -> Result<u64>;

    /// Most recent entries for `action`, newest first.
    async fn recent_entries(&self, action: ActionType, limit: usize) -> Result<Vec<HistoryEntry>>;

    async fn update_metrics(&self, entry_id: Uuid, metrics: &Metrics) -> Result<()>;

    async fn record_sync(&self, marker: &SyncMarker) -> Result<()>;

    /// Average engagement per comment strategy, best first.
    async fn strategy_performance(&self) -> Result<Vec<StrategyPerformance>>;
}

// Test mocks for the engagement engine.
//
// Three mocks matching the three trait boundaries:
// - MockStore (PersistentStore): in-memory history with unique (action, id)
// - MockActuator (Actuator): scripted listings and outcomes per candidate,
//   with a shared ActuatorLog for assertions after the loop consumes it
// - MockGenerator (ContentGenerator): scripted replies, skips, failures, hangs
//
// Plus `candidate()` for building eligible posts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use outreach_common::{
    ActionType, Candidate, HistoryEntry, Metrics, ObservedActivity, StrategyPerformance,
    SyncMarker,
};

use crate::traits::{ActionOutcome, Actuator, ActuatorSession, ContentGenerator, PersistentStore};

/// Text long enough to pass the default comment eligibility rules.
pub const ELIGIBLE_TEXT: &str =
    "We rebuilt our onboarding flow three times this quarter and learned that fewer steps beat clever copy.";

/// An eligible feed post with the given id and popularity.
pub fn candidate(id: &str, popularity: u64) -> Candidate {
    Candidate {
        id: id.to_string(),
        url: format!("https://www.linkedin.com/feed/update/{id}"),
        text: ELIGIBLE_TEXT.to_string(),
        author: format!("Author {id}"),
        author_title: "Founder".to_string(),
        popularity,
        published_at: None,
        observed_at: Utc::now(),
    }
}

/// A history entry performed at `performed_at`, for seeding stores.
pub fn entry_at(
    candidate_id: &str,
    action: ActionType,
    text: &str,
    performed_at: DateTime<Utc>,
) -> HistoryEntry {
    HistoryEntry::new(
        &candidate(candidate_id, 20),
        action,
        None,
        text.to_string(),
        "seed",
        performed_at,
    )
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// In-memory store. Entries are unique per `(action_type, candidate_id)`.
pub struct MockStore {
    entries: Mutex<Vec<HistoryEntry>>,
    syncs: Mutex<Vec<SyncMarker>>,
    failing_inserts: AtomicU32,
    failing_counts: AtomicU32,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            syncs: Mutex::new(Vec::new()),
            failing_inserts: AtomicU32::new(0),
            failing_counts: AtomicU32::new(0),
        }
    }

    pub fn with_entries(entries: Vec<HistoryEntry>) -> Self {
        let store = Self::new();
        *store.entries.lock().unwrap() = entries;
        store
    }

    /// Make the next `n` inserts fail.
    pub fn fail_inserts(self, n: u32) -> Self {
        self.failing_inserts.store(n, Ordering::SeqCst);
        self
    }

    /// Make the next `n` window counts fail.
    pub fn fail_counts(self, n: u32) -> Self {
        self.failing_counts.store(n, Ordering::SeqCst);
        self
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_for(&self, action: ActionType) -> Vec<HistoryEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.action_type == action)
            .collect()
    }

    pub fn syncs(&self) -> Vec<SyncMarker> {
        self.syncs.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for MockStore {
    async fn find_by_ids(
        &self,
        action: ActionType,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.action_type == action && candidate_ids.contains(&e.candidate_id))
            .map(|e| e.candidate_id.clone())
            .collect())
    }

    async fn insert(&self, entry: &HistoryEntry) -> Result<bool> {
        if Self::take_failure(&self.failing_inserts) {
            bail!("MockStore: insert failed");
        }
        let mut entries = self.entries.lock().unwrap();
        if entries
            .iter()
            .any(|e| e.action_type == entry.action_type && e.candidate_id == entry.candidate_id)
        {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn count_since(&self, action: ActionType, since: DateTime<Utc>) -> Result<u64> {
        if Self::take_failure(&self.failing_counts) {
            bail!("MockStore: count failed");
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.action_type == action && e.performed_at >= since)
            .count() as u64)
    }

    async fn recent_entries(&self, action: ActionType, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.entries_for(action);
        entries.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn update_metrics(&self, entry_id: Uuid, metrics: &Metrics) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.metrics = *metrics;
                Ok(())
            }
            None => bail!("MockStore: no entry {entry_id}"),
        }
    }

    async fn record_sync(&self, marker: &SyncMarker) -> Result<()> {
        let mut syncs = self.syncs.lock().unwrap();
        syncs.retain(|s| s.name != marker.name);
        syncs.push(marker.clone());
        Ok(())
    }

    async fn strategy_performance(&self) -> Result<Vec<StrategyPerformance>> {
        let mut groups: HashMap<String, Vec<Metrics>> = HashMap::new();
        for entry in self.entries_for(ActionType::Comment) {
            if let Some(strategy) = entry.strategy {
                groups.entry(strategy).or_default().push(entry.metrics);
            }
        }

        let mut rows: Vec<StrategyPerformance> = groups
            .into_iter()
            .map(|(strategy, metrics)| {
                let n = metrics.len() as f64;
                let avg = |f: fn(&Metrics) -> u64| metrics.iter().map(f).sum::<u64>() as f64 / n;
                StrategyPerformance {
                    strategy,
                    count: metrics.len() as u64,
                    avg_impressions: avg(|m| m.impressions),
                    avg_likes: avg(|m| m.likes),
                    avg_replies: avg(|m| m.replies),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.avg_impressions.total_cmp(&a.avg_impressions));
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// MockActuator
// ---------------------------------------------------------------------------

/// Everything the mock sessions saw, shared with the test.
#[derive(Debug, Default)]
pub struct ActuatorLog {
    pub sessions_started: u32,
    pub sessions_closed: u32,
    /// Queries in the order they were listed.
    pub listings: Vec<String>,
    /// `(candidate_id, content)` for every attempted action.
    pub attempted: Vec<(String, String)>,
}

#[derive(Default)]
struct Script {
    listings: HashMap<String, Vec<Candidate>>,
    outcomes: HashMap<String, ActionOutcome>,
    hang_on: HashSet<String>,
    activity: Vec<ObservedActivity>,
    fail_start: bool,
    failing_listings: AtomicU32,
}

/// Scripted actuator. Unregistered queries list nothing; unregistered
/// candidates succeed.
pub struct MockActuator {
    script: Arc<Script>,
    log: Arc<Mutex<ActuatorLog>>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script::default()),
            log: Arc::new(Mutex::new(ActuatorLog::default())),
        }
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::get_mut(&mut self.script).expect("MockActuator script is shared after start")
    }

    pub fn on_query(mut self, query: &str, candidates: Vec<Candidate>) -> Self {
        self.script_mut()
            .listings
            .insert(query.to_string(), candidates);
        self
    }

    pub fn on_action(mut self, candidate_id: &str, outcome: ActionOutcome) -> Self {
        self.script_mut()
            .outcomes
            .insert(candidate_id.to_string(), outcome);
        self
    }

    /// Never complete the action on `candidate_id`.
    pub fn hang_on(mut self, candidate_id: &str) -> Self {
        self.script_mut().hang_on.insert(candidate_id.to_string());
        self
    }

    pub fn with_activity(mut self, activity: Vec<ObservedActivity>) -> Self {
        self.script_mut().activity = activity;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.script_mut().fail_start = true;
        self
    }

    /// Make the next `n` listings fail.
    pub fn failing_listings(mut self, n: u32) -> Self {
        self.script_mut().failing_listings = AtomicU32::new(n);
        self
    }

    pub fn log(&self) -> Arc<Mutex<ActuatorLog>> {
        self.log.clone()
    }
}

impl Default for MockActuator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn start_session(&self) -> Result<Box<dyn ActuatorSession>> {
        if self.script.fail_start {
            bail!("MockActuator: browser profile unavailable");
        }
        self.log.lock().unwrap().sessions_started += 1;
        Ok(Box::new(MockSession {
            script: self.script.clone(),
            log: self.log.clone(),
        }))
    }
}

struct MockSession {
    script: Arc<Script>,
    log: Arc<Mutex<ActuatorLog>>,
}

#[async_trait]
impl ActuatorSession for MockSession {
    async fn list_candidates(
        &mut self,
        _action: ActionType,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        self.log.lock().unwrap().listings.push(query.to_string());
        if MockStore::take_failure(&self.script.failing_listings) {
            bail!("MockActuator: feed did not load");
        }
        let mut listed = self.script.listings.get(query).cloned().unwrap_or_default();
        listed.truncate(limit);
        Ok(listed)
    }

    async fn perform_action(
        &mut self,
        _action: ActionType,
        candidate: &Candidate,
        content: &str,
    ) -> ActionOutcome {
        self.log
            .lock()
            .unwrap()
            .attempted
            .push((candidate.id.clone(), content.to_string()));
        if self.script.hang_on.contains(&candidate.id) {
            std::future::pending::<()>().await;
        }
        self.script
            .outcomes
            .get(&candidate.id)
            .cloned()
            .unwrap_or(ActionOutcome::Ok)
    }

    async fn recent_activity(&mut self, limit: usize) -> Result<Vec<ObservedActivity>> {
        Ok(self.script.activity.iter().take(limit).cloned().collect())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().sessions_closed += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Skip,
    Fail,
    Hang,
}

/// Scripted generator. Unregistered candidates get `"Reply to {id}"`.
pub struct MockGenerator {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, candidate_id: &str, text: &str) -> Self {
        self.replies
            .insert(candidate_id.to_string(), Reply::Text(text.to_string()));
        self
    }

    pub fn skip(mut self, candidate_id: &str) -> Self {
        self.replies.insert(candidate_id.to_string(), Reply::Skip);
        self
    }

    pub fn fail(mut self, candidate_id: &str) -> Self {
        self.replies.insert(candidate_id.to_string(), Reply::Fail);
        self
    }

    pub fn hang(mut self, candidate_id: &str) -> Self {
        self.replies.insert(candidate_id.to_string(), Reply::Hang);
        self
    }

    /// `(candidate_id, strategy)` for every call, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(
        &self,
        _action: ActionType,
        candidate: &Candidate,
        strategy: Option<&str>,
    ) -> Result<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((candidate.id.clone(), strategy.map(String::from)));

        match self.replies.get(&candidate.id) {
            Some(Reply::Text(text)) => Ok(Some(text.clone())),
            Some(Reply::Skip) => Ok(None),
            Some(Reply::Fail) => bail!("MockGenerator: model unavailable"),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(Some(format!("Reply to {}", candidate.id))),
        }
    }
}

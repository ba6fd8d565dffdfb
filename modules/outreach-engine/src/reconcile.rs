use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use outreach_common::config::{AnalyticsConfig, TimeoutConfig};
use outreach_common::{ActionType, HistoryEntry, ObservedActivity, OutreachError, SyncMarker};

use crate::call::{retry_once, with_retry, with_timeout};
use crate::traits::{Actuator, PersistentStore};

/// Name of the marker written after each pass.
pub const ANALYTICS_SYNC: &str = "analytics";

/// An observed activity paired with the history entry it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ActivityMatch<'a> {
    pub activity: &'a ObservedActivity,
    pub entry: &'a HistoryEntry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Observed activities considered.
    pub observed: u64,
    /// Activities paired with a history entry.
    pub matched: u64,
    /// Entries whose stored metrics changed.
    pub updated: u64,
    /// History entries eligible for matching.
    pub total: u64,
}

impl fmt::Display for ReconcileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observed={} matched={} updated={} of {} entries",
            self.observed, self.matched, self.updated, self.total
        )
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pair activities with history entries.
///
/// An activity matches an entry when the first `prefix_chars` characters of
/// the entry's generated text (whitespace-normalized) occur in the activity
/// text. `history` is expected newest first; the first unclaimed entry wins,
/// and each entry is claimed at most once. Activities with all-zero counters
/// are ignored.
pub fn match_activities<'a>(
    activities: &'a [ObservedActivity],
    history: &'a [HistoryEntry],
    prefix_chars: usize,
) -> Vec<ActivityMatch<'a>> {
    let prefixes: Vec<String> = history
        .iter()
        .map(|e| {
            normalize(&e.generated_text)
                .chars()
                .take(prefix_chars)
                .collect()
        })
        .collect();

    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut matches = Vec::new();

    for activity in activities {
        if activity.metrics().is_zero() {
            continue;
        }
        let observed = normalize(&activity.text);
        let found = history.iter().zip(&prefixes).find(|(entry, prefix)| {
            !prefix.is_empty() && !claimed.contains(&entry.id) && observed.contains(prefix.as_str())
        });
        if let Some((entry, _)) = found {
            claimed.insert(entry.id);
            matches.push(ActivityMatch { activity, entry });
        }
    }
    matches
}

/// Folds observed engagement back onto recent history entries.
pub struct AnalyticsReconciler {
    store: Arc<dyn PersistentStore>,
    action: ActionType,
    config: AnalyticsConfig,
    timeouts: TimeoutConfig,
}

impl AnalyticsReconciler {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        config: AnalyticsConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            store,
            action: ActionType::Comment,
            config,
            timeouts,
        }
    }

    async fn recent_history(&self) -> Result<Vec<HistoryEntry>, OutreachError> {
        let store = &self.store;
        with_retry(
            "recent_entries",
            self.timeouts.store(),
            self.timeouts.retry_backoff(),
            OutreachError::Store,
            || store.recent_entries(self.action, self.config.history_window),
        )
        .await
    }

    /// Apply `activities` to the most recent history. Each entry is written at
    /// most once and only when its merged metrics differ from what is stored.
    pub async fn reconcile(
        &self,
        activities: &[ObservedActivity],
    ) -> Result<ReconcileStats, OutreachError> {
        let history = self.recent_history().await?;
        let matches = match_activities(activities, &history, self.config.prefix_chars);

        let mut stats = ReconcileStats {
            observed: activities.len() as u64,
            matched: matches.len() as u64,
            updated: 0,
            total: history.len() as u64,
        };

        let store = &self.store;
        for m in &matches {
            let merged = m.entry.metrics.merge_observed(&m.activity.metrics());
            if merged == m.entry.metrics {
                continue;
            }
            debug!(
                entry_id = %m.entry.id,
                candidate_id = %m.entry.candidate_id,
                before = %m.entry.metrics,
                after = %merged,
                "Updating engagement metrics"
            );
            with_retry(
                "update_metrics",
                self.timeouts.store(),
                self.timeouts.retry_backoff(),
                OutreachError::Store,
                || store.update_metrics(m.entry.id, &merged),
            )
            .await?;
            stats.updated += 1;
        }

        let marker = SyncMarker {
            name: ANALYTICS_SYNC.to_string(),
            synced_at: Utc::now(),
            updated: stats.updated,
            total: stats.total,
        };
        with_retry(
            "record_sync",
            self.timeouts.store(),
            self.timeouts.retry_backoff(),
            OutreachError::Store,
            || store.record_sync(&marker),
        )
        .await?;

        info!(%stats, "Analytics reconciled");
        Ok(stats)
    }

    /// One full pass: open a session, read recent activity, reconcile, close.
    /// Skips the browser entirely when there is no history to match.
    pub async fn sync(&self, actuator: &dyn Actuator) -> Result<ReconcileStats, OutreachError> {
        if self.recent_history().await?.is_empty() {
            info!("No history to reconcile");
            return Ok(ReconcileStats::default());
        }

        let mut session = with_timeout(
            "start_session",
            self.timeouts.actuator(),
            OutreachError::Actuator,
            actuator.start_session(),
        )
        .await?;

        let activity = retry_once!(
            "recent_activity",
            self.timeouts.actuator(),
            self.timeouts.retry_backoff(),
            OutreachError::Actuator,
            session.recent_activity(self.config.activity_limit)
        );

        if let Err(e) = with_timeout(
            "close_session",
            self.timeouts.actuator(),
            OutreachError::Actuator,
            session.close(),
        )
        .await
        {
            warn!(error = %e, "Failed to close session");
        }

        let activity = activity?;
        info!(count = activity.len(), "Read recent activity");
        self.reconcile(&activity).await
    }
}

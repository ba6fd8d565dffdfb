//! Analytics reconciliation against the in-memory store and actuator.

use std::sync::Arc;

use chrono::{Duration, Utc};

use outreach_common::config::{AnalyticsConfig, TimeoutConfig};
use outreach_common::{ActionType, Metrics, ObservedActivity};
use outreach_engine::reconcile::{AnalyticsReconciler, ReconcileStats, ANALYTICS_SYNC};
use outreach_engine::testing::{entry_at, MockActuator, MockStore};

const PRICING: &str = "Pricing pages convert better when the cheapest plan is not the default choice.";
const HIRING: &str = "The best hire we made this year came from a referral, not a job board post.";

fn observed(text: &str, impressions: u64, likes: u64, replies: u64) -> ObservedActivity {
    ObservedActivity {
        text: text.to_string(),
        impressions,
        likes,
        replies,
    }
}

fn reconciler(store: &Arc<MockStore>) -> AnalyticsReconciler {
    AnalyticsReconciler::new(store.clone(), AnalyticsConfig::default(), TimeoutConfig::default())
}

fn seeded_store() -> Arc<MockStore> {
    let now = Utc::now();
    Arc::new(MockStore::with_entries(vec![
        entry_at("p1", ActionType::Comment, PRICING, now - Duration::hours(2)),
        entry_at("p2", ActionType::Comment, HIRING, now - Duration::hours(1)),
    ]))
}

fn metrics_of(store: &MockStore, candidate_id: &str) -> Metrics {
    store
        .entries()
        .into_iter()
        .find(|e| e.candidate_id == candidate_id)
        .unwrap()
        .metrics
}

#[tokio::test(start_paused = true)]
async fn matched_activity_updates_metrics() {
    let store = seeded_store();
    let activities = vec![
        observed(&format!("You commented: {PRICING}"), 420, 7, 2),
        observed("A post we never touched", 900, 30, 4),
    ];

    let stats = reconciler(&store).reconcile(&activities).await.unwrap();

    assert_eq!(
        stats,
        ReconcileStats {
            observed: 2,
            matched: 1,
            updated: 1,
            total: 2,
        }
    );
    assert_eq!(
        metrics_of(&store, "p1"),
        Metrics {
            impressions: 420,
            likes: 7,
            replies: 2,
        }
    );
    assert!(metrics_of(&store, "p2").is_zero());
}

#[tokio::test(start_paused = true)]
async fn zero_observation_never_overwrites() {
    let store = seeded_store();
    let reconciler = reconciler(&store);

    reconciler
        .reconcile(&[observed(PRICING, 300, 5, 1)])
        .await
        .unwrap();
    // Later scrape missed the likes and replies
    let stats = reconciler
        .reconcile(&[observed(PRICING, 350, 0, 0)])
        .await
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(
        metrics_of(&store, "p1"),
        Metrics {
            impressions: 350,
            likes: 5,
            replies: 1,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn unchanged_metrics_are_not_rewritten() {
    let store = seeded_store();
    let reconciler = reconciler(&store);
    let activities = [observed(HIRING, 80, 2, 0)];

    reconciler.reconcile(&activities).await.unwrap();
    let stats = reconciler.reconcile(&activities).await.unwrap();

    assert_eq!(stats.matched, 1);
    assert_eq!(stats.updated, 0);
}

#[tokio::test(start_paused = true)]
async fn each_entry_is_updated_at_most_once_per_pass() {
    let store = seeded_store();
    let activities = vec![observed(PRICING, 100, 1, 0), observed(PRICING, 200, 2, 0)];

    let stats = reconciler(&store).reconcile(&activities).await.unwrap();

    assert_eq!(stats.matched, 1);
    assert_eq!(stats.updated, 1);
    assert_eq!(metrics_of(&store, "p1").impressions, 100);
}

#[tokio::test(start_paused = true)]
async fn connection_history_is_ignored() {
    let store = Arc::new(MockStore::with_entries(vec![entry_at(
        "person1",
        ActionType::Connection,
        PRICING,
        Utc::now(),
    )]));

    let stats = reconciler(&store)
        .reconcile(&[observed(PRICING, 50, 1, 0)])
        .await
        .unwrap();

    assert_eq!(stats.total, 0);
    assert_eq!(stats.matched, 0);
    assert!(metrics_of(&store, "person1").is_zero());
}

#[tokio::test(start_paused = true)]
async fn pass_writes_sync_marker() {
    let store = seeded_store();

    reconciler(&store)
        .reconcile(&[observed(HIRING, 10, 0, 0)])
        .await
        .unwrap();

    let syncs = store.syncs();
    assert_eq!(syncs.len(), 1);
    assert_eq!(syncs[0].name, ANALYTICS_SYNC);
    assert_eq!(syncs[0].updated, 1);
    assert_eq!(syncs[0].total, 2);
}

#[tokio::test(start_paused = true)]
async fn sync_reads_activity_and_closes_session() {
    let store = seeded_store();
    let actuator = MockActuator::new().with_activity(vec![
        observed(PRICING, 120, 3, 0),
        observed(HIRING, 60, 1, 1),
    ]);
    let log = actuator.log();

    let stats = reconciler(&store).sync(&actuator).await.unwrap();

    assert_eq!(stats.updated, 2);
    let log = log.lock().unwrap();
    assert_eq!(log.sessions_started, 1);
    assert_eq!(log.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn sync_without_history_skips_the_browser() {
    let store = Arc::new(MockStore::new());
    let actuator = MockActuator::new().with_activity(vec![observed(PRICING, 120, 3, 0)]);
    let log = actuator.log();

    let stats = reconciler(&store).sync(&actuator).await.unwrap();

    assert_eq!(stats, ReconcileStats::default());
    assert_eq!(log.lock().unwrap().sessions_started, 0);
    assert!(store.syncs().is_empty());
}

// Postgres persistence for action history and sync markers.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use outreach_common::{
    ActionType, HistoryEntry, Metrics, StrategyPerformance, SyncMarker,
};

use crate::traits::PersistentStore;

pub struct PgStore {
    pool: PgPool,
}

/// A row from the history_entries table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    candidate_id: String,
    action_type: String,
    strategy: Option<String>,
    generated_text: String,
    candidate_url: String,
    candidate_author: String,
    candidate_title: String,
    candidate_excerpt: String,
    source_tag: String,
    performed_at: DateTime<Utc>,
    impressions: i64,
    likes: i64,
    replies: i64,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = anyhow::Error;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(HistoryEntry {
            id: row.id,
            candidate_id: row.candidate_id,
            action_type: row.action_type.parse()?,
            strategy: row.strategy,
            generated_text: row.generated_text,
            candidate_url: row.candidate_url,
            candidate_author: row.candidate_author,
            candidate_title: row.candidate_title,
            candidate_excerpt: row.candidate_excerpt,
            source_tag: row.source_tag,
            performed_at: row.performed_at,
            metrics: Metrics {
                impressions: from_db(row.impressions),
                likes: from_db(row.likes),
                replies: from_db(row.replies),
            },
        })
    }
}

fn to_db(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_db(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run history migrations")?;
        Ok(())
    }

    pub async fn last_sync(&self, name: &str) -> Result<Option<SyncMarker>> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>, i64, i64)>(
            "SELECT name, synced_at, updated, total FROM sync_status WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(name, synced_at, updated, total)| SyncMarker {
            name,
            synced_at,
            updated: from_db(updated),
            total: from_db(total),
        }))
    }
}

#[async_trait]
impl PersistentStore for PgStore {
    async fn find_by_ids(
        &self,
        action: ActionType,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>> {
        if candidate_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT candidate_id FROM history_entries
            WHERE action_type = $1 AND candidate_id = ANY($2)
            "#,
        )
        .bind(action.as_str())
        .bind(candidate_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert(&self, entry: &HistoryEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO history_entries
                (id, candidate_id, action_type, strategy, generated_text,
                 candidate_url, candidate_author, candidate_title, candidate_excerpt,
                 source_tag, performed_at, impressions, likes, replies)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (action_type, candidate_id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(&entry.candidate_id)
        .bind(entry.action_type.as_str())
        .bind(&entry.strategy)
        .bind(&entry.generated_text)
        .bind(&entry.candidate_url)
        .bind(&entry.candidate_author)
        .bind(&entry.candidate_title)
        .bind(&entry.candidate_excerpt)
        .bind(&entry.source_tag)
        .bind(entry.performed_at)
        .bind(to_db(entry.metrics.impressions))
        .bind(to_db(entry.metrics.likes))
        .bind(to_db(entry.metrics.replies))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_since(&self, action: ActionType, since: DateTime<Utc>) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM history_entries
            WHERE action_type = $1 AND performed_at >= $2
            "#,
        )
        .bind(action.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(from_db(count))
    }

    async fn recent_entries(&self, action: ActionType, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT * FROM history_entries
            WHERE action_type = $1
            ORDER BY performed_at DESC
            LIMIT $2
            "#,
        )
        .bind(action.as_str())
        .bind(to_db(limit as u64))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn update_metrics(&self, entry_id: Uuid, metrics: &Metrics) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE history_entries
            SET impressions = $2, likes = $3, replies = $4
            WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .bind(to_db(metrics.impressions))
        .bind(to_db(metrics.likes))
        .bind(to_db(metrics.replies))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_sync(&self, marker: &SyncMarker) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (name, synced_at, updated, total)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET synced_at = EXCLUDED.synced_at,
                updated = EXCLUDED.updated,
                total = EXCLUDED.total
            "#,
        )
        .bind(&marker.name)
        .bind(marker.synced_at)
        .bind(to_db(marker.updated))
        .bind(to_db(marker.total))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn strategy_performance(&self) -> Result<Vec<StrategyPerformance>> {
        let rows = sqlx::query_as::<_, (String, i64, f64, f64, f64)>(
            r#"
            SELECT strategy,
                   COUNT(*),
                   AVG(impressions)::float8,
                   AVG(likes)::float8,
                   AVG(replies)::float8
            FROM history_entries
            WHERE action_type = $1 AND strategy IS NOT NULL
            GROUP BY strategy
            ORDER BY AVG(impressions) DESC
            "#,
        )
        .bind(ActionType::Comment.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(strategy, count, avg_impressions, avg_likes, avg_replies)| StrategyPerformance {
                    strategy,
                    count: from_db(count),
                    avg_impressions,
                    avg_likes,
                    avg_replies,
                },
            )
            .collect())
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OutreachError;

// --- Actions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Comment,
    Connection,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Connection => "connection",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment" => Ok(Self::Comment),
            "connection" => Ok(Self::Connection),
            other => Err(OutreachError::Parse(format!(
                "action_type: unknown value '{other}'"
            ))),
        }
    }
}

// --- Candidates ---

/// A post or profile that an action could be performed on.
///
/// Arrives already parsed from the browser driver. `id` may be empty when the
/// page offered no stable identity; the engine derives one from the URL before
/// dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_title: String,
    #[serde(default)]
    pub popularity: u64,
    /// When the underlying post was published, if the page exposed it.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl Candidate {
    /// First `max_chars` characters of the candidate text.
    pub fn text_excerpt(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

// --- History ---

/// Engagement counters observed on a performed action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub impressions: u64,
    pub likes: u64,
    pub replies: u64,
}

impl Metrics {
    pub fn is_zero(&self) -> bool {
        self.impressions == 0 && self.likes == 0 && self.replies == 0
    }

    /// Fold freshly observed counters over known ones. A zero observation is
    /// treated as a scrape miss and never replaces a recorded value.
    pub fn merge_observed(&self, observed: &Metrics) -> Metrics {
        fn pick(known: u64, seen: u64) -> u64 {
            if seen == 0 {
                known
            } else {
                seen
            }
        }

        Metrics {
            impressions: pick(self.impressions, observed.impressions),
            likes: pick(self.likes, observed.likes),
            replies: pick(self.replies, observed.replies),
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "impressions={} likes={} replies={}",
            self.impressions, self.likes, self.replies
        )
    }
}

/// Durable record of one completed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub candidate_id: String,
    pub action_type: ActionType,
    pub strategy: Option<String>,
    pub generated_text: String,
    pub candidate_url: String,
    pub candidate_author: String,
    pub candidate_title: String,
    pub candidate_excerpt: String,
    /// Where the candidate came from, e.g. the search query used.
    pub source_tag: String,
    pub performed_at: DateTime<Utc>,
    pub metrics: Metrics,
}

/// Stored candidate text is capped to keep rows small.
pub const CANDIDATE_EXCERPT_CHARS: usize = 2000;

impl HistoryEntry {
    pub fn new(
        candidate: &Candidate,
        action_type: ActionType,
        strategy: Option<String>,
        generated_text: String,
        source_tag: &str,
        performed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_id: candidate.id.clone(),
            action_type,
            strategy,
            generated_text,
            candidate_url: candidate.url.clone(),
            candidate_author: candidate.author.clone(),
            candidate_title: candidate.author_title.clone(),
            candidate_excerpt: candidate.text_excerpt(CANDIDATE_EXCERPT_CHARS),
            source_tag: source_tag.to_string(),
            performed_at,
            metrics: Metrics::default(),
        }
    }
}

// --- Rate limits ---

/// A cap on how many actions may fall inside a trailing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    pub hours: u32,
    #[serde(rename = "max")]
    pub max_count: u32,
}

impl RateWindow {
    /// Longest window accepted by config validation (ten years).
    pub const MAX_HOURS: u32 = 24 * 366 * 10;

    pub fn new(hours: u32, max_count: u32) -> Self {
        Self { hours, max_count }
    }

    pub fn duration(&self) -> Duration {
        Duration::hours(i64::from(self.hours))
    }

    /// Start of the window ending at `now`, clamped to the earliest
    /// representable instant.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.duration())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}h", self.max_count, self.hours)
    }
}

// --- Strategies ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyWeight {
    pub name: String,
    pub weight: u32,
}

/// Relative weights for content strategies, in declared order.
///
/// Order is part of the value: the same draw always walks the list the same
/// way. Construction rejects empty lists, duplicate or blank names, and lists
/// whose weights are all zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StrategyWeight>", into = "Vec<StrategyWeight>")]
pub struct StrategyWeights {
    entries: Vec<StrategyWeight>,
}

impl StrategyWeights {
    pub fn new(entries: Vec<StrategyWeight>) -> Result<Self, OutreachError> {
        if entries.is_empty() {
            return Err(OutreachError::Config("strategy list is empty".into()));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(OutreachError::Config("strategy name is blank".into()));
            }
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(OutreachError::Config(format!(
                    "strategy '{}' is declared twice",
                    entry.name
                )));
            }
        }
        if entries.iter().all(|e| e.weight == 0) {
            return Err(OutreachError::Config(
                "all strategy weights are zero".into(),
            ));
        }
        Ok(Self { entries })
    }

    /// Build from `(name, weight)` pairs in declared order.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> Result<Self, OutreachError> {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, weight)| StrategyWeight {
                    name: name.to_string(),
                    weight,
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[StrategyWeight] {
        &self.entries
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.weight)).sum()
    }

    pub fn weight_of(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.weight)
    }

    /// Walk the declared order subtracting each weight from `draw`; the first
    /// strategy that brings the remainder to zero or below wins. Zero weights
    /// are skipped. A draw past the end lands on the last positive weight.
    pub fn pick_with_draw(&self, draw: f64) -> &str {
        let mut remaining = draw;
        let mut last_positive = "";
        for entry in self.entries.iter().filter(|e| e.weight > 0) {
            last_positive = &entry.name;
            remaining -= f64::from(entry.weight);
            if remaining <= 0.0 {
                return &entry.name;
            }
        }
        last_positive
    }
}

impl TryFrom<Vec<StrategyWeight>> for StrategyWeights {
    type Error = OutreachError;

    fn try_from(entries: Vec<StrategyWeight>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<StrategyWeights> for Vec<StrategyWeight> {
    fn from(weights: StrategyWeights) -> Self {
        weights.entries
    }
}

// --- Analytics ---

/// One activity snippet scraped from the account's activity page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedActivity {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub replies: u64,
}

impl ObservedActivity {
    pub fn metrics(&self) -> Metrics {
        Metrics {
            impressions: self.impressions,
            likes: self.likes,
            replies: self.replies,
        }
    }
}

/// Marker written after each reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarker {
    pub name: String,
    pub synced_at: DateTime<Utc>,
    pub updated: u64,
    pub total: u64,
}

/// Aggregate engagement per comment strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub count: u64,
    pub avg_impressions: f64,
    pub avg_likes: f64,
    pub avg_replies: f64,
}

impl fmt::Display for StrategyPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<14} count={:<5} avg_impressions={:<8.1} avg_likes={:<6.1} avg_replies={:.1}",
            self.strategy, self.count, self.avg_impressions, self.avg_likes, self.avg_replies
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_known_values_over_zero_observations() {
        let known = Metrics {
            impressions: 120,
            likes: 4,
            replies: 1,
        };
        let observed = Metrics {
            impressions: 300,
            likes: 0,
            replies: 0,
        };
        let merged = known.merge_observed(&observed);
        assert_eq!(merged.impressions, 300);
        assert_eq!(merged.likes, 4);
        assert_eq!(merged.replies, 1);
    }

    #[test]
    fn strategy_weights_reject_all_zero() {
        let err = StrategyWeights::from_pairs([("insight", 0), ("question", 0)]).unwrap_err();
        assert!(matches!(err, OutreachError::Config(_)));
    }

    #[test]
    fn strategy_weights_reject_duplicates() {
        assert!(StrategyWeights::from_pairs([("insight", 1), ("insight", 2)]).is_err());
    }

    #[test]
    fn strategy_weights_keep_declared_order() {
        let w = StrategyWeights::from_pairs([("story", 20), ("insight", 40), ("question", 25)])
            .unwrap();
        let names: Vec<_> = w.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["story", "insight", "question"]);
        assert_eq!(w.total(), 85);
    }

    #[test]
    fn draw_walk_is_inclusive_at_boundaries() {
        let w = StrategyWeights::from_pairs([
            ("insight", 40),
            ("question", 25),
            ("story", 20),
            ("agree_expand", 15),
        ])
        .unwrap();
        assert_eq!(w.pick_with_draw(0.0), "insight");
        assert_eq!(w.pick_with_draw(37.0), "insight");
        assert_eq!(w.pick_with_draw(40.0), "insight");
        assert_eq!(w.pick_with_draw(40.5), "question");
        assert_eq!(w.pick_with_draw(65.0), "question");
        assert_eq!(w.pick_with_draw(65.5), "story");
        assert_eq!(w.pick_with_draw(99.9), "agree_expand");
    }

    #[test]
    fn draw_skips_zero_weights_and_clamps_overflow() {
        let w = StrategyWeights::from_pairs([("muted", 0), ("insight", 3), ("story", 2), ("off", 0)])
            .unwrap();
        assert_eq!(w.pick_with_draw(0.0), "insight");
        assert_eq!(w.pick_with_draw(1e9), "story");
    }

    #[test]
    fn action_type_round_trips_through_str() {
        for action in [ActionType::Comment, ActionType::Connection] {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
        let err = "like".parse::<ActionType>().unwrap_err();
        assert!(matches!(err, OutreachError::Parse(ref msg) if msg.contains("action_type")));
    }

    #[test]
    fn candidate_deserializes_with_missing_fields() {
        let c: Candidate =
            serde_json::from_str(r#"{"url": "https://example.com/p/1", "popularity": 12}"#)
                .unwrap();
        assert!(c.id.is_empty());
        assert_eq!(c.popularity, 12);
        assert!(c.published_at.is_none());
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::OutreachError;
use crate::types::{RateWindow, StrategyWeights};

/// Default location of the tunables file when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "outreach.toml";

/// TOML-backed configuration for all loops. Secrets stay in the environment
/// (see [`Environment`]).
///
/// Loop sections are optional; when present they must be complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutreachConfig {
    #[serde(default = "LoopConfig::comment_defaults")]
    pub comment: LoopConfig,
    #[serde(default = "LoopConfig::connection_defaults")]
    pub connection: LoopConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            comment: LoopConfig::comment_defaults(),
            connection: LoopConfig::connection_defaults(),
            analytics: AnalyticsConfig::default(),
            timeouts: TimeoutConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopConfig {
    /// Source queries, used round-robin one per scan.
    pub queries: Vec<String>,
    /// Max raw candidates requested per scan.
    pub scan_limit: usize,
    /// Candidates acted on per scan (1 = single best pick).
    pub batch_size: usize,
    /// Stop after this many successful actions in one run.
    pub max_per_run: Option<u32>,
    /// Stop after this many complete passes over `queries`.
    pub max_passes: Option<u32>,
    pub windows: Vec<RateWindow>,
    pub pacing: PacingConfig,
    /// Sleep when a scan yields nothing actionable.
    pub idle_backoff_secs: u64,
    pub eligibility: EligibilityRules,
    /// Content strategies; comment loops only.
    pub strategies: Option<StrategyWeights>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PacingConfig {
    pub base_secs: u64,
    pub jitter_min_secs: u64,
    pub jitter_max_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EligibilityRules {
    pub min_text_chars: usize,
    pub min_popularity: u64,
    /// Max age of the underlying post. Candidates without a publish time pass.
    pub max_age_hours: Option<u32>,
    /// Case-insensitive substrings that disqualify a candidate.
    pub denylist: Vec<String>,
}

fn default_denylist() -> Vec<String> {
    [
        "hiring",
        "job opening",
        "we are looking for",
        "crypto",
        "nft",
        "web3",
        "grind",
        "hustle culture",
        "motivational quote",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl LoopConfig {
    pub fn comment_defaults() -> Self {
        Self {
            queries: vec!["feed".to_string()],
            scan_limit: 20,
            batch_size: 1,
            max_per_run: None,
            max_passes: None,
            windows: vec![RateWindow::new(24, 25)],
            pacing: PacingConfig {
                base_secs: 240,
                jitter_min_secs: 0,
                jitter_max_secs: 60,
            },
            idle_backoff_secs: 600,
            eligibility: EligibilityRules {
                min_text_chars: 50,
                min_popularity: 10,
                max_age_hours: Some(6),
                denylist: default_denylist(),
            },
            strategies: StrategyWeights::from_pairs([
                ("insight", 40),
                ("question", 25),
                ("story", 20),
                ("agree_expand", 15),
            ])
            .ok(),
        }
    }

    pub fn connection_defaults() -> Self {
        Self {
            queries: vec!["startup founder".to_string(), "product manager".to_string()],
            scan_limit: 10,
            batch_size: 10,
            max_per_run: Some(10),
            max_passes: Some(1),
            windows: vec![RateWindow::new(24 * 7, 50)],
            pacing: PacingConfig {
                base_secs: 30,
                jitter_min_secs: 0,
                jitter_max_secs: 30,
            },
            idle_backoff_secs: 600,
            eligibility: EligibilityRules {
                min_text_chars: 1,
                min_popularity: 0,
                max_age_hours: None,
                denylist: default_denylist(),
            },
            strategies: None,
        }
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    /// Check one loop section; `section` prefixes error messages.
    pub fn validate(&self, section: &str) -> Result<(), OutreachError> {
        let err = |msg: String| Err(OutreachError::Config(format!("[{section}] {msg}")));

        if self.queries.iter().all(|q| q.trim().is_empty()) {
            return err("at least one query is required".into());
        }
        if self.scan_limit == 0 {
            return err("scan_limit must be > 0".into());
        }
        if self.batch_size == 0 {
            return err("batch_size must be > 0".into());
        }
        if self.max_per_run == Some(0) {
            return err("max_per_run must be > 0".into());
        }
        if self.max_passes == Some(0) {
            return err("max_passes must be > 0".into());
        }
        if self.windows.is_empty() {
            return err("at least one rate window is required".into());
        }
        for window in &self.windows {
            if window.hours == 0 || window.max_count == 0 {
                return err(format!("rate window {window} must have hours > 0 and max > 0"));
            }
            if window.hours > RateWindow::MAX_HOURS {
                return err(format!(
                    "rate window {window} exceeds {} hours",
                    RateWindow::MAX_HOURS
                ));
            }
        }
        if self.idle_backoff_secs == 0 {
            return err("idle_backoff_secs must be > 0".into());
        }
        if self.pacing.jitter_min_secs > self.pacing.jitter_max_secs {
            return err(format!(
                "pacing jitter_min_secs ({}) exceeds jitter_max_secs ({})",
                self.pacing.jitter_min_secs, self.pacing.jitter_max_secs
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// How many of the most recent history entries are eligible for matching.
    pub history_window: usize,
    /// Leading characters of generated text that must appear in the observed text.
    pub prefix_chars: usize,
    /// Max activity snippets requested from the driver.
    pub activity_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            history_window: 50,
            prefix_chars: 50,
            activity_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub generator_secs: u64,
    pub actuator_secs: u64,
    pub store_secs: u64,
    /// Pause before the single retry of a failed store/listing/generator call.
    pub retry_backoff_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            generator_secs: 60,
            actuator_secs: 120,
            store_secs: 15,
            retry_backoff_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn generator(&self) -> Duration {
        Duration::from_secs(self.generator_secs)
    }

    pub fn actuator(&self) -> Duration {
        Duration::from_secs(self.actuator_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub model: String,
    pub comment_max_tokens: u32,
    pub connection_max_tokens: u32,
    pub connection_note_max_chars: usize,
    pub candidate_text_max_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            comment_max_tokens: 300,
            connection_max_tokens: 150,
            connection_note_max_chars: 200,
            candidate_text_max_chars: 1000,
        }
    }
}

impl OutreachConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`] if it exists, or fall
    /// back to built-in defaults. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            }
        };

        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let config: OutreachConfig = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                tracing::info!(path = %path.display(), "Loaded config file");
                config
            }
            None => {
                tracing::info!("No config file found, using built-in defaults");
                OutreachConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that must not start a run.
    pub fn validate(&self) -> Result<(), OutreachError> {
        self.comment.validate("comment")?;
        self.connection.validate("connection")?;

        if self.comment.strategies.is_none() {
            return Err(OutreachError::Config(
                "[comment] strategies are required".into(),
            ));
        }
        if self.analytics.history_window == 0 {
            return Err(OutreachError::Config(
                "[analytics] history_window must be > 0".into(),
            ));
        }
        if self.analytics.prefix_chars == 0 {
            return Err(OutreachError::Config(
                "[analytics] prefix_chars must be > 0".into(),
            ));
        }
        if self.timeouts.generator_secs == 0
            || self.timeouts.actuator_secs == 0
            || self.timeouts.store_secs == 0
        {
            return Err(OutreachError::Config(
                "[timeouts] every timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Secrets and endpoints, read from the process environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Environment {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub driver_url: String,
    /// Optional shared secret appended to driver requests.
    pub driver_token: Option<String>,
    pub adspower_profile_id: String,
}

impl Environment {
    pub fn from_env() -> Result<Self, OutreachError> {
        dotenvy::dotenv().ok();

        let env = Self {
            database_url: required_env("DATABASE_URL")?,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            driver_url: std::env::var("DRIVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:4400".to_string()),
            driver_token: std::env::var("DRIVER_TOKEN").ok().filter(|t| !t.is_empty()),
            adspower_profile_id: std::env::var("ADSPOWER_PROFILE_ID").unwrap_or_default(),
        };
        Ok(env)
    }

    /// Fail unless the generator credentials are present.
    pub fn require_generator(&self) -> Result<(), OutreachError> {
        if self.anthropic_api_key.is_empty() {
            return Err(OutreachError::Config(
                "ANTHROPIC_API_KEY environment variable is required".into(),
            ));
        }
        Ok(())
    }

    /// Fail unless a browser profile is configured.
    pub fn require_actuator(&self) -> Result<(), OutreachError> {
        if self.adspower_profile_id.is_empty() {
            return Err(OutreachError::Config(
                "ADSPOWER_PROFILE_ID environment variable is required".into(),
            ));
        }
        Ok(())
    }

    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "<not set>".to_string();
            }
            let prefix: String = val.chars().take(5).collect();
            format!("{prefix}...({} chars)", val.chars().count())
        }

        tracing::info!("Environment loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
        tracing::info!("  DRIVER_URL: {}", self.driver_url);
        tracing::info!(
            "  DRIVER_TOKEN: {}",
            preview(self.driver_token.as_deref().unwrap_or_default())
        );
        tracing::info!("  ADSPOWER_PROFILE_ID: {}", preview(&self.adspower_profile_id));
    }
}

fn required_env(key: &str) -> Result<String, OutreachError> {
    std::env::var(key)
        .map_err(|_| OutreachError::Config(format!("{key} environment variable is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        OutreachConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_carry_original_caps() {
        let config = OutreachConfig::default();
        assert_eq!(config.comment.windows, vec![RateWindow::new(24, 25)]);
        assert_eq!(config.connection.windows, vec![RateWindow::new(168, 50)]);
        assert_eq!(config.connection.max_per_run, Some(10));
        let weights = config.comment.strategies.unwrap();
        assert_eq!(weights.weight_of("insight"), Some(40));
        assert_eq!(weights.total(), 100);
    }

    #[test]
    fn sample_file_matches_defaults() {
        let sample: OutreachConfig =
            toml::from_str(include_str!("../../../outreach.toml")).unwrap();
        sample.validate().unwrap();
        let defaults = OutreachConfig::default();
        assert_eq!(
            toml::to_string(&sample).unwrap(),
            toml::to_string(&defaults).unwrap()
        );
    }

    #[test]
    fn zero_cap_is_rejected() {
        let mut config = OutreachConfig::default();
        config.comment.windows = vec![RateWindow::new(24, 0)];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[comment]"));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let mut config = OutreachConfig::default();
        config.comment.windows = vec![RateWindow::new(u32::MAX, 25)];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OutreachError::Config(ref msg) if msg.contains("[comment]")));

        config.comment.windows = vec![RateWindow::new(RateWindow::MAX_HOURS, 25)];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_idle_backoff_is_rejected() {
        let mut config = OutreachConfig::default();
        config.connection.idle_backoff_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("idle_backoff_secs"));
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let mut config = OutreachConfig::default();
        config.connection.pacing.jitter_min_secs = 90;
        config.connection.pacing.jitter_max_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn all_zero_strategy_weights_fail_to_parse() {
        let toml = r#"
            [comment]
            queries = ["feed"]
            scan_limit = 20
            batch_size = 1
            windows = [{ hours = 24, max = 25 }]
            pacing = { base_secs = 240, jitter_min_secs = 0, jitter_max_secs = 60 }
            idle_backoff_secs = 600
            eligibility = { min_text_chars = 50, min_popularity = 10, denylist = [] }
            strategies = [{ name = "insight", weight = 0 }, { name = "question", weight = 0 }]
        "#;
        let err = toml::from_str::<OutreachConfig>(toml).unwrap_err();
        assert!(err.to_string().contains("all strategy weights are zero"));
    }

    #[test]
    fn partial_file_falls_back_per_section() {
        let toml = r#"
            [analytics]
            history_window = 10
        "#;
        let config: OutreachConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.analytics.history_window, 10);
        assert_eq!(config.analytics.prefix_chars, 50);
        assert_eq!(config.comment.batch_size, 1);
        config.validate().unwrap();
    }

    #[test]
    fn strategies_keep_file_order() {
        let toml = r#"
            [comment]
            queries = ["feed"]
            scan_limit = 20
            batch_size = 1
            windows = [{ hours = 24, max = 25 }]
            pacing = { base_secs = 240, jitter_min_secs = 0, jitter_max_secs = 60 }
            idle_backoff_secs = 600
            eligibility = { min_text_chars = 50, min_popularity = 10, denylist = [] }

            [[comment.strategies]]
            name = "story"
            weight = 5

            [[comment.strategies]]
            name = "insight"
            weight = 7
        "#;
        let config: OutreachConfig = toml::from_str(toml).unwrap();
        let weights = config.comment.strategies.unwrap();
        let names: Vec<_> = weights.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["story", "insight"]);
    }
}

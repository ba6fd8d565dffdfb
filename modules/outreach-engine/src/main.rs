use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use driver_client::DriverClient;
use outreach_common::config::LoopConfig;
use outreach_common::{ActionType, Environment, OutreachConfig};
use outreach_engine::actuator::DriverActuator;
use outreach_engine::engagement::{Collaborators, EngagementLoop};
use outreach_engine::generator::ClaudeGenerator;
use outreach_engine::rate_limit::RateLimiter;
use outreach_engine::reconcile::{AnalyticsReconciler, ANALYTICS_SYNC};
use outreach_engine::store::PgStore;
use outreach_engine::traits::PersistentStore;

#[derive(Parser)]
#[command(name = "outreach", version, about = "Rate-limited LinkedIn engagement")]
struct Cli {
    /// Tunables file. Defaults to ./outreach.toml when present.
    #[arg(long, env = "OUTREACH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Comment on feed posts until the daily cap is reached.
    Comment,
    /// Send connection requests to people found by search.
    Connect {
        /// Search query; repeat for several. Overrides the configured queries.
        #[arg(long = "query")]
        queries: Vec<String>,
    },
    /// Pull engagement numbers from the activity page onto recent comments.
    SyncAnalytics,
    /// Print average engagement per comment strategy and the remaining budget.
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("outreach=info".parse()?))
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(ref e) = result {
        error!("outreach failed: {e:#}");
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = OutreachConfig::load(cli.config.as_deref())?;
    let env = Environment::from_env()?;
    env.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(config.timeouts.store())
        .connect(&env.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let store = Arc::new(PgStore::new(pool));
    store.migrate().await?;

    match cli.command {
        Command::Comment => {
            let loop_config = config.comment.clone();
            run_loop(ActionType::Comment, loop_config, &config, &env, store).await
        }
        Command::Connect { queries } => {
            let mut loop_config = config.connection.clone();
            if !queries.is_empty() {
                loop_config.queries = queries;
            }
            run_loop(ActionType::Connection, loop_config, &config, &env, store).await
        }
        Command::SyncAnalytics => {
            let actuator = driver_actuator(&env, &config)?;
            let reconciler =
                AnalyticsReconciler::new(store, config.analytics.clone(), config.timeouts.clone());
            let stats = reconciler.sync(&actuator).await?;
            info!("Analytics sync complete. {stats}");
            Ok(())
        }
        Command::Report => {
            let rows = store.strategy_performance().await?;
            if rows.is_empty() {
                println!("No strategy history yet");
            }
            for row in rows {
                println!("{row}");
            }

            let now = Utc::now();
            for (action, windows) in [
                (ActionType::Comment, &config.comment.windows),
                (ActionType::Connection, &config.connection.windows),
            ] {
                let left = RateLimiter::new(store.clone(), action)
                    .remaining(now, windows)
                    .await?;
                println!("{action}: {left} left in current window");
            }

            match store.last_sync(ANALYTICS_SYNC).await? {
                Some(marker) => println!(
                    "Last analytics sync: {} ({} of {} entries updated)",
                    marker.synced_at, marker.updated, marker.total
                ),
                None => println!("Analytics never synced"),
            }
            Ok(())
        }
    }
}

async fn run_loop(
    action: ActionType,
    loop_config: LoopConfig,
    config: &OutreachConfig,
    env: &Environment,
    store: Arc<PgStore>,
) -> Result<()> {
    env.require_generator()?;
    let claude = Claude::new(&env.anthropic_api_key, &config.generator.model);
    info!(model = claude.model(), %action, "Generator ready");
    let collaborators = Collaborators {
        store,
        generator: Arc::new(ClaudeGenerator::new(claude, config.generator.clone())),
        actuator: Arc::new(driver_actuator(env, config)?),
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut engine = EngagementLoop::new(action, loop_config, config.timeouts.clone(), collaborators)?
        .with_cancellation(cancel);
    let summary = engine.run().await?;

    info!("Run complete. {summary}");
    Ok(())
}

fn driver_actuator(env: &Environment, config: &OutreachConfig) -> Result<DriverActuator> {
    env.require_actuator()?;
    let client = DriverClient::new(
        &env.driver_url,
        env.driver_token.as_deref(),
        config.timeouts.actuator(),
    )?;
    Ok(DriverActuator::new(client, env.adspower_profile_id.clone()))
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping at the next step");
            cancel.cancel();
        }
    });
}

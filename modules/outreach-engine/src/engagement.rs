use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use outreach_common::config::{LoopConfig, TimeoutConfig};
use outreach_common::{ActionType, Candidate, HistoryEntry, OutreachError};

use crate::call::{retry_once, with_retry, with_timeout};
use crate::candidate::ensure_id;
use crate::dedup::DedupStore;
use crate::error::RunFailure;
use crate::filter::CandidateFilter;
use crate::pacing::Pacing;
use crate::rate_limit::RateLimiter;
use crate::recorder::OutcomeRecorder;
use crate::select::pick_batch;
use crate::strategy::StrategySelector;
use crate::traits::{ActionOutcome, Actuator, ActuatorSession, ContentGenerator, PersistentStore};

/// Where the loop is. Reported with every transition and on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scanning,
    Selecting,
    Generating,
    Acting,
    Recording,
    Waiting,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning => write!(f, "scanning"),
            Self::Selecting => write!(f, "selecting"),
            Self::Generating => write!(f, "generating"),
            Self::Acting => write!(f, "acting"),
            Self::Recording => write!(f, "recording"),
            Self::Waiting => write!(f, "waiting"),
        }
    }
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A rate window is full.
    CapReached,
    /// `max_per_run` actions were performed.
    RunCapReached,
    /// `max_passes` passes over the queries completed.
    QueriesExhausted,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapReached => write!(f, "cap_reached"),
            Self::RunCapReached => write!(f, "run_cap_reached"),
            Self::QueriesExhausted => write!(f, "queries_exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub action: ActionType,
    pub actions: u32,
    pub skipped: u32,
    pub soft_failures: u32,
    pub scans: u64,
    pub stop: StopReason,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action={} actions={} skipped={} soft_failures={} scans={} stop={}",
            self.action, self.actions, self.skipped, self.soft_failures, self.scans, self.stop
        )
    }
}

/// The three external collaborators of a loop.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn PersistentStore>,
    pub generator: Arc<dyn ContentGenerator>,
    pub actuator: Arc<dyn Actuator>,
}

/// A candidate with content, on its way to the actuator.
struct Pending {
    candidate: Candidate,
    strategy: Option<String>,
    content: String,
}

enum Step {
    /// `limits_checked` is set when the caps were just checked on the way in.
    Scan { limits_checked: bool },
    Select(Vec<Candidate>),
    Generate(Candidate),
    Act(Pending),
    Record(Pending),
    Wait(Duration),
    Stop(StopReason),
}

impl Step {
    fn state(&self) -> LoopState {
        match self {
            Self::Scan { .. } => LoopState::Scanning,
            Self::Select(_) => LoopState::Selecting,
            Self::Generate(_) => LoopState::Generating,
            Self::Act(_) => LoopState::Acting,
            Self::Record(_) => LoopState::Recording,
            Self::Wait(_) => LoopState::Waiting,
            Self::Stop(_) => LoopState::Idle,
        }
    }
}

/// Per-run bookkeeping. Nothing here outlives the run.
#[derive(Default)]
struct RunState {
    /// Remaining candidates of the current batch, best first.
    queue: VecDeque<Candidate>,
    /// Skipped or soft-failed this run; never offered again.
    passed_over: HashSet<String>,
    /// Query of the last scan; becomes the entry's source tag.
    query: String,
    scans: u64,
    actions: u32,
    skipped: u32,
    soft_failures: u32,
}

impl RunState {
    fn pass_over(&mut self, candidate: &Candidate) {
        self.passed_over.insert(candidate.id.clone());
    }
}

fn failed(
    state: LoopState,
    candidate_id: Option<&str>,
) -> impl FnOnce(OutreachError) -> RunFailure + '_ {
    move |source| RunFailure::new(state, candidate_id, source)
}

/// One engagement loop: comment or connection, single pick or batch.
///
/// Scanning -> Selecting -> Generating -> Acting -> Recording -> Waiting,
/// back to Scanning until a rate window fills, the per-run cap is hit, the
/// queries are exhausted, or the run is cancelled. The browser session is
/// closed on every exit path.
pub struct EngagementLoop {
    action: ActionType,
    config: LoopConfig,
    queries: Vec<String>,
    timeouts: TimeoutConfig,
    generator: Arc<dyn ContentGenerator>,
    actuator: Arc<dyn Actuator>,
    limiter: RateLimiter,
    dedup: DedupStore,
    filter: CandidateFilter,
    selector: Option<StrategySelector>,
    recorder: OutcomeRecorder,
    pacing: Pacing,
    cancel: CancellationToken,
    rng: StdRng,
}

impl EngagementLoop {
    pub fn new(
        action: ActionType,
        config: LoopConfig,
        timeouts: TimeoutConfig,
        collaborators: Collaborators,
    ) -> Result<Self, OutreachError> {
        config.validate(action.as_str())?;
        if action == ActionType::Comment && config.strategies.is_none() {
            return Err(OutreachError::Config(
                "comment loop requires strategy weights".into(),
            ));
        }

        let Collaborators {
            store,
            generator,
            actuator,
        } = collaborators;

        let queries = config
            .queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        let selector = match action {
            ActionType::Comment => config.strategies.clone().map(StrategySelector::new),
            ActionType::Connection => None,
        };

        Ok(Self {
            action,
            queries,
            timeouts,
            limiter: RateLimiter::new(store.clone(), action),
            dedup: DedupStore::new(store.clone(), action),
            filter: CandidateFilter::new(config.eligibility.clone()),
            selector,
            recorder: OutcomeRecorder::new(store),
            pacing: Pacing::new(config.pacing),
            config,
            generator,
            actuator,
            cancel: CancellationToken::new(),
            rng: StdRng::from_os_rng(),
        })
    }

    /// Stop at the next transition boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Seed strategy draws and pacing jitter.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Run until a stop condition. The session is always closed.
    pub async fn run(&mut self) -> Result<RunSummary, RunFailure> {
        info!(
            action = %self.action,
            queries = ?self.queries,
            windows = ?self.config.windows,
            batch_size = self.config.batch_size,
            "Engagement loop starting"
        );

        let mut session = with_timeout(
            "start_session",
            self.timeouts.actuator(),
            OutreachError::Actuator,
            self.actuator.start_session(),
        )
        .await
        .map_err(failed(LoopState::Idle, None))?;

        let result = self.drive(session.as_mut()).await;

        // Always release the browser
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

        match &result {
            Ok(summary) => info!(%summary, "Engagement loop stopped"),
            Err(failure) => error!(
                action = %self.action,
                state = %failure.state,
                candidate_id = failure.candidate_id.as_deref().unwrap_or("-"),
                error = %failure.source,
                "Engagement loop failed"
            ),
        }
        result
    }

    async fn drive(&mut self, session: &mut dyn ActuatorSession) -> Result<RunSummary, RunFailure> {
        let mut run = RunState::default();
        let mut step = Step::Scan {
            limits_checked: false,
        };

        loop {
            if self.cancel.is_cancelled() && !matches!(step, Step::Stop(_)) {
                info!(action = %self.action, state = %step.state(), "Cancellation requested");
                step = Step::Stop(StopReason::Cancelled);
            }
            debug!(action = %self.action, state = %step.state(), "Loop transition");

            step = match step {
                Step::Scan { limits_checked } => self.scan(session, &mut run, limits_checked).await?,
                Step::Select(eligible) => self.select(&mut run, eligible),
                Step::Generate(candidate) => self.generate(&mut run, candidate).await?,
                Step::Act(pending) => self.act(session, &mut run, pending).await?,
                Step::Record(pending) => self.record(&mut run, pending).await?,
                Step::Wait(delay) => self.wait(&mut run, delay).await?,
                Step::Stop(stop) => {
                    return Ok(RunSummary {
                        action: self.action,
                        actions: run.actions,
                        skipped: run.skipped,
                        soft_failures: run.soft_failures,
                        scans: run.scans,
                        stop,
                    })
                }
            };
        }
    }

    fn passes_exhausted(&self, run: &RunState) -> bool {
        self.config
            .max_passes
            .is_some_and(|passes| run.scans >= u64::from(passes) * self.queries.len() as u64)
    }

    /// Per-run cap first, then the persisted rate windows.
    async fn limit_reached(&self, run: &RunState) -> Result<Option<StopReason>, OutreachError> {
        if self.config.max_per_run.is_some_and(|max| run.actions >= max) {
            info!(action = %self.action, actions = run.actions, "Per-run cap reached");
            return Ok(Some(StopReason::RunCapReached));
        }

        let limiter = &self.limiter;
        let windows = &self.config.windows;
        let allowed = with_retry(
            "count_since",
            self.timeouts.store(),
            self.timeouts.retry_backoff(),
            OutreachError::Store,
            || limiter.may_act(Utc::now(), windows),
        )
        .await?;
        Ok((!allowed).then_some(StopReason::CapReached))
    }

    fn next_candidate(&self, run: &mut RunState) -> Step {
        match run.queue.pop_front() {
            Some(candidate) => Step::Generate(candidate),
            None => Step::Scan {
                limits_checked: false,
            },
        }
    }

    async fn scan(
        &mut self,
        session: &mut dyn ActuatorSession,
        run: &mut RunState,
        limits_checked: bool,
    ) -> Result<Step, RunFailure> {
        if !limits_checked {
            if let Some(stop) = self
                .limit_reached(run)
                .await
                .map_err(failed(LoopState::Scanning, None))?
            {
                return Ok(Step::Stop(stop));
            }
        }
        if self.passes_exhausted(run) {
            info!(action = %self.action, scans = run.scans, "All query passes complete");
            return Ok(Step::Stop(StopReason::QueriesExhausted));
        }

        let query = self.queries[(run.scans % self.queries.len() as u64) as usize].clone();
        run.scans += 1;
        run.query = query.clone();

        let listed = retry_once!(
            "list_candidates",
            self.timeouts.actuator(),
            self.timeouts.retry_backoff(),
            OutreachError::Actuator,
            session.list_candidates(self.action, &query, self.config.scan_limit)
        )
        .map_err(failed(LoopState::Scanning, None))?;
        let listed_count = listed.len();

        let identified: Vec<Candidate> = listed
            .into_iter()
            .filter_map(ensure_id)
            .filter(|c| !run.passed_over.contains(&c.id))
            .collect();
        let eligible = self.filter.retain_eligible(identified, Utc::now());
        let eligible_count = eligible.len();

        let dedup = &self.dedup;
        let fresh = with_retry(
            "find_by_ids",
            self.timeouts.store(),
            self.timeouts.retry_backoff(),
            OutreachError::Store,
            || dedup.filter_unseen(eligible.clone()),
        )
        .await
        .map_err(failed(LoopState::Scanning, None))?;

        info!(
            action = %self.action,
            query = %query,
            listed = listed_count,
            eligible = eligible_count,
            fresh = fresh.len(),
            "Scan complete"
        );

        if !fresh.is_empty() {
            return Ok(Step::Select(fresh));
        }
        if self.passes_exhausted(run) {
            return Ok(Step::Stop(StopReason::QueriesExhausted));
        }
        if run.scans % self.queries.len() as u64 != 0 {
            // Rest of this pass first; nothing was acted on, so caps are unchanged.
            return Ok(Step::Scan {
                limits_checked: true,
            });
        }
        info!(
            action = %self.action,
            backoff_secs = self.config.idle_backoff_secs,
            "Nothing to act on, backing off"
        );
        Ok(Step::Wait(self.config.idle_backoff()))
    }

    fn select(&self, run: &mut RunState, eligible: Vec<Candidate>) -> Step {
        let batch = pick_batch(eligible, self.config.batch_size);
        if let Some(top) = batch.first() {
            info!(
                action = %self.action,
                candidate_id = %top.id,
                popularity = top.popularity,
                author = %top.author,
                batch = batch.len(),
                "Selected target"
            );
        }
        run.queue = batch.into();
        self.next_candidate(run)
    }

    async fn generate(&mut self, run: &mut RunState, candidate: Candidate) -> Result<Step, RunFailure> {
        let strategy = self
            .selector
            .as_ref()
            .map(|s| s.pick(&mut self.rng).to_string());

        let generator = &self.generator;
        let action = self.action;
        let content = with_retry(
            "generate",
            self.timeouts.generator(),
            self.timeouts.retry_backoff(),
            OutreachError::Generator,
            || generator.generate(action, &candidate, strategy.as_deref()),
        )
        .await
        .map_err(failed(LoopState::Generating, Some(candidate.id.as_str())))?;

        match content {
            Some(content) => Ok(Step::Act(Pending {
                candidate,
                strategy,
                content,
            })),
            None => {
                info!(
                    action = %self.action,
                    candidate_id = %candidate.id,
                    strategy = strategy.as_deref().unwrap_or("-"),
                    "Generator skipped candidate"
                );
                run.skipped += 1;
                run.pass_over(&candidate);
                Ok(self.next_candidate(run))
            }
        }
    }

    async fn act(
        &mut self,
        session: &mut dyn ActuatorSession,
        run: &mut RunState,
        pending: Pending,
    ) -> Result<Step, RunFailure> {
        let action = self.action;
        let outcome = with_timeout(
            "perform_action",
            self.timeouts.actuator(),
            OutreachError::Actuator,
            async {
                Ok::<_, anyhow::Error>(
                    session
                        .perform_action(action, &pending.candidate, &pending.content)
                        .await,
                )
            },
        )
        .await
        .map_err(failed(LoopState::Acting, Some(pending.candidate.id.as_str())))?;

        match outcome {
            ActionOutcome::Ok => Ok(Step::Record(pending)),
            ActionOutcome::SoftFail(reason) => {
                info!(
                    action = %self.action,
                    candidate_id = %pending.candidate.id,
                    reason = %reason,
                    "Action not possible, moving on"
                );
                run.soft_failures += 1;
                run.pass_over(&pending.candidate);
                Ok(self.next_candidate(run))
            }
            ActionOutcome::HardFail(reason) => Err(RunFailure::new(
                LoopState::Acting,
                Some(pending.candidate.id.as_str()),
                OutreachError::Actuator(reason),
            )),
        }
    }

    async fn record(&mut self, run: &mut RunState, pending: Pending) -> Result<Step, RunFailure> {
        let entry = HistoryEntry::new(
            &pending.candidate,
            self.action,
            pending.strategy,
            pending.content,
            &run.query,
            Utc::now(),
        );

        let recorder = &self.recorder;
        with_retry(
            "insert",
            self.timeouts.store(),
            self.timeouts.retry_backoff(),
            OutreachError::Store,
            || recorder.record(&entry),
        )
        .await
        .map_err(failed(LoopState::Recording, Some(entry.candidate_id.as_str())))?;

        run.actions += 1;
        info!(
            action = %self.action,
            candidate_id = %entry.candidate_id,
            strategy = entry.strategy.as_deref().unwrap_or("-"),
            count = run.actions,
            "Action completed"
        );

        if self.config.max_per_run.is_some_and(|max| run.actions >= max) {
            info!(action = %self.action, actions = run.actions, "Per-run cap reached");
            return Ok(Step::Stop(StopReason::RunCapReached));
        }
        Ok(Step::Wait(self.pacing.delay(&mut self.rng)))
    }

    async fn wait(&mut self, run: &mut RunState, delay: Duration) -> Result<Step, RunFailure> {
        debug!(action = %self.action, secs = delay.as_secs(), "Waiting");
        tokio::select! {
            _ = self.cancel.cancelled() => return Ok(Step::Stop(StopReason::Cancelled)),
            _ = tokio::time::sleep(delay) => {}
        }

        if let Some(stop) = self
            .limit_reached(run)
            .await
            .map_err(failed(LoopState::Waiting, None))?
        {
            return Ok(Step::Stop(stop));
        }
        Ok(match run.queue.pop_front() {
            Some(candidate) => Step::Generate(candidate),
            None => Step::Scan {
                limits_checked: true,
            },
        })
    }
}

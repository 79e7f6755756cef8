//! Robot orchestrator
//!
//! # Phase progression
//! IDLE → FETCHING → SELECTING → DELIVERING → FINALIZING → IDLE
//!
//! One run at a time per orchestrator instance. A run is either spawned in
//! the background ([`RobotOrchestrator::start`]) or executed inline
//! ([`RobotOrchestrator::run_once`]). Stop is cooperative: the run checks its
//! cancellation token between phases, before each fetch combination, before
//! each delivery pair and while waiting between sends.
//!
//! Per-item failures (a fetch combination, an upsert, a delivery pair) are
//! counted and listed in the run result; only storage failures outside an
//! item boundary end the run early, and the counts gathered so far are kept.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RobotConfig;
use crate::models::{RobotPhase, RobotStatus, RunCounts, RunResult};
use crate::services::clock::Clock;
use crate::services::delivery::MessageTransport;
use crate::services::enricher::Enricher;
use crate::services::fetcher::SourceFetcher;
use crate::services::template_renderer::TemplateError;

mod phase_delivering;
mod phase_fetching;
mod phase_finalizing;
mod phase_selecting;

pub use phase_delivering::PairOutcome;
pub use phase_selecting::Selection;

/// Default number of finished runs kept in memory
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum RobotError {
    #[error("Robot is already running")]
    AlreadyRunning,

    #[error("Invalid robot configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Storage(#[from] promobot_common::Error),
}

/// Collaborators of an orchestrator
pub struct RobotDeps {
    pub db: SqlitePool,
    pub fetcher: Arc<SourceFetcher>,
    pub enricher: Enricher,
    pub transport: Arc<dyn MessageTransport>,
    pub clock: Arc<dyn Clock>,
}

/// Process-level settings fixed at construction
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub history_capacity: usize,
    /// Wait after signalling a stop
    pub stop_grace: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            stop_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct LiveState {
    phase: RobotPhase,
    run_id: Option<Uuid>,
    counts: RunCounts,
    cancel: Option<CancellationToken>,
}

impl Default for LiveState {
    fn default() -> Self {
        Self {
            phase: RobotPhase::Idle,
            run_id: None,
            counts: RunCounts::default(),
            cancel: None,
        }
    }
}

/// Clears the running flag when the run ends, however it ends
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// A claimed run slot
struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
    _guard: RunGuard,
}

/// Per-run scratch state threaded through the phases
pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub errors: Vec<String>,
}

pub struct RobotOrchestrator {
    db: SqlitePool,
    fetcher: Arc<SourceFetcher>,
    enricher: Enricher,
    transport: Arc<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    config: Mutex<RobotConfig>,
    running: Arc<AtomicBool>,
    live: Mutex<LiveState>,
    history: Mutex<VecDeque<RunResult>>,
    total_runs: Mutex<usize>,
    last_finalize: Mutex<Option<NaiveDate>>,
    options: OrchestratorOptions,
}

/// Poison-tolerant lock: state here stays consistent between statements
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RobotOrchestrator {
    pub fn new(deps: RobotDeps, config: RobotConfig, options: OrchestratorOptions) -> Self {
        Self {
            db: deps.db,
            fetcher: deps.fetcher,
            enricher: deps.enricher,
            transport: deps.transport,
            clock: deps.clock,
            config: Mutex::new(config),
            running: Arc::new(AtomicBool::new(false)),
            live: Mutex::new(LiveState::default()),
            history: Mutex::new(VecDeque::with_capacity(options.history_capacity)),
            total_runs: Mutex::new(0),
            last_finalize: Mutex::new(None),
            options: OrchestratorOptions {
                history_capacity: options.history_capacity.max(1),
                ..options
            },
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the single run slot or fail with `AlreadyRunning`
    fn begin(&self) -> Result<ActiveRun, RobotError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RobotError::AlreadyRunning);
        }
        let guard = RunGuard {
            flag: Arc::clone(&self.running),
        };

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut live = lock(&self.live);
            live.run_id = Some(run_id);
            live.counts = RunCounts::default();
            live.cancel = Some(cancel.clone());
        }

        Ok(ActiveRun {
            run_id,
            cancel,
            _guard: guard,
        })
    }

    /// Start a run in the background; returns its id
    ///
    /// Rejected synchronously while another run is active.
    pub fn start(self: &Arc<Self>) -> Result<Uuid, RobotError> {
        let run = self.begin()?;
        let run_id = run.run_id;
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let result = this.execute(run).await;
            tracing::debug!(run_id = %result.run_id, success = result.success, "Background run finished");
        });

        Ok(run_id)
    }

    /// Execute a complete run on the caller's task
    pub async fn run_once(&self) -> Result<RunResult, RobotError> {
        let run = self.begin()?;
        Ok(self.execute(run).await)
    }

    /// Signal the active run to stop
    ///
    /// Returns `false` when no run was active.
    pub async fn stop(&self) -> bool {
        let cancel = {
            let live = lock(&self.live);
            if !self.is_running() {
                return false;
            }
            live.cancel.clone()
        };

        match cancel {
            Some(token) => {
                tracing::info!("Stop requested, signalling active run");
                token.cancel();
                tokio::time::sleep(self.options.stop_grace).await;
                true
            }
            None => false,
        }
    }

    async fn execute(&self, run: ActiveRun) -> RunResult {
        let started = Instant::now();
        let started_at = self.clock.now_utc();
        let config = self.config();
        let mut ctx = RunContext {
            run_id: run.run_id,
            errors: Vec::new(),
        };

        tracing::info!(
            run_id = %run.run_id,
            categories = ?config.categories,
            platforms = ?config.platforms,
            "Starting robot run"
        );

        let outcome = self.execute_phases(&mut ctx, &config, &run.cancel).await;

        let stopped = run.cancel.is_cancelled();
        if let Err(e) = &outcome {
            tracing::error!(run_id = %run.run_id, error = %e, "Robot run failed");
            ctx.errors.push(e.to_string());
        }

        let counts = lock(&self.live).counts;
        let result = RunResult {
            run_id: run.run_id,
            success: outcome.is_ok(),
            stopped,
            started_at,
            finished_at: self.clock.now_utc(),
            duration_ms: started.elapsed().as_millis() as u64,
            counts,
            errors: ctx.errors,
        };

        tracing::info!(
            run_id = %result.run_id,
            success = result.success,
            stopped,
            scraped = counts.scraped,
            sent = counts.sent,
            succeeded = counts.succeeded,
            errors = counts.errors,
            duration_ms = result.duration_ms,
            "Robot run finished"
        );

        self.record(result.clone());
        {
            let mut live = lock(&self.live);
            *live = LiveState::default();
        }
        // `run` drops here and releases the slot
        drop(run);
        result
    }

    async fn execute_phases(
        &self,
        ctx: &mut RunContext,
        config: &RobotConfig,
        cancel: &CancellationToken,
    ) -> Result<(), RobotError> {
        self.set_phase(RobotPhase::Fetching);
        self.phase_fetching(ctx, config, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.set_phase(RobotPhase::Selecting);
        let selection = self.phase_selecting(config).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.set_phase(RobotPhase::Delivering);
        self.phase_delivering(ctx, config, selection, cancel).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.set_phase(RobotPhase::Finalizing);
        self.phase_finalizing().await?;
        Ok(())
    }

    fn set_phase(&self, phase: RobotPhase) {
        let mut live = lock(&self.live);
        tracing::debug!(run_id = ?live.run_id, ?phase, "Robot phase");
        live.phase = phase;
    }

    fn update_counts(&self, f: impl FnOnce(&mut RunCounts)) {
        f(&mut lock(&self.live).counts);
    }

    fn record(&self, result: RunResult) {
        let mut history = lock(&self.history);
        while history.len() >= self.options.history_capacity {
            history.pop_front();
        }
        history.push_back(result);
        *lock(&self.total_runs) += 1;
    }

    pub fn status(&self) -> RobotStatus {
        let live = lock(&self.live);
        let running = self.is_running();
        RobotStatus {
            is_running: running,
            phase: live.phase,
            current_run_id: live.run_id,
            current_counts: running.then_some(live.counts),
            last_run: lock(&self.history).back().cloned(),
            total_runs: *lock(&self.total_runs),
        }
    }

    /// Finished runs, newest first
    pub fn history(&self) -> Vec<RunResult> {
        lock(&self.history).iter().rev().cloned().collect()
    }

    pub fn config(&self) -> RobotConfig {
        lock(&self.config).clone()
    }

    /// Replace the runtime configuration; refused while a run is active
    pub fn update_config(&self, config: RobotConfig) -> Result<RobotConfig, RobotError> {
        config.validate().map_err(RobotError::InvalidConfig)?;
        if self.is_running() {
            return Err(RobotError::AlreadyRunning);
        }
        *lock(&self.config) = config.clone();
        tracing::info!(?config, "Robot configuration updated");
        Ok(config)
    }

    pub fn transport(&self) -> Arc<dyn MessageTransport> {
        Arc::clone(&self.transport)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

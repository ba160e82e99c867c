use crate::config::{NodeConfig, SchedulerConfig};
use crate::engine::RscEngine;
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// When each job last completed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobState {
    pub last_snapshot: Option<NaiveDate>,
    pub last_distribution: Option<NaiveDate>,
    pub last_sweep: Option<DateTime<Utc>>,
}

/// Which jobs ran on one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub snapshot: bool,
    pub distribution: bool,
    pub sweep: bool,
    pub failures: usize,
}

impl TickReport {
    pub fn ran_any(&self) -> bool {
        self.snapshot || self.distribution || self.sweep
    }
}

/// Drives the daily snapshot, weekly distribution and bounty expiry jobs.
///
/// Every job is idempotent for its date, so a restart that re-runs a job
/// does no harm.
pub struct Scheduler {
    engine: Arc<RscEngine>,
    config: SchedulerConfig,
    weekday: Weekday,
    ledger_path: PathBuf,
}

impl Scheduler {
    pub fn new(engine: Arc<RscEngine>, node_config: &NodeConfig) -> Result<Self> {
        Ok(Self {
            weekday: node_config.distribution_weekday()?,
            config: node_config.scheduler.clone(),
            ledger_path: node_config.ledger_path(),
            engine,
        })
    }

    pub async fn tick(&self, state: &mut JobState, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let today = now.date_naive();

        if state.last_snapshot != Some(today) {
            match self.engine.run_daily_snapshot(today).await {
                Ok(run) => {
                    // users that failed are retried next tick
                    if run.failed == 0 {
                        state.last_snapshot = Some(today);
                    } else {
                        report.failures += run.failed;
                    }
                    report.snapshot = true;
                }
                Err(e) => {
                    error!(date = %today, error = %e, "Daily snapshot job failed");
                    report.failures += 1;
                }
            }
        }

        if today.weekday() == self.weekday && state.last_distribution != Some(today) {
            match self.engine.run_weekly_distribution(today).await {
                Ok(record) => {
                    debug!(date = %today, status = %record.status, "Weekly distribution job finished");
                    state.last_distribution = Some(today);
                    report.distribution = true;
                }
                Err(e) => {
                    error!(date = %today, error = %e, "Weekly distribution job failed");
                    report.failures += 1;
                }
            }
        }

        let sweep_due = state.last_sweep.map_or(true, |last| {
            now - last >= Duration::seconds(self.config.expiry_sweep_secs as i64)
        });
        if sweep_due {
            match self.engine.expire_bounties().await {
                Ok(sweep) => {
                    if !sweep.failed.is_empty() {
                        report.failures += sweep.failed.len();
                    }
                    state.last_sweep = Some(now);
                    report.sweep = true;
                }
                Err(e) => {
                    error!(error = %e, "Bounty expiry sweep failed");
                    report.failures += 1;
                }
            }
        }

        if report.ran_any() && self.config.persist_after_jobs {
            if let Err(e) = self.engine.persist(&self.ledger_path).await {
                error!(path = %self.ledger_path.display(), error = %e, "Failed to persist ledger");
                report.failures += 1;
            }
        }
        report
    }

    /// Tick until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.tick_secs.max(1)));
        let mut state = JobState::default();
        tokio::pin!(shutdown);

        info!(
            tick_secs = self.config.tick_secs,
            distribution_day = %self.weekday,
            "⏱️ Scheduler started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.engine.now();
                    self.tick(&mut state, now).await;
                }
                _ = &mut shutdown => {
                    info!("🛑 Scheduler stopping");
                    break;
                }
            }
        }
    }
}

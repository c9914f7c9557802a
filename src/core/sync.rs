//! Sync orchestration - one run over all four billing collections.
//!
//! A run walks the stages in a fixed order: balances, predictions,
//! transactions, project reports. Each stage is isolated: its failures are
//! logged and recorded in the [`SyncOutcome`], and the next stage runs anyway.
//! Inside the transactions and project report stages every chunk is fetched,
//! reconciled and committed on its own, strictly one after another. A chunk
//! that fails is not retried within the run; the next run's overlapping window
//! picks it up again.

use chrono::{Local, NaiveDateTime, Utc};
use sea_orm::DatabaseConnection;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::api::BillingSource;
use crate::config::SyncSettings;
use crate::core::fetcher::PeriodFetcher;
use crate::core::planner::{SyncMode, plan_windows, report_months};
use crate::core::reconcile::{
    ChunkCounts, reconcile_project_reports, reconcile_transactions, record_balances,
    record_predictions,
};

/// One step of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Balance snapshot
    Balances,
    /// Spend prediction snapshot
    Predictions,
    /// Transactions by date window
    Transactions,
    /// Monthly per-project costs
    ProjectReports,
}

impl Stage {
    /// All stages, in execution order.
    pub const ALL: [Self; 4] = [
        Self::Balances,
        Self::Predictions,
        Self::Transactions,
        Self::ProjectReports,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Balances => "balances",
            Self::Predictions => "predictions",
            Self::Transactions => "transactions",
            Self::ProjectReports => "project_reports",
        };
        f.write_str(name)
    }
}

/// Result of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Which stage this is
    pub stage: Stage,
    /// Record counts summed over all committed chunks
    pub counts: ChunkCounts,
    /// Chunks attempted
    pub chunks: u64,
    /// Chunks whose fetch or commit failed
    pub failed_chunks: u64,
    /// Stage-level failure, for the single-chunk snapshot stages
    pub error: Option<String>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            counts: ChunkCounts::default(),
            chunks: 0,
            failed_chunks: 0,
            error: None,
        }
    }

    /// True when every chunk of the stage was fetched and committed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed_chunks == 0 && self.error.is_none()
    }
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Mode the run was started with
    pub mode: SyncMode,
    /// Clock value the run planned its windows from
    pub started_at: NaiveDateTime,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// One report per stage, in execution order
    pub stages: Vec<StageReport>,
}

impl SyncOutcome {
    /// True when no stage reported a failure.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(StageReport::is_clean)
    }

    /// Counts summed over all stages.
    #[must_use]
    pub fn totals(&self) -> ChunkCounts {
        let mut totals = ChunkCounts::default();
        for stage in &self.stages {
            totals += stage.counts;
        }
        totals
    }

    /// The report of one stage.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }
}

/// Drives sync runs against one billing source and one database.
pub struct SyncEngine<S> {
    source: S,
    db: DatabaseConnection,
    settings: SyncSettings,
}

impl<S> SyncEngine<S>
where
    S: BillingSource,
{
    /// Creates an engine. The database must already have its tables.
    pub const fn new(source: S, db: DatabaseConnection, settings: SyncSettings) -> Self {
        Self {
            source,
            db,
            settings,
        }
    }

    /// The billing source this engine reads from.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The database this engine writes to.
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Runs all stages, planning windows from the local wall clock.
    pub async fn run(&self, mode: SyncMode) -> SyncOutcome {
        self.run_at(mode, Local::now().naive_local()).await
    }

    /// Runs all stages, planning windows from `now`.
    #[instrument(skip(self))]
    pub async fn run_at(&self, mode: SyncMode, now: NaiveDateTime) -> SyncOutcome {
        info!(%now, "Starting sync run");
        let started = Instant::now();
        let mut stages = Vec::with_capacity(Stage::ALL.len());

        for stage in Stage::ALL {
            let report = match stage {
                Stage::Balances => self.sync_balances().await,
                Stage::Predictions => self.sync_predictions().await,
                Stage::Transactions => self.sync_transactions(mode, now).await,
                Stage::ProjectReports => self.sync_project_reports(mode, now).await,
            };
            stages.push(report);
        }

        let outcome = SyncOutcome {
            mode,
            started_at: now,
            elapsed: started.elapsed(),
            stages,
        };
        let totals = outcome.totals();
        if outcome.is_clean() {
            info!(
                elapsed_secs = outcome.elapsed.as_secs_f64(),
                inserted = totals.inserted,
                updated = totals.updated,
                skipped = totals.skipped,
                "Sync run finished"
            );
        } else {
            warn!(
                elapsed_secs = outcome.elapsed.as_secs_f64(),
                inserted = totals.inserted,
                updated = totals.updated,
                skipped = totals.skipped,
                failed_stages = ?outcome
                    .stages
                    .iter()
                    .filter(|s| !s.is_clean())
                    .map(|s| s.stage.to_string())
                    .collect::<Vec<_>>(),
                "Sync run finished with failures"
            );
        }
        outcome
    }

    fn fetcher(&self) -> PeriodFetcher<'_, S> {
        PeriodFetcher::new(&self.source, &self.settings)
    }

    #[instrument(skip(self))]
    async fn sync_balances(&self) -> StageReport {
        let mut report = StageReport::new(Stage::Balances);
        report.chunks = 1;

        let balances = match self.fetcher().balances().await {
            Ok(balances) => balances,
            Err(e) => {
                warn!(error = %e, "Failed to fetch balances");
                report.error = Some(e.to_string());
                return report;
            }
        };

        match record_balances(&self.db, &balances, Utc::now()).await {
            Ok(counts) => {
                info!(stored = counts.inserted, skipped = counts.skipped, "Balances stored");
                report.counts = counts;
            }
            Err(e) => {
                error!(error = %e, "Failed to store balances, changes rolled back");
                report.error = Some(e.to_string());
            }
        }
        report
    }

    #[instrument(skip(self))]
    async fn sync_predictions(&self) -> StageReport {
        let mut report = StageReport::new(Stage::Predictions);
        report.chunks = 1;

        let predictions = match self.fetcher().predictions().await {
            Ok(predictions) => predictions,
            Err(e) => {
                warn!(error = %e, "Failed to fetch predictions");
                report.error = Some(e.to_string());
                return report;
            }
        };

        match record_predictions(&self.db, &predictions, Utc::now()).await {
            Ok(counts) => {
                info!(stored = counts.inserted, skipped = counts.skipped, "Predictions stored");
                report.counts = counts;
            }
            Err(e) => {
                error!(error = %e, "Failed to store predictions, changes rolled back");
                report.error = Some(e.to_string());
            }
        }
        report
    }

    #[instrument(skip(self, now))]
    async fn sync_transactions(&self, mode: SyncMode, now: NaiveDateTime) -> StageReport {
        let mut report = StageReport::new(Stage::Transactions);
        let fetcher = self.fetcher();

        for window in plan_windows(mode, now, &self.settings) {
            report.chunks += 1;

            let records = match fetcher.transactions(&window).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(%window, error = %e, "Failed to fetch transactions, window left for the next run");
                    report.failed_chunks += 1;
                    continue;
                }
            };

            match reconcile_transactions(&self.db, &records, Utc::now()).await {
                Ok(counts) => {
                    info!(
                        %window,
                        fetched = records.len(),
                        inserted = counts.inserted,
                        updated = counts.updated,
                        skipped = counts.skipped,
                        "Transactions window committed"
                    );
                    report.counts += counts;
                }
                Err(e) => {
                    error!(%window, error = %e, "Failed to store transactions, window rolled back");
                    report.failed_chunks += 1;
                }
            }
        }

        info!(
            chunks = report.chunks,
            failed = report.failed_chunks,
            inserted = report.counts.inserted,
            updated = report.counts.updated,
            "Transactions synchronized"
        );
        report
    }

    #[instrument(skip(self, now))]
    async fn sync_project_reports(&self, mode: SyncMode, now: NaiveDateTime) -> StageReport {
        let mut report = StageReport::new(Stage::ProjectReports);
        let fetcher = self.fetcher();

        for period in report_months(mode, now) {
            report.chunks += 1;

            let projects = match fetcher.project_report(period).await {
                Ok(projects) => projects,
                Err(e) => {
                    warn!(%period, error = %e, "Failed to fetch project report, month left for the next run");
                    report.failed_chunks += 1;
                    continue;
                }
            };

            match reconcile_project_reports(&self.db, period, &projects, Utc::now()).await {
                Ok(counts) => {
                    info!(
                        %period,
                        inserted = counts.inserted,
                        updated = counts.updated,
                        skipped = counts.skipped,
                        "Project report committed"
                    );
                    report.counts += counts;
                }
                Err(e) => {
                    error!(%period, error = %e, "Failed to store project report, month rolled back");
                    report.failed_chunks += 1;
                }
            }
        }
        report
    }
}

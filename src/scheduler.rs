//! Periodic execution of sync runs.
//!
//! The scheduler starts with one full run so that the store catches up after
//! downtime, then performs an incremental run every interval. Runs never
//! overlap: a tick that arrives while a run is still busy is delayed until it
//! finishes.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

use crate::api::BillingSource;
use crate::core::{SyncEngine, SyncMode};

/// Runs syncs until `shutdown` resolves and returns the number of runs made.
///
/// `shutdown` is only observed between runs; a run in progress always
/// completes.
pub async fn run_scheduled<S, F>(engine: &SyncEngine<S>, interval: Duration, shutdown: F) -> u64
where
    S: BillingSource,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    info!(interval_secs = interval.as_secs(), "Scheduler started");
    engine.run(SyncMode::Full).await;
    let mut runs = 1;

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!(runs, "Shutdown requested, scheduler stopped");
                return runs;
            }
            _ = ticker.tick() => {
                engine.run(SyncMode::Incremental).await;
                runs += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::endpoints;
    use crate::config::SyncSettings;
    use crate::errors::Result;
    use crate::test_utils::{StubSource, setup_test_db};

    #[tokio::test]
    async fn test_full_run_then_incremental_until_shutdown() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = SyncEngine::new(StubSource::new(), db, SyncSettings::default());

        let runs = run_scheduled(
            &engine,
            Duration::from_millis(20),
            time::sleep(Duration::from_millis(150)),
        )
        .await;

        assert!(runs >= 2, "expected at least one incremental run, got {runs}");
        assert_eq!(
            engine.source().calls_to(endpoints::BALANCES) as u64,
            runs
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_immediate_shutdown_still_completes_first_run() -> Result<()> {
        let db = setup_test_db().await?;
        let engine = SyncEngine::new(StubSource::new(), db, SyncSettings::default());

        let runs = run_scheduled(&engine, Duration::from_secs(3600), async {}).await;

        assert_eq!(runs, 1);
        assert_eq!(engine.source().calls_to(endpoints::BALANCES), 1);
        Ok(())
    }
}

/// Paginated retrieval of raw records for one planned chunk
pub mod fetcher;
/// Sync modes, transaction windows and report months
pub mod planner;
/// Idempotent persistence of raw records
pub mod reconcile;
/// Stage-by-stage orchestration of a sync run
pub mod sync;

pub use planner::{DateWindow, ReportMonth, SyncMode};
pub use reconcile::ChunkCounts;
pub use sync::{Stage, StageReport, SyncEngine, SyncOutcome};

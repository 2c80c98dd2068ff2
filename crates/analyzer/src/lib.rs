//! Scheduling and orchestration: the exponential backoff controller (C4),
//! the generic block scheduler (C5), the refresh processors (section 4.10),
//! and the top-level orchestrator (C9) that ties them to a [`Config`](indexer_config::Config).

pub mod backoff;
pub mod orchestrator;
pub mod refresh;
pub mod scheduler;

pub use backoff::BackoffController;
pub use orchestrator::{AnalyzerMetrics, Orchestrator};
pub use refresh::{BalanceRefreshCandidate, BalanceRefreshProcessor, TokenRefreshCandidate, TokenRefreshProcessor};
pub use scheduler::{BlockProcessor, Scheduler, BATCH_PICK_LOCK_ID, PROCESS_BLOCK_TIMEOUT};

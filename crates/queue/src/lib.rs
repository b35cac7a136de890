//! Generation job queue: polling, state machine, and upload fan-out.
//!
//! This crate tracks long-running generation jobs from submission to
//! republication of their output artifacts:
//!
//! - [`QueueStore`]: the ordered collection of tracked items and the
//!   public enqueue/remove/update contract.
//! - [`Poller`]: periodic sweep over non-terminal items: fetch remote
//!   status, advance the per-item state machine, hand freshly-succeeded
//!   jobs to the upload orchestrator, notify observers.
//! - [`UploadOrchestrator`]: claims each produced generation exactly
//!   once, republishes it into the gallery, and optionally runs analysis.
//! - [`UploadLedger`]: process-wide record of claimed generation ids;
//!   the at-most-once upload guarantee across overlapping sweeps.
//! - [`ports`]: async trait contracts for the remote collaborators
//!   (job API, asset publishing, analysis), so everything above is
//!   testable without a network.

pub mod ledger;
pub mod poller;
pub mod ports;
pub mod store;
pub mod upload;

pub use ledger::UploadLedger;
pub use poller::{Poller, PollerConfig, SweepReport};
pub use ports::{Analyzer, AssetPublisher, JobService, ServiceError, UnifiedCreation};
pub use store::{
    CreationOutcome, CreationStrategy, QueueError, QueueItem, QueueItemStatus, QueueSettings,
    QueueStore,
};
pub use upload::{UploadConfig, UploadOrchestrator, UploadSummary};

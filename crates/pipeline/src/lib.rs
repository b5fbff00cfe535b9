//! The publishing pipeline: harvest videos, substitute placeholders,
//! shrink images, split and publish per job, embed videos and record the
//! ledger, with a checkpoint after every stage.

pub mod embed;
pub mod harvest;
pub mod ledger;
pub mod orchestrator;
pub mod publish;
pub mod workspace;

pub use embed::{embed_videos, EmbedReport};
pub use harvest::{HarvestReport, Harvester};
pub use ledger::{ledger_row, record_ledger, LedgerReport};
pub use orchestrator::{CancelHandle, Orchestrator, RunReport};
pub use publish::{PublishReport, Publisher};
pub use workspace::Workspace;

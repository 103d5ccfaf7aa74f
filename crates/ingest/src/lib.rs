//! Ingestion pipeline, scheduler loop, manual-run dispatcher and the
//! latest-value view built from the snapshot history.

pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod status;
pub mod view;

pub use dispatch::{ManualRun, RunDispatcher, RunStatus};
pub use error::{IngestError, ViewError};
pub use pipeline::{Ingestor, RunOutcome, Trigger};
pub use scheduler::{CycleReport, Scheduler};
pub use status::{service_status, ServiceStatus};
pub use view::{build_view, ItemRow, Section, WorkplaceView, UNKNOWN_VALUE};

#[cfg(test)]
pub(crate) mod test_support;

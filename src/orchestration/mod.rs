//! Store-coupled workflows.
//!
//! Each workflow loads what it needs through the [`Repository`](crate::db::Repository),
//! calls into the pure `engine` functions, and writes the result back.
//! Bulk workflows commit chunk by chunk and report partial failures in a
//! [`BatchReport`] instead of rolling everything back.

pub mod adjustments;
pub mod confirm;
pub mod corrections;
pub mod hooks;
pub mod import;
pub mod payouts;
pub mod reconstruct;
pub mod repair;

pub use adjustments::{AdjustmentService, BulkRejectReport, ParticipantChange, SubjectCounts};
pub use confirm::{ConfirmReport, EventConfirmer};
pub use corrections::{CorrectionReport, EventCorrections, MerchantCorrection};
pub use hooks::{AuditTrailHook, HookFailure, PostCommitHook};
pub use import::{ImportReport, Importer};
pub use payouts::PaidStatusUpdater;
pub use reconstruct::DealReconstructor;
pub use repair::{BackfillReport, PartnerRefBackfill};

use crate::error::BatchFailure;
use serde::Serialize;

/// Outcome of a chunked bulk write. Committed chunks stay committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

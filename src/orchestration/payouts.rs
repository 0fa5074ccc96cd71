use crate::db::Repository;
use crate::domain::{validate_paid_status, TimeMs};
use crate::error::{BatchFailure, EngineError};
use crate::orchestration::BatchReport;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Mass paid-status updates, one transaction per chunk.
#[derive(Debug, Clone)]
pub struct PaidStatusUpdater {
    repo: Arc<Repository>,
    chunk_size: usize,
}

impl PaidStatusUpdater {
    pub fn new(repo: Arc<Repository>, chunk_size: usize) -> Self {
        Self {
            repo,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Set `raw_status` on every payout in `ids`.
    ///
    /// Every requested id ends up either counted in `succeeded` or listed in
    /// `errors`: repeats of an id are reported as duplicates and ids with no
    /// stored payout as not found.
    ///
    /// # Errors
    /// `Validation` when the status is not one of unpaid/pending/paid; nothing
    /// is written in that case. Chunk failures are reported, not raised.
    pub async fn mark_paid(&self, ids: &[String], raw_status: &str) -> Result<BatchReport, EngineError> {
        let status = validate_paid_status(raw_status)?;
        let now = TimeMs::now();

        let mut report = BatchReport {
            attempted: ids.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.insert(id.as_str()) {
                unique.push(id.clone());
            } else {
                report.errors.push(BatchFailure {
                    id: id.clone(),
                    message: "duplicate id in request".to_string(),
                });
            }
        }

        for chunk in unique.chunks(self.chunk_size) {
            match self.repo.mark_paid_chunk(chunk, status, now).await {
                Ok(updated) => {
                    report.succeeded += updated.len();
                    let updated_ids: HashSet<&str> = updated.iter().map(String::as_str).collect();
                    for id in chunk.iter().filter(|id| !updated_ids.contains(id.as_str())) {
                        warn!(payout_id = %id, "Paid-status update for unknown payout");
                        report.errors.push(BatchFailure {
                            id: id.clone(),
                            message: "not found".to_string(),
                        });
                    }
                }
                Err(e) => {
                    error!(size = chunk.len(), status = status.as_str(), error = %e, "Paid-status chunk failed");
                    report.errors.extend(chunk.iter().map(|id| BatchFailure {
                        id: id.clone(),
                        message: e.to_string(),
                    }));
                }
            }
        }

        info!(
            status = status.as_str(),
            attempted = report.attempted,
            updated = report.succeeded,
            failed = report.failed(),
            "Paid-status update complete"
        );
        Ok(report)
    }
}

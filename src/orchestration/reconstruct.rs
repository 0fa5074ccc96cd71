use crate::db::Repository;
use crate::engine::reconstruct_deals;
use crate::error::{BatchFailure, EngineError};
use crate::orchestration::BatchReport;
use std::sync::Arc;
use tracing::{error, info};

/// DealReconstructor: rebuild deals from legacy payout history.
///
/// Safe to re-run. Upserts are keyed on `(merchant_id, payout_type)`, so a
/// second pass overwrites the same rows instead of adding new ones.
#[derive(Debug, Clone)]
pub struct DealReconstructor {
    repo: Arc<Repository>,
    batch_size: usize,
}

impl DealReconstructor {
    pub fn new(repo: Arc<Repository>, batch_size: usize) -> Self {
        Self {
            repo,
            batch_size: batch_size.max(1),
        }
    }

    /// Every merchant in a failed chunk is listed in `errors`; other chunks
    /// still commit.
    pub async fn reconstruct(&self) -> Result<BatchReport, EngineError> {
        let payouts = self.repo.query_legacy_payouts().await?;
        let drafts = reconstruct_deals(&payouts);

        let mut report = BatchReport {
            attempted: drafts.len(),
            ..Default::default()
        };

        for (index, chunk) in drafts.chunks(self.batch_size).enumerate() {
            match self.repo.upsert_deals_batch(chunk).await {
                Ok(ids) => report.succeeded += ids.len(),
                Err(e) => {
                    error!(chunk = index, size = chunk.len(), error = %e, "Deal upsert chunk failed");
                    report.errors.extend(chunk.iter().map(|draft| BatchFailure {
                        id: format!("{}/{}", draft.merchant_id, draft.payout_type),
                        message: e.to_string(),
                    }));
                }
            }
        }

        info!(
            payouts = payouts.len(),
            deals = report.attempted,
            upserted = report.succeeded,
            failed = report.failed(),
            "Deal reconstruction complete"
        );
        Ok(report)
    }
}

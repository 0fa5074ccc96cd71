//! Direct edits to residual events: deal assignment, merchant corrections,
//! and the guarded delete.

use crate::config::DedupHashMode;
use crate::datasource::residual_csv::dedup_hash;
use crate::db::Repository;
use crate::domain::audit::CATEGORY_CORRECTION;
use crate::domain::{AssignmentStatus, AuditSubject, MerchantId, NewAuditEntry, TimeMs};
use crate::error::EngineError;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fields to rewrite on an event. At least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantCorrection {
    pub merchant_id: Option<String>,
    pub merchant_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionReport {
    pub event_id: String,
    pub merchant_id: MerchantId,
    pub merchant_name: String,
    pub dedup_hash: String,
    pub payouts_updated: u64,
}

#[derive(Debug, Clone)]
pub struct EventCorrections {
    repo: Arc<Repository>,
    hash_mode: DedupHashMode,
}

impl EventCorrections {
    pub fn new(repo: Arc<Repository>, hash_mode: DedupHashMode) -> Self {
        Self { repo, hash_mode }
    }

    /// Link an open event to a deal, moving it to pending.
    pub async fn assign_deal(&self, event_id: &str, deal_id: &str) -> Result<(), EngineError> {
        let event = self.load_event(event_id).await?;
        if event.assignment_status == AssignmentStatus::Confirmed {
            return Err(EngineError::Conflict(format!(
                "event {} is already confirmed",
                event_id
            )));
        }
        if self.repo.get_deal(deal_id).await?.is_none() {
            return Err(EngineError::NotFound {
                entity: "deal",
                id: deal_id.to_string(),
            });
        }

        if !self.repo.assign_event_deal(event_id, deal_id).await? {
            warn!(event_id, deal_id, "Event changed state during assignment");
            return Err(EngineError::Conflict(format!(
                "event {} was confirmed or removed concurrently",
                event_id
            )));
        }

        info!(event_id, deal_id, "Event assigned to deal");
        Ok(())
    }

    /// Rewrite merchant id and/or name. The dedup hash is recomputed, and for
    /// confirmed events the change is carried to their payouts atomically.
    pub async fn correct_merchant(
        &self,
        event_id: &str,
        correction: MerchantCorrection,
    ) -> Result<CorrectionReport, EngineError> {
        if correction.merchant_id.is_none() && correction.merchant_name.is_none() {
            return Err(EngineError::validation("merchant_id", "nothing to correct"));
        }
        let new_mid = match correction.merchant_id {
            Some(raw) if raw.trim().is_empty() => {
                return Err(EngineError::validation("merchant_id", "must not be blank"))
            }
            // Kept verbatim apart from surrounding whitespace; leading zeros matter.
            Some(raw) => Some(MerchantId::new(raw.trim())),
            None => None,
        };

        let event = self.load_event(event_id).await?;
        let merchant_id = new_mid.unwrap_or_else(|| event.merchant_id.clone());
        let merchant_name = correction
            .merchant_name
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| event.merchant_name.clone());
        let hash = dedup_hash(
            self.hash_mode,
            &merchant_id,
            event.payout_month,
            event.volume,
            event.fees,
        );
        let cascade = event.assignment_status == AssignmentStatus::Confirmed;

        let written = self
            .repo
            .correct_event_merchant(event_id, &merchant_id, &merchant_name, &hash, cascade)
            .await
            .map_err(|e| {
                if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    warn!(event_id, merchant_id = %merchant_id, "Correction collides with an existing event");
                    EngineError::Conflict(format!(
                        "another event for merchant {} in {} has the same amounts",
                        merchant_id, event.payout_month
                    ))
                } else {
                    error!(event_id, merchant_id = %merchant_id, error = %e, "Merchant correction failed");
                    EngineError::from(e)
                }
            })?;
        if !written.event_updated {
            return Err(EngineError::NotFound {
                entity: "event",
                id: event_id.to_string(),
            });
        }

        let audit = NewAuditEntry {
            category: CATEGORY_CORRECTION.to_string(),
            subject: AuditSubject::new("event", event_id),
            description: "Merchant correction".to_string(),
            before_state: Some(json!({
                "merchantId": event.merchant_id,
                "merchantName": event.merchant_name,
            })),
            after_state: Some(json!({
                "status": "applied",
                "merchantId": merchant_id,
                "merchantName": merchant_name,
                "payoutsUpdated": written.payouts_updated,
            })),
            created_at: TimeMs::now(),
        };
        if let Err(e) = self.repo.append_audit(&audit).await {
            warn!(event_id, error = %e, "Correction committed but audit append failed");
        }

        info!(
            event_id,
            merchant_id = %merchant_id,
            payouts_updated = written.payouts_updated,
            "Merchant corrected"
        );
        Ok(CorrectionReport {
            event_id: event_id.to_string(),
            merchant_id,
            merchant_name,
            dedup_hash: hash,
            payouts_updated: written.payouts_updated,
        })
    }

    /// Delete an unassigned or pending event. Confirmed events have payouts
    /// and must go through a reversal instead.
    pub async fn delete_event(&self, event_id: &str) -> Result<(), EngineError> {
        let event = self.load_event(event_id).await?;
        if event.assignment_status == AssignmentStatus::Confirmed {
            return Err(EngineError::Conflict(format!(
                "event {} is confirmed; reverse its payouts instead of deleting",
                event_id
            )));
        }

        if !self.repo.delete_open_event(event_id).await? {
            warn!(event_id, "Event confirmed or removed during delete");
            return Err(EngineError::Conflict(format!(
                "event {} was confirmed or removed concurrently",
                event_id
            )));
        }

        info!(event_id, merchant_id = %event.merchant_id, "Event deleted");
        Ok(())
    }

    async fn load_event(&self, event_id: &str) -> Result<crate::domain::ResidualEvent, EngineError> {
        self.repo
            .get_event(event_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "event",
                id: event_id.to_string(),
            })
    }
}

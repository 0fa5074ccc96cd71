//! Adjustments over the audit log: record, count, bulk-reject.
//!
//! One user adjustment touches several participants and writes one audit row
//! per participant, all stamped with the same time. The AdjustmentBatcher in
//! `engine::adjustments` folds those rows back into one logical batch.

use crate::db::{AuditFilter, Repository};
use crate::domain::audit::{CATEGORY_ADJUSTMENT, CATEGORY_BULK_REJECT, STATUS_PENDING, STATUS_REJECTED};
use crate::domain::{AuditSubject, NewAuditEntry, TimeMs};
use crate::engine::{count_batches, BatchCounts};
use crate::error::{BatchFailure, EngineError};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Before/after state for one participant touched by an adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantChange {
    pub before_state: Option<Value>,
    pub after_state: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCounts {
    pub subject_type: String,
    pub subject_id: String,
    pub total: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRejectReport {
    pub success: bool,
    pub rejected: usize,
    /// Requested ids that were missing or already voided.
    pub skipped: Vec<i64>,
    pub errors: Vec<BatchFailure>,
    pub summary_audit_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AdjustmentService {
    repo: Arc<Repository>,
}

impl AdjustmentService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Write one audit row per change, sharing one timestamp. A change whose
    /// after-state has no `status` is recorded as pending.
    pub async fn record_adjustment(
        &self,
        subject: AuditSubject,
        description: &str,
        changes: Vec<ParticipantChange>,
        at: TimeMs,
    ) -> Result<Vec<i64>, EngineError> {
        if changes.is_empty() {
            return Err(EngineError::validation("changes", "an adjustment needs at least one participant change"));
        }

        let entries: Vec<NewAuditEntry> = changes
            .into_iter()
            .map(|change| NewAuditEntry {
                category: CATEGORY_ADJUSTMENT.to_string(),
                subject: subject.clone(),
                description: description.to_string(),
                before_state: change.before_state,
                after_state: Some(with_default_status(change.after_state)),
                created_at: at,
            })
            .collect();

        let ids = self.repo.append_audit_batch(&entries).await?;
        info!(
            subject_type = %subject.subject_type,
            subject_id = %subject.subject_id,
            rows = ids.len(),
            "Adjustment recorded"
        );
        Ok(ids)
    }

    /// Batch counts per subject over non-voided adjustment rows.
    pub async fn adjustment_counts(
        &self,
        subject: Option<AuditSubject>,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<SubjectCounts>, EngineError> {
        let entries = self
            .repo
            .query_audit(&AuditFilter {
                category: Some(CATEGORY_ADJUSTMENT.to_string()),
                subject,
                include_voided: false,
                from,
                to,
            })
            .await?;

        Ok(count_batches(&entries)
            .into_iter()
            .map(|(subject, BatchCounts { total, pending })| SubjectCounts {
                subject_type: subject.subject_type,
                subject_id: subject.subject_id,
                total,
                pending,
            })
            .collect())
    }

    /// Void the named audit rows with a rejection reason.
    ///
    /// Rows that fail to update are listed in `errors`; the rest stay voided.
    /// One `bulk_reject` summary row is appended afterwards.
    pub async fn bulk_reject(&self, ids: &[i64], reason: &str) -> Result<BulkRejectReport, EngineError> {
        if ids.is_empty() {
            return Err(EngineError::validation("ids", "no audit rows named"));
        }

        let targets = self.repo.get_open_audit_entries(ids).await?;
        let skipped: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !targets.iter().any(|t| t.id == *id))
            .collect();

        let now = TimeMs::now();
        let mut rejected_ids = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();

        for entry in &targets {
            let after = rejected_state(entry.after_state.clone(), reason, now);
            match self.repo.void_audit_entry(entry.id, &after).await {
                Ok(true) => rejected_ids.push(entry.id),
                Ok(false) => {
                    warn!(audit_id = entry.id, "Audit row voided concurrently");
                    errors.push(BatchFailure {
                        id: entry.id.to_string(),
                        message: "already voided".to_string(),
                    });
                }
                Err(e) => {
                    error!(audit_id = entry.id, error = %e, "Failed to void audit row");
                    errors.push(BatchFailure {
                        id: entry.id.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let summary = NewAuditEntry {
            category: CATEGORY_BULK_REJECT.to_string(),
            subject: AuditSubject::new("audit_log", "bulk"),
            description: format!("Bulk rejected {} adjustment rows", rejected_ids.len()),
            before_state: None,
            after_state: Some(json!({
                "status": STATUS_REJECTED,
                "rejectedIds": rejected_ids,
                "failedIds": errors.iter().map(|f| f.id.clone()).collect::<Vec<_>>(),
                "rejectionReason": reason,
            })),
            created_at: now,
        };
        let summary_audit_id = match self.repo.append_audit(&summary).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(error = %e, rejected = rejected_ids.len(), "Failed to append bulk-reject summary");
                None
            }
        };

        info!(
            rejected = rejected_ids.len(),
            skipped = skipped.len(),
            failed = errors.len(),
            "Bulk reject complete"
        );

        Ok(BulkRejectReport {
            success: true,
            rejected: rejected_ids.len(),
            skipped,
            errors,
            summary_audit_id,
        })
    }
}

fn with_default_status(after: Value) -> Value {
    let mut map = into_object(after);
    let has_status = map
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !has_status {
        map.insert("status".to_string(), Value::from(STATUS_PENDING));
    }
    Value::Object(map)
}

fn rejected_state(after: Option<Value>, reason: &str, at: TimeMs) -> Value {
    let mut map = after.map(into_object).unwrap_or_default();
    map.insert("status".to_string(), Value::from(STATUS_REJECTED));
    map.insert("rejection_reason".to_string(), Value::from(reason));
    map.insert("rejected_at".to_string(), Value::from(at.as_ms()));
    Value::Object(map)
}

/// Non-object payloads are kept under `value`.
fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        let v = with_default_status(json!({"split": 10}));
        assert_eq!(v["status"], "pending");
        let v = with_default_status(json!({"status": "approved"}));
        assert_eq!(v["status"], "approved");
    }

    #[test]
    fn test_rejected_state_keeps_payload() {
        let v = rejected_state(Some(json!({"split": 10, "status": "pending"})), "dup", TimeMs::new(5));
        assert_eq!(v["split"], 10);
        assert_eq!(v["status"], "rejected");
        assert_eq!(v["rejection_reason"], "dup");
        assert_eq!(v["rejected_at"], 5);

        let v = rejected_state(Some(json!(3)), "x", TimeMs::new(1));
        assert_eq!(v["value"], 3);
    }
}

//! Grouping raw audit rows into logical adjustment batches.
//!
//! One user action that touches several participants writes several audit
//! rows. Rows sharing subject, wall-clock minute and outcome status are one
//! batch. Batches are derived on every read and never stored.

use crate::domain::audit::STATUS_PENDING;
use crate::domain::{AuditEntry, AuditSubject, TimeMs};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BatchKey {
    pub subject: AuditSubject,
    pub minute: i64,
    pub status: String,
}

impl BatchKey {
    pub fn of(entry: &AuditEntry) -> Self {
        BatchKey {
            subject: entry.subject.clone(),
            minute: entry.created_at.minute_bucket(),
            status: entry.outcome_status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentBatch {
    pub key: BatchKey,
    pub entry_ids: Vec<i64>,
    pub first_created_at: TimeMs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub total: usize,
    pub pending: usize,
}

/// Group entries into batches, ordered by subject, minute, then status.
/// Entry ids within a batch keep their input order.
pub fn group_batches(entries: &[AuditEntry]) -> Vec<AdjustmentBatch> {
    let mut batches: BTreeMap<BatchKey, AdjustmentBatch> = BTreeMap::new();
    for entry in entries {
        let key = BatchKey::of(entry);
        let batch = batches
            .entry(key.clone())
            .or_insert_with(|| AdjustmentBatch {
                key,
                entry_ids: Vec::new(),
                first_created_at: entry.created_at,
            });
        batch.entry_ids.push(entry.id);
        batch.first_created_at = batch.first_created_at.min(entry.created_at);
    }
    batches.into_values().collect()
}

/// Distinct batch count and pending batch count per subject.
pub fn count_batches(entries: &[AuditEntry]) -> BTreeMap<AuditSubject, BatchCounts> {
    let mut counts: BTreeMap<AuditSubject, BatchCounts> = BTreeMap::new();
    for batch in group_batches(entries) {
        let c = counts.entry(batch.key.subject.clone()).or_default();
        c.total += 1;
        if batch.key.status == STATUS_PENDING {
            c.pending += 1;
        }
    }
    counts
}

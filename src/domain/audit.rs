//! Append-only audit log records.

use crate::domain::TimeMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CATEGORY_ADJUSTMENT: &str = "adjustment";
pub const CATEGORY_BULK_REJECT: &str = "bulk_reject";
pub const CATEGORY_CONFIRMATION: &str = "confirmation";
pub const CATEGORY_CORRECTION: &str = "correction";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_REJECTED: &str = "rejected";

/// What an audit row is about (a merchant, a deal, an event...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditSubject {
    pub subject_type: String,
    pub subject_id: String,
}

impl AuditSubject {
    pub fn new(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        AuditSubject {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
        }
    }
}

/// A stored audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub category: String,
    pub subject: AuditSubject,
    pub description: String,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub voided: bool,
    pub created_at: TimeMs,
}

impl AuditEntry {
    /// Outcome status carried in the after-state payload, lower-cased.
    /// Rows without one count as pending.
    pub fn outcome_status(&self) -> String {
        self.after_state
            .as_ref()
            .and_then(|s| s.get("status"))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| STATUS_PENDING.to_string())
    }
}

/// An audit row waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub category: String,
    pub subject: AuditSubject,
    pub description: String,
    pub before_state: Option<Value>,
    pub after_state: Option<Value>,
    pub created_at: TimeMs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(after: Option<Value>) -> AuditEntry {
        AuditEntry {
            id: 1,
            category: CATEGORY_ADJUSTMENT.to_string(),
            subject: AuditSubject::new("merchant", "M1"),
            description: String::new(),
            before_state: None,
            after_state: after,
            voided: false,
            created_at: TimeMs::new(0),
        }
    }

    #[test]
    fn outcome_status_reads_after_state() {
        assert_eq!(entry(Some(json!({"status": "Approved"}))).outcome_status(), "approved");
        assert_eq!(entry(Some(json!({"amount": 5}))).outcome_status(), "pending");
        assert_eq!(entry(None).outcome_status(), "pending");
    }
}

//! Assignment and paid status vocabularies.
//!
//! Every write path that sets `assignment_status` or `paid_status` goes through
//! the validators here before touching the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} {value:?}: expected one of {allowed}")]
pub struct InvalidStatus {
    pub field: &'static str,
    pub value: String,
    pub allowed: &'static str,
}

/// Lifecycle of a residual event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Unassigned,
    Pending,
    Confirmed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Unassigned => "unassigned",
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Confirmed => "confirmed",
        }
    }

    /// Whether the event may still be deleted or re-assigned directly.
    pub fn is_open(&self) -> bool {
        !matches!(self, AssignmentStatus::Confirmed)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of a payout line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaidStatus {
    Unpaid,
    Pending,
    Paid,
}

impl PaidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaidStatus::Unpaid => "unpaid",
            PaidStatus::Pending => "pending",
            PaidStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case, trim, and match against the assignment vocabulary.
pub fn validate_assignment_status(raw: &str) -> Result<AssignmentStatus, InvalidStatus> {
    try_assignment_status(raw).ok_or_else(|| InvalidStatus {
        field: "assignment_status",
        value: raw.to_string(),
        allowed: "unassigned, pending, confirmed",
    })
}

/// Lower-case, trim, and match against the paid vocabulary.
pub fn validate_paid_status(raw: &str) -> Result<PaidStatus, InvalidStatus> {
    try_paid_status(raw).ok_or_else(|| InvalidStatus {
        field: "paid_status",
        value: raw.to_string(),
        allowed: "unpaid, pending, paid",
    })
}

/// Non-failing variant for opportunistic validation inside larger batches.
pub fn try_assignment_status(raw: &str) -> Option<AssignmentStatus> {
    match raw.trim().to_lowercase().as_str() {
        "unassigned" => Some(AssignmentStatus::Unassigned),
        "pending" => Some(AssignmentStatus::Pending),
        "confirmed" => Some(AssignmentStatus::Confirmed),
        _ => None,
    }
}

pub fn try_paid_status(raw: &str) -> Option<PaidStatus> {
    match raw.trim().to_lowercase().as_str() {
        "unpaid" => Some(PaidStatus::Unpaid),
        "pending" => Some(PaidStatus::Pending),
        "paid" => Some(PaidStatus::Paid),
        _ => None,
    }
}

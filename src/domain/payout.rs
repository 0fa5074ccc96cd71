//! Per-partner payout line items.

use crate::domain::{AssignmentStatus, Decimal, MerchantId, PaidStatus, PayoutMonth, TimeMs};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a payout row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutSource {
    /// Created by confirming a residual event.
    Confirmation,
    /// Bulk-loaded history; input of deal reconstruction.
    LegacyImport,
}

impl PayoutSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutSource::Confirmation => "confirmation",
            PayoutSource::LegacyImport => "legacy_import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confirmation" => Some(PayoutSource::Confirmation),
            "legacy_import" => Some(PayoutSource::LegacyImport),
            _ => None,
        }
    }
}

/// One event x one participant. Immutable apart from paid-status toggling and
/// merchant-id correction cascades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    /// `None` for legacy rows imported without their source event.
    pub event_id: Option<String>,
    pub deal_id: Option<String>,
    pub merchant_id: MerchantId,
    pub merchant_name: String,
    pub payout_type: String,
    pub payout_month: PayoutMonth,
    pub payout_date: Option<NaiveDate>,
    pub volume: Decimal,
    pub fees: Decimal,
    pub adjustments: Decimal,
    pub chargebacks: Decimal,
    pub net_residual: Decimal,
    pub partner_ref: String,
    pub partner_name: String,
    pub partner_role: String,
    pub split_pct: Decimal,
    pub amount: Decimal,
    pub assignment_status: AssignmentStatus,
    pub paid_status: PaidStatus,
    pub paid_at: Option<TimeMs>,
    pub source: PayoutSource,
    pub created_at: TimeMs,
}

//! Residual events: one ingested line of merchant activity for one month.

use crate::domain::{AssignmentStatus, Decimal, MerchantId, PayoutMonth, TimeMs};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualEvent {
    pub id: String,
    pub merchant_id: MerchantId,
    pub merchant_name: String,
    pub volume: Decimal,
    pub fees: Decimal,
    pub adjustments: Decimal,
    pub chargebacks: Decimal,
    pub payout_date: NaiveDate,
    pub payout_month: PayoutMonth,
    /// Payout type carried by the source row, if any.
    pub payout_type: Option<String>,
    pub dedup_hash: String,
    pub assignment_status: AssignmentStatus,
    pub deal_id: Option<String>,
    /// Original CSV row, kept for traceability.
    pub raw_data: serde_json::Value,
    pub created_at: TimeMs,
}

impl ResidualEvent {
    /// `volume - fees - adjustments - chargebacks`. May be negative (clawback month).
    /// `None` when the difference leaves the representable range.
    pub fn net_residual(&self) -> Option<Decimal> {
        self.volume
            .checked_sub(self.fees)?
            .checked_sub(self.adjustments)?
            .checked_sub(self.chargebacks)
    }
}

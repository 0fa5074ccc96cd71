//! Revenue-sharing agreements.

use crate::domain::{MerchantId, Participant, TimeMs};
use chrono::NaiveDate;

pub const DEFAULT_PAYOUT_TYPE: &str = "residual";

/// A deal: how one merchant's residual is split among partners.
///
/// Unique on `(merchant_id, payout_type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub id: String,
    pub merchant_id: MerchantId,
    pub payout_type: String,
    pub participants: Vec<Participant>,
    pub effective_date: Option<NaiveDate>,
    pub assigned_at: Option<TimeMs>,
}

/// A deal as written by an upsert; the store assigns or keeps the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealDraft {
    pub merchant_id: MerchantId,
    pub payout_type: String,
    pub participants: Vec<Participant>,
    pub effective_date: Option<NaiveDate>,
    pub assigned_at: Option<TimeMs>,
}

impl From<Deal> for DealDraft {
    fn from(deal: Deal) -> Self {
        DealDraft {
            merchant_id: deal.merchant_id,
            payout_type: deal.payout_type,
            participants: deal.participants,
            effective_date: deal.effective_date,
            assigned_at: deal.assigned_at,
        }
    }
}

//! Payout planning for event confirmation.
//!
//! Pure: given an event and its resolved deal, either produce every payout row
//! or fail before anything is written. A deal is never partially confirmed.

use crate::domain::{
    AssignmentStatus, Deal, PaidStatus, Participant, Payout, PayoutSource, ResidualEvent, TimeMs,
    DEFAULT_PAYOUT_TYPE,
};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncompleteDealError {
    #[error("event {event_id} has no deal participants")]
    NoParticipants { event_id: String },
    #[error("event {event_id} has participants without a partner reference: {}", names.join(", "))]
    MissingPartnerReference { event_id: String, names: Vec<String> },
    /// One payout per participant needs one distinct reference per participant.
    #[error("event {event_id} has participants sharing a partner reference: {}", names.join(", "))]
    DuplicatePartnerReference { event_id: String, names: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error(transparent)]
    Incomplete(#[from] IncompleteDealError),
    /// A money value left the representable decimal range.
    #[error("event {event_id}: {field} overflows the decimal range")]
    Overflow { event_id: String, field: &'static str },
}

/// Event type, then deal type, then `residual`.
pub fn resolve_payout_type(event: &ResidualEvent, deal: &Deal) -> String {
    [event.payout_type.as_deref(), Some(deal.payout_type.as_str())]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|t| !t.is_empty())
        .unwrap_or(DEFAULT_PAYOUT_TYPE)
        .to_string()
}

/// Build one payout per participant of `deal`.
///
/// # Errors
/// `NoParticipants` when there is no deal or it is empty;
/// `MissingPartnerReference` listing every participant without a reference;
/// `DuplicatePartnerReference` listing participants whose references clash;
/// `Overflow` when the net residual or a payout amount is out of range.
pub fn plan_payouts(
    event: &ResidualEvent,
    deal: Option<&Deal>,
    now: TimeMs,
) -> Result<Vec<Payout>, PlanError> {
    let deal = match deal {
        Some(d) if !d.participants.is_empty() => d,
        _ => {
            return Err(IncompleteDealError::NoParticipants {
                event_id: event.id.clone(),
            }
            .into())
        }
    };

    let participants: Vec<Participant> = deal.participants.iter().map(Participant::normalized).collect();

    let missing: Vec<String> = participants
        .iter()
        .filter(|p| !p.has_partner_ref())
        .map(|p| {
            if p.partner_name.is_empty() {
                "(unnamed)".to_string()
            } else {
                p.partner_name.clone()
            }
        })
        .collect();
    if !missing.is_empty() {
        return Err(IncompleteDealError::MissingPartnerReference {
            event_id: event.id.clone(),
            names: missing,
        }
        .into());
    }

    let clashing = shared_references(&participants);
    if !clashing.is_empty() {
        return Err(IncompleteDealError::DuplicatePartnerReference {
            event_id: event.id.clone(),
            names: clashing,
        }
        .into());
    }

    let net_residual = event.net_residual().ok_or_else(|| PlanError::Overflow {
        event_id: event.id.clone(),
        field: "volume",
    })?;
    let payout_type = resolve_payout_type(event, deal);

    participants
        .into_iter()
        .map(|p| {
            let amount = p.split_pct.percent_of(net_residual).ok_or_else(|| PlanError::Overflow {
                event_id: event.id.clone(),
                field: "amount",
            })?;
            Ok(Payout {
                id: uuid::Uuid::new_v4().to_string(),
                event_id: Some(event.id.clone()),
                deal_id: Some(deal.id.clone()),
                merchant_id: event.merchant_id.clone(),
                merchant_name: event.merchant_name.clone(),
                payout_type: payout_type.clone(),
                payout_month: event.payout_month,
                payout_date: Some(event.payout_date),
                volume: event.volume,
                fees: event.fees,
                adjustments: event.adjustments,
                chargebacks: event.chargebacks,
                net_residual,
                amount,
                partner_ref: p.partner_ref,
                partner_name: p.partner_name,
                partner_role: p.role,
                split_pct: p.split_pct,
                assignment_status: AssignmentStatus::Confirmed,
                paid_status: PaidStatus::Unpaid,
                paid_at: None,
                source: PayoutSource::Confirmation,
                created_at: now,
            })
        })
        .collect()
}

/// Names of every participant whose reference is also used by another one,
/// formatted as `name (ref)`, grouped by reference.
fn shared_references(participants: &[Participant]) -> Vec<String> {
    let mut by_ref: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for p in participants {
        by_ref.entry(p.partner_ref.as_str()).or_default().push(p.partner_name.as_str());
    }
    by_ref
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .flat_map(|(reference, names)| {
            names.into_iter().map(move |name| format!("{} ({})", name, reference))
        })
        .collect()
}

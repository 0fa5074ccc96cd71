//! Rebuilding deals from a flat payout history.
//!
//! Groups payouts by exact merchant id and folds each group into one deal
//! draft. Within a group the first row seen for a partner reference wins; later
//! rows for the same reference never overwrite its role or split. Original
//! `deal_id` linkage is ignored: merchant identity is what keys a deal.

use crate::domain::{DealDraft, MerchantId, Participant, Payout, DEFAULT_PAYOUT_TYPE};
use std::collections::{HashMap, HashSet};

/// Key used to recognise the same participant within a merchant group.
/// Falls back to the lower-cased name when the reference is blank.
fn participant_key(participant: &Participant) -> String {
    if participant.has_partner_ref() {
        format!("ref:{}", participant.partner_ref)
    } else {
        format!("name:{}", participant.partner_name.to_lowercase())
    }
}

fn participant_of(payout: &Payout) -> Participant {
    Participant {
        partner_ref: payout.partner_ref.clone(),
        partner_name: payout.partner_name.clone(),
        role: payout.partner_role.clone(),
        split_pct: payout.split_pct,
    }
    .normalized()
}

struct Group<'a> {
    first: &'a Payout,
    seen: HashSet<String>,
    participants: Vec<Participant>,
}

/// Fold payouts (in the order given) into one draft per merchant id.
///
/// Drafts come back in first-seen merchant order.
pub fn reconstruct_deals(payouts: &[Payout]) -> Vec<DealDraft> {
    let mut order: Vec<MerchantId> = Vec::new();
    let mut groups: HashMap<MerchantId, Group<'_>> = HashMap::new();

    for payout in payouts {
        let group = groups
            .entry(payout.merchant_id.clone())
            .or_insert_with(|| {
                order.push(payout.merchant_id.clone());
                Group {
                    first: payout,
                    seen: HashSet::new(),
                    participants: Vec::new(),
                }
            });

        let participant = participant_of(payout);
        if group.seen.insert(participant_key(&participant)) {
            group.participants.push(participant);
        }
    }

    order
        .into_iter()
        .filter_map(|mid| groups.remove(&mid))
        .map(|group| {
            let first = group.first;
            let payout_type = Some(first.payout_type.trim())
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_PAYOUT_TYPE)
                .to_string();
            DealDraft {
                merchant_id: first.merchant_id.clone(),
                payout_type,
                participants: group.participants,
                effective_date: Some(
                    first
                        .payout_date
                        .unwrap_or_else(|| first.payout_month.first_day()),
                ),
                assigned_at: Some(first.created_at),
            }
        })
        .collect()
}

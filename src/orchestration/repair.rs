use crate::datasource::{fetch_all_partners, PartnerDirectory};
use crate::db::Repository;
use crate::domain::DealDraft;
use crate::error::{BatchFailure, EngineError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub deals_scanned: usize,
    pub deals_updated: usize,
    pub participants_filled: usize,
    /// Participant names with no unambiguous directory match.
    pub unresolved: Vec<String>,
    pub errors: Vec<BatchFailure>,
}

/// Fills empty partner references on stored deals from the partner directory.
/// Read-only against the directory.
#[derive(Debug, Clone)]
pub struct PartnerRefBackfill {
    repo: Arc<Repository>,
    directory: Arc<dyn PartnerDirectory>,
}

impl PartnerRefBackfill {
    pub fn new(repo: Arc<Repository>, directory: Arc<dyn PartnerDirectory>) -> Self {
        Self { repo, directory }
    }

    pub async fn backfill_partner_refs(&self) -> Result<BackfillReport, EngineError> {
        let partners = fetch_all_partners(self.directory.as_ref()).await.map_err(|e| {
            error!(error = %e, "Partner directory read failed");
            e
        })?;

        // Names that map to more than one reference are left alone.
        let mut by_name: HashMap<String, Option<String>> = HashMap::new();
        for partner in partners {
            let key = partner.display_name.trim().to_lowercase();
            if key.is_empty() || partner.external_ref.trim().is_empty() {
                continue;
            }
            by_name
                .entry(key)
                .and_modify(|existing| {
                    if existing.as_deref() != Some(partner.external_ref.as_str()) {
                        *existing = None;
                    }
                })
                .or_insert_with(|| Some(partner.external_ref.clone()));
        }

        let deals = self.repo.list_deals().await?;
        let mut report = BackfillReport {
            deals_scanned: deals.len(),
            ..Default::default()
        };
        let mut unresolved = BTreeSet::new();

        for deal in deals {
            let mut draft = DealDraft::from(deal.clone());
            let mut filled = 0;
            for participant in draft.participants.iter_mut().filter(|p| !p.has_partner_ref()) {
                match by_name.get(&participant.partner_name.trim().to_lowercase()) {
                    Some(Some(reference)) => {
                        participant.partner_ref = reference.clone();
                        filled += 1;
                    }
                    _ => {
                        unresolved.insert(participant.partner_name.clone());
                    }
                }
            }
            if filled == 0 {
                continue;
            }

            match self.repo.upsert_deal(&draft).await {
                Ok(_) => {
                    report.deals_updated += 1;
                    report.participants_filled += filled;
                }
                Err(e) => {
                    error!(deal_id = %deal.id, merchant_id = %deal.merchant_id, error = %e, "Backfill upsert failed");
                    report.errors.push(BatchFailure {
                        id: deal.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report.unresolved = unresolved.into_iter().collect();
        if !report.unresolved.is_empty() {
            warn!(count = report.unresolved.len(), "Participants left without a partner reference");
        }
        info!(
            scanned = report.deals_scanned,
            updated = report.deals_updated,
            filled = report.participants_filled,
            "Partner reference backfill complete"
        );
        Ok(report)
    }
}

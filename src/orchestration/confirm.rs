//! EventConfirmer: fan a residual event out into payouts.
//!
//! Payouts are inserted in one transaction before the event is marked
//! confirmed. A failed insert leaves the event untouched; a failed status
//! update after a successful insert is reported as
//! [`EngineError::StatusUpdateAfterPayouts`] and is safe to retry because the
//! `(event_id, partner_ref)` unique index turns repeated inserts into no-ops.
//! Before the status flips, every planned partner reference must be stored
//! for the event; otherwise the event stays unconfirmed.

use crate::db::Repository;
use crate::domain::{AssignmentStatus, Decimal, TimeMs};
use crate::engine::plan_payouts;
use crate::error::EngineError;
use crate::orchestration::hooks::{run_hooks, HookFailure, PostCommitHook};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmReport {
    pub event_id: String,
    pub net_residual: Decimal,
    pub payouts_created: usize,
    /// The event was confirmed before this call; nothing was written.
    pub already_confirmed: bool,
    pub hook_failures: Vec<HookFailure>,
}

#[derive(Clone)]
pub struct EventConfirmer {
    repo: Arc<Repository>,
    hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl EventConfirmer {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub async fn confirm(&self, event_id: &str) -> Result<ConfirmReport, EngineError> {
        let event = self
            .repo
            .get_event(event_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "event",
                id: event_id.to_string(),
            })?;

        let net_residual = event.net_residual().ok_or_else(|| {
            EngineError::validation(
                "volume",
                format!("event {}: net residual overflows the decimal range", event_id),
            )
        })?;

        if event.assignment_status == AssignmentStatus::Confirmed {
            info!(event_id, "Event already confirmed, skipping");
            return Ok(ConfirmReport {
                event_id: event.id.clone(),
                net_residual,
                payouts_created: 0,
                already_confirmed: true,
                hook_failures: Vec::new(),
            });
        }

        let deal = match event.deal_id.as_deref() {
            Some(deal_id) => {
                let deal = self.repo.get_deal(deal_id).await?;
                if deal.is_none() {
                    warn!(event_id, deal_id, "Event references a missing deal");
                }
                deal
            }
            None => None,
        };

        let planned = plan_payouts(&event, deal.as_ref(), TimeMs::now()).map_err(|e| {
            warn!(event_id, merchant_id = %event.merchant_id, error = %e, "Deal incomplete, not confirming");
            e
        })?;

        let payouts_created = self.repo.insert_payouts_atomic(&planned).await.map_err(|e| {
            error!(event_id, merchant_id = %event.merchant_id, error = %e, "Payout insert failed, event left unconfirmed");
            e
        })?;

        let mut stored = None;
        if payouts_created < planned.len() {
            let existing = self.repo.query_payouts_for_event(event_id).await?;
            let missing: Vec<&str> = planned
                .iter()
                .filter(|p| !existing.iter().any(|e| e.partner_ref == p.partner_ref))
                .map(|p| p.partner_ref.as_str())
                .collect();
            if !missing.is_empty() {
                error!(
                    event_id,
                    planned = planned.len(),
                    payouts_created,
                    "Payouts missing after insert, event left unconfirmed"
                );
                return Err(EngineError::Conflict(format!(
                    "event {}: payouts not stored for partner references {}",
                    event_id,
                    missing.join(", ")
                )));
            }
            stored = Some(existing);
        }

        match self
            .repo
            .update_event_status(event_id, AssignmentStatus::Confirmed)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return Err(EngineError::NotFound {
                    entity: "event",
                    id: event_id.to_string(),
                })
            }
            Err(source) => {
                error!(event_id, payouts_created, error = %source, "Payouts committed but status update failed");
                return Err(EngineError::StatusUpdateAfterPayouts {
                    event_id: event_id.to_string(),
                    payouts_inserted: payouts_created,
                    source,
                });
            }
        }

        info!(
            event_id,
            merchant_id = %event.merchant_id,
            payouts_created,
            "Event confirmed"
        );

        let hook_failures = if self.hooks.is_empty() {
            Vec::new()
        } else {
            let stored = match stored {
                Some(rows) => rows,
                None => self.repo.query_payouts_for_event(event_id).await.unwrap_or_else(|e| {
                    warn!(event_id, error = %e, "Could not reload payouts for hooks, using planned rows");
                    planned.clone()
                }),
            };
            run_hooks(&self.hooks, &event, &stored).await
        };

        Ok(ConfirmReport {
            event_id: event.id.clone(),
            net_residual,
            payouts_created,
            already_confirmed: false,
            hook_failures,
        })
    }
}

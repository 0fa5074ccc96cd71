//! Best-effort work that runs after a confirmation has committed.
//!
//! A hook failure is logged and reported back to the caller. It never undoes
//! the committed payouts.

use crate::db::Repository;
use crate::domain::audit::CATEGORY_CONFIRMATION;
use crate::domain::{AuditSubject, NewAuditEntry, Payout, ResidualEvent, TimeMs};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &str;

    async fn after_confirm(&self, event: &ResidualEvent, payouts: &[Payout]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    pub hook: String,
    pub message: String,
}

/// Run every hook concurrently and collect the failures.
pub async fn run_hooks(
    hooks: &[Arc<dyn PostCommitHook>],
    event: &ResidualEvent,
    payouts: &[Payout],
) -> Vec<HookFailure> {
    let results = join_all(hooks.iter().map(|hook| async move {
        (hook.name().to_string(), hook.after_confirm(event, payouts).await)
    }))
    .await;

    results
        .into_iter()
        .filter_map(|(hook, result)| match result {
            Ok(()) => None,
            Err(e) => {
                warn!(hook = %hook, event_id = %event.id, error = %e, "Post-commit hook failed");
                Some(HookFailure {
                    hook,
                    message: format!("{:#}", e),
                })
            }
        })
        .collect()
}

/// Appends a `confirmation` audit row per confirmed event.
#[derive(Debug, Clone)]
pub struct AuditTrailHook {
    repo: Arc<Repository>,
}

impl AuditTrailHook {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PostCommitHook for AuditTrailHook {
    fn name(&self) -> &str {
        "audit_trail"
    }

    async fn after_confirm(&self, event: &ResidualEvent, payouts: &[Payout]) -> anyhow::Result<()> {
        let total = payouts
            .iter()
            .try_fold(crate::domain::Decimal::zero(), |acc, p| acc.checked_add(p.amount));
        let entry = NewAuditEntry {
            category: CATEGORY_CONFIRMATION.to_string(),
            subject: AuditSubject::new("event", event.id.clone()),
            description: format!(
                "Confirmed {} payouts for merchant {}",
                payouts.len(),
                event.merchant_id
            ),
            before_state: Some(json!({ "status": event.assignment_status.as_str() })),
            after_state: Some(json!({
                "status": "confirmed",
                "dealId": event.deal_id,
                "netResidual": event.net_residual(),
                "payoutTotal": total,
            })),
            created_at: TimeMs::now(),
        };
        self.repo.append_audit(&entry).await?;
        Ok(())
    }
}

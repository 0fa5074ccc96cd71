//! Payout operations for the repository.

use crate::domain::{
    try_assignment_status, try_paid_status, AssignmentStatus, MerchantId, PaidStatus, Payout,
    PayoutSource, TimeMs,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use tracing::warn;

use super::{date_from_sql, date_to_sql, decimal_col, month_col, Repository};

const PAYOUT_COLUMNS: &str = r#"
    id, event_id, deal_id, merchant_id, merchant_name, payout_type, payout_month,
    payout_date, volume, fees, adjustments, chargebacks, net_residual, partner_ref,
    partner_name, partner_role, split_pct, amount, assignment_status, paid_status,
    paid_at_ms, source, created_at_ms
"#;

fn payout_from_row(row: &SqliteRow) -> Payout {
    let id: String = row.get("id");
    let assignment_raw: String = row.get("assignment_status");
    let paid_raw: String = row.get("paid_status");
    let source_raw: String = row.get("source");
    let date_raw: Option<String> = row.get("payout_date");

    let assignment_status = try_assignment_status(&assignment_raw).unwrap_or_else(|| {
        warn!(payout_id = %id, status = %assignment_raw, "Unknown payout assignment status");
        AssignmentStatus::Confirmed
    });
    let paid_status = try_paid_status(&paid_raw).unwrap_or_else(|| {
        warn!(payout_id = %id, status = %paid_raw, "Unknown paid status, treating as unpaid");
        PaidStatus::Unpaid
    });
    let source = PayoutSource::parse(&source_raw).unwrap_or_else(|| {
        warn!(payout_id = %id, source = %source_raw, "Unknown payout source");
        PayoutSource::Confirmation
    });

    Payout {
        event_id: row.get("event_id"),
        deal_id: row.get("deal_id"),
        merchant_id: MerchantId::new(row.get::<String, _>("merchant_id")),
        merchant_name: row.get("merchant_name"),
        payout_type: row.get("payout_type"),
        payout_month: month_col(row, "payout_month"),
        payout_date: date_raw.as_deref().and_then(date_from_sql),
        volume: decimal_col(row, "volume"),
        fees: decimal_col(row, "fees"),
        adjustments: decimal_col(row, "adjustments"),
        chargebacks: decimal_col(row, "chargebacks"),
        net_residual: decimal_col(row, "net_residual"),
        partner_ref: row.get("partner_ref"),
        partner_name: row.get("partner_name"),
        partner_role: row.get("partner_role"),
        split_pct: decimal_col(row, "split_pct"),
        amount: decimal_col(row, "amount"),
        assignment_status,
        paid_status,
        paid_at: row.get::<Option<i64>, _>("paid_at_ms").map(TimeMs::new),
        source,
        created_at: TimeMs::new(row.get("created_at_ms")),
        id,
    }
}

async fn insert_payout(tx: &mut Transaction<'_, Sqlite>, payout: &Payout) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO payouts (
            id, event_id, deal_id, merchant_id, merchant_name, payout_type, payout_month,
            payout_date, volume, fees, adjustments, chargebacks, net_residual, partner_ref,
            partner_name, partner_role, split_pct, amount, assignment_status, paid_status,
            paid_at_ms, source, created_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id, partner_ref) DO NOTHING
        "#,
    )
    .bind(&payout.id)
    .bind(payout.event_id.as_deref())
    .bind(payout.deal_id.as_deref())
    .bind(payout.merchant_id.as_str())
    .bind(&payout.merchant_name)
    .bind(&payout.payout_type)
    .bind(payout.payout_month.to_string())
    .bind(payout.payout_date.map(date_to_sql))
    .bind(payout.volume.to_canonical_string())
    .bind(payout.fees.to_canonical_string())
    .bind(payout.adjustments.to_canonical_string())
    .bind(payout.chargebacks.to_canonical_string())
    .bind(payout.net_residual.to_canonical_string())
    .bind(&payout.partner_ref)
    .bind(&payout.partner_name)
    .bind(&payout.partner_role)
    .bind(payout.split_pct.to_canonical_string())
    .bind(payout.amount.to_canonical_string())
    .bind(payout.assignment_status.as_str())
    .bind(payout.paid_status.as_str())
    .bind(payout.paid_at.map(|t| t.as_ms()))
    .bind(payout.source.as_str())
    .bind(payout.created_at.as_ms())
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

impl Repository {
    /// Insert all payouts in one transaction.
    ///
    /// A payout whose `(event_id, partner_ref)` already exists is skipped, so
    /// re-confirming an event inserts nothing. Returns the number inserted.
    ///
    /// # Errors
    /// Any failure rolls back the whole set.
    pub async fn insert_payouts_atomic(&self, payouts: &[Payout]) -> Result<usize, sqlx::Error> {
        if payouts.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;
        for payout in payouts {
            if insert_payout(&mut tx, payout).await? {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Store historical payouts that arrived without their source events.
    /// Rows are forced to `legacy_import` and `event_id = NULL`.
    pub async fn insert_legacy_payouts(&self, payouts: &[Payout]) -> Result<usize, sqlx::Error> {
        let legacy: Vec<Payout> = payouts
            .iter()
            .cloned()
            .map(|mut p| {
                p.source = PayoutSource::LegacyImport;
                p.event_id = None;
                p
            })
            .collect();
        self.insert_payouts_atomic(&legacy).await
    }

    pub async fn query_payouts_for_event(&self, event_id: &str) -> Result<Vec<Payout>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payouts WHERE event_id = ? ORDER BY created_at_ms ASC, rowid ASC",
            PAYOUT_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(event_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(payout_from_row).collect())
    }

    /// Legacy-import payouts in insertion order, the input of deal reconstruction.
    pub async fn query_legacy_payouts(&self) -> Result<Vec<Payout>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payouts WHERE source = ? ORDER BY created_at_ms ASC, rowid ASC",
            PAYOUT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(PayoutSource::LegacyImport.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(payout_from_row).collect())
    }

    /// Set paid status on one chunk of payouts in a single transaction.
    /// `paid_at` is stored for `paid` and cleared otherwise.
    /// Returns the ids that were updated; unknown ids are absent from it.
    pub async fn mark_paid_chunk(
        &self,
        ids: &[String],
        status: PaidStatus,
        now: TimeMs,
    ) -> Result<Vec<String>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let paid_at = (status == PaidStatus::Paid).then(|| now.as_ms());
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE payouts SET paid_status = ");
        qb.push_bind(status.as_str())
            .push(", paid_at_ms = ")
            .push_bind(paid_at)
            .push(" WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(") RETURNING id");

        let mut tx = self.pool.begin().await?;
        let rows = qb.build().fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }
}

//! Residual event operations for the repository.

use crate::domain::{try_assignment_status, AssignmentStatus, MerchantId, PayoutMonth, ResidualEvent, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::warn;

use super::{date_from_sql, date_to_sql, decimal_col, json_col, month_col, Repository};

const EVENT_COLUMNS: &str = r#"
    id, merchant_id, merchant_name, volume, fees, adjustments, chargebacks,
    payout_date, payout_month, payout_type, dedup_hash, assignment_status,
    deal_id, raw_data, created_at_ms
"#;

/// Outcome of a merchant correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionWrite {
    pub event_updated: bool,
    pub payouts_updated: u64,
}

fn event_from_row(row: &SqliteRow) -> ResidualEvent {
    let id: String = row.get("id");
    let status_raw: String = row.get("assignment_status");
    let assignment_status = try_assignment_status(&status_raw).unwrap_or_else(|| {
        warn!(event_id = %id, status = %status_raw, "Unknown stored assignment status, treating as unassigned");
        AssignmentStatus::Unassigned
    });
    let date_raw: String = row.get("payout_date");
    let payout_month = month_col(row, "payout_month");

    ResidualEvent {
        merchant_id: MerchantId::new(row.get::<String, _>("merchant_id")),
        merchant_name: row.get("merchant_name"),
        volume: decimal_col(row, "volume"),
        fees: decimal_col(row, "fees"),
        adjustments: decimal_col(row, "adjustments"),
        chargebacks: decimal_col(row, "chargebacks"),
        payout_date: date_from_sql(&date_raw).unwrap_or_else(|| payout_month.first_day()),
        payout_month,
        payout_type: row.get("payout_type"),
        dedup_hash: row.get("dedup_hash"),
        assignment_status,
        deal_id: row.get("deal_id"),
        raw_data: json_col(row, "raw_data").unwrap_or(serde_json::Value::Null),
        created_at: TimeMs::new(row.get("created_at_ms")),
        id,
    }
}

impl Repository {
    /// Insert residual events, skipping any whose dedup hash already exists.
    ///
    /// Returns the number of newly inserted events.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_events_batch(&self, events: &[ResidualEvent]) -> Result<usize, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO residual_events (
                    id, merchant_id, merchant_name, volume, fees, adjustments, chargebacks,
                    payout_date, payout_month, payout_type, dedup_hash, assignment_status,
                    deal_id, raw_data, created_at_ms, updated_at_ms
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(dedup_hash) DO NOTHING
                "#,
            )
            .bind(&event.id)
            .bind(event.merchant_id.as_str())
            .bind(&event.merchant_name)
            .bind(event.volume.to_canonical_string())
            .bind(event.fees.to_canonical_string())
            .bind(event.adjustments.to_canonical_string())
            .bind(event.chargebacks.to_canonical_string())
            .bind(date_to_sql(event.payout_date))
            .bind(event.payout_month.to_string())
            .bind(event.payout_type.as_deref())
            .bind(&event.dedup_hash)
            .bind(event.assignment_status.as_str())
            .bind(event.deal_id.as_deref())
            .bind(event.raw_data.to_string())
            .bind(event.created_at.as_ms())
            .bind(event.created_at.as_ms())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<ResidualEvent>, sqlx::Error> {
        let sql = format!("SELECT {} FROM residual_events WHERE id = ?", EVENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    /// Query events with optional month / status / merchant filters.
    pub async fn query_events(
        &self,
        payout_month: Option<PayoutMonth>,
        status: Option<AssignmentStatus>,
        merchant_id: Option<&MerchantId>,
    ) -> Result<Vec<ResidualEvent>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM residual_events WHERE 1 = 1",
            EVENT_COLUMNS
        ));
        if let Some(month) = payout_month {
            qb.push(" AND payout_month = ").push_bind(month.to_string());
        }
        if let Some(status) = status {
            qb.push(" AND assignment_status = ").push_bind(status.as_str());
        }
        if let Some(mid) = merchant_id {
            qb.push(" AND merchant_id = ").push_bind(mid.as_str().to_string());
        }
        qb.push(" ORDER BY payout_month ASC, merchant_id ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(event_from_row).collect())
    }

    /// Set the assignment status. Returns false if the event does not exist.
    pub async fn update_event_status(
        &self,
        id: &str,
        status: AssignmentStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE residual_events SET assignment_status = ?, updated_at_ms = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(TimeMs::now().as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Link an open event to a deal and move it to pending.
    /// Returns false when the event is missing or already confirmed.
    pub async fn assign_event_deal(&self, id: &str, deal_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE residual_events
            SET deal_id = ?, assignment_status = 'pending', updated_at_ms = ?
            WHERE id = ? AND assignment_status IN ('unassigned', 'pending')
            "#,
        )
        .bind(deal_id)
        .bind(TimeMs::now().as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rewrite an event's merchant fields and, when asked, cascade them to
    /// the event's payouts, atomically.
    pub async fn correct_event_merchant(
        &self,
        id: &str,
        merchant_id: &MerchantId,
        merchant_name: &str,
        dedup_hash: &str,
        cascade_to_payouts: bool,
    ) -> Result<CorrectionWrite, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let event = sqlx::query(
            r#"
            UPDATE residual_events
            SET merchant_id = ?, merchant_name = ?, dedup_hash = ?, updated_at_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(merchant_id.as_str())
        .bind(merchant_name)
        .bind(dedup_hash)
        .bind(TimeMs::now().as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let mut payouts_updated = 0;
        if cascade_to_payouts && event.rows_affected() > 0 {
            payouts_updated = sqlx::query(
                "UPDATE payouts SET merchant_id = ?, merchant_name = ? WHERE event_id = ?",
            )
            .bind(merchant_id.as_str())
            .bind(merchant_name)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(CorrectionWrite {
            event_updated: event.rows_affected() > 0,
            payouts_updated,
        })
    }

    /// Delete an event only while it is unassigned or pending.
    pub async fn delete_open_event(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM residual_events WHERE id = ? AND assignment_status IN ('unassigned', 'pending')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_repo;
    use super::*;
    use crate::config::SchemaFlags;
    use crate::domain::Decimal;
    use chrono::NaiveDate;

    fn event(id: &str, mid: &str, hash: &str) -> ResidualEvent {
        ResidualEvent {
            id: id.to_string(),
            merchant_id: MerchantId::new(mid),
            merchant_name: "Shop".to_string(),
            volume: "1000.50".parse().unwrap(),
            fees: Decimal::from(25),
            adjustments: Decimal::zero(),
            chargebacks: Decimal::zero(),
            payout_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            payout_month: "2024-03".parse().unwrap(),
            payout_type: None,
            dedup_hash: hash.to_string(),
            assignment_status: AssignmentStatus::Unassigned,
            deal_id: None,
            raw_data: serde_json::json!({"MID": mid}),
            created_at: TimeMs::new(1),
        }
    }

    #[tokio::test]
    async fn test_insert_skips_duplicate_hash() {
        let (repo, _temp) = setup_repo(SchemaFlags::default()).await;
        let inserted = repo
            .insert_events_batch(&[event("e1", "007123", "h1"), event("e2", "007123", "h1")])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let stored = repo.get_event("e1").await.unwrap().unwrap();
        assert_eq!(stored.merchant_id.as_str(), "007123");
        assert_eq!(stored.volume.to_canonical_string(), "1000.5");
        assert_eq!(stored.raw_data["MID"], "007123");
        assert!(repo.get_event("e2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_events_filters() {
        let (repo, _temp) = setup_repo(SchemaFlags::default()).await;
        repo.insert_events_batch(&[event("e1", "M1", "h1"), event("e2", "M2", "h2")])
            .await
            .unwrap();
        repo.update_event_status("e2", AssignmentStatus::Pending)
            .await
            .unwrap();

        let pending = repo
            .query_events(None, Some(AssignmentStatus::Pending), None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "e2");

        let m1 = repo
            .query_events(Some("2024-03".parse().unwrap()), None, Some(&MerchantId::new("M1")))
            .await
            .unwrap();
        assert_eq!(m1.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_only_open_events() {
        let (repo, _temp) = setup_repo(SchemaFlags::default()).await;
        repo.insert_events_batch(&[event("e1", "M1", "h1"), event("e2", "M2", "h2")])
            .await
            .unwrap();
        repo.update_event_status("e2", AssignmentStatus::Confirmed)
            .await
            .unwrap();

        assert!(repo.delete_open_event("e1").await.unwrap());
        assert!(!repo.delete_open_event("e2").await.unwrap());
        assert!(repo.get_event("e2").await.unwrap().is_some());
    }
}

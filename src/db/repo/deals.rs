//! Deal operations for the repository.
//!
//! Deals are keyed on `(merchant_id, payout_type)`. Participants always live in
//! the `participants_json` column; the `deal_participants` table is written and
//! read alongside it according to the repository's [`SchemaFlags`].
//!
//! [`SchemaFlags`]: crate::config::SchemaFlags

use crate::domain::participant::participants_from_json;
use crate::domain::{Deal, DealDraft, Decimal, MerchantId, Participant, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::warn;

use super::{date_from_sql, date_to_sql, Repository};

const DEAL_COLUMNS: &str =
    "id, merchant_id, payout_type, participants_json, effective_date, assigned_at_ms";

fn deal_from_row(row: &SqliteRow) -> Deal {
    let json: String = row.get("participants_json");
    let effective: Option<String> = row.get("effective_date");
    Deal {
        id: row.get("id"),
        merchant_id: MerchantId::new(row.get::<String, _>("merchant_id")),
        payout_type: row.get("payout_type"),
        participants: participants_from_json(&json),
        effective_date: effective.as_deref().and_then(date_from_sql),
        assigned_at: row.get::<Option<i64>, _>("assigned_at_ms").map(TimeMs::new),
    }
}

async fn upsert_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    draft: &DealDraft,
    write_normalized: bool,
    now: TimeMs,
) -> Result<String, sqlx::Error> {
    let participants_json = serde_json::to_string(&draft.participants)
        .map_err(|e| sqlx::Error::Protocol(format!("participants encode: {}", e)))?;

    let row = sqlx::query(
        r#"
        INSERT INTO deals (
            id, merchant_id, payout_type, participants_json, effective_date,
            assigned_at_ms, created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(merchant_id, payout_type) DO UPDATE SET
            participants_json = excluded.participants_json,
            effective_date = excluded.effective_date,
            assigned_at_ms = excluded.assigned_at_ms,
            updated_at_ms = excluded.updated_at_ms
        RETURNING id
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(draft.merchant_id.as_str())
    .bind(&draft.payout_type)
    .bind(participants_json)
    .bind(draft.effective_date.map(date_to_sql))
    .bind(draft.assigned_at.map(|t| t.as_ms()))
    .bind(now.as_ms())
    .bind(now.as_ms())
    .fetch_one(&mut **tx)
    .await?;
    let deal_id: String = row.get("id");

    if write_normalized {
        sqlx::query("DELETE FROM deal_participants WHERE deal_id = ?")
            .bind(&deal_id)
            .execute(&mut **tx)
            .await?;
        for (position, p) in draft.participants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO deal_participants (deal_id, position, partner_ref, partner_name, role, split_pct)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&deal_id)
            .bind(position as i64)
            .bind(&p.partner_ref)
            .bind(&p.partner_name)
            .bind(&p.role)
            .bind(p.split_pct.to_canonical_string())
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(deal_id)
}

impl Repository {
    /// Insert or overwrite the deal for `(merchant_id, payout_type)`.
    /// Returns the id of the stored deal, which is stable across upserts.
    pub async fn upsert_deal(&self, draft: &DealDraft) -> Result<String, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = upsert_in_tx(
            &mut tx,
            draft,
            self.schema.write_normalized_participants,
            TimeMs::now(),
        )
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Upsert a batch of drafts in one transaction. Either all land or none do.
    pub async fn upsert_deals_batch(&self, drafts: &[DealDraft]) -> Result<Vec<String>, sqlx::Error> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let now = TimeMs::now();
        let mut ids = Vec::with_capacity(drafts.len());
        let mut tx = self.pool.begin().await?;
        for draft in drafts {
            ids.push(
                upsert_in_tx(&mut tx, draft, self.schema.write_normalized_participants, now).await?,
            );
        }
        tx.commit().await?;
        Ok(ids)
    }

    pub async fn get_deal(&self, id: &str) -> Result<Option<Deal>, sqlx::Error> {
        let sql = format!("SELECT {} FROM deals WHERE id = ?", DEAL_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(deal_from_row(&row)).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_deal_by_key(
        &self,
        merchant_id: &MerchantId,
        payout_type: &str,
    ) -> Result<Option<Deal>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM deals WHERE merchant_id = ? AND payout_type = ?",
            DEAL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(merchant_id.as_str())
            .bind(payout_type)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(deal_from_row(&row)).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_deals(&self) -> Result<Vec<Deal>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM deals ORDER BY merchant_id ASC, payout_type ASC",
            DEAL_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut deals = Vec::with_capacity(rows.len());
        for row in &rows {
            deals.push(self.hydrate(deal_from_row(row)).await?);
        }
        Ok(deals)
    }

    /// Swap in the normalized participant rows when reading from that table.
    /// Deals written before the table existed keep their JSON participants.
    async fn hydrate(&self, mut deal: Deal) -> Result<Deal, sqlx::Error> {
        if !self.schema.read_normalized_participants {
            return Ok(deal);
        }

        let rows = sqlx::query(
            r#"
            SELECT partner_ref, partner_name, role, split_pct
            FROM deal_participants
            WHERE deal_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(&deal.id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(deal);
        }

        deal.participants = rows
            .iter()
            .map(|row| {
                let split_raw: String = row.get("split_pct");
                let split_pct = Decimal::from_str(&split_raw).unwrap_or_else(|e| {
                    warn!(deal_id = %deal.id, value = %split_raw, error = %e, "Failed to parse split_pct");
                    Decimal::default()
                });
                Participant {
                    partner_ref: row.get("partner_ref"),
                    partner_name: row.get("partner_name"),
                    role: row.get("role"),
                    split_pct,
                }
                .normalized()
            })
            .collect();
        Ok(deal)
    }
}

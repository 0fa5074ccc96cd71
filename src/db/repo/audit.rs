//! Audit log operations for the repository.

use crate::domain::{AuditEntry, AuditSubject, NewAuditEntry, TimeMs};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{json_col, Repository};

/// Read-path filter over the audit log. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub category: Option<String>,
    pub subject: Option<AuditSubject>,
    pub include_voided: bool,
    /// Inclusive lower bound on `created_at_ms`.
    pub from: Option<TimeMs>,
    /// Exclusive upper bound on `created_at_ms`.
    pub to: Option<TimeMs>,
}

fn audit_from_row(row: &SqliteRow) -> AuditEntry {
    AuditEntry {
        id: row.get("id"),
        category: row.get("category"),
        subject: AuditSubject::new(
            row.get::<String, _>("subject_type"),
            row.get::<String, _>("subject_id"),
        ),
        description: row.get("description"),
        before_state: json_col(row, "before_state"),
        after_state: json_col(row, "after_state"),
        voided: row.get::<i64, _>("voided") != 0,
        created_at: TimeMs::new(row.get("created_at_ms")),
    }
}

fn state_to_sql(state: &Option<Value>) -> Option<String> {
    state.as_ref().map(Value::to_string)
}

impl Repository {
    pub async fn append_audit(&self, entry: &NewAuditEntry) -> Result<i64, sqlx::Error> {
        let ids = self.append_audit_batch(std::slice::from_ref(entry)).await?;
        Ok(ids.into_iter().next().unwrap_or_default())
    }

    /// Append entries in one transaction and return their ids in input order.
    pub async fn append_audit_batch(&self, entries: &[NewAuditEntry]) -> Result<Vec<i64>, sqlx::Error> {
        let mut ids = Vec::with_capacity(entries.len());
        if entries.is_empty() {
            return Ok(ids);
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO audit_log (
                    category, subject_type, subject_id, description,
                    before_state, after_state, voided, created_at_ms
                ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(&entry.category)
            .bind(&entry.subject.subject_type)
            .bind(&entry.subject.subject_id)
            .bind(&entry.description)
            .bind(state_to_sql(&entry.before_state))
            .bind(state_to_sql(&entry.after_state))
            .bind(entry.created_at.as_ms())
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }
        tx.commit().await?;
        Ok(ids)
    }

    pub async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, category, subject_type, subject_id, description,
                   before_state, after_state, voided, created_at_ms
            FROM audit_log
            WHERE 1 = 1
            "#,
        );
        if let Some(category) = &filter.category {
            qb.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(subject) = &filter.subject {
            qb.push(" AND subject_type = ")
                .push_bind(subject.subject_type.clone())
                .push(" AND subject_id = ")
                .push_bind(subject.subject_id.clone());
        }
        if !filter.include_voided {
            qb.push(" AND voided = 0");
        }
        if let Some(from) = filter.from {
            qb.push(" AND created_at_ms >= ").push_bind(from.as_ms());
        }
        if let Some(to) = filter.to {
            qb.push(" AND created_at_ms < ").push_bind(to.as_ms());
        }
        qb.push(" ORDER BY created_at_ms ASC, id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(audit_from_row).collect())
    }

    /// Fetch the named rows that are not voided yet. Missing ids are skipped.
    pub async fn get_open_audit_entries(&self, ids: &[i64]) -> Result<Vec<AuditEntry>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT id, category, subject_type, subject_id, description,
                   before_state, after_state, voided, created_at_ms
            FROM audit_log
            WHERE voided = 0 AND id IN (
            "#,
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(audit_from_row).collect())
    }

    /// Void one row and replace its after-state. Returns false when the row
    /// is missing or was voided concurrently.
    pub async fn void_audit_entry(&self, id: i64, after_state: &Value) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE audit_log SET voided = 1, after_state = ? WHERE id = ? AND voided = 0",
        )
        .bind(after_state.to_string())
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
    use crate::domain::audit::CATEGORY_ADJUSTMENT;
    use serde_json::json;

    fn new_entry(subject_id: &str, at: i64) -> NewAuditEntry {
        NewAuditEntry {
            category: CATEGORY_ADJUSTMENT.to_string(),
            subject: AuditSubject::new("merchant", subject_id),
            description: "split change".to_string(),
            before_state: None,
            after_state: Some(json!({"status": "pending"})),
            created_at: TimeMs::new(at),
        }
    }

    #[tokio::test]
    async fn test_append_and_filter() {
        let (repo, _temp) = setup_repo(SchemaFlags::default()).await;
        let ids = repo
            .append_audit_batch(&[new_entry("M1", 1_000), new_entry("M2", 2_000), new_entry("M1", 3_000)])
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let m1 = repo
            .query_audit(&AuditFilter {
                subject: Some(AuditSubject::new("merchant", "M1")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(m1.len(), 2);

        let ranged = repo
            .query_audit(&AuditFilter {
                from: Some(TimeMs::new(2_000)),
                to: Some(TimeMs::new(3_000)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].subject.subject_id, "M2");
    }

    #[tokio::test]
    async fn test_void_is_single_shot() {
        let (repo, _temp) = setup_repo(SchemaFlags::default()).await;
        let id = repo.append_audit(&new_entry("M1", 1_000)).await.unwrap();

        let after = json!({"status": "rejected"});
        assert!(repo.void_audit_entry(id, &after).await.unwrap());
        assert!(!repo.void_audit_entry(id, &after).await.unwrap());

        assert!(repo.get_open_audit_entries(&[id]).await.unwrap().is_empty());
        let all = repo
            .query_audit(&AuditFilter {
                include_voided: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(all[0].voided);
        assert_eq!(all[0].outcome_status(), "rejected");
    }
}

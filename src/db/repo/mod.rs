//! Repository layer for database operations.
//!
//! This is the transactional store the engine writes through. Methods are
//! organized across submodules by table:
//! - `events.rs` - residual events (ingestion, status, corrections)
//! - `deals.rs` - deal upserts keyed on (merchant_id, payout_type)
//! - `payouts.rs` - payout inserts, legacy history, paid-status updates
//! - `audit.rs` - append-only audit log

mod audit;
mod deals;
mod events;
mod payouts;

pub use audit::AuditFilter;
pub use events::CorrectionWrite;

use crate::config::SchemaFlags;
use crate::domain::{Decimal, PayoutMonth};
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    schema: SchemaFlags,
}

impl Repository {
    /// Create a repository with default schema flags.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_schema(pool, SchemaFlags::default())
    }

    pub fn with_schema(pool: SqlitePool, schema: SchemaFlags) -> Self {
        Repository { pool, schema }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn schema(&self) -> SchemaFlags {
        self.schema
    }
}

fn decimal_col(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "Failed to parse stored decimal, using default");
        Decimal::default()
    })
}

fn month_col(row: &SqliteRow, column: &str) -> PayoutMonth {
    let raw: String = row.get(column);
    raw.parse().unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "Failed to parse stored payout month");
        PayoutMonth::of(NaiveDate::MIN)
    })
}

fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_from_sql(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

fn json_col(row: &SqliteRow, column: &str) -> Option<serde_json::Value> {
    let raw: Option<String> = row.get(column);
    raw.and_then(|s| match serde_json::from_str(&s) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(column, error = %e, "Failed to parse stored JSON");
            None
        }
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::config::SchemaFlags;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub async fn setup_repo(schema: SchemaFlags) -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::with_schema(pool, schema), temp_dir)
    }
}

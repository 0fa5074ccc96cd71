use crate::datasource::{CsvIngestor, ParseOptions, ParsedRow, RowError};
use crate::db::Repository;
use crate::domain::{AssignmentStatus, ResidualEvent, TimeMs};
use crate::error::EngineError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub parsed: usize,
    pub inserted: usize,
    /// Rows whose dedup hash was already stored.
    pub duplicates: usize,
    pub errors: Vec<RowError>,
}

/// CSV file -> residual events, deduplicated by content hash.
#[derive(Debug, Clone)]
pub struct Importer {
    repo: Arc<Repository>,
    ingestor: CsvIngestor,
}

impl Importer {
    pub fn new(repo: Arc<Repository>, ingestor: CsvIngestor) -> Self {
        Self { repo, ingestor }
    }

    /// Parse and store a residual report. Row errors are returned, not raised;
    /// only a store failure fails the import.
    pub async fn import_csv(
        &self,
        raw_text: &str,
        options: &ParseOptions,
    ) -> Result<ImportReport, EngineError> {
        let outcome = self.ingestor.parse(raw_text, options);
        for err in &outcome.errors {
            warn!(line = err.line, field = %err.field, error = %err.message, "CSV row rejected");
        }

        let now = TimeMs::now();
        let events: Vec<ResidualEvent> = outcome.rows.into_iter().map(|row| to_event(row, now)).collect();
        let inserted = self.repo.insert_events_batch(&events).await?;
        let report = ImportReport {
            parsed: events.len(),
            inserted,
            duplicates: events.len() - inserted,
            errors: outcome.errors,
        };

        info!(
            parsed = report.parsed,
            inserted = report.inserted,
            duplicates = report.duplicates,
            row_errors = report.errors.len(),
            "Residual import complete"
        );
        Ok(report)
    }
}

fn to_event(row: ParsedRow, now: TimeMs) -> ResidualEvent {
    ResidualEvent {
        id: uuid::Uuid::new_v4().to_string(),
        merchant_id: row.merchant_id,
        merchant_name: row.merchant_name,
        volume: row.volume,
        fees: row.fees,
        adjustments: row.adjustments,
        chargebacks: row.chargebacks,
        payout_date: row.payout_date,
        payout_month: row.payout_month,
        payout_type: row.payout_type,
        dedup_hash: row.dedup_hash,
        assignment_status: AssignmentStatus::Unassigned,
        deal_id: None,
        raw_data: row.raw_data,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupHashMode;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    async fn setup_importer() -> (Importer, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let importer = Importer::new(repo.clone(), CsvIngestor::new(DedupHashMode::Sha256));
        (importer, repo, temp_dir)
    }

    const REPORT: &str = "Merchant ID,DBA,Amount,Commission,Date\n\
        007123,Corner Shop,\"$1,000.00\",$25.00,03/15/2024\n\
        008888,Bakery,500,10,not-a-date\n\
        ,Totals,1500,35,\n";

    #[tokio::test]
    async fn test_reimport_is_noop() {
        let (importer, repo, _temp) = setup_importer().await;
        let options = ParseOptions {
            payout_month: Some("2024-03".parse().unwrap()),
        };

        let first = importer.import_csv(REPORT, &options).await.unwrap();
        assert_eq!(first.parsed, 1);
        assert_eq!(first.inserted, 1);
        assert_eq!(first.errors.len(), 1);
        assert_eq!(first.errors[0].merchant_id.as_deref(), Some("008888"));

        let second = importer.import_csv(REPORT, &options).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 1);

        let events = repo.query_events(None, None, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].merchant_id.as_str(), "007123");
        assert_eq!(events[0].assignment_status, AssignmentStatus::Unassigned);
    }
}

//! End-to-end: CSV import -> assignment -> confirmation -> corrections,
//! mark-paid, and reconstruction over the resulting history.

use residual_recon::config::DedupHashMode;
use residual_recon::datasource::{CsvIngestor, ParseOptions};
use residual_recon::db::init_db;
use residual_recon::domain::{
    AssignmentStatus, DealDraft, Decimal, MerchantId, PaidStatus, Participant, Payout, TimeMs,
};
use residual_recon::error::EngineError;
use residual_recon::orchestration::{
    DealReconstructor, EventConfirmer, EventCorrections, Importer, MerchantCorrection,
    PaidStatusUpdater,
};
use residual_recon::Repository;
use std::sync::Arc;
use tempfile::TempDir;

const REPORT: &str = "\
Merchant #,Business Name,Sales Volume,Total Fees,Adj,CB,Payout Date
007123,Corner Shop,\"$1,100.00\",$50.00,30,20,2024-03-31
000042,Bakery,800,(25.00),0,0,03/31/2024
";

async fn setup_repo() -> (Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

fn options() -> ParseOptions {
    ParseOptions {
        payout_month: Some("2024-03".parse().unwrap()),
    }
}

fn participant(reference: &str, name: &str, split: i64) -> Participant {
    Participant {
        partner_ref: reference.to_string(),
        partner_name: name.to_string(),
        role: String::new(),
        split_pct: Decimal::from(split),
    }
}

async fn import_and_confirm(repo: &Arc<Repository>) -> String {
    let importer = Importer::new(repo.clone(), CsvIngestor::new(DedupHashMode::Sha256));
    let report = importer.import_csv(REPORT, &options()).await.unwrap();
    assert_eq!(report.inserted, 2);

    let events = repo
        .query_events(None, None, Some(&MerchantId::new("007123")))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    let event_id = events[0].id.clone();

    let deal_id = repo
        .upsert_deal(&DealDraft {
            merchant_id: MerchantId::new("007123"),
            payout_type: "residual".to_string(),
            participants: vec![
                participant("rec1", "Alice", 60),
                participant("rec2", "Lumino Income Fund LP", 40),
            ],
            effective_date: None,
            assigned_at: None,
        })
        .await
        .unwrap();

    let corrections = EventCorrections::new(repo.clone(), DedupHashMode::Sha256);
    corrections.assign_deal(&event_id, &deal_id).await.unwrap();
    EventConfirmer::new(repo.clone()).confirm(&event_id).await.unwrap();
    event_id
}

#[tokio::test]
async fn test_hashes_are_stable_across_parses() {
    let ingestor = CsvIngestor::new(DedupHashMode::Sha256);
    let first = ingestor.parse(REPORT, &options());
    let second = ingestor.parse(REPORT, &options());
    let a: Vec<&str> = first.rows.iter().map(|r| r.dedup_hash.as_str()).collect();
    let b: Vec<&str> = second.rows.iter().map(|r| r.dedup_hash.as_str()).collect();
    assert_eq!(a.len(), 2);
    assert_eq!(a, b);

    let rolling = CsvIngestor::new(DedupHashMode::Rolling);
    let r1 = rolling.parse(REPORT, &options());
    let r2 = rolling.parse(REPORT, &options());
    assert_eq!(r1.rows[0].dedup_hash, r2.rows[0].dedup_hash);
    assert_ne!(r1.rows[0].dedup_hash, first.rows[0].dedup_hash);
}

#[tokio::test]
async fn test_leading_zeros_survive_end_to_end() {
    let (repo, _temp) = setup_repo().await;
    let event_id = import_and_confirm(&repo).await;

    let event = repo.get_event(&event_id).await.unwrap().unwrap();
    assert_eq!(event.merchant_id.as_str(), "007123");
    assert_eq!(event.net_residual().unwrap().to_canonical_string(), "1000");
    assert_eq!(event.assignment_status, AssignmentStatus::Confirmed);

    let payouts = repo.query_payouts_for_event(&event_id).await.unwrap();
    assert_eq!(payouts.len(), 2);
    assert!(payouts.iter().all(|p| p.merchant_id.as_str() == "007123"));
    let fund = payouts.iter().find(|p| p.partner_ref == "rec2").unwrap();
    assert_eq!(fund.partner_role, "Fund I");
    assert_eq!(fund.amount.to_canonical_string(), "400");
    let alice = payouts.iter().find(|p| p.partner_ref == "rec1").unwrap();
    assert_eq!(alice.partner_role, "Partner");

    // Feed the confirmed rows back in as history and rebuild.
    let history: Vec<Payout> = payouts
        .iter()
        .cloned()
        .map(|mut p| {
            p.id = format!("legacy-{}", p.id);
            p
        })
        .collect();
    repo.insert_legacy_payouts(&history).await.unwrap();
    sqlx::query("DELETE FROM deals").execute(repo.pool()).await.unwrap();
    DealReconstructor::new(repo.clone(), 10).reconstruct().await.unwrap();

    let rebuilt = repo
        .get_deal_by_key(&MerchantId::new("007123"), "residual")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rebuilt.merchant_id.as_str(), "007123");
    assert_eq!(rebuilt.participants.len(), 2);
    assert!(repo
        .get_deal_by_key(&MerchantId::new("7123"), "residual")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_accounting_negative_fees() {
    let (repo, _temp) = setup_repo().await;
    let importer = Importer::new(repo.clone(), CsvIngestor::new(DedupHashMode::Sha256));
    importer.import_csv(REPORT, &options()).await.unwrap();

    let events = repo
        .query_events(None, None, Some(&MerchantId::new("000042")))
        .await
        .unwrap();
    assert_eq!(events[0].fees.to_canonical_string(), "-25");
    assert_eq!(events[0].net_residual().unwrap().to_canonical_string(), "825");
}

#[tokio::test]
async fn test_correction_cascades_to_payouts() {
    let (repo, _temp) = setup_repo().await;
    let event_id = import_and_confirm(&repo).await;
    let before = repo.get_event(&event_id).await.unwrap().unwrap();

    let corrections = EventCorrections::new(repo.clone(), DedupHashMode::Sha256);
    let report = corrections
        .correct_merchant(
            &event_id,
            MerchantCorrection {
                merchant_id: Some(" 0071230 ".to_string()),
                merchant_name: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(report.merchant_id.as_str(), "0071230");
    assert_eq!(report.payouts_updated, 2);
    assert_ne!(report.dedup_hash, before.dedup_hash);

    let payouts = repo.query_payouts_for_event(&event_id).await.unwrap();
    assert!(payouts.iter().all(|p| p.merchant_id.as_str() == "0071230"));
    assert!(payouts.iter().all(|p| p.merchant_name == "Corner Shop"));
}

#[tokio::test]
async fn test_correction_into_existing_content_conflicts() {
    let (repo, _temp) = setup_repo().await;
    let importer = Importer::new(repo.clone(), CsvIngestor::new(DedupHashMode::Sha256));
    importer.import_csv(REPORT, &options()).await.unwrap();
    // Same amounts as 007123 under a different id.
    importer
        .import_csv(
            "MID,Volume,Fees,Adjustments,Chargebacks\nX1,1100,50,30,20\n",
            &options(),
        )
        .await
        .unwrap();

    let x1 = repo
        .query_events(None, None, Some(&MerchantId::new("X1")))
        .await
        .unwrap();
    let corrections = EventCorrections::new(repo.clone(), DedupHashMode::Sha256);
    let err = corrections
        .correct_merchant(
            &x1[0].id,
            MerchantCorrection {
                merchant_id: Some("007123".to_string()),
                merchant_name: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn test_confirmed_events_cannot_be_deleted_or_reassigned() {
    let (repo, _temp) = setup_repo().await;
    let event_id = import_and_confirm(&repo).await;
    let corrections = EventCorrections::new(repo.clone(), DedupHashMode::Sha256);

    let err = corrections.delete_event(&event_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    let err = corrections.assign_deal(&event_id, "any").await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let pending = repo
        .query_events(None, Some(AssignmentStatus::Unassigned), None)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    corrections.delete_event(&pending[0].id).await.unwrap();
    assert!(repo.get_event(&pending[0].id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mark_paid_reports_failed_chunk() {
    let (repo, _temp) = setup_repo().await;
    let event_id = import_and_confirm(&repo).await;
    let payouts = repo.query_payouts_for_event(&event_id).await.unwrap();
    let ids: Vec<String> = payouts.iter().map(|p| p.id.clone()).collect();

    let updater = PaidStatusUpdater::new(repo.clone(), 1);
    let err = updater.mark_paid(&ids, "settled").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    sqlx::query(&format!(
        "CREATE TRIGGER lock_payout BEFORE UPDATE ON payouts WHEN OLD.id = '{}' \
         BEGIN SELECT RAISE(ABORT, 'payout locked'); END",
        ids[1]
    ))
    .execute(repo.pool())
    .await
    .unwrap();

    let report = updater.mark_paid(&ids, " PAID ").await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].id, ids[1]);

    let stored = repo.query_payouts_for_event(&event_id).await.unwrap();
    let paid = stored.iter().find(|p| p.id == ids[0]).unwrap();
    assert_eq!(paid.paid_status, PaidStatus::Paid);
    assert!(paid.paid_at.unwrap() > TimeMs::new(0));
    let locked = stored.iter().find(|p| p.id == ids[1]).unwrap();
    assert_eq!(locked.paid_status, PaidStatus::Unpaid);
}

#[tokio::test]
async fn test_mark_paid_accounts_for_every_requested_id() {
    let (repo, _temp) = setup_repo().await;
    let event_id = import_and_confirm(&repo).await;
    let payouts = repo.query_payouts_for_event(&event_id).await.unwrap();
    let ids = vec![
        payouts[0].id.clone(),
        "no-such-payout".to_string(),
        payouts[0].id.clone(),
        payouts[1].id.clone(),
    ];

    let report = PaidStatusUpdater::new(repo.clone(), 10)
        .mark_paid(&ids, "paid")
        .await
        .unwrap();
    assert_eq!(report.attempted, 4);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.succeeded + report.failed(), report.attempted);

    let duplicate = report.errors.iter().find(|e| e.id == payouts[0].id).unwrap();
    assert_eq!(duplicate.message, "duplicate id in request");
    let unknown = report.errors.iter().find(|e| e.id == "no-such-payout").unwrap();
    assert_eq!(unknown.message, "not found");

    let stored = repo.query_payouts_for_event(&event_id).await.unwrap();
    assert!(stored.iter().all(|p| p.paid_status == PaidStatus::Paid));
}

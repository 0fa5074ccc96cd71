pub mod adjustments;
pub mod deals;
pub mod events;
pub mod health;
pub mod imports;
pub mod payouts;

use crate::config::Config;
use crate::datasource::{CsvIngestor, PartnerDirectory};
use crate::db::Repository;
use crate::orchestration::{
    AdjustmentService, AuditTrailHook, DealReconstructor, EventConfirmer, EventCorrections,
    Importer, PaidStatusUpdater, PartnerRefBackfill,
};
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub importer: Arc<Importer>,
    pub confirmer: Arc<EventConfirmer>,
    pub corrections: Arc<EventCorrections>,
    pub reconstructor: Arc<DealReconstructor>,
    pub backfill: Arc<PartnerRefBackfill>,
    pub paid_status: Arc<PaidStatusUpdater>,
    pub adjustments: Arc<AdjustmentService>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, directory: Arc<dyn PartnerDirectory>) -> Self {
        let confirmer =
            EventConfirmer::new(repo.clone()).with_hook(Arc::new(AuditTrailHook::new(repo.clone())));
        Self {
            importer: Arc::new(Importer::new(repo.clone(), CsvIngestor::new(config.dedup_hash))),
            confirmer: Arc::new(confirmer),
            corrections: Arc::new(EventCorrections::new(repo.clone(), config.dedup_hash)),
            reconstructor: Arc::new(DealReconstructor::new(
                repo.clone(),
                config.reconstruct_batch_size,
            )),
            backfill: Arc::new(PartnerRefBackfill::new(repo.clone(), directory)),
            paid_status: Arc::new(PaidStatusUpdater::new(repo.clone(), config.bulk_batch_size)),
            adjustments: Arc::new(AdjustmentService::new(repo.clone())),
            repo,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/imports", post(imports::post_import))
        .route("/v1/events", get(events::list_events))
        .route(
            "/v1/events/:id",
            patch(events::correct_event).delete(events::delete_event),
        )
        .route("/v1/events/:id/assign", post(events::assign_event))
        .route("/v1/events/:id/confirm", post(events::confirm_event))
        .route("/v1/deals/reconstruct", post(deals::reconstruct))
        .route("/v1/deals/backfill-partners", post(deals::backfill_partners))
        .route("/v1/payouts/mark-paid", post(payouts::mark_paid))
        .route("/v1/adjustments", post(adjustments::record))
        .route("/v1/adjustments/counts", get(adjustments::counts))
        .route("/v1/adjustments/reject", post(adjustments::reject))
        .layer(cors)
        .with_state(state)
}

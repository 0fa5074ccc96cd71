use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;
use crate::orchestration::{BackfillReport, BatchReport};

pub async fn reconstruct(State(state): State<AppState>) -> Result<Json<BatchReport>, AppError> {
    Ok(Json(state.reconstructor.reconstruct().await?))
}

pub async fn backfill_partners(
    State(state): State<AppState>,
) -> Result<Json<BackfillReport>, AppError> {
    Ok(Json(state.backfill.backfill_partner_refs().await?))
}

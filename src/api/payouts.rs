use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppError;
use crate::orchestration::BatchReport;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPaidBody {
    pub ids: Vec<String>,
    pub status: String,
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Json(body): Json<MarkPaidBody>,
) -> Result<Json<BatchReport>, AppError> {
    if body.ids.is_empty() {
        return Err(AppError::BadRequest("ids must not be empty".into()));
    }
    Ok(Json(state.paid_status.mark_paid(&body.ids, &body.status).await?))
}

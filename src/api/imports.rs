use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::datasource::ParseOptions;
use crate::domain::PayoutMonth;
use crate::error::AppError;
use crate::orchestration::ImportReport;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportQuery {
    pub payout_month: Option<String>,
}

/// Body is the raw CSV text.
pub async fn post_import(
    Query(params): Query<ImportQuery>,
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportReport>, AppError> {
    let payout_month = params
        .payout_month
        .as_deref()
        .map(str::parse::<PayoutMonth>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if body.trim().is_empty() {
        return Err(AppError::BadRequest("empty CSV body".into()));
    }

    let report = state
        .importer
        .import_csv(&body, &ParseOptions { payout_month })
        .await?;
    Ok(Json(report))
}

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::{validate_assignment_status, MerchantId, PayoutMonth, ResidualEvent};
use crate::error::AppError;
use crate::orchestration::{ConfirmReport, CorrectionReport, MerchantCorrection};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub payout_month: Option<String>,
    pub status: Option<String>,
    pub merchant_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub id: String,
    pub merchant_id: String,
    pub merchant_name: String,
    pub volume: String,
    pub fees: String,
    pub adjustments: String,
    pub chargebacks: String,
    /// Null when the stored amounts overflow the decimal range.
    pub net_residual: Option<String>,
    pub payout_date: String,
    pub payout_month: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_type: Option<String>,
    pub assignment_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
}

impl From<ResidualEvent> for EventDto {
    fn from(e: ResidualEvent) -> Self {
        EventDto {
            net_residual: e.net_residual().map(|d| d.to_canonical_string()),
            id: e.id,
            merchant_id: e.merchant_id.as_str().to_string(),
            merchant_name: e.merchant_name,
            volume: e.volume.to_canonical_string(),
            fees: e.fees.to_canonical_string(),
            adjustments: e.adjustments.to_canonical_string(),
            chargebacks: e.chargebacks.to_canonical_string(),
            payout_date: e.payout_date.to_string(),
            payout_month: e.payout_month.to_string(),
            payout_type: e.payout_type,
            assignment_status: e.assignment_status.as_str().to_string(),
            deal_id: e.deal_id,
        }
    }
}

pub async fn list_events(
    Query(params): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<EventDto>>, AppError> {
    let payout_month = params
        .payout_month
        .as_deref()
        .map(str::parse::<PayoutMonth>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let status = params
        .status
        .as_deref()
        .map(validate_assignment_status)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let merchant_id = params.merchant_id.map(MerchantId::new);

    let events = state
        .repo
        .query_events(payout_month, status, merchant_id.as_ref())
        .await?;
    Ok(Json(events.into_iter().map(EventDto::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub deal_id: String,
}

pub async fn assign_event(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AssignBody>,
) -> Result<StatusCode, AppError> {
    state.corrections.assign_deal(&id, &body.deal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn confirm_event(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ConfirmReport>, AppError> {
    Ok(Json(state.confirmer.confirm(&id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionBody {
    pub merchant_id: Option<String>,
    pub merchant_name: Option<String>,
}

pub async fn correct_event(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CorrectionBody>,
) -> Result<Json<CorrectionReport>, AppError> {
    let report = state
        .corrections
        .correct_merchant(
            &id,
            MerchantCorrection {
                merchant_id: body.merchant_id,
                merchant_name: body.merchant_name,
            },
        )
        .await?;
    Ok(Json(report))
}

pub async fn delete_event(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.corrections.delete_event(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

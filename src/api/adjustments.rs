use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::AppState;
use crate::domain::{AuditSubject, TimeMs};
use crate::error::AppError;
use crate::orchestration::{BulkRejectReport, ParticipantChange, SubjectCounts};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBody {
    pub before: Option<Value>,
    pub after: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub description: String,
    pub changes: Vec<ChangeBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub audit_ids: Vec<i64>,
}

pub async fn record(
    State(state): State<AppState>,
    Json(body): Json<RecordBody>,
) -> Result<Json<RecordResponse>, AppError> {
    let changes = body
        .changes
        .into_iter()
        .map(|c| ParticipantChange {
            before_state: c.before,
            after_state: c.after,
        })
        .collect();
    let audit_ids = state
        .adjustments
        .record_adjustment(
            AuditSubject::new(body.subject_type, body.subject_id),
            &body.description,
            changes,
            TimeMs::now(),
        )
        .await?;
    Ok(Json(RecordResponse { audit_ids }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsQuery {
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

pub async fn counts(
    Query(params): Query<CountsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubjectCounts>>, AppError> {
    let subject = match (params.subject_type, params.subject_id) {
        (Some(t), Some(id)) => Some(AuditSubject::new(t, id)),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "subjectType and subjectId must be given together".into(),
            ))
        }
    };
    if let (Some(from), Some(to)) = (params.from_ms, params.to_ms) {
        if from > to {
            return Err(AppError::BadRequest("fromMs must be <= toMs".into()));
        }
    }

    let counts = state
        .adjustments
        .adjustment_counts(
            subject,
            params.from_ms.map(TimeMs::new),
            params.to_ms.map(TimeMs::new),
        )
        .await?;
    Ok(Json(counts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    pub ids: Vec<i64>,
    pub reason: String,
}

pub async fn reject(
    State(state): State<AppState>,
    Json(body): Json<RejectBody>,
) -> Result<Json<BulkRejectReport>, AppError> {
    Ok(Json(
        state.adjustments.bulk_reject(&body.ids, &body.reason).await?,
    ))
}

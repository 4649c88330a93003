use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{error::ApiError, response::ApiResponse};
use crate::domain::{DailyWeather, PredictedWaterSchedule, SchedulePatch};
use crate::engine::{JobStatus, TodayRecommendation, TrainingJob};
use crate::forecast::DeviceHistory;
use crate::ml::ModelMetadata;
use crate::state::AppState;

/// Days in a forecast outlook when none are requested
const DEFAULT_OUTLOOK_DAYS: u32 = 4;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/devices/:id/schedules",
            get(list_device_schedules).post(generate_schedule),
        )
        .route("/devices/:id/train", post(train_model))
        .route("/devices/:id/prediction/today", get(predict_today))
        .route("/devices/:id/model", get(model_metadata))
        .route("/devices/:id/forecast", get(forecast_outlook))
        .route("/devices/:id/history", get(device_history))
        .route("/schedules", get(list_schedules_in_range))
        .route("/schedules/:id", patch(update_schedule).delete(delete_schedule))
        .route("/training/:job_id", get(training_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// POST /api/v1/devices/{id}/schedules?days=N
pub async fn generate_schedule(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(q): Query<DaysQuery>,
) -> Result<Response, ApiError> {
    let days = q
        .days
        .ok_or_else(|| ApiError::BadRequest("query parameter `days` is required".into()))?;
    let rows = state.engine.generate_schedule(device_id, days).await?;
    Ok(ApiResponse::success(rows).with_status(StatusCode::CREATED))
}

/// GET /api/v1/devices/{id}/schedules
pub async fn list_device_schedules(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> ApiResult<Vec<PredictedWaterSchedule>> {
    let rows = state.engine.schedules_by_device(device_id).await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// GET /api/v1/schedules?start=YYYY-MM-DD&end=YYYY-MM-DD
pub async fn list_schedules_in_range(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> ApiResult<Vec<PredictedWaterSchedule>> {
    let rows = state.engine.schedules_by_date_range(q.start, q.end).await?;
    Ok(Json(ApiResponse::success(rows)))
}

/// PATCH /api/v1/schedules/{id}
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<SchedulePatch>,
) -> ApiResult<PredictedWaterSchedule> {
    let row = state.engine.update_schedule(id, &patch).await?;
    Ok(Json(ApiResponse::success(row)))
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
}

/// DELETE /api/v1/schedules/{id}
pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Deleted> {
    state.engine.delete_schedule(id).await?;
    Ok(Json(ApiResponse::success(Deleted { id })))
}

#[derive(Debug, Serialize)]
pub struct TrainingAccepted {
    pub job_id: Uuid,
    pub device_id: Uuid,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// POST /api/v1/devices/{id}/train
///
/// Queues a training job and answers 202 with its id. Unknown devices are
/// rejected before a job is created.
pub async fn train_model(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.engine.device(device_id).await?;
    let handle = state.worker.submit(device_id);
    let body = TrainingAccepted {
        job_id: handle.job_id,
        device_id,
        status: JobStatus::Queued,
    };
    Ok(ApiResponse::success(body).with_status(StatusCode::ACCEPTED))
}

/// GET /api/v1/training/{job_id}
pub async fn training_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<TrainingJob> {
    let job = state
        .worker
        .status(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("training job {job_id}")))?;
    Ok(Json(ApiResponse::success(job)))
}

/// GET /api/v1/devices/{id}/prediction/today
pub async fn predict_today(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> ApiResult<TodayRecommendation> {
    let recommendation = state.engine.predict_today(device_id).await?;
    Ok(Json(ApiResponse::success(recommendation)))
}

/// GET /api/v1/devices/{id}/model
pub async fn model_metadata(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> ApiResult<ModelMetadata> {
    state.engine.device(device_id).await?;
    Ok(Json(ApiResponse::success(state.engine.model_metadata(device_id)?)))
}

/// GET /api/v1/devices/{id}/forecast?days=N
pub async fn forecast_outlook(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(q): Query<DaysQuery>,
) -> ApiResult<Vec<DailyWeather>> {
    let days = q.days.unwrap_or(DEFAULT_OUTLOOK_DAYS);
    let outlook = state.engine.forecast_outlook(device_id, days).await?;
    Ok(Json(ApiResponse::success(outlook)))
}

/// GET /api/v1/devices/{id}/history?start=YYYY-MM-DD&end=YYYY-MM-DD
pub async fn device_history(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(q): Query<RangeQuery>,
) -> ApiResult<DeviceHistory> {
    let history = state.engine.training_history(device_id, q.start, q.end).await?;
    Ok(Json(ApiResponse::success(history)))
}

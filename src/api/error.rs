use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::response::ApiResponse;
use crate::error::IrrigationError;

/// Errors returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] IrrigationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Engine(e) => match e {
                IrrigationError::NotFound { .. } | IrrigationError::ModelNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                IrrigationError::InvalidScheduleRange { .. } | IrrigationError::InvalidSchedule(_) => {
                    StatusCode::BAD_REQUEST
                }
                IrrigationError::InsufficientTrainingData { .. }
                | IrrigationError::NoSensorData { .. }
                | IrrigationError::DeviceInactive(_) => StatusCode::UNPROCESSABLE_ENTITY,
                IrrigationError::DataUnavailable(_) | IrrigationError::ForecastUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                IrrigationError::Model(_) | IrrigationError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Engine(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(kind = self.error_type(), error = %self, "request failed");
                "An internal error occurred".to_string()
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                tracing::warn!(kind = self.error_type(), error = %self, "no recommendation available");
                format!("{}: {self}", self.error_type())
            }
            _ => {
                tracing::debug!(kind = self.error_type(), error = %self, "client error");
                format!("{}: {self}", self.error_type())
            }
        };

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

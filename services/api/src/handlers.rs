//! Axum Handlers for the plain HTTP surface
//!
//! The relay itself lives in [`crate::ws`]; this module holds the error
//! response shape shared by every HTTP path and the health probe.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use interview_core::RelayError;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    /// The request reached a realtime endpoint without asking for an upgrade.
    UpgradeRequired(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UpgradeRequired(message) => {
                warn!(%message, "Rejected non-upgrade request");
                (StatusCode::UPGRADE_REQUIRED, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        // Only errors with no close frame are upgrade failures.
        if err.closes_socket() {
            ApiError::InternalServerError(err.into())
        } else {
            ApiError::UpgradeRequired(err.to_string())
        }
    }
}

/// Liveness probe for load balancers.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

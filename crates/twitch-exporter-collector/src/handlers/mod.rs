pub mod eventsub;
pub mod landing;
pub mod metrics;

use axum::{Json, http::StatusCode, response::IntoResponse};
use twitch_exporter_common::error::ExporterError;

pub struct ApiError(pub ExporterError);

impl From<ExporterError> for ApiError {
    fn from(value: ExporterError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            ExporterError::Signature => StatusCode::FORBIDDEN,
            ExporterError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ExporterError::PrerequisiteNotConfigured(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(serde_json::json!({
                "code": self.0.code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

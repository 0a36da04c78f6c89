use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use twitch_exporter_common::error::ExporterError;
use twitch_exporter_eventsub::Delivery;

use crate::{handlers::ApiError, router::ExporterState};

pub async fn eventsub_webhook(
    State(state): State<Arc<ExporterState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(eventsub) = state.eventsub.as_ref() else {
        return Err(ExporterError::PrerequisiteNotConfigured("eventsub".to_string()).into());
    };

    let delivery = eventsub.handle_delivery(&headers, &body).map_err(|err| {
        warn!(error = %err, code = err.code(), "rejected eventsub delivery");
        ApiError(err)
    })?;

    match delivery {
        Delivery::Challenge(challenge) => {
            Ok(([(header::CONTENT_TYPE, "text/plain")], challenge).into_response())
        }
        Delivery::Notification {
            event_type,
            listeners,
        } => {
            debug!(event_type, listeners, "eventsub notification dispatched");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Delivery::Revocation { .. } | Delivery::Duplicate | Delivery::Ignored(_) => {
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

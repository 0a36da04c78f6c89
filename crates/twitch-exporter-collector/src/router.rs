use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use twitch_exporter_eventsub::EventSubClient;

use crate::{handlers, orchestrator::Orchestrator};

pub struct ExporterState {
    pub orchestrator: Arc<Orchestrator>,
    pub eventsub: Option<Arc<EventSubClient>>,
    pub telemetry_path: String,
}

impl ExporterState {
    pub fn new(orchestrator: Arc<Orchestrator>, telemetry_path: impl Into<String>) -> Self {
        Self {
            orchestrator,
            eventsub: None,
            telemetry_path: telemetry_path.into(),
        }
    }

    pub fn with_eventsub(mut self, eventsub: Arc<EventSubClient>) -> Self {
        self.eventsub = Some(eventsub);
        self
    }
}

/// `GET /`, `GET <telemetry path>` and, when EventSub is configured,
/// `POST <webhook path>`.
pub fn exporter_router(state: Arc<ExporterState>, webhook_path: Option<&str>) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::landing::landing_page))
        .route(
            &state.telemetry_path,
            get(handlers::metrics::prometheus_metrics),
        );

    if let Some(path) = webhook_path
        && state.eventsub.is_some()
    {
        router = router.route(path, post(handlers::eventsub::eventsub_webhook));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

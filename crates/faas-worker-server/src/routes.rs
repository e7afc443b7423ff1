use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use faas_history::{HistorySnapshot, HistoryTracker};
use faas_telemetry::{ResourceDescriptor, TelemetrySampler};
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::error;

use crate::dispatcher::Dispatcher;

pub const STATUS_PATH: &str = "/status";
pub const RID_PATH: &str = "/rid";
pub const HISTORY_PATH: &str = "/history";

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, PUT, POST, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str =
    "Content-Type, Content-Range, Content-Disposition, Content-Description, X-Requested-With";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub history: Arc<HistoryTracker>,
    pub sampler: TelemetrySampler,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        history: Arc<HistoryTracker>,
        sampler: TelemetrySampler,
    ) -> Self {
        Self {
            dispatcher,
            history,
            sampler,
        }
    }
}

/// Routes for a worker whose invocation URLs start with `invoke_prefix`
/// (e.g. `/run`).
pub fn create_app(state: AppState, invoke_prefix: &str) -> Router {
    let prefix = invoke_prefix.trim_end_matches('/');

    // bare prefix and trailing slash are routed so they can be rejected
    // with the missing-name error instead of a 404
    let invoke = Router::new()
        .route(prefix, any(invoke_handler))
        .route(&format!("{prefix}/"), any(invoke_handler))
        .route(&format!("{prefix}/*rest"), any(invoke_handler))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ));

    Router::new()
        .route(STATUS_PATH, get(status_handler))
        .route(RID_PATH, get(rid_handler))
        .route(HISTORY_PATH, get(history_handler))
        .merge(invoke)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn invoke_handler(State(state): State<AppState>, request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    match state.dispatcher.invoke(request).await {
        Ok(forwarded) => {
            let status =
                StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                forwarded.body,
            )
                .into_response()
        }
        Err(err) => {
            error!("could not handle request: {}", err);
            err.into_response()
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> &'static str {
    state.dispatcher.pool().dump();
    "ready\n"
}

async fn rid_handler(State(state): State<AppState>) -> Json<ResourceDescriptor> {
    Json(ResourceDescriptor::discover(&state.sampler))
}

async fn history_handler(State(state): State<AppState>) -> Json<HistorySnapshot> {
    Json(state.history.snapshot())
}

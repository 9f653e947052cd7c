//! HTTP surface: the route tree wrapped in the request middleware.
//!
//! `main.rs` and the integration tests both go through [`build_router`].

use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

/// Correlation header, generated when the client does not send one.
const REQUEST_ID: &str = "x-request-id";

/// Methods the browser front-end uses: submit, poll, delete gallery items.
const CORS_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::DELETE];

/// How long browsers may cache a preflight answer.
const CORS_MAX_AGE: Duration = Duration::from_secs(60 * 60);

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(routes::health::router())
        .nest("/v1", routes::api_routes());

    with_middleware(routes, &state.config).with_state(state)
}

/// Layers wrap bottom-up, so requests meet CORS first and the panic guard
/// last.
///
/// The timeout bounds the time to response headers only, so an open SSE
/// body is not cut off.
fn with_middleware(routes: Router<AppState>, config: &ServerConfig) -> Router<AppState> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let request_id = HeaderName::from_static(REQUEST_ID);

    routes
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors_layer(config))
}

/// One span per request, tagged with its correlation id.
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}

/// CORS for the configured origins.
///
/// Panics on an unparsable origin; `main` builds the router before binding,
/// so a bad `CORS_ORIGINS` stops startup.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{origin}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers([CONTENT_TYPE])
        .max_age(CORS_MAX_AGE)
}

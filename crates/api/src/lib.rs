mod config;
mod deepseek;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, Path, Query, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracko_agents::{ChatAgent, FallbackResponder, StaticFallback};
use tracko_core::{BusSnapshot, ChatInput, CrowdStatus, NlpConfig, NlpEngine};
use tracko_observability::{AppMetrics, MetricsSnapshot};
use tracko_storage::Store;

pub use crate::config::ApiConfig;
pub use crate::deepseek::DeepSeekFallback;
use crate::rate_limit::IpRateLimiter;

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_STATUS_BUS: &str = "12A";

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<ChatAgent<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
    pub backend: &'static str,
    pub remote_fallback: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    store: &'static str,
    remote_fallback: bool,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    context: Option<Vec<BusSnapshot>>,
}

#[derive(Debug, Deserialize)]
struct NlpRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CrowdStatusQuery {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrowdUpdateRequest {
    #[serde(default)]
    vehicle_id: Option<String>,
    #[serde(default)]
    people_count: Option<i64>,
}

pub async fn build_app(config: ApiConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let nlp_config = match &config.nlp_config_path {
        Some(path) => NlpConfig::from_json_file(path)
            .with_context(|| format!("failed to load NLP catalogue from {}", path.display()))?,
        None => NlpConfig::default(),
    };
    let engine = Arc::new(NlpEngine::new(nlp_config));

    let store = match &config.database_url {
        Some(database_url) => Store::sqlite(database_url, config.bus_capacity).await?,
        None => Store::memory(config.bus_capacity)?,
    };
    let backend = store.backend_name();

    let fallback: Arc<dyn FallbackResponder> = match &config.deepseek_api_key {
        Some(api_key) => Arc::new(DeepSeekFallback::new(api_key.as_str())?),
        None => Arc::new(StaticFallback::default()),
    };
    let remote_fallback = config.deepseek_api_key.is_some();

    let agent = Arc::new(ChatAgent::new(
        engine,
        Arc::new(store),
        fallback,
        metrics.clone(),
    ));

    let limiter = IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max);
    spawn_limiter_pruning(limiter.clone());

    info!(
        store = backend,
        remote_fallback,
        rate_limit_max = config.rate_limit_max,
        "tracko api configured"
    );

    let state = ApiState {
        agent,
        metrics,
        limiter,
        allowed_origins: Arc::new(config.allowed_origins),
        backend,
        remote_fallback,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/buses", get(list_buses))
        .route("/api/routes", get(list_routes))
        .route("/api/routes/:bus_id/stops", get(route_stops))
        .route("/api/crowd/status", get(crowd_status))
        .route("/api/crowd/update", post(crowd_update))
        .route("/api/chat", post(chat))
        .route("/api/nlp", post(nlp))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        store: state.backend,
        remote_fallback: state.remote_fallback,
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn list_buses(State(state): State<ApiState>) -> Response {
    match state.agent.active_buses().await {
        Ok(buses) => (StatusCode::OK, Json(buses)).into_response(),
        Err(err) => {
            error!(error = %err, "failed to fetch buses");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch buses")
        }
    }
}

async fn list_routes(State(state): State<ApiState>) -> Response {
    match state.agent.route_catalogue().await {
        Ok(routes) => (StatusCode::OK, Json(routes)).into_response(),
        Err(err) => {
            error!(error = %err, "failed to fetch routes");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch routes")
        }
    }
}

async fn route_stops(State(state): State<ApiState>, Path(bus_id): Path<String>) -> Response {
    match state.agent.route_details(&bus_id).await {
        Ok(Some(route)) => (StatusCode::OK, Json(route)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Route not found"),
        Err(err) => {
            error!(error = %err, bus_id = %bus_id, "failed to fetch route stops");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch route stops")
        }
    }
}

/// Always answers 200; unknown buses and lookup failures report zero passengers.
async fn crowd_status(
    State(state): State<ApiState>,
    Query(query): Query<CrowdStatusQuery>,
) -> Json<CrowdStatus> {
    let bus_id = query
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_STATUS_BUS);

    let status = match state.agent.crowd_status(bus_id).await {
        Ok(status) => status,
        Err(err) => {
            error!(error = %err, bus_id = %bus_id, "failed to fetch crowd status");
            None
        }
    };

    Json(status.unwrap_or_else(|| CrowdStatus::empty(chrono::Utc::now())))
}

async fn crowd_update(
    State(state): State<ApiState>,
    Json(request): Json<CrowdUpdateRequest>,
) -> Response {
    let Some(bus_id) = request
        .vehicle_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, "vehicle_id is required");
    };

    let passengers = request
        .people_count
        .unwrap_or(0)
        .clamp(0, i64::from(u32::MAX)) as u32;

    match state.agent.record_crowd(bus_id, passengers).await {
        Ok(update) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "crowdLevel": update.capacity_percentage,
                "data": update
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, bus_id = %bus_id, "failed to record crowd level");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update crowd level")
        }
    }
}

async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> Response {
    let message = request.message.unwrap_or_default();
    if message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "reply": "Please say something!" })),
        )
            .into_response();
    }

    let input = ChatInput {
        message,
        context: request.context,
    };

    match state.agent.handle_chat(input).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(err) => {
            error!(error = %err, "chat handling failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "reply": "Something went wrong on my side. Please try again."
                })),
            )
                .into_response()
        }
    }
}

async fn nlp(State(state): State<ApiState>, Json(request): Json<NlpRequest>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.agent.process(&request.message)))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn spawn_limiter_pruning(limiter: IpRateLimiter) {
    tokio::spawn(async move {
        let period = limiter.window().max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // no configured origins means the public demo mode
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

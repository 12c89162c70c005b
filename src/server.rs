use crate::{
    config::Config,
    errors::AppError,
    ops::{
        dispatch::{Dispatcher, Stage},
        types::{Capabilities, OperationRequest},
    },
    security::{self, Throttle},
};
use axum::{
    extract::{Path, Query, Request, State},
    http::{Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub throttle: Throttle,
}

impl AppState {
    pub fn new(cfg: Config, dispatcher: Dispatcher) -> Self {
        let throttle = Throttle::new(cfg.limits.requests_per_second, cfg.limits.burst);
        Self { cfg: Arc::new(cfg), dispatcher, throttle }
    }
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{}:{}", state.cfg.server.bind_addr, state.cfg.server.port).parse()?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let base = state.cfg.server.base_path.trim_end_matches('/').to_string();
    let limit_bytes = state.cfg.limits.max_request_kb * 1024;
    Router::new()
        .route("/healthz", get(health).fallback(method_not_allowed))
        .route("/capabilities", get(capabilities).fallback(method_not_allowed))
        .route(&format!("{base}/:operation"), post(run).fallback(method_not_allowed))
        .fallback(unknown_route)
        .layer(RequestBodyLimitLayer::new(limit_bytes))
        // outside the limit layer so a declared oversize body gets a structured 413
        .layer(middleware::from_fn_with_state(state.clone(), admit_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn admit_body(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Err(e) = security::content_length_ok(request.headers(), state.cfg.limits.max_request_kb) {
        let request_id = uuid::Uuid::new_v4().to_string();
        audit(&request_id, request.uri().path(), "deny", e.kind(), Instant::now());
        return e.into_response();
    }
    next.run(request).await
}

async fn unknown_route(uri: Uri) -> Response {
    AppError::UnknownOperation(uri.path().to_string()).into_response()
}

async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    AppError::MethodNotAllowed(format!("{method} {}", uri.path())).into_response()
}

async fn health() -> impl IntoResponse { (StatusCode::OK, Json(json!({"status":"ok"}))) }

async fn capabilities(State(state): State<AppState>) -> Response {
    let caps = Capabilities { operations: state.dispatcher.registry().describe() };
    (StatusCode::OK, Json(caps)).into_response()
}

async fn run(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Query(args): Query<HashMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    if let Err(e) = state.throttle.check() {
        audit(&request_id, &operation, "deny", e.kind(), started);
        return e.into_response();
    }

    match state.dispatcher.handle(OperationRequest::new(operation.clone(), args)).await {
        Ok(outcome) => match outcome.into_json() {
            Ok(body) => {
                audit(&request_id, &operation, "allow", "OK", started);
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(e) => {
                audit(&request_id, &operation, "error", e.kind(), started);
                e.into_response()
            }
        },
        Err(failure) => {
            let decision = match failure.stage {
                Stage::Validation => "deny",
                Stage::Handler => "error",
            };
            audit(&request_id, &operation, decision, failure.error.kind(), started);
            failure.error.into_response()
        }
    }
}

fn audit(request_id: &str, operation: &str, decision: &str, code: &str, started: Instant) {
    tracing::info!(
        request_id = request_id,
        operation = operation,
        decision = decision,
        code = code,
        duration_ms = started.elapsed().as_millis() as u64,
        "audit"
    );
}


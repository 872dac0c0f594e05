pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::FacturaConfig;
use crate::services::{Database, EmailProvider, JwtService, OcrProvider};

#[derive(Clone)]
pub struct AppState {
    pub config: FacturaConfig,
    pub db: Database,
    pub email: Arc<dyn EmailProvider>,
    pub ocr: Arc<dyn OcrProvider>,
    pub jwt: JwtService,
}

pub fn build_router(state: AppState) -> Router {
    // Everything below requires a bearer token.
    let authed = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/companies", get(handlers::companies::list))
        .route("/companies/search", get(handlers::companies::search))
        .route("/companies/:id", get(handlers::companies::get_company))
        .route(
            "/clients",
            get(handlers::clients::list).post(handlers::clients::create),
        )
        .route("/clients/search/:nif", get(handlers::clients::search_by_nif))
        .route(
            "/clients/:id",
            get(handlers::clients::get_client)
                .put(handlers::clients::update)
                .delete(handlers::clients::delete),
        )
        .route("/invoices", post(handlers::invoices::create_direct))
        .route("/invoices/request", post(handlers::invoices::request_invoice))
        .route("/invoices/my-requests", get(handlers::invoices::my_requests))
        .route("/invoices/pending", get(handlers::invoices::pending))
        .route("/invoices/approved", get(handlers::invoices::approved))
        .route("/invoices/ocr", post(handlers::invoices::ocr_preview))
        .route("/invoices/:id", get(handlers::invoices::get_invoice))
        .route("/invoices/:id/approve", post(handlers::invoices::approve))
        .route("/invoices/:id/reject", post(handlers::invoices::reject))
        .route("/invoices/:id/send", post(handlers::invoices::send))
        .route("/dashboard/stats", get(handlers::dashboard::stats))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .map(|origin| {
                    origin
                        .parse::<axum::http::HeaderValue>()
                        .unwrap_or_else(|e| {
                            tracing::error!("Invalid CORS origin '{}': {}. Using fallback.", origin, e);
                            axum::http::HeaderValue::from_static("*")
                        })
                })
                .collect::<Vec<axum::http::HeaderValue>>(),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .merge(authed)
        .with_state(state)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

/// Service health check: process up + database reachable.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        e
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up"
        }
    })))
}

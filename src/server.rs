//! HTTP server for the reset service.
//!
//! [`router`] builds the axum application; [`serve`] wires the database,
//! identity provider and policy from config into a running server.

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{create_policy, create_provider, Action, AuthenticationGate};
use crate::cascade::{CascadeEngine, CascadeGraph, SqliteGateway};
use crate::config::EventResetConfig;
use crate::db;
use crate::service::{ResetOutcome, ResetRequest, ResetService, ServiceError};

pub const RESET_PATH: &str = "/reset-event";

/// Build the application router around a ready service.
pub fn router(service: ResetService) -> Router {
    Router::new()
        .route(RESET_PATH, post(reset_event))
        .route("/health", get(health))
        .with_state(service)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Answers every `OPTIONS` request on the router, with or without an `Origin`.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

#[tracing::instrument(name = "reset_request", skip_all, fields(request_id = %uuid::Uuid::now_v7()))]
async fn reset_event(
    State(service): State<ResetService>,
    headers: HeaderMap,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<ResetOutcome, ServiceError> {
    // Credentials are checked before the body is even looked at
    let identity = service.authenticate(&headers).await?;
    match payload {
        Ok(Json(request)) => service.execute(&identity, request).await,
        Err(rejection) => {
            // Unreadable body: only a caller allowed to reset learns why
            service.authorize(&identity, Action::ResetEvent)?;
            Err(ServiceError::Validation(rejection.body_text()))
        }
    }
}

/// Assemble the service from config: database, gateway, engine, auth.
pub fn build_service(config: &EventResetConfig) -> Result<ResetService> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let gateway = SqliteGateway::new(Arc::new(Mutex::new(conn)));
    let engine = CascadeEngine::new(Arc::new(gateway), CascadeGraph::standard());

    let provider = create_provider(&config.auth)?;
    tracing::info!(provider = ?config.auth.provider, "identity provider ready");
    let policy = create_policy(&config.auth);

    Ok(ResetService::new(
        AuthenticationGate::new(provider),
        policy,
        engine,
        config.reset.clone(),
    ))
}

/// Start the HTTP server and run until ctrl-c.
pub async fn serve(config: EventResetConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    tracing::info!(addr = %bind_addr, "starting event reset service");

    let service = build_service(&config)?;
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}{RESET_PATH}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use dispatcher::Dispatcher;
use line_gateway::{verify_signature, LineGateway, SIGNATURE_HEADER};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::WebhookPayload,
};
use storage::Storage;

mod config;

use config::load_settings;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    channel_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let storage = Storage::new(&settings.database_url, &settings.exam_table_name)
        .await
        .map_err(|error| {
            error!(
                database_url = %settings.database_url,
                %error,
                "failed to open SQLite database; verify parent directory exists and permissions are correct"
            );
            error
        })?;
    let gateway = LineGateway::new(settings.channel_access_token);
    let dispatcher = Dispatcher::new(Arc::new(storage), Arc::new(gateway));

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        channel_secret: settings.channel_secret,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "webhook server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", post(webhook))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !verify_signature(&state.channel_secret, &body, signature) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::new(
                ErrorCode::Unauthorized,
                "signature verification failed",
            )),
        ));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                ErrorCode::Validation,
                format!("malformed webhook payload: {e}"),
            )),
        )
    })?;

    let events = payload.into_events();
    state.dispatcher.dispatch(&events).await.map_err(|e| {
        error!(error = %e, "webhook dispatch failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;

    Ok("OK")
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

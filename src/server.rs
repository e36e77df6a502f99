use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::error::ReleaseBotError;
use crate::handlers::ReleaseBot;
use crate::intent::WebhookRequest;
use crate::response::{Reply, ResponseEnvelope, GENERIC_FAILURE};

#[derive(Clone)]
struct AppState {
    bot: Arc<ReleaseBot>,
    /// Log request and reply bodies at info instead of debug
    debug: bool,
}

pub fn router(bot: Arc<ReleaseBot>, debug: bool) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health_check))
        .with_state(AppState { bot, debug })
}

pub async fn serve(bot: Arc<ReleaseBot>, host: &str, port: u16, debug: bool) -> anyhow::Result<()> {
    let listener = bind(host, port).await?;
    let app = router(bot, debug);

    info!("Starting release bot on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Host names, IPv4 and bare IPv6 literals such as `::` are all accepted.
async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

async fn health_check() -> &'static str {
    "ok"
}

/// Bodies are parsed whatever their content type, since fulfillment
/// platforms do not always send one.
async fn webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let request: WebhookRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting unreadable webhook body: {e}");
            return json_reply(StatusCode::BAD_REQUEST, &Reply::empty());
        }
    };
    log_body(state.debug, "Request", &String::from_utf8_lossy(&body));

    let (status, reply) = match state.bot.answer(&request, Utc::now()).await {
        Ok(reply) => (StatusCode::OK, reply),
        Err(e) => {
            match &e {
                ReleaseBotError::Template(_) => error!("Rule table misconfigured: {e}"),
                _ => error!("Failed to answer {:?}: {e}", request.action()),
            }
            let envelope = ResponseEnvelope::new(GENERIC_FAILURE, state.bot.source());
            (StatusCode::INTERNAL_SERVER_ERROR, envelope.into())
        }
    };

    let response = json_reply(status, &reply);
    if let Some(speech) = reply.speech() {
        log_body(state.debug, "Response", speech);
    }
    response
}

fn log_body(verbose: bool, label: &str, body: &str) {
    if verbose {
        info!("{label}:\n{body}");
    } else {
        debug!("{label}:\n{body}");
    }
}

fn json_reply(status: StatusCode, reply: &Reply) -> Response {
    let body = serde_json::to_string_pretty(reply).unwrap_or_else(|_| "{}".to_string());
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

// src/api.rs
//! HTTP boundary: health check and the chat-provider webhook.
//!
//! The webhook never fails. Whatever arrives is parsed, checked and queued for the single
//! approval worker; the provider always gets `200 OK` so it does not retry in a loop.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::approval::{ApprovalController, Update};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ApiState {
    pub events: mpsc::Sender<Update>,
    pub webhook_secret: Option<String>,
}

pub fn event_queue() -> (mpsc::Sender<Update>, mpsc::Receiver<Update>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn webhook(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    counter!("curator_webhook_events_total").increment(1);

    if let Some(secret) = &state.webhook_secret {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret.as_str()) {
            counter!("curator_webhook_rejected_total", "reason" => "secret").increment(1);
            tracing::warn!(target: "webhook", "secret token mismatch, event dropped");
            return StatusCode::OK;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            counter!("curator_webhook_rejected_total", "reason" => "malformed").increment(1);
            tracing::warn!(target: "webhook", error = %e, bytes = body.len(), "malformed update");
            return StatusCode::OK;
        }
    };

    let update_id = update.update_id;
    if let Err(e) = state.events.try_send(update) {
        counter!("curator_webhook_rejected_total", "reason" => "queue").increment(1);
        tracing::error!(target: "webhook", update_id, error = %e, "event queue unavailable, update dropped");
    }
    StatusCode::OK
}

/// Single consumer: updates are handled strictly one after another.
pub fn spawn_event_worker(
    controller: Arc<ApprovalController>,
    mut events: mpsc::Receiver<Update>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = events.recv().await {
            if let Err(e) = controller.handle_update(&update).await {
                counter!("curator_event_failures_total").increment(1);
                tracing::warn!(target: "webhook", update_id = update.update_id, "event handling failed: {e:#}");
            }
        }
        tracing::info!(target: "webhook", "event queue closed, worker exiting");
    })
}

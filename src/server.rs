use axum::extract::State;
use axum::{Json, Router, routing::{get, post, put}};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

use crate::dispatcher::{ChatSnapshot, DispatchOutcome, Dispatcher};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Deserialize)]
pub struct InputBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    /// Omitted: send the pending input buffer instead.
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuickReplyBody {
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub outcome: DispatchOutcome,
    pub snapshot: ChatSnapshot,
}

async fn get_session(State(state): State<AppState>) -> Json<ChatSnapshot> {
    Json(state.dispatcher.snapshot().await)
}

async fn put_input(State(state): State<AppState>, Json(body): Json<InputBody>) -> Json<ChatSnapshot> {
    state.dispatcher.set_pending_input(&body.text).await;
    Json(state.dispatcher.snapshot().await)
}

async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageBody>,
) -> Json<DispatchResponse> {
    let outcome = match body.text {
        Some(text) => state.dispatcher.send_text(&text).await,
        None => state.dispatcher.submit_input().await,
    };
    Json(DispatchResponse { outcome, snapshot: state.dispatcher.snapshot().await })
}

async fn post_quick_reply(
    State(state): State<AppState>,
    Json(body): Json<QuickReplyBody>,
) -> Json<DispatchResponse> {
    let outcome = state.dispatcher.send_quick_reply(&body.payload).await;
    Json(DispatchResponse { outcome, snapshot: state.dispatcher.snapshot().await })
}

async fn post_reset(State(state): State<AppState>) -> Json<ChatSnapshot> {
    state.dispatcher.reset().await;
    Json(state.dispatcher.snapshot().await)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/session", get(get_session))
        .route("/v1/session/input", put(put_input))
        .route("/v1/session/messages", post(post_message))
        .route("/v1/session/quick-replies", post(post_quick_reply))
        .route("/v1/session/reset", post(post_reset))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "chat surface listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

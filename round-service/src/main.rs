// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod commands;
mod config;
mod orchestrator;
mod platform;
mod store;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    commands::{CommandInvocation, CommandReply},
    config::ServiceConfig,
    orchestrator::{ReactionEvent, ReactionOutcome, RoundOrchestrator},
    platform::{ChatPlatform, HttpChatGateway},
    store::{PinnedMessageBlob, StateStore},
};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<RoundOrchestrator>,
    /// Inbound events are handled one at a time.
    event_lock: Arc<Mutex<()>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    fn new(orchestrator: Arc<RoundOrchestrator>) -> Self {
        Self {
            orchestrator,
            event_lock: Arc::new(Mutex::new(())),
            started_at: Utc::now(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "round_service=debug,tower_http=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env()?;

    let platform: Arc<dyn ChatPlatform> = Arc::new(HttpChatGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_token.clone(),
    ));
    let blob = PinnedMessageBlob::new(
        platform.clone(),
        config.state_channel_id,
        config.history_limit,
    );
    let store = Arc::new(StateStore::new(Arc::new(blob)));

    match store.load().await {
        Ok(envelope) => info!(
            game_id = envelope.state.game_id,
            round = envelope.state.round,
            theo_points = envelope.state.theo_points,
            rose_points = envelope.state.rose_points,
            round_open = envelope.state.round_open,
            "game state loaded"
        ),
        Err(error) => warn!(error = %error, "initial state load failed; retrying on first event"),
    }

    let orchestrator = Arc::new(RoundOrchestrator::new(
        store,
        platform,
        config.announce_channel_id,
    ));
    let app = build_router(AppState::new(orchestrator));

    info!(bind_addr = %config.bind_addr, "round-service listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(error = %error, "failed to listen for shutdown signal");
            }
            info!("round-service shutting down");
        })
        .await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/commands", post(command_handler))
        .route("/v1/events/reaction-added", post(reaction_added_handler))
        .route("/v1/events/reaction-removed", post(reaction_removed_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "round-service",
        "started_at": state.started_at,
    }))
}

async fn command_handler(
    State(state): State<AppState>,
    Json(invocation): Json<CommandInvocation>,
) -> Json<CommandReply> {
    let _guard = state.event_lock.lock().await;
    info!(
        command = %invocation.command,
        user_id = invocation.user_id,
        channel_id = invocation.channel_id,
        "command received"
    );
    Json(commands::dispatch(&state.orchestrator, &invocation).await)
}

async fn reaction_added_handler(
    State(state): State<AppState>,
    Json(event): Json<ReactionEvent>,
) -> Result<Json<ReactionOutcome>, ApiError> {
    let _guard = state.event_lock.lock().await;
    state
        .orchestrator
        .on_reaction(&event)
        .await
        .map(Json)
        .map_err(|error| ApiError::bad_gateway(format!("{error:#}")))
}

async fn reaction_removed_handler(Json(event): Json<ReactionEvent>) -> Json<serde_json::Value> {
    info!(
        message_id = event.message_id,
        selector = %event.selector,
        "reaction removal ignored"
    );
    Json(serde_json::json!({"outcome": "ignored", "reason": "REACTION_REMOVED"}))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

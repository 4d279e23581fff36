//! The agent REST surface and the spectator WebSocket route.
//!
//! Workers here never touch match state directly: reads come from the
//! published `WorldView`, writes go over the command channel. Rejections
//! are validated against the current snapshot; the authoritative truth is
//! whatever the next broadcast says.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config;
use crate::game::lifecycle::Command;
use crate::game::player::Action;
use crate::game::snapshot::{agent_view, WorldView};
use crate::game::Phase;
use crate::msg::api::{
    ActionRequest, ActionResponse, ErrorKind, ErrorResponse, JoinRequest, JoinResponse,
    StatusMatchInfo, StatusNextMatch, StatusResponse,
};
use crate::msg::events::WsEvent;
use crate::net::auth::IdentityVerifier;
use crate::net::rate_limit::RateLimiter;
use crate::net::ws::spectator_socket;

#[derive(Clone)]
pub struct AppState {
    pub cmd_tx: mpsc::UnboundedSender<Command>,
    pub view_rx: watch::Receiver<Arc<WorldView>>,
    pub events_tx: broadcast::Sender<WsEvent>,
    pub verifier: Arc<IdentityVerifier>,
    pub limiter: Arc<RateLimiter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/join", post(join))
        .route("/state", get(agent_state))
        .route("/action", post(action))
        .route("/spectator", get(spectator))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Failure plumbing ────────────────────────────────────────────────

#[derive(Debug)]
struct ApiFailure {
    kind: ErrorKind,
    retry_after_ms: Option<u64>,
}

impl From<ErrorKind> for ApiFailure {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, retry_after_ms: None }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
        let body = ErrorResponse {
            success: false,
            error: self.kind.as_str(),
            message: self.kind.message(),
            retry_after_ms: self.retry_after_ms,
        };
        (status, Json(body)).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<String, ApiFailure> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ErrorKind::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").unwrap_or("").trim();
    if token.is_empty() {
        return Err(ErrorKind::Unauthorized.into());
    }
    Ok(token.to_string())
}

// ─── Routes ──────────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let view = state.view_rx.borrow().clone();
    let current_match = view.has_match().then(|| StatusMatchInfo {
        id: view.match_id.clone(),
        phase: view.phase.as_str().to_string(),
        player_count: view.snapshot.players.len(),
        starts_at: view.starts_at_ms,
    });
    let next_match = match (&view.next_match_id, view.lobby_opens_at_ms) {
        (Some(id), Some(opens)) => Some(StatusNextMatch {
            id: id.clone(),
            lobby_opens_at: opens,
            starts_at: None,
        }),
        _ => None,
    };
    Json(StatusResponse {
        server_time: config::now_ms(),
        current_match,
        next_match,
    })
}

async fn join(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<JoinResponse>, ApiFailure> {
    let token = bearer_token(&headers)?;
    let identity = state.verifier.verify(&token).await.ok_or(ErrorKind::InvalidApiKey)?;
    // The body is entirely optional; a bare POST joins with defaults.
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let (reply, reply_rx) = oneshot::channel();
    state
        .cmd_tx
        .send(Command::Join {
            api_key: token,
            agent_name: identity.name,
            wallet: identity.wallet,
            display_name: req.display_name,
            strategy: req.strategy_tag,
            character_id: req.character_id,
            reply,
        })
        .map_err(|_| ErrorKind::InternalError)?;

    // The tick loop answers within one tick; anything longer is a stall.
    let outcome = tokio::time::timeout(Duration::from_secs(2), reply_rx)
        .await
        .map_err(|_| {
            warn!("Join reply timed out");
            ErrorKind::InternalError
        })?
        .map_err(|_| ErrorKind::InternalError)?;

    let ok = outcome.map_err(ApiFailure::from)?;
    Ok(Json(JoinResponse {
        success: true,
        player_id: ok.player_id,
        match_id: ok.match_id,
        message: "joined".to_string(),
        starts_at: ok.starts_at_ms,
    }))
}

async fn agent_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let token = bearer_token(&headers)?;
    state.verifier.verify(&token).await.ok_or(ErrorKind::InvalidApiKey)?;

    let view = state.view_rx.borrow().clone();
    if !view.has_match() {
        return Err(ErrorKind::NoMatch.into());
    }
    let player_id = view.key_to_player.get(&token).ok_or(ErrorKind::NotInMatch)?;
    let projection = agent_view(&view.snapshot, player_id).ok_or(ErrorKind::NotInMatch)?;
    Ok(Json(projection).into_response())
}

async fn action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiFailure> {
    let token = bearer_token(&headers)?;
    state.verifier.verify(&token).await.ok_or(ErrorKind::InvalidApiKey)?;

    if let Err(retry) = state.limiter.check(&token, config::now_ms()) {
        return Err(ApiFailure {
            kind: ErrorKind::RateLimited,
            retry_after_ms: Some(retry.retry_after_ms),
        });
    }

    let Json(req) = body.map_err(|_| ErrorKind::InvalidAction)?;

    let view = state.view_rx.borrow().clone();
    if !view.has_match() {
        return Err(ErrorKind::NoMatch.into());
    }
    let player_id = view.key_to_player.get(&token).ok_or(ErrorKind::NotInMatch)?.clone();
    if view.phase != Phase::Active {
        return Err(ErrorKind::MatchNotActive.into());
    }
    let me = view.player_snapshot(&player_id).ok_or(ErrorKind::NotInMatch)?;
    if !me.alive {
        return Err(if me.lives == 0 { ErrorKind::Eliminated } else { ErrorKind::Dead }.into());
    }

    let action = parse_action(&req)?;
    state
        .cmd_tx
        .send(Command::Action { player_id, action })
        .map_err(|_| ErrorKind::InternalError)?;
    Ok(Json(ActionResponse { success: true }))
}

/// Wire angles are degrees; the simulation runs in radians.
fn parse_action(req: &ActionRequest) -> Result<Action, ApiFailure> {
    let finite_rad = |deg: Option<f64>| -> Result<f64, ApiFailure> {
        let deg = deg.ok_or(ErrorKind::InvalidAction)?;
        if !deg.is_finite() {
            return Err(ErrorKind::InvalidAction.into());
        }
        Ok(deg.to_radians())
    };

    match req.action.as_str() {
        "move" if req.move_flag == Some(false) => Ok(Action::Stop),
        "move" => Ok(Action::Move(finite_rad(req.angle)?)),
        "shoot" => Ok(Action::Shoot(finite_rad(req.aim_angle)?)),
        "melee" => Ok(Action::Melee),
        "pickup" => Ok(Action::Pickup),
        "stop" => Ok(Action::Stop),
        _ => Err(ErrorKind::InvalidAction.into()),
    }
}

async fn spectator(State(state): State<AppState>) -> Result<Response, ApiFailure> {
    let view = state.view_rx.borrow().clone();
    if !view.has_match() {
        return Err(ErrorKind::NoMatch.into());
    }
    Ok(Json(view.snapshot.clone()).into_response())
}

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let events_rx = state.events_tx.subscribe();
    let initial = state.view_rx.borrow().clone();
    upgrade.on_upgrade(move |socket| spectator_socket(socket, events_rx, initial))
}

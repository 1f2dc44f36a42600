//! HTTP route definitions

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{
    MatchError, MatchHandle, MatchSnapshot, ParticipantSnapshot, RawMoveEvent,
};
use crate::game::registry::MatchSummary;
use crate::pose::{DetectedMove, RawKeypoint};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // No configured origins means any origin, which rules out credentials
    let allowed_origins: Vec<HeaderValue> = state
        .config
        .client_origins
        .iter()
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();
    let cors = if allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(allowed_origins).allow_credentials(true)
    };

    let match_routes = Router::new()
        .route("/matches", get(list_matches_handler).post(create_match_handler))
        .route(
            "/matches/:id",
            get(snapshot_handler).delete(remove_match_handler),
        )
        .route("/matches/:id/participants", post(register_handler))
        .route(
            "/matches/:id/participants/:pid",
            delete(deregister_handler),
        )
        .route("/matches/:id/start", post(start_handler))
        .route("/matches/:id/pause", post(pause_handler))
        .route("/matches/:id/resume", post(resume_handler))
        .route("/matches/:id/finish", post(finish_handler))
        .route("/matches/:id/reset", post(reset_handler))
        .route("/matches/:id/score", get(score_handler))
        .route("/matches/:id/pose", post(pose_handler))
        .route("/matches/:id/actions", post(actions_handler))
        .route("/matches/:id/ws", get(ws_handler));

    Router::new()
        .route("/health", get(health_handler))
        .merge(match_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn lookup(state: &AppState, id: Uuid) -> Result<MatchHandle, AppError> {
    state
        .match_registry
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Match not found: {}", id)))
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    total_participants: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        total_participants: state.match_registry.total_participants(),
    })
}

// ============================================================================
// Match lifecycle endpoints
// ============================================================================

async fn list_matches_handler(State(state): State<AppState>) -> Json<Vec<MatchSummary>> {
    Json(state.match_registry.list())
}

async fn create_match_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<MatchSnapshot>) {
    let handle = state.match_registry.create();
    (StatusCode::CREATED, Json(handle.snapshot()))
}

async fn snapshot_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lookup(&state, id)?.snapshot()))
}

async fn remove_match_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .match_registry
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| AppError::NotFound(format!("Match not found: {}", id)))
}

async fn start_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lookup(&state, id)?.start()?))
}

async fn pause_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lookup(&state, id)?.pause()))
}

async fn resume_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lookup(&state, id)?.resume()))
}

async fn finish_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lookup(&state, id)?.finish()))
}

async fn reset_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lookup(&state, id)?.reset()))
}

async fn score_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BTreeMap<String, u32>>, AppError> {
    Ok(Json(lookup(&state, id)?.scores()))
}

// ============================================================================
// Participant endpoints
// ============================================================================

#[derive(Deserialize)]
struct RegisterRequest {
    id: String,
    name: String,
}

async fn register_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ParticipantSnapshot>), AppError> {
    if req.id.trim().is_empty() {
        return Err(AppError::BadRequest("Participant id must not be empty".to_string()));
    }

    let participant = lookup(&state, id)?.register(&req.id, &req.name)?;
    Ok((StatusCode::CREATED, Json(ParticipantSnapshot::from(&participant))))
}

async fn deregister_handler(
    State(state): State<AppState>,
    Path((id, participant_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    if lookup(&state, id)?.deregister(&participant_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(MatchError::UnknownParticipant(participant_id).into())
    }
}

// ============================================================================
// Telemetry endpoints
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoseRequest {
    #[serde(alias = "participant_id", alias = "player_id")]
    participant_id: String,
    #[serde(default)]
    keypoints: Vec<RawKeypoint>,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoseResponse {
    actions: Vec<DetectedMove>,
    game_state: MatchSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
}

async fn pose_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PoseRequest>,
) -> Result<Json<PoseResponse>, AppError> {
    let (actions, game_state) = lookup(&state, id)?.submit_pose(&req.participant_id, &req.keypoints);

    Ok(Json(PoseResponse {
        actions,
        game_state,
        timestamp: req.timestamp,
    }))
}

#[derive(Deserialize)]
struct ActionsRequest {
    actions: Vec<RawMoveEvent>,
}

async fn actions_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionsRequest>,
) -> Result<Json<MatchSnapshot>, AppError> {
    let handle = lookup(&state, id)?;
    let snapshot = handle.submit_actions(None, &req.actions)?;
    info!(match_id = %id, count = req.actions.len(), "Applied action batch");
    Ok(Json(snapshot))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<MatchError> for AppError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::InsufficientParticipants
            | MatchError::UnrecognizedMove(_)
            | MatchError::MissingActor => AppError::BadRequest(err.to_string()),
            MatchError::DuplicateParticipant(_) => AppError::Conflict(err.to_string()),
            MatchError::UnknownParticipant(_) => AppError::NotFound(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;

    fn router() -> Router {
        build_router(AppState::new(Config::default()))
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_match(router: &Router) -> String {
        let (status, body) = call(router, Method::POST, "/matches", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["matchId"].as_str().unwrap().to_string()
    }

    async fn register(router: &Router, match_id: &str, id: &str) -> StatusCode {
        let uri = format!("/matches/{}/participants", match_id);
        call(router, Method::POST, &uri, Some(json!({"id": id, "name": id}))).await.0
    }

    #[tokio::test]
    async fn test_health() {
        let router = router();
        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_matches"], 0);
    }

    #[tokio::test]
    async fn test_create_and_fetch_match() {
        let router = router();
        let match_id = create_match(&router).await;

        let (status, body) = call(&router, Method::GET, &format!("/matches/{}", match_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "waiting");
        assert_eq!(body["currentRound"], 1);

        let (_, list) = call(&router, Method::GET, "/matches", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_match_is_404() {
        let router = router();
        let uri = format!("/matches/{}", Uuid::new_v4());
        let (status, body) = call(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("Match not found"));
    }

    #[tokio::test]
    async fn test_start_without_participants_is_400() {
        let router = router();
        let match_id = create_match(&router).await;
        let (status, _) = call(&router, Method::POST, &format!("/matches/{}/start", match_id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_409() {
        let router = router();
        let match_id = create_match(&router).await;
        assert_eq!(register(&router, &match_id, "p1").await, StatusCode::CREATED);
        assert_eq!(register(&router, &match_id, "p1").await, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_action_flow_to_knockout() {
        let router = router();
        let match_id = create_match(&router).await;
        register(&router, &match_id, "p1").await;
        register(&router, &match_id, "p2").await;

        let (status, body) = call(&router, Method::POST, &format!("/matches/{}/start", match_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "playing");

        let actions: Vec<Value> = (0..4)
            .map(|_| json!({"playerId": "p1", "move": "uppercut", "confidence": 1.0}))
            .collect();
        let uri = format!("/matches/{}/actions", match_id);
        let (status, body) = call(&router, Method::POST, &uri, Some(json!({"actions": actions}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "finished");

        let (_, scores) = call(&router, Method::GET, &format!("/matches/{}/score", match_id), None).await;
        assert_eq!(scores["p1"], 150);
        assert_eq!(scores["p2"], 0);
    }

    #[tokio::test]
    async fn test_unrecognized_move_rejects_batch() {
        let router = router();
        let match_id = create_match(&router).await;
        register(&router, &match_id, "p1").await;
        register(&router, &match_id, "p2").await;
        call(&router, Method::POST, &format!("/matches/{}/start", match_id), None).await;

        let uri = format!("/matches/{}/actions", match_id);
        let body = json!({"actions": [
            {"playerId": "p1", "move": "jab", "confidence": 1.0},
            {"playerId": "p1", "move": "headbutt", "confidence": 1.0}
        ]});
        let (status, _) = call(&router, Method::POST, &uri, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, snapshot) = call(&router, Method::GET, &format!("/matches/{}", match_id), None).await;
        assert_eq!(snapshot["participants"][1]["health"], 100);
    }

    #[tokio::test]
    async fn test_pose_returns_actions_and_state() {
        let router = router();
        let match_id = create_match(&router).await;
        register(&router, &match_id, "p1").await;

        let uri = format!("/matches/{}/pose", match_id);
        let body = json!({"participantId": "p1", "keypoints": [], "timestamp": 3.5});
        let (status, body) = call(&router, Method::POST, &uri, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["actions"], json!([]));
        assert_eq!(body["gameState"]["phase"], "waiting");
        assert_eq!(body["timestamp"], 3.5);
    }

    #[tokio::test]
    async fn test_deregister_unknown_is_404() {
        let router = router();
        let match_id = create_match(&router).await;
        let uri = format!("/matches/{}/participants/ghost", match_id);
        let (status, _) = call(&router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_remove_match() {
        let router = router();
        let match_id = create_match(&router).await;
        let uri = format!("/matches/{}", match_id);
        assert_eq!(call(&router, Method::DELETE, &uri, None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(call(&router, Method::GET, &uri, None).await.0, StatusCode::NOT_FOUND);
    }
}

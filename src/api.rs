//! HTTP API endpoints.
//!
//! Session lifecycle, progress, leaderboards and client error reports. Game
//! mutations also fan out over the realtime channel; these endpoints only
//! answer the caller.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{GameError, GameResult};
use crate::metrics::{self, MetricsSnapshot};
use crate::reports::{Category, ClientErrorReport, ErrorReportStats, Severity};
use crate::state::{AppState, RankCategory};
use crate::types::*;
use crate::validation::ValidationError;
use crate::ws;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub mode: GameMode,
    #[serde(default)]
    pub theme: Option<String>,
    pub player_id: PlayerId,
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    pub player_id: PlayerId,
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponseRequest {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub response: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextDoorQuery {
    pub player_id: PlayerId,
    #[serde(default)]
    pub current_score: u32,
}

#[derive(Debug, Deserialize)]
pub struct RankQuery {
    pub category: RankCategory,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub session: GameSession,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorResponse {
    pub success: bool,
    pub door: Door,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponseResponse {
    pub success: bool,
    pub response: PlayerResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub success: bool,
    pub progress: SessionProgress,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLeaderboardResponse {
    pub success: bool,
    pub leaderboard: Vec<PlayerProgress>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLeaderboardResponse {
    pub success: bool,
    pub leaderboard: GlobalLeaderboard,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStatsResponse {
    pub success: bool,
    pub stats: LeaderboardStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRankResponse {
    pub success: bool,
    pub player_id: PlayerId,
    /// 1-based; absent when the player has no entry in the category
    pub rank: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportResponse {
    pub success: bool,
    pub report_id: String,
    pub severity: Severity,
    pub category: Category,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatsResponse {
    pub success: bool,
    pub stats: ErrorReportStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusResponse {
    pub success: bool,
    pub session_id: SessionId,
    pub active_players: Vec<PlayerId>,
    pub subscribers: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        active_sessions: state.sessions.read().await.len(),
    })
}

/// GET /metrics
pub async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /api
pub async fn api_info() -> Json<ApiInfo> {
    Json(ApiInfo {
        message: "DumDoors Game API",
        version: env!("CARGO_PKG_VERSION"),
        status: "ready",
    })
}

/// Create a session with the caller as its first player.
///
/// POST /api/game/create
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> GameResult<(StatusCode, Json<SessionResponse>)> {
    let session = state
        .create_session(req.mode, &req.player_id, &req.username, req.theme)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            success: true,
            session,
        }),
    ))
}

/// POST /api/game/join/{sessionId}
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<JoinSessionRequest>,
) -> GameResult<Json<SessionResponse>> {
    let session = state
        .join_session(&session_id, &req.player_id, &req.username)
        .await?;
    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

/// GET /api/game/status/{sessionId}
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> GameResult<Json<SessionResponse>> {
    let session = state.get_session(&session_id).await?;
    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

/// POST /api/game/start/{sessionId}
pub async fn start_game(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> GameResult<Json<MessageResponse>> {
    state.start_game(&session_id).await?;
    Ok(MessageResponse::ok("Game started successfully"))
}

/// POST /api/game/start-with-door/{sessionId}
pub async fn start_game_with_door(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> GameResult<Json<MessageResponse>> {
    state.start_game_with_first_door(&session_id).await?;
    Ok(MessageResponse::ok("Game started and first door presented"))
}

/// Pick a door for a player, adjusting difficulty by their last score.
///
/// GET /api/game/next-door?playerId=..&currentScore=..
pub async fn next_door(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextDoorQuery>,
) -> Json<DoorResponse> {
    let door = state.next_door(&query.player_id, query.current_score).await;
    Json(DoorResponse {
        success: true,
        door,
    })
}

/// POST /api/game/submit-response
pub async fn submit_response(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitResponseRequest>,
) -> GameResult<Json<SubmitResponseResponse>> {
    let response = state
        .submit_response(&req.session_id, &req.player_id, &req.response)
        .await?;
    Ok(Json(SubmitResponseResponse {
        success: true,
        response,
    }))
}

/// GET /api/game/progress/{sessionId}
pub async fn session_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> GameResult<Json<ProgressResponse>> {
    let progress = state.session_progress(&session_id).await?;
    Ok(Json(ProgressResponse {
        success: true,
        progress,
    }))
}

/// GET /api/game/leaderboard/{sessionId}
pub async fn session_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> GameResult<Json<SessionLeaderboardResponse>> {
    let leaderboard = state.session_leaderboard(&session_id).await?;
    Ok(Json(SessionLeaderboardResponse {
        success: true,
        leaderboard,
    }))
}

/// GET /api/leaderboard?mode=..&theme=..&limit=..
pub async fn global_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LeaderboardFilter>,
) -> Json<GlobalLeaderboardResponse> {
    Json(GlobalLeaderboardResponse {
        success: true,
        leaderboard: state.global_leaderboard(&filter).await,
    })
}

/// GET /api/leaderboard/stats
pub async fn leaderboard_stats(
    State(state): State<Arc<AppState>>,
) -> Json<LeaderboardStatsResponse> {
    Json(LeaderboardStatsResponse {
        success: true,
        stats: state.leaderboard_stats().await,
    })
}

/// GET /api/leaderboard/rank/{playerId}?category=..
pub async fn player_rank(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<PlayerId>,
    Query(query): Query<RankQuery>,
) -> Json<PlayerRankResponse> {
    let rank = state.player_rank(&player_id, query.category).await;
    Json(PlayerRankResponse {
        success: true,
        player_id,
        rank,
    })
}

/// Accept an error report from a client and classify it.
///
/// POST /api/errors
pub async fn report_error(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ClientErrorReport>,
) -> GameResult<Json<ErrorReportResponse>> {
    if report.message.trim().is_empty() {
        return Err(GameError::Validation(ValidationError::Empty));
    }

    let classified = state.error_reports.write().await.record(report);
    let severity = classified.severity;
    let category = classified.category;

    state.metrics.increment(
        metrics::CLIENT_ERROR_REPORTS_TOTAL,
        &[("severity", severity.as_str()), ("category", category.as_str())],
    );

    let message = &classified.report.message;
    let session = classified.report.session_id.as_deref().unwrap_or("-");
    match severity {
        Severity::Critical | Severity::High => tracing::error!(
            "Client error {} [{}/{}] session={}: {}",
            classified.report_id,
            severity.as_str(),
            category.as_str(),
            session,
            message
        ),
        Severity::Medium => tracing::warn!(
            "Client error {} [{}] session={}: {}",
            classified.report_id,
            category.as_str(),
            session,
            message
        ),
        Severity::Low => tracing::info!(
            "Client error {} [{}] session={}: {}",
            classified.report_id,
            category.as_str(),
            session,
            message
        ),
    }

    Ok(Json(ErrorReportResponse {
        success: true,
        report_id: classified.report_id,
        severity,
        category,
    }))
}

/// GET /api/errors/stats
pub async fn error_stats(State(state): State<Arc<AppState>>) -> Json<ErrorStatsResponse> {
    Json(ErrorStatsResponse {
        success: true,
        stats: state.error_reports.read().await.stats(),
    })
}

/// GET /api/ws/status/{sessionId}
pub async fn connection_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> GameResult<Json<ConnectionStatusResponse>> {
    state.get_session(&session_id).await?;
    Ok(Json(ConnectionStatusResponse {
        success: true,
        active_players: state.active_players(&session_id).await,
        subscribers: state.hub.subscriber_count(&session_id),
        session_id,
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(MessageResponse {
            success: false,
            message: "Route not found".to_string(),
        }),
    )
}

/// Build the application router with all routes and layers
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_snapshot))
        .route("/api", get(api_info))
        .route("/api/game/create", post(create_session))
        .route("/api/game/join/{session_id}", post(join_session))
        .route("/api/game/status/{session_id}", get(session_status))
        .route("/api/game/start/{session_id}", post(start_game))
        .route(
            "/api/game/start-with-door/{session_id}",
            post(start_game_with_door),
        )
        .route("/api/game/next-door", get(next_door))
        .route("/api/game/submit-response", post(submit_response))
        .route("/api/game/progress/{session_id}", get(session_progress))
        .route("/api/game/leaderboard/{session_id}", get(session_leaderboard))
        .route("/api/leaderboard", get(global_leaderboard))
        .route("/api/leaderboard/stats", get(leaderboard_stats))
        .route("/api/leaderboard/rank/{player_id}", get(player_rank))
        .route("/api/errors", post(report_error))
        .route("/api/errors/stats", get(error_stats))
        .route("/api/ws/connect", get(ws::ws_handler))
        .route("/api/ws/status/{session_id}", get(connection_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            metrics::track_http,
        ))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::with_config(AppConfig {
            door_time_limit: Duration::from_secs(3600),
            next_door_delay: Duration::from_secs(3600),
            ..AppConfig::default()
        }))
    }

    async fn call(
        state: &Arc<AppState>,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create(state: &Arc<AppState>, mode: &str) -> String {
        let (status, body) = call(
            state,
            "POST",
            "/api/game/create",
            Some(json!({ "mode": mode, "playerId": "alice", "username": "Alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["session"]["sessionId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (_, body) = call(&state, "GET", "/api", None).await;
        assert_eq!(body["message"], "DumDoors Game API");
    }

    #[tokio::test]
    async fn test_create_join_start_flow() {
        let state = test_state();
        let id = create(&state, "multiplayer").await;

        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/game/join/{}", id),
            Some(json!({ "playerId": "bob", "username": "Bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["players"].as_array().unwrap().len(), 2);

        let (status, _) = call(&state, "POST", &format!("/api/game/start-with-door/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, "GET", &format!("/api/game/status/{}", id), None).await;
        assert_eq!(body["session"]["status"], "active");
        assert!(body["session"]["currentDoor"].is_object());
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api/game/status/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "SESSION_NOT_FOUND");

        let id = create(&state, "single-player").await;
        let (status, body) = call(
            &state,
            "POST",
            &format!("/api/game/join/{}", id),
            Some(json!({ "playerId": "bob", "username": "Bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "SINGLE_PLAYER_TAKEN");
    }

    #[tokio::test]
    async fn test_submit_response_validates_text() {
        let state = test_state();
        let id = create(&state, "single-player").await;
        call(&state, "POST", &format!("/api/game/start-with-door/{}", id), None).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/game/submit-response",
            Some(json!({ "sessionId": id, "playerId": "alice", "response": "short" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");

        let (status, body) = call(
            &state,
            "POST",
            "/api/game/submit-response",
            Some(json!({
                "sessionId": id,
                "playerId": "alice",
                "response": "I would calmly call for help and wait"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["response"]["aiScore"].as_u64().is_some());

        let (_, body) = call(&state, "GET", &format!("/api/game/progress/{}", id), None).await;
        assert_eq!(body["progress"]["players"][0]["currentPosition"], 1);
    }

    #[tokio::test]
    async fn test_next_door_by_score() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "GET",
            "/api/game/next-door?playerId=alice&currentScore=90",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["door"]["difficulty"], 1);
    }

    #[tokio::test]
    async fn test_error_reports() {
        let state = test_state();
        let (status, body) = call(&state, "POST", "/api/errors", Some(json!({ "message": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = call(
            &state,
            "POST",
            "/api/errors",
            Some(json!({ "message": "WebSocket connection lost", "retryCount": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["severity"], "high");
        assert_eq!(body["category"], "network");

        let (_, body) = call(&state, "GET", "/api/errors/stats", None).await;
        assert_eq!(body["stats"]["total"], 1);
        assert_eq!(body["stats"]["byCategory"]["network"], 1);
    }

    #[tokio::test]
    async fn test_leaderboard_routes() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api/leaderboard?mode=single-player&limit=5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["leaderboard"]["fastestCompletions"].as_array().unwrap().is_empty());

        let (status, body) = call(&state, "GET", "/api/leaderboard/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["totalGamesCompleted"], 0);

        let (status, body) = call(&state, "GET", "/api/leaderboard/rank/alice?category=fastest", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["rank"].is_null());
    }

    #[tokio::test]
    async fn test_ws_status_and_metrics() {
        let state = test_state();
        let id = create(&state, "multiplayer").await;
        let (status, body) = call(&state, "GET", &format!("/api/ws/status/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["activePlayers"].as_array().unwrap().is_empty());

        let (_, body) = call(&state, "GET", "/metrics", None).await;
        let requests = body["counters"]
            .as_object()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(metrics::HTTP_REQUESTS_TOTAL))
            .count();
        assert!(requests >= 2);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }
}

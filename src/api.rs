//! REST API Server for the session core
//!
//! Exposes the turn/approval protocol via HTTP endpoints
//! for a chat frontend or CLI client

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::agent::{SessionController, SessionSeed};
use crate::error::{ErrorKind, SessionError};
use crate::models::Decision;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionsRequest {
    pub decisions: Vec<Decision>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutoApproveRequest {
    pub enabled: bool,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            error_kind: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(error: &SessionError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::SessionBusy | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Arity | ErrorKind::DecisionNotAllowed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ApprovalTimeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::RuntimeTransient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::IncompleteTurn | ErrorKind::Runtime => StatusCode::BAD_GATEWAY,
        ErrorKind::Store | ErrorKind::Config | ErrorKind::Serialization => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn respond<T: Serialize>(result: crate::Result<T>) -> ApiResult {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => (status_for(e.kind()), Json(ApiResponse::error(&e))),
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<SessionController>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Session Endpoints
/// =============================

async fn create_session(
    State(state): State<ApiState>,
    seed: Option<Json<SessionSeed>>,
) -> ApiResult {
    let seed = seed.map(|Json(seed)| seed).unwrap_or_default();
    respond(
        state
            .controller
            .create_session(seed)
            .await
            .map(|session_id| serde_json::json!({ "session_id": session_id })),
    )
}

async fn list_sessions(State(state): State<ApiState>) -> ApiResult {
    respond(state.controller.list_sessions().await)
}

async fn clear_session(State(state): State<ApiState>, Path(session_id): Path<String>) -> ApiResult {
    respond(
        state
            .controller
            .clear_session(&session_id)
            .await
            .map(|cleared| serde_json::json!({ "cleared": cleared })),
    )
}

async fn delete_session(State(state): State<ApiState>, Path(session_id): Path<String>) -> ApiResult {
    respond(
        state
            .controller
            .delete_session(&session_id)
            .await
            .map(|deleted| serde_json::json!({ "deleted": deleted })),
    )
}

async fn set_auto_approve(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(req): Json<AutoApproveRequest>,
) -> ApiResult {
    respond(
        state
            .controller
            .set_auto_approve(&session_id, req.enabled)
            .await
            .map(|_| serde_json::json!({ "auto_approve": req.enabled })),
    )
}

/// =============================
/// Turn Endpoints
/// =============================

async fn submit_turn(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> ApiResult {
    info!(session_id = %session_id, "Received turn");
    respond(state.controller.submit_turn(&session_id, &req.content).await)
}

async fn submit_decisions(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(req): Json<DecisionsRequest>,
) -> ApiResult {
    info!(
        session_id = %session_id,
        decision_count = req.decisions.len(),
        "Received decisions"
    );
    respond(
        state
            .controller
            .submit_decisions(&session_id, req.decisions)
            .await,
    )
}

async fn get_history(State(state): State<ApiState>, Path(session_id): Path<String>) -> ApiResult {
    respond(state.controller.get_history(&session_id).await)
}

async fn get_pending(State(state): State<ApiState>, Path(session_id): Path<String>) -> ApiResult {
    let pending = state.controller.pending(&session_id).await;
    respond(Ok(pending))
}

/// =============================
/// Router
/// =============================

pub fn create_router(controller: Arc<SessionController>) -> Router {
    let state = ApiState { controller };

    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route("/api/sessions/:id", axum::routing::delete(delete_session))
        .route("/api/sessions/:id/clear", post(clear_session))
        .route("/api/sessions/:id/auto-approve", put(set_auto_approve))
        .route("/api/sessions/:id/turns", post(submit_turn))
        .route("/api/sessions/:id/decisions", post(submit_decisions))
        .route("/api/sessions/:id/history", get(get_history))
        .route("/api/sessions/:id/pending", get(get_pending))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    controller: Arc<SessionController>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(controller);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::models::ActionRequest;
    use crate::runtime::ScriptedRuntime;
    use crate::state::InMemorySessionStore;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn router(runtime: &ScriptedRuntime) -> Router {
        let controller = SessionController::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(runtime.clone()),
            SessionConfig::default(),
        );
        create_router(Arc::new(controller))
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(&ScriptedRuntime::new());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_turn_then_history() {
        let runtime = ScriptedRuntime::new();
        runtime.push_reply("AAPL is $150.00").await;
        let app = router(&runtime);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/sessions/s1/turns",
                serde_json::json!({"content": "What's AAPL price?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["final_text"], "AAPL is $150.00");

        let response = app
            .oneshot(
                Request::get("/api/sessions/s1/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_arity_error_maps_to_422() {
        let runtime = ScriptedRuntime::new();
        runtime
            .push_interrupt(
                "thread-s1",
                vec![ActionRequest::new(
                    "update_investment_holding",
                    serde_json::json!({"ticker": "AAPL", "shares": 10}),
                )],
            )
            .await;
        let app = router(&runtime);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/sessions/s1/turns",
                serde_json::json!({"content": "Buy 10 AAPL"}),
            ))
            .await
            .unwrap();
        let body = read_json(response).await;
        assert_eq!(body["data"]["status"], "awaiting_approval");

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/sessions/s1/decisions",
                serde_json::json!({"decisions": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = read_json(response).await;
        assert_eq!(body["error_kind"], "arity");

        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/sessions/s1/turns",
                serde_json::json!({"content": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_session_without_body() {
        let app = router(&ScriptedRuntime::new());
        let response = app
            .oneshot(
                Request::post("/api/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert!(body["data"]["session_id"].is_string());
    }
}

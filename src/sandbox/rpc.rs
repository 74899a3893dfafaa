//! Bearer-authenticated HTTP surface mirroring `runtime/tool_server.py`'s
//! FastAPI routes (`POST /execute`, `POST /register_agent`, `GET /health`),
//! so an out-of-process worker can be driven identically to the in-process
//! supervised task in [`crate::sandbox::worker`].

use crate::sandbox::dispatcher::SandboxDispatcher;
use crate::sandbox::worker::ToolExecutionRequest;
use crate::AgentId;
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct RpcState {
    pub dispatcher: Arc<SandboxDispatcher>,
    pub expected_token: Arc<str>,
}

pub fn router(state: RpcState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/register_agent", post(register_agent))
        .route("/health", get(health))
        .with_state(state)
}

fn verify_token(state: &RpcState, headers: &axum::http::HeaderMap) -> Result<(), StatusCode> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let matches: bool = token.as_bytes().ct_eq(state.expected_token.as_bytes()).into();
    if matches && token.len() == state.expected_token.len() {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub agent_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub kwargs: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponseBody {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

async fn execute(
    State(state): State<RpcState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> Response {
    if let Err(status) = verify_token(&state, &headers) {
        return status.into_response();
    }

    let agent_id = AgentId::from(body.agent_id);
    let request = ToolExecutionRequest { tool_name: body.tool_name, kwargs: body.kwargs };

    match state.dispatcher.execute(&agent_id, request).await {
        Ok(response) => {
            Json(ExecuteResponseBody { result: response.result, error: response.error })
                .into_response()
        }
        Err(e) => {
            Json(ExecuteResponseBody { result: None, error: Some(e.to_string()) }).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentBody {
    pub agent_id: String,
}

async fn register_agent(
    State(state): State<RpcState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<RegisterAgentBody>,
) -> Response {
    if let Err(status) = verify_token(&state, &headers) {
        return status.into_response();
    }

    let agent_id = AgentId::from(body.agent_id.clone());
    state.dispatcher.ensure_worker(agent_id).await;
    Json(serde_json::json!({"status": "registered", "agent_id": body.agent_id})).into_response()
}

async fn health(State(state): State<RpcState>) -> Response {
    let agents = state.dispatcher.agent_ids().await;
    Json(serde_json::json!({
        "status": "healthy",
        "active_agents": agents.len(),
        "agents": agents,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::dispatcher::SandboxDispatcherConfig;
    use crate::sandbox::worker::{ToolExecutionResponse, ToolExecutor};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct EchoExecutor;

    #[async_trait::async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, tool_name: &str, _kwargs: serde_json::Value) -> ToolExecutionResponse {
            ToolExecutionResponse { result: Some(serde_json::json!(tool_name)), error: None }
        }
    }

    fn test_state() -> RpcState {
        let dispatcher = Arc::new(SandboxDispatcher::new(
            SandboxDispatcherConfig::default(),
            Arc::new(EchoExecutor),
        ));
        RpcState { dispatcher, expected_token: Arc::from("secret-token") }
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn execute_without_bearer_is_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&serde_json::json!({
                            "agent_id": "agent_1", "tool_name": "noop", "kwargs": {}
                        }))
                        .unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn execute_with_correct_bearer_succeeds() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/execute")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer secret-token")
                    .body(Body::from(
                        serde_json::to_vec(&serde_json::json!({
                            "agent_id": "agent_1", "tool_name": "noop", "kwargs": {}
                        }))
                        .unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

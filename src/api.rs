//! HTTP surface: the generate-code webhook and the health endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::errors::PipelineError;
use crate::models::TaskRequest;
use crate::pipeline::Pipeline;

pub const SERVICE_NAME: &str = "shipwright";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    /// Absent when a collaborator failed to initialize at startup; the
    /// service then answers 503 instead of crashing.
    pub pipeline: Option<Pipeline>,
    /// Shared secret for inbound requests; when unset the check is
    /// skipped (dev-mode behavior).
    pub webhook_secret: Option<String>,
    pub llm_ready: bool,
    pub github_ready: bool,
}

pub type SharedState = Arc<AppState>;

// ── Response payload types ────────────────────────────────────────────

#[derive(Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub message: String,
    pub commit_url: String,
    pub evaluation_url: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub llm_ready: bool,
    pub github_ready: bool,
}

// ── Error handling ────────────────────────────────────────────────────

/// Transport wrapper around `PipelineError`: maps the variant to a status
/// code and surfaces the raw error text to the caller unchanged.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "status": "error",
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/generate-code", post(generate_code))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn generate_code(
    State(state): State<SharedState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    if let Some(expected) = &state.webhook_secret
        && request.secret != *expected
    {
        return Err(PipelineError::Unauthorized.into());
    }

    let pipeline = state.pipeline.as_ref().ok_or(PipelineError::ServiceUnavailable(
        "missing API credentials; check server logs",
    ))?;

    let evaluation_url = request.evaluation_url.clone();
    let outcome = pipeline.process(request).await.map_err(|e| {
        tracing::error!("request failed: {}", e);
        ApiError(e)
    })?;

    Ok(Json(GenerateResponse {
        status: "success",
        message: format!(
            "Code generated and deployed successfully to {}",
            outcome.repo_url
        ),
        commit_url: if outcome.pages_url.is_empty() {
            outcome.repo_url
        } else {
            outcome.pages_url
        },
        evaluation_url,
    }))
}

async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let ready = state.llm_ready && state.github_ready;
    Json(HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        service: SERVICE_NAME,
        llm_ready: state.llm_ready,
        github_ready: state.github_ready,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbHandle, TaskStore};
    use crate::pipeline::test_support::{
        MockGenerator, MockNotifier, MockRepoHost, VALID_HTML,
    };
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn mock_pipeline() -> Pipeline {
        Pipeline::new(
            DbHandle::new(TaskStore::new_in_memory().unwrap()),
            Arc::new(MockGenerator::returning(VALID_HTML)),
            Arc::new(MockRepoHost::new()),
            Arc::new(MockNotifier::new(true)),
        )
    }

    fn router_with(state: AppState) -> Router {
        api_router().with_state(Arc::new(state))
    }

    fn ready_router(webhook_secret: Option<&str>) -> Router {
        router_with(AppState {
            pipeline: Some(mock_pipeline()),
            webhook_secret: webhook_secret.map(String::from),
            llm_ready: true,
            github_ready: true,
        })
    }

    fn task_body(round: u32, secret: &str) -> String {
        serde_json::json!({
            "email": "dev@example.com",
            "secret": secret,
            "task": "abc",
            "round": round,
            "nonce": "n-1",
            "brief": "build a todo app",
            "checks": ["has an input"],
            "evaluation_url": "https://eval.example.com/hook"
        })
        .to_string()
    }

    fn post_generate(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate-code")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_when_ready() {
        let app = ready_router(None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "shipwright");
    }

    #[tokio::test]
    async fn health_reports_degraded_when_client_missing() {
        let app = router_with(AppState {
            pipeline: None,
            webhook_secret: None,
            llm_ready: false,
            github_ready: true,
        });
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["llm_ready"], false);
    }

    #[tokio::test]
    async fn successful_build_returns_urls() {
        let app = ready_router(None);
        let response = app.oneshot(post_generate(task_body(1, "any"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(
            body["commit_url"],
            "https://octocat.github.io/llm-app-abc/"
        );
        assert_eq!(body["evaluation_url"], "https://eval.example.com/hook");
    }

    #[tokio::test]
    async fn secret_mismatch_is_unauthorized() {
        let app = ready_router(Some("expected"));
        let response = app
            .oneshot(post_generate(task_body(1, "wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn matching_secret_is_accepted() {
        let app = ready_router(Some("expected"));
        let response = app
            .oneshot(post_generate(task_body(1, "expected")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_configured_secret_skips_the_check() {
        let app = ready_router(None);
        let response = app
            .oneshot(post_generate(task_body(1, "anything-goes")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_round_is_bad_request_with_detail() {
        let app = ready_router(None);
        let response = app.oneshot(post_generate(task_body(3, "s"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(
            body["detail"]
                .as_str()
                .unwrap()
                .contains("invalid round 3")
        );
    }

    #[tokio::test]
    async fn uninitialized_service_returns_503() {
        let app = router_with(AppState {
            pipeline: None,
            webhook_secret: None,
            llm_ready: false,
            github_ready: false,
        });
        let response = app.oneshot(post_generate(task_body(1, "s"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn revise_without_baseline_is_not_found() {
        let app = ready_router(None);
        let response = app.oneshot(post_generate(task_body(2, "s"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("abc"));
    }
}

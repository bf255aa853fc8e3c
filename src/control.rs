//! Local HTTP surface the dashboard uses to steer the runner.

use crate::models::{ApiError, AutomationTask, ListingSnapshot, Platform};
use crate::optimizer::{self, OptimizedContent, PlatformPrice};
use crate::runner::{RunnerError, TaskRunner};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{self, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
struct ControlState {
    runner: Arc<TaskRunner>,
    token: Option<Arc<str>>,
    prometheus: PrometheusHandle,
}

pub fn router(runner: Arc<TaskRunner>, prometheus: PrometheusHandle) -> Router {
    let token = runner.config().control_token.as_deref().map(Arc::from);
    let state = ControlState {
        runner,
        token,
        prometheus,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route("/status", get(status))
        .route("/metrics", get(metrics_endpoint))
        .route("/runner/pause", post(pause))
        .route("/runner/resume", post(resume))
        .route("/tasks/pending", get(pending_tasks))
        .route("/tasks/history", get(task_history))
        .route("/tasks/{id}", delete(cancel_task))
        .route("/platforms/{platform}/login", post(open_login))
        .route("/platforms/{platform}/session", get(check_session))
        .route("/optimize/{platform}", post(preview_listing))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_control_token,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn require_control_token(
    State(state): State<ControlState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };
    match bearer_token(request.headers()).map(|presented| presented == expected) {
        Some(true) => next.run(request).await,
        Some(false) => AppError::Unauthorized("Token not recognized").into_response(),
        None => AppError::Unauthorized("Provide a Bearer token").into_response(),
    }
}

fn bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    let raw = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    if raw.len() >= 7 && raw[..6].eq_ignore_ascii_case("bearer") {
        Some(raw[6..].trim())
    } else {
        None
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "reseller-companion",
    }))
}

async fn metrics_endpoint(State(state): State<ControlState>) -> impl IntoResponse {
    (
        [(http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    running: bool,
    paused: bool,
    sessions: HashMap<Platform, Option<bool>>,
}

async fn status(State(state): State<ControlState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: state.runner.is_running().await,
        paused: state.runner.is_paused(),
        sessions: state.runner.session_states().await.into_iter().collect(),
    })
}

async fn pause(State(state): State<ControlState>) -> Json<StatusResponse> {
    state.runner.pause();
    status(State(state)).await
}

async fn resume(State(state): State<ControlState>) -> Json<StatusResponse> {
    state.runner.resume();
    status(State(state)).await
}

async fn pending_tasks(
    State(state): State<ControlState>,
) -> Result<Json<Vec<AutomationTask>>, AppError> {
    Ok(Json(state.runner.pending_tasks().await?))
}

async fn task_history(State(state): State<ControlState>) -> Json<Vec<AutomationTask>> {
    Json(state.runner.history().await)
}

/// Removes a task that has not started yet. Running or finished tasks are
/// left alone and reported as not found.
async fn cancel_task(
    State(state): State<ControlState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("invalid_task_id", id))?;
    if state.runner.cancel_task(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(id))
    }
}

async fn open_login(
    State(state): State<ControlState>,
    Path(platform): Path<String>,
) -> Result<StatusCode, AppError> {
    let platform = parse_platform(platform)?;
    state.runner.login_to_platform(platform).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn check_session(
    State(state): State<ControlState>,
    Path(platform): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let platform = parse_platform(platform)?;
    let logged_in = state.runner.check_session(platform).await?;
    Ok(Json(json!({ "platform": platform, "logged_in": logged_in })))
}

#[derive(Debug, Serialize)]
struct PreviewResponse {
    content: OptimizedContent,
    pricing: PlatformPrice,
}

/// Shows what a post task would type into the form, without a browser.
async fn preview_listing(
    Path(platform): Path<String>,
    Json(listing): Json<ListingSnapshot>,
) -> Result<Json<PreviewResponse>, AppError> {
    let platform = parse_platform(platform)?;
    Ok(Json(PreviewResponse {
        content: optimizer::optimize(platform, &listing),
        pricing: optimizer::platform_price(listing.base_price, &listing.currency, platform),
    }))
}

fn parse_platform(raw: String) -> Result<Platform, AppError> {
    Platform::parse(&raw).ok_or(AppError::BadRequest("unknown_platform", raw))
}

#[derive(Debug)]
enum AppError {
    Runner(RunnerError),
    BadRequest(&'static str, String),
    NotFound(Uuid),
    Unauthorized(&'static str),
}

impl From<RunnerError> for AppError {
    fn from(value: RunnerError) -> Self {
        Self::Runner(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match self {
            AppError::Runner(RunnerError::NotRunning) => (
                StatusCode::CONFLICT,
                "runner_not_running",
                "start the runner first".to_string(),
            ),
            AppError::Runner(RunnerError::Store(err)) => {
                warn!(target = "reseller.control", error = %err, "store request failed");
                (StatusCode::BAD_GATEWAY, "store_unavailable", err.to_string())
            }
            AppError::Runner(err) => {
                warn!(target = "reseller.control", error = %err, "browser action failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "browser_error", err.to_string())
            }
            AppError::BadRequest(code, value) => (StatusCode::BAD_REQUEST, code, value),
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "task_not_pending",
                format!("no pending task {id}"),
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                message.to_string(),
            ),
        };
        let payload = ApiError {
            error: code.to_string(),
            detail: Some(detail),
        };
        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserConfig, HttpTimeouts, RunnerConfig};
    use crate::models::TaskPayload;
    use crate::runner::RunnerContext;
    use crate::testing::{MemoryTaskStore, MockLauncher, MockSite};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(store: &Arc<MemoryTaskStore>, token: Option<&str>) -> (Router, Arc<TaskRunner>) {
        let config = RunnerConfig {
            supabase_url: "https://project.supabase.co".into(),
            supabase_key: "service-key".into(),
            user_id: None,
            browser: BrowserConfig::default(),
            poll_interval: Duration::from_secs(3600),
            form_timeout: Duration::from_millis(50),
            control_addr: ([127, 0, 0, 1], 0).into(),
            control_token: token.map(str::to_string),
            http: HttpTimeouts::default(),
        };
        let runner = Arc::new(TaskRunner::new(RunnerContext {
            config: Arc::new(config),
            store: store.clone(),
            launcher: MockLauncher::new(MockSite::new()),
        }));
        let prometheus = PrometheusBuilder::new().build_recorder().handle();
        (router(runner.clone(), prometheus), runner)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let (app, _) = app(&MemoryTaskStore::new(), Some("secret"));
        let response = app.oneshot(request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn token_guards_control_routes() {
        let (app, _) = app(&MemoryTaskStore::new(), Some("secret"));
        let response = app
            .clone()
            .oneshot(request("GET", "/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "unauthorized");

        let authorized = Request::builder()
            .uri("/status")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(authorized).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_sit_behind_the_token() {
        let (app, _) = app(&MemoryTaskStore::new(), Some("secret"));
        let response = app
            .clone()
            .oneshot(request("GET", "/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let authorized = Request::builder()
            .uri("/metrics")
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(authorized).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[http::header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn pause_and_resume_flip_status() {
        let (app, runner) = app(&MemoryTaskStore::new(), None);
        let response = app
            .clone()
            .oneshot(request("POST", "/runner/pause"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["paused"], true);
        assert_eq!(body["running"], false);
        assert_eq!(body["sessions"]["grailed"], serde_json::Value::Null);
        assert!(runner.is_paused());

        app.oneshot(request("POST", "/runner/resume")).await.unwrap();
        assert!(!runner.is_paused());
    }

    #[tokio::test]
    async fn cancel_only_removes_pending_tasks() {
        let store = MemoryTaskStore::new();
        let id = store.enqueue("vinted", "delist", TaskPayload::default());
        let (app, _) = app(&store, None);

        let listed = json_body(
            app.clone()
                .oneshot(request("GET", "/tasks/pending"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listed[0]["id"], id.to_string());

        let uri = format!("/tasks/{id}");
        let response = app.clone().oneshot(request("DELETE", &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.clone().oneshot(request("DELETE", &uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app
            .oneshot(request("DELETE", "/tasks/not-a-uuid"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn platform_routes_validate_and_need_a_running_browser() {
        let (app, _) = app(&MemoryTaskStore::new(), None);
        let response = app
            .clone()
            .oneshot(request("POST", "/platforms/depop/login"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "unknown_platform");

        let response = app
            .oneshot(request("GET", "/platforms/vinted/session"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn preview_returns_copy_and_pricing() {
        let (app, _) = app(&MemoryTaskStore::new(), None);
        let body = json!({
            "title": "Jacket",
            "brand": "Nike",
            "base_price": 100.0,
            "currency": "USD",
            "condition": "good"
        });
        let request = Request::builder()
            .method("POST")
            .uri("/optimize/plick")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["content"]["title"], "Nike Jacket");
        assert_eq!(body["pricing"]["price"], 1050);
        assert_eq!(body["pricing"]["currency"], "SEK");
        assert_eq!(body["pricing"]["net_earnings"], 945);
    }

    #[tokio::test]
    async fn session_route_reports_login_state() {
        let (app, runner) = app(&MemoryTaskStore::new(), None);
        runner.start().await.unwrap();
        let response = app
            .oneshot(request("GET", "/platforms/plick/session"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body, json!({ "platform": "plick", "logged_in": true }));
        runner.stop().await.unwrap();
    }
}

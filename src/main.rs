mod audit;
mod context;
mod draft;
mod http;
mod idempotency;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod prompts;
mod resolve;
mod scrape;
mod store;
#[cfg(test)]
mod testing;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use eyre::WrapErr;
use idempotency::{Claim, IdempotencyCache};
use models::{ApiError, GenerateResponse, GenerationRequest};
use once_cell::sync::Lazy;
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

static OPENAPI: Lazy<Value> = Lazy::new(|| {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
});

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    if let Err(err) = run().await {
        error!(target = "estate.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let state = AppState::from_env();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    info!(target = "estate.api", "listening on {addr}");

    axum::serve(listener, app(state, body_limit_from_env()).into_make_service())
        .await
        .wrap_err("server error")?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    idempotency: Arc<IdempotencyCache>,
    docs_key: Option<String>,
}

impl AppState {
    fn from_env() -> Self {
        Self {
            pipeline: Pipeline::from_env(),
            idempotency: Arc::new(IdempotencyCache::from_env()),
            docs_key: std::env::var("OPENAPI_KEY").ok().filter(|k| !k.is_empty()),
        }
    }
}

fn app(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_json))
        .route("/ai/generate-project", post(generate_project))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns `status` and `service`.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "estate-draft-api",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    if let Some(key) = &state.docs_key {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Unauthorized);
        }
    }
    Ok(Json(OPENAPI.clone()))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

/// Generate a draft project listing from a URL, pasted text, or a name.
///
/// - Method: `POST`
/// - Path: `/ai/generate-project`
/// - Body: `GenerationRequest` (`projectName`, `location`, `rawText`, `url`, `preview`)
/// - Response: `GenerateResponse`; `projectId` only when the draft was saved
/// - Optional `Idempotency-Key` header replays the first response for that key;
///   409 while the first request is running, 422 if the body differs
async fn generate_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GenerationRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    crate::metrics::inc_requests("/ai/generate-project");
    info!(
        target = "estate.api",
        preview = payload.preview,
        has_url = payload.url.is_some(),
        has_raw_text = payload.raw_text.is_some(),
        has_project_name = payload.project_name.is_some(),
        "generate_project_request"
    );

    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let fingerprint = idempotency::fingerprint(&payload);
    if let Some(key) = &key {
        match state.idempotency.begin(key, &fingerprint).await {
            Claim::Claimed => crate::metrics::idempotency_outcome("claimed"),
            Claim::Replay(existing) => {
                crate::metrics::idempotency_outcome("replayed");
                info!(target = "estate.api", idempotency_key = %key, "idempotent_replay");
                return Ok(Json(*existing));
            }
            Claim::InFlight => {
                crate::metrics::idempotency_outcome("in_flight");
                return Err(AppError::Idempotency(
                    StatusCode::CONFLICT,
                    "A request with this Idempotency-Key is still in progress",
                ));
            }
            Claim::Mismatch => {
                crate::metrics::idempotency_outcome("mismatch");
                return Err(AppError::Idempotency(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "This Idempotency-Key was used with a different request body",
                ));
            }
        }
    }

    // The attempt runs on its own task so it still finishes, is audited and
    // settles its idempotency key when the client goes away mid-request.
    let pipeline = state.pipeline.clone();
    let cache = state.idempotency.clone();
    let attempt = tokio::spawn(async move {
        let outcome = pipeline.run_supervised(payload).await;
        if let Some(key) = &key {
            match &outcome {
                Ok(response) => cache.complete(key, &fingerprint, response).await,
                Err(_) => cache.release(key).await,
            }
        }
        outcome
    });
    let response = attempt
        .await
        .map_err(|err| PipelineError::internal("generate", err.to_string()))??;
    Ok(Json(response))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    Idempotency(StatusCode, &'static str),
    Unauthorized,
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) if err.kind() == PipelineErrorKind::InvalidInput => {
                let payload = ApiError {
                    message: err.detail().to_string(),
                    error: None,
                    stage: None,
                };
                (StatusCode::BAD_REQUEST, Json(payload)).into_response()
            }
            AppError::Pipeline(err) => {
                let payload = ApiError {
                    message: "Failed to generate project draft".to_string(),
                    error: Some(err.detail().to_string()),
                    stage: Some(err.stage().to_string()),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
            }
            AppError::Idempotency(status, message) => {
                let payload = ApiError {
                    message: message.to_string(),
                    error: None,
                    stage: None,
                };
                (status, Json(payload)).into_response()
            }
            AppError::Unauthorized => {
                let payload = ApiError {
                    message: "unauthorized".to_string(),
                    error: None,
                    stage: None,
                };
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::PlaceholderMedia;
    use crate::store::MemoryStore;
    use crate::testing::{
        CONTENT_REPLY, DETAILS_REPLY, IDENTITY_REPLY, ScriptedModel, StaticFetcher,
    };
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        llm: Arc<ScriptedModel>,
        store: Arc<MemoryStore>,
    }

    fn test_app(llm: ScriptedModel, docs_key: Option<&str>) -> TestApp {
        let llm = Arc::new(llm);
        let store = Arc::new(MemoryStore::with_default_categories());
        let pipeline = Pipeline::new(
            llm.clone(),
            Arc::new(StaticFetcher::with_text(
                "Skyline Residences by Skyline Developers. Ready to move in.",
            )),
            store.clone(),
            store.clone(),
            PlaceholderMedia::new("https://placehold.co"),
        );
        let state = AppState {
            pipeline,
            idempotency: Arc::new(IdempotencyCache::memory()),
            docs_key: docs_key.map(str::to_string),
        };
        TestApp {
            router: app(state, 256 * 1024),
            llm,
            store,
        }
    }

    fn happy_model() -> ScriptedModel {
        ScriptedModel::replying([
            IDENTITY_REPLY,
            CONTENT_REPLY,
            DETAILS_REPLY,
            IDENTITY_REPLY,
            CONTENT_REPLY,
            DETAILS_REPLY,
        ])
    }

    fn generate(body: Value, idempotency_key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/ai/generate-project")
            .header("content-type", "application/json");
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_service() {
        let app = test_app(happy_model(), None);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["service"], json!("estate-draft-api"));
    }

    #[tokio::test]
    async fn preview_returns_draft_without_project_id() {
        let app = test_app(happy_model(), None);
        let (status, body) = send(
            &app.router,
            generate(json!({"url": "https://example.com/project-x", "preview": true}), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("projectId").is_none());
        assert_eq!(body["data"]["status"], json!("Ready to Move In"));
        assert_eq!(body["builderData"]["title"], json!("Skyline Developers"));
        assert_eq!(body["data"]["builder"], body["builderData"]["id"]);
        assert_eq!(body["categoryData"]["name"], json!("Apartment"));
        assert_eq!(body["stages"].as_array().unwrap().len(), 7);
        assert!(app.store.listings().await.is_empty());
    }

    #[tokio::test]
    async fn persist_returns_project_id() {
        let app = test_app(happy_model(), None);
        let (status, body) = send(
            &app.router,
            generate(json!({"rawText": "Skyline Residences, Baner"}), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let listings = app.store.listings().await;
        assert_eq!(listings.len(), 1);
        assert_eq!(body["projectId"], json!(listings[0].0));
        assert_eq!(body["data"]["available"], json!(false));
    }

    #[tokio::test]
    async fn missing_input_is_bad_request() {
        let app = test_app(happy_model(), None);
        let (status, body) = send(&app.router, generate(json!({"location": "Pune"}), None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("projectName"));
        assert!(body.get("error").is_none());
        assert!(app.store.audit_records().await.is_empty());
    }

    #[tokio::test]
    async fn stage_failure_is_server_error_with_stage() {
        let app = test_app(
            ScriptedModel::replying(["{\"title\": \"Skyline\",\n\"builder\": \"Skyline Developers\",}"]),
            None,
        );
        let (status, body) = send(
            &app.router,
            generate(json!({"rawText": "Skyline Residences"}), None),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["stage"], json!("identity"));
        assert!(body["error"].is_string());
        assert!(body["message"].is_string());
        assert!(app.store.listings().await.is_empty());
        assert_eq!(app.store.audit_records().await.len(), 1);
    }

    #[tokio::test]
    async fn idempotency_key_replays_first_response() {
        let app = test_app(happy_model(), None);
        let body = json!({"rawText": "Skyline Residences"});

        let (_, first) = send(&app.router, generate(body.clone(), Some("req-1"))).await;
        let (status, second) = send(&app.router, generate(body, Some("req-1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["projectId"], second["projectId"]);
        assert_eq!(app.llm.calls(), 3);
        assert_eq!(app.store.listings().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_key_runs_once() {
        let app = test_app(happy_model().with_delay(Duration::from_millis(20)), None);
        let body = json!({"rawText": "Skyline Residences"});

        let ((first_status, first), (second_status, second)) = tokio::join!(
            send(&app.router, generate(body.clone(), Some("k1"))),
            send(&app.router, generate(body.clone(), Some("k1"))),
        );

        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::CONFLICT);
        assert!(second["message"].as_str().unwrap().contains("in progress"));
        assert_eq!(app.llm.calls(), 3);
        assert_eq!(app.store.listings().await.len(), 1);

        let (status, replay) = send(&app.router, generate(body, Some("k1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(replay["projectId"], first["projectId"]);
    }

    #[tokio::test]
    async fn reused_key_with_different_body_is_rejected() {
        let app = test_app(happy_model(), None);

        let (status, _) = send(
            &app.router,
            generate(json!({"rawText": "Skyline Residences"}), Some("k2")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app.router,
            generate(json!({"rawText": "Prestige Lakeside"}), Some("k2")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["message"].is_string());
        assert_eq!(app.llm.calls(), 3);
    }

    #[tokio::test]
    async fn failed_attempt_frees_its_key_for_retry() {
        let app = test_app(
            ScriptedModel::replying(["not json at all", IDENTITY_REPLY, CONTENT_REPLY, DETAILS_REPLY]),
            None,
        );
        let body = json!({"rawText": "Skyline Residences"});

        let (status, _) = send(&app.router, generate(body.clone(), Some("k3"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, retried) = send(&app.router, generate(body, Some("k3"))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(retried["projectId"].is_string());
        assert_eq!(app.store.audit_records().await.len(), 2);
    }

    #[tokio::test]
    async fn abandoned_request_still_finishes_and_is_audited() {
        let app = test_app(happy_model().with_delay(Duration::from_millis(30)), None);
        let body = json!({"rawText": "Skyline Residences"});

        let abandoned = tokio::time::timeout(
            Duration::from_millis(40),
            send(&app.router, generate(body.clone(), Some("k4"))),
        )
        .await;
        assert!(abandoned.is_err());

        for _ in 0..100 {
            if !app.store.audit_records().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // let the detached task settle the idempotency key
        tokio::time::sleep(Duration::from_millis(50)).await;

        let audit = app.store.audit_records().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, crate::audit::AuditStatus::Success);
        assert_eq!(app.llm.calls(), 3);
        assert_eq!(app.store.listings().await.len(), 1);

        let (status, replay) = send(&app.router, generate(body, Some("k4"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(replay["projectId"], json!(app.store.listings().await[0].0));
    }

    #[tokio::test]
    async fn openapi_document_requires_key_when_configured() {
        let app = test_app(happy_model(), Some("docs-secret"));

        let denied = Request::get("/openapi.json").body(Body::empty()).unwrap();
        let (status, _) = send(&app.router, denied).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let allowed = Request::get("/openapi.json")
            .header("X-Docs-Key", "docs-secret")
            .body(Body::empty())
            .unwrap();
        let (status, doc) = send(&app.router, allowed).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"].get("/ai/generate-project").is_some());
    }
}

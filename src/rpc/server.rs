use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tower_http::cors::{Any, CorsLayer};

use super::methods;
use super::types::*;
use crate::spaced_repetition::session::CreateSessionRequest;
use crate::spaced_repetition::{self, ReviewConfig, ReviewError, SharedReviewStore};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedReviewStore,
}

/// JSON error body carrying the status that matches the failure
pub struct ApiError(ReviewError);

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &ReviewError) -> StatusCode {
    match err {
        ReviewError::InvalidQualityRating(_) | ReviewError::InvalidConfig(_) => {
            StatusCode::BAD_REQUEST
        }
        ReviewError::UnknownItem { .. } | ReviewError::SessionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ReviewError::ConcurrentModification { .. }
        | ReviewError::SessionComplete(_)
        | ReviewError::AlreadyAnswered { .. } => StatusCode::CONFLICT,
        ReviewError::Io(_) | ReviewError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Review request failed: {}", self.0);
        } else {
            tracing::debug!("Review request rejected: {}", self.0);
        }
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

fn ok<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

fn respond<T: Serialize>(result: Result<T, ReviewError>) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub fn router(store: SharedReviewStore) -> Router {
    let state = Arc::new(AppState { store });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/review/config", get(review_get_config))
        .route("/api/review/config", post(review_update_config))
        .route("/api/review/track", post(review_track))
        .route("/api/review/track/batch", post(review_track_batch))
        .route("/api/review/untrack", post(review_untrack))
        .route("/api/review/saved", post(review_is_saved))
        .route("/api/review/get", post(review_get_item))
        .route("/api/review/record", post(review_record))
        .route("/api/review/memorized", post(review_set_memorized))
        .route("/api/review/items", post(review_items))
        .route("/api/review/due", post(review_due))
        .route("/api/review/stats", post(review_stats))
        .route("/api/review/progress", post(review_progress))
        .route("/api/review/session", post(review_session))
        .route("/api/review/session/answer", post(review_session_answer))
        .route("/api/review/session/back", post(review_session_back))
        .route("/api/review/session/forward", post(review_session_forward))
        .route("/api/review/history", post(review_history))
        .layer(cors)
        .with_state(state)
}

pub async fn run_http_server(host: &str, port: u16, data_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let store = spaced_repetition::create_shared_store(data_dir)?;
    let app = router(store);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn run_stdio_server(data_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let store = spaced_repetition::create_shared_store(data_dir)?;

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);

    tracing::info!("JSON-RPC server running on stdio");

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = handle_jsonrpc_request(&store, line).await;

        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn review_get_config(State(state): State<Arc<AppState>>) -> Response {
    ok(methods::get_config(&state.store).await)
}

async fn review_update_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReviewConfig>,
) -> Response {
    respond(methods::update_config(&state.store, request).await)
}

async fn review_track(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContentRequest>,
) -> Response {
    respond(methods::track(&state.store, request).await)
}

async fn review_track_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrackBatchRequest>,
) -> Response {
    respond(methods::track_batch(&state.store, request).await)
}

async fn review_untrack(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContentRequest>,
) -> Response {
    respond(methods::untrack(&state.store, request).await)
}

async fn review_is_saved(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContentRequest>,
) -> Response {
    ok(methods::is_saved(&state.store, request).await)
}

async fn review_get_item(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContentRequest>,
) -> Response {
    respond(methods::get_item(&state.store, request).await)
}

async fn review_record(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordReviewRequest>,
) -> Response {
    respond(methods::record_review(&state.store, request).await)
}

async fn review_set_memorized(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetMemorizedRequest>,
) -> Response {
    respond(methods::set_memorized(&state.store, request).await)
}

async fn review_items(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ItemsRequest>,
) -> Response {
    ok(methods::items(&state.store, request).await)
}

async fn review_due(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DueRequest>,
) -> Response {
    ok(methods::list_due(&state.store, request).await)
}

async fn review_stats(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LearnerRequest>,
) -> Response {
    ok(methods::statistics(&state.store, request).await)
}

async fn review_progress(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LearnerRequest>,
) -> Response {
    ok(methods::progress(&state.store, request).await)
}

async fn review_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    ok(methods::create_session(&state.store, request).await)
}

async fn review_session_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionAnswerRequest>,
) -> Response {
    respond(methods::answer_session(&state.store, request).await)
}

async fn review_session_back(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> Response {
    respond(methods::session_back(&state.store, request).await)
}

async fn review_session_forward(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> Response {
    respond(methods::session_forward(&state.store, request).await)
}

async fn review_history(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LearnerRequest>,
) -> Response {
    ok(methods::history(&state.store, request).await)
}

async fn handle_jsonrpc_request(store: &SharedReviewStore, request: &str) -> String {
    let parsed: Result<serde_json::Value, _> = serde_json::from_str(request);

    match parsed {
        Ok(json) => {
            let method = json.get("method").and_then(|m| m.as_str()).unwrap_or("");
            let params = json
                .get("params")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let id = json.get("id").cloned().unwrap_or(serde_json::Value::Null);

            let result = dispatch_method(store, method, params).await;

            match result {
                Ok(value) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "result": value,
                    "id": id
                })
                .to_string(),
                Err(e) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": {
                        "code": -32000,
                        "message": e.to_string()
                    },
                    "id": id
                })
                .to_string(),
            }
        }
        Err(e) => serde_json::json!({
            "jsonrpc": "2.0",
            "error": {
                "code": -32700,
                "message": format!("Parse error: {}", e)
            },
            "id": null
        })
        .to_string(),
    }
}

async fn dispatch_method(
    store: &SharedReviewStore,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    match method {
        "review.config.get" => Ok(serde_json::to_value(methods::get_config(store).await)?),
        "review.config.update" => {
            let request: ReviewConfig = serde_json::from_value(params)?;
            let response = methods::update_config(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.track" => {
            let request: ContentRequest = serde_json::from_value(params)?;
            let response = methods::track(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.track_batch" => {
            let request: TrackBatchRequest = serde_json::from_value(params)?;
            let response = methods::track_batch(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.untrack" => {
            let request: ContentRequest = serde_json::from_value(params)?;
            let response = methods::untrack(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.saved" => {
            let request: ContentRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(methods::is_saved(store, request).await)?)
        }
        "review.get" => {
            let request: ContentRequest = serde_json::from_value(params)?;
            let response = methods::get_item(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.record" => {
            let request: RecordReviewRequest = serde_json::from_value(params)?;
            let response = methods::record_review(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.memorized" => {
            let request: SetMemorizedRequest = serde_json::from_value(params)?;
            let response = methods::set_memorized(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.items" => {
            let request: ItemsRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(methods::items(store, request).await)?)
        }
        "review.due" => {
            let request: DueRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(methods::list_due(store, request).await)?)
        }
        "review.stats" => {
            let request: LearnerRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(methods::statistics(store, request).await)?)
        }
        "review.progress" => {
            let request: LearnerRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(methods::progress(store, request).await)?)
        }
        "review.session" => {
            let request: CreateSessionRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(
                methods::create_session(store, request).await,
            )?)
        }
        "review.session.answer" => {
            let request: SessionAnswerRequest = serde_json::from_value(params)?;
            let response = methods::answer_session(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.session.back" => {
            let request: SessionRequest = serde_json::from_value(params)?;
            let response = methods::session_back(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.session.forward" => {
            let request: SessionRequest = serde_json::from_value(params)?;
            let response = methods::session_forward(store, request).await?;
            Ok(serde_json::to_value(response)?)
        }
        "review.history" => {
            let request: LearnerRequest = serde_json::from_value(params)?;
            Ok(serde_json::to_value(methods::history(store, request).await)?)
        }
        "health.check" => Ok(serde_json::Value::String("ok".to_string())),
        _ => {
            anyhow::bail!("Method not found: {}", method)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, SharedReviewStore) {
        let dir = tempdir().unwrap();
        let store = spaced_repetition::create_shared_store(dir.path().to_path_buf()).unwrap();
        (dir, store)
    }

    async fn call(store: &SharedReviewStore, request: serde_json::Value) -> serde_json::Value {
        let response = handle_jsonrpc_request(store, &request.to_string()).await;
        serde_json::from_str(&response).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ReviewError::InvalidQualityRating(7)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ReviewError::UnknownItem {
                learner_id: "a".to_string(),
                content: spaced_repetition::ContentId::vocabulary(1),
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ReviewError::ConcurrentModification {
                expected: 1,
                found: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ReviewError::AlreadyAnswered {
                session_id: "s".to_string(),
                index: 0
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ReviewError::SessionNotFound("s".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_jsonrpc_track_and_review() {
        let (_dir, store) = test_store();
        let content = serde_json::json!({"kind": "vocabulary", "id": 5});

        let tracked = call(
            &store,
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "review.track",
                "params": {"learner_id": "alice", "content": content},
                "id": 1
            }),
        )
        .await;
        assert_eq!(tracked["result"]["repetitions"], 0);
        assert_eq!(tracked["id"], 1);

        let reviewed = call(
            &store,
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "review.record",
                "params": {"learner_id": "alice", "content": content, "rating": "easy"},
                "id": 2
            }),
        )
        .await;
        assert_eq!(reviewed["result"]["repetitions"], 1);
        assert_eq!(reviewed["result"]["interval_days"], 1);

        let stats = call(
            &store,
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "review.stats",
                "params": {"learner_id": "alice"},
                "id": 3
            }),
        )
        .await;
        assert_eq!(stats["result"]["total"], 1);
    }

    #[tokio::test]
    async fn test_jsonrpc_errors() {
        let (_dir, store) = test_store();

        let parse_error = handle_jsonrpc_request(&store, "{not json").await;
        let parse_error: serde_json::Value = serde_json::from_str(&parse_error).unwrap();
        assert_eq!(parse_error["error"]["code"], -32700);

        let unknown = call(
            &store,
            serde_json::json!({"jsonrpc": "2.0", "method": "nope", "id": 9}),
        )
        .await;
        assert_eq!(unknown["error"]["code"], -32000);

        let bad_quality = call(
            &store,
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "review.record",
                "params": {
                    "learner_id": "alice",
                    "content": {"kind": "grammar", "id": 1},
                    "rating": 6
                },
                "id": 10
            }),
        )
        .await;
        assert!(bad_quality["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Invalid quality rating"));
    }
}

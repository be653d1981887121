//! Dashboard-facing API routes. Callers arrive authenticated; the only
//! validation here is request shape and the sender's own preconditions.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use leadflow_core::domain::thread::ThreadId;
use leadflow_sync::SendError;

use crate::bootstrap::Services;

type ApiResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct BackfillRequest {
    #[serde(default)]
    pub cursor: i64,
    #[serde(default = "default_backfill_limit")]
    pub limit: u32,
}

fn default_backfill_limit() -> u32 {
    100
}

pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/api/threads/{id}/messages", post(send_message))
        .route("/api/admin/backfill", post(run_backfill))
        .with_state(services)
}

pub async fn send_message(
    State(services): State<Arc<Services>>,
    Path(thread_id): Path<i64>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult {
    let report = services
        .sender
        .send(ThreadId(thread_id), &request.text)
        .await
        .map_err(send_error_response)?;

    info!(
        event_name = "server.api.message_sent",
        thread_id,
        provider_message_id = report.provider_message_id.as_str(),
        deduplicated = report.deduplicated,
    );
    Ok((
        StatusCode::OK,
        Json(json!({
            "message_id": report.message_id,
            "provider_message_id": report.provider_message_id,
            "deduplicated": report.deduplicated,
        })),
    ))
}

pub async fn run_backfill(
    State(services): State<Arc<Services>>,
    Json(request): Json<BackfillRequest>,
) -> ApiResult {
    let page = services.backfill.run(request.cursor, request.limit).await.map_err(|error| {
        error!(event_name = "server.api.backfill_failed", error = %error);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "an internal storage error occurred"})),
        )
    })?;

    let payload = serde_json::to_value(&page).map_err(|error| {
        error!(event_name = "server.api.backfill_encode_failed", error = %error);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "could not encode the backfill page"})),
        )
    })?;
    Ok((StatusCode::OK, Json(payload)))
}

fn send_error_response(error: SendError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        SendError::ThreadNotFound => StatusCode::NOT_FOUND,
        SendError::InvalidThreadIdentifiers | SendError::EmptyMessage => StatusCode::BAD_REQUEST,
        SendError::SendFailed(_) | SendError::MessageIdMissing => StatusCode::BAD_GATEWAY,
        SendError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let detail = match &error {
        SendError::SendFailed(detail) => Some(detail.clone()),
        _ => None,
    };
    (status, Json(json!({"error": error.code(), "detail": detail})))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;
    use chrono::Utc;
    use serde_json::json;

    use leadflow_core::domain::client::Client;
    use leadflow_core::domain::lead::ClientId;
    use leadflow_db::repositories::ThreadRepository;
    use leadflow_unipile::SendReceipt;

    use super::{run_backfill, send_message, BackfillRequest, SendMessageRequest};
    use crate::testing::{test_services_with_receipt, TestServices};

    async fn seeded() -> (TestServices, i64) {
        let harness = test_services_with_receipt(SendReceipt {
            provider_message_id: Some("m-out-1".to_string()),
            sender_url: None,
            sent_at: None,
        });
        harness
            .clients
            .insert(Client {
                id: ClientId(1),
                name: "Acme Outreach".to_string(),
                unipile_account_id: "acct-1".to_string(),
                created_at: Utc::now(),
            })
            .await;
        let thread = harness
            .threads
            .ensure(ClientId(1), "acct-1", "chat-1", None)
            .await
            .expect("ensure thread");
        (harness, thread.id.0)
    }

    #[tokio::test]
    async fn send_endpoint_mirrors_and_reports_dedup_on_retry() {
        let (harness, thread_id) = seeded().await;

        let (status, Json(payload)) = send_message(
            State(harness.services.clone()),
            Path(thread_id),
            Json(SendMessageRequest { text: "hello".to_string() }),
        )
        .await
        .expect("send succeeds");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["provider_message_id"], "m-out-1");
        assert_eq!(payload["deduplicated"], false);

        let (_, Json(retry)) = send_message(
            State(harness.services.clone()),
            Path(thread_id),
            Json(SendMessageRequest { text: "hello".to_string() }),
        )
        .await
        .expect("retry succeeds");
        assert_eq!(retry["deduplicated"], true);
        assert_eq!(retry["message_id"], json!(null));
    }

    #[tokio::test]
    async fn send_errors_carry_the_outcome_code() {
        let (harness, _) = seeded().await;

        let (status, Json(payload)) = send_message(
            State(harness.services.clone()),
            Path(9999),
            Json(SendMessageRequest { text: "hello".to_string() }),
        )
        .await
        .expect_err("unknown thread");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload["error"], "thread_not_found");
    }

    #[tokio::test]
    async fn backfill_endpoint_reports_the_page() {
        let (harness, _) = seeded().await;

        let (status, Json(payload)) = run_backfill(
            State(harness.services.clone()),
            Json(BackfillRequest { cursor: 0, limit: 10 }),
        )
        .await
        .expect("backfill runs");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["next_cursor"], 0);
        assert_eq!(payload["scanned"], 0);
        assert_eq!(payload["has_more"], false);
    }
}

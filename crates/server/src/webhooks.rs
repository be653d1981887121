//! Gateway webhook ingest.
//!
//! Deliveries are acknowledged with 200 whenever we do not want the
//! gateway to retry: unknown event tags, unknown accounts, and incomplete
//! payloads are all terminal from the provider's point of view. Only a bad
//! shared secret (401) and store failures (500) are reported as errors.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use leadflow_core::domain::invitation::{DmDraftStatus, InvitationId};
use leadflow_core::domain::message::{MessageDirection, NewMessage};
use leadflow_db::repositories::RepositoryError;
use leadflow_sync::RelationEventInput;
use leadflow_unipile::webhook::{secret_matches, MessageEvent, RelationEvent, WebhookKind};

use crate::bootstrap::Services;

type WebhookResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    secret: Option<String>,
}

pub fn router(services: Arc<Services>) -> Router {
    Router::new().route("/webhooks/unipile", post(ingest)).with_state(services)
}

pub async fn ingest(
    State(services): State<Arc<Services>>,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<Value>,
) -> WebhookResult {
    if !secret_matches(query.secret.as_deref(), services.webhook_secret.as_ref()) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid webhook secret"})),
        ));
    }

    match WebhookKind::classify(&body) {
        WebhookKind::Relation => handle_relation(&services, body).await,
        WebhookKind::Message => handle_message(&services, body).await,
        WebhookKind::Unknown => {
            info!(event_name = "server.webhook.ignored_tag");
            Ok((StatusCode::OK, Json(json!({"status": "ignored"}))))
        }
    }
}

async fn handle_relation(services: &Services, body: Value) -> WebhookResult {
    let event = RelationEvent::from_payload(&body);

    let invitation = match event.invitation_id {
        Some(id) => {
            services.invitations.find_by_id(InvitationId(id)).await.map_err(store_error)?
        }
        None => None,
    };
    // The tracking id round-trips through the gateway as an opaque string,
    // so the referenced invitation is untrusted until it matches the
    // account the delivery arrived for.
    let invitation = invitation.filter(|invitation| {
        event.account_id.as_deref().is_some_and(|account| invitation.account_id == account)
    });

    let input = RelationEventInput {
        lead_hint: invitation.as_ref().and_then(|invitation| invitation.lead_id),
        event,
    };
    let report = services.reconciler.reconcile(&input).await.map_err(store_error)?;

    if let Some(invitation) = invitation {
        services
            .invitations
            .mark_accepted(invitation.id, Utc::now(), &body.to_string())
            .await
            .map_err(store_error)?;
        // Acceptance makes the follow-up DM draftable. Forward-only, so a
        // replayed delivery cannot regress an already sent draft.
        services
            .invitations
            .advance_dm_draft_status(invitation.id, DmDraftStatus::Draft)
            .await
            .map_err(store_error)?;
    }

    info!(
        event_name = "server.webhook.relation_reconciled",
        outcome = report.outcome.as_str(),
    );
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": report.outcome.as_str(),
            "matched_lead_id": report.matched_lead_id,
            "hinted_lead_id": report.hinted_lead_id,
        })),
    ))
}

async fn handle_message(services: &Services, body: Value) -> WebhookResult {
    let event = MessageEvent::from_payload(&body);
    let (Some(account_id), Some(chat_id), Some(provider_message_id)) =
        (event.account_id.clone(), event.chat_id.clone(), event.provider_message_id.clone())
    else {
        info!(event_name = "server.webhook.message_incomplete");
        return Ok((
            StatusCode::OK,
            Json(json!({"status": "ignored", "reason": "missing identifiers"})),
        ));
    };

    let Some(client) =
        services.clients.find_by_account(&account_id).await.map_err(store_error)?
    else {
        info!(event_name = "server.webhook.unknown_account", account_id = account_id.as_str());
        return Ok((
            StatusCode::OK,
            Json(json!({"status": "ignored", "reason": "unknown account"})),
        ));
    };

    let thread = services
        .threads
        .ensure(client.id, &account_id, &chat_id, None)
        .await
        .map_err(store_error)?;

    let inserted = services
        .messages
        .insert(NewMessage {
            client_id: client.id,
            account_id: account_id.clone(),
            provider_message_id,
            thread_id: thread.id,
            direction: MessageDirection::Inbound,
            sender_name: None,
            sender_url: None,
            body: event.text.unwrap_or_default(),
            sent_at: event.sent_at.unwrap_or_else(Utc::now),
            payload_json: Some(body.to_string()),
        })
        .await
        .map_err(store_error)?;

    if inserted.is_some() {
        services.threads.increment_unread(thread.id).await.map_err(store_error)?;
    }

    // Identity resolution never blocks the mirror.
    if let Some(attendee_id) = event.sender_attendee_id {
        services.resolver.resolve(&account_id, &attendee_id, Some(thread.id)).await;
    }

    let status = if inserted.is_some() { "mirrored" } else { "duplicate" };
    info!(
        event_name = "server.webhook.message_ingested",
        thread_id = thread.id.0,
        status,
    );
    Ok((StatusCode::OK, Json(json!({"status": status}))))
}

fn store_error(error: RepositoryError) -> (StatusCode, Json<Value>) {
    error!(event_name = "server.webhook.store_error", error = %error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "an internal storage error occurred"})),
    )
}

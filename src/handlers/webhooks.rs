//! # Provider Webhook Handler
//!
//! Receives the provider's batched event objects. The endpoint always
//! replies success once the request is authenticated, even when individual
//! events fail to process, so the provider never enters a retry storm.
//! Signature verification runs only when a signing key is configured.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::realtime::EmailOpenedPayload;
use crate::reconcile::{self, BounceKind, EventDraft, OpenDetails, Signal};
use crate::server::AppState;
use crate::tracking::{GeoData, format_geo_location, parse_user_agent};
use crate::webhook_verification::verify_webhook_request;

#[derive(Debug, Deserialize)]
struct ProviderEvent {
    event: String,
    #[serde(default)]
    timestamp: Option<i64>,
    /// Custom arg attached at dispatch time, correlating back to a recipient.
    #[serde(rename = "emailId", default)]
    email_id: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    useragent: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    geo: Option<ProviderGeo>,
}

#[derive(Debug, Deserialize)]
struct ProviderGeo {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Receive provider delivery/engagement events
#[utoipa::path(
    post,
    path = "/api/webhooks/sendgrid",
    request_body = Vec<serde_json::Value>,
    responses(
        (status = 200, description = "Events accepted; always success to suppress provider retries"),
        (status = 401, description = "Signature verification failed")
    ),
    tag = "webhooks"
)]
pub async fn receive_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = verify_webhook_request(&body, &headers, &state.config) {
        tracing::warn!(error = %err, "Webhook signature verification failed");
        return (err.status_code(), Json(json!({ "success": false }))).into_response();
    }

    let events: Vec<Value> = match serde_json::from_slice(&body) {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "Webhook body is not a JSON event array");
            return Json(json!({ "success": false, "error": "Processing error" }))
                .into_response();
        }
    };

    tracing::info!(count = events.len(), "Received provider webhook events");

    for raw in events {
        if let Err(err) = process_event(&state, &raw).await {
            // One bad event never fails the batch.
            tracing::error!(error = %err, event = %raw, "Failed to process webhook event");
        }
    }

    Json(json!({ "success": true })).into_response()
}

/// Webhook endpoint probe
#[utoipa::path(
    get,
    path = "/api/webhooks/sendgrid",
    responses((status = 200, description = "Endpoint is reachable")),
    tag = "webhooks"
)]
pub async fn probe() -> Json<Value> {
    Json(json!({ "status": "Webhook endpoint active" }))
}

async fn process_event(state: &AppState, raw: &Value) -> anyhow::Result<()> {
    let event: ProviderEvent = serde_json::from_value(raw.clone())?;

    let Some(recipient_id) = event.email_id.as_deref().and_then(|id| id.parse::<Uuid>().ok())
    else {
        tracing::debug!(event = %event.event, "Webhook event without usable emailId, skipping");
        return Ok(());
    };

    let Some(recipient) = state.recipients().find_by_id(recipient_id).await? else {
        tracing::warn!(%recipient_id, "Webhook event for unknown recipient");
        return Ok(());
    };

    let occurred_at = event
        .timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let signal = match event.event.as_str() {
        "delivered" => Signal::WebhookDelivered,
        "open" | "click" => Signal::WebhookOpen(OpenDetails {
            ip_address: event.ip.clone(),
            user_agent: event.useragent.as_deref().map(parse_user_agent),
            geo_location: event.geo.as_ref().and_then(|geo| {
                format_geo_location(&GeoData {
                    city: geo.city.clone(),
                    region: geo.region.clone(),
                    country: geo.country.clone(),
                })
            }),
        }),
        "bounce" => Signal::WebhookBounce {
            kind: BounceKind::Bounced,
            reason: event.reason.clone(),
        },
        "blocked" => Signal::WebhookBounce {
            kind: BounceKind::Blocked,
            reason: event.reason.clone(),
        },
        "dropped" | "spamreport" => Signal::WebhookBounce {
            kind: BounceKind::Dropped,
            reason: event.reason.clone(),
        },
        other => {
            // Unrecognized event types still land in the ledger, with no
            // status change.
            let draft = EventDraft {
                event: other.to_string(),
                status: recipient.status,
                ip_address: None,
                user_agent: None,
                geo_location: None,
                error_reason: None,
                payload: Some(raw.clone()),
                timestamp: occurred_at.fixed_offset(),
            };
            state.events().append(recipient_id, &draft).await?;
            return Ok(());
        }
    };

    let is_open = matches!(signal, Signal::WebhookOpen(_));

    let Some(mut reconciled) = reconcile::reconcile(&recipient, signal, occurred_at) else {
        return Ok(());
    };
    reconciled.event = reconciled.event.with_payload(raw.clone());

    let updated = state.recipients().apply(recipient_id, &reconciled).await?;

    if is_open {
        if let Some(broadcaster) = &state.broadcaster {
            broadcaster
                .broadcast_email_opened(&EmailOpenedPayload {
                    email_id: updated.id.to_string(),
                    status: updated.status,
                    opened_at: updated.opened_at.map(|t| t.to_rfc3339()),
                    open_count: Some(updated.open_count),
                    ip_address: updated.ip_address,
                    user_agent: updated.user_agent,
                    geo_location: updated.geo_location,
                })
                .await;
        }
    }

    Ok(())
}

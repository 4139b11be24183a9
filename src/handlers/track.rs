//! # Tracking Pixel Handler
//!
//! `GET /track/{id}` records an open and returns the 1x1 transparent GIF.
//! The response is the pixel no matter what happens internally; tracking
//! side effects complete before the response is written so short-lived
//! client connections cannot cut them off.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::realtime::EmailOpenedPayload;
use crate::reconcile::{self, OpenDetails, Signal};
use crate::server::AppState;
use crate::tracking::{self, format_geo_location, parse_user_agent};

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        tracking::pixel_bytes(),
    )
        .into_response()
}

/// Record an open and return the tracking pixel
#[utoipa::path(
    get,
    path = "/track/{id}",
    params(("id" = String, Path, description = "Recipient id")),
    responses(
        (status = 200, description = "Transparent 1x1 GIF, regardless of internal outcome")
    ),
    tag = "tracking"
)]
pub async fn track_open(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    // An unparseable id still gets the pixel.
    let Ok(recipient_id) = id.parse::<Uuid>() else {
        tracing::warn!(id, "Tracking hit with malformed recipient id");
        return pixel_response();
    };

    let ip = client_ip(&headers);
    let raw_user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    record_open(&state, recipient_id, &ip, raw_user_agent).await;

    pixel_response()
}

/// The full tracking side effect chain: geo lookup, reconciliation, ledger
/// append, realtime broadcast. Every failure is logged and swallowed.
async fn record_open(state: &AppState, recipient_id: Uuid, ip: &str, raw_user_agent: &str) {
    let recipient = match state.recipients().find_by_id(recipient_id).await {
        Ok(Some(recipient)) => recipient,
        Ok(None) => {
            tracing::warn!(%recipient_id, "Tracking hit for unknown recipient");
            return;
        }
        Err(err) => {
            tracing::error!(%recipient_id, error = %err, "Tracking lookup failed");
            return;
        }
    };

    let geo_location = match state.geo.lookup(ip).await {
        Some(geo) => format_geo_location(&geo),
        None => None,
    };

    let details = OpenDetails {
        ip_address: (ip != "Unknown").then(|| ip.to_string()),
        user_agent: Some(parse_user_agent(raw_user_agent)),
        geo_location,
    };

    let Some(reconciled) = reconcile::reconcile(&recipient, Signal::PixelOpen(details), Utc::now())
    else {
        return;
    };

    let updated = match state.recipients().apply(recipient_id, &reconciled).await {
        Ok(updated) => updated,
        Err(err) => {
            tracing::error!(%recipient_id, error = %err, "Failed to record open");
            return;
        }
    };

    tracing::info!(
        %recipient_id,
        open_count = updated.open_count,
        geo = updated.geo_location.as_deref().unwrap_or("Unknown"),
        "Recorded email open"
    );

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

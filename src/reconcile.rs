//! Status reconciliation: the mapping from inbound signals onto a
//! recipient's current status and append-only event history.
//!
//! Three independent signal sources of decreasing reliability feed the same
//! projection: provider webhooks, the tracking pixel, and a time-based
//! delivery fallback. Rather than letting the last write win, signals are
//! ranked (webhook > pixel > heuristic) and a lower-confidence signal never
//! downgrades engagement already recorded: the heuristic only applies from
//! SENT, and a webhook `delivered` does not regress OPENED. Dispatch
//! outcomes are our own writes and always apply.
//!
//! Every applied signal produces exactly one [`EventDraft`] alongside the
//! field writes, keeping the append-only ledger independent of the mutable
//! current-status projection.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

use crate::models::recipient::{EmailStatus, Model as Recipient};

/// Metadata carried by an open signal (pixel hit or provider open event).
#[derive(Debug, Clone, Default)]
pub struct OpenDetails {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub geo_location: Option<String>,
}

/// Provider-reported terminal failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceKind {
    Bounced,
    Blocked,
    Dropped,
}

impl BounceKind {
    fn status(self) -> EmailStatus {
        match self {
            BounceKind::Bounced => EmailStatus::Bounced,
            BounceKind::Blocked => EmailStatus::Blocked,
            BounceKind::Dropped => EmailStatus::Dropped,
        }
    }

    fn event_tag(self) -> &'static str {
        match self {
            BounceKind::Bounced => "bounce",
            BounceKind::Blocked => "blocked",
            BounceKind::Dropped => "dropped",
        }
    }

    fn generic_reason(self) -> &'static str {
        match self {
            BounceKind::Bounced => "Message bounced",
            BounceKind::Blocked => "Message blocked by provider",
            BounceKind::Dropped => "Message dropped by provider",
        }
    }
}

/// One inbound status-affecting signal.
#[derive(Debug, Clone)]
pub enum Signal {
    /// The dispatch adapter accepted the message; carries the rendered copy.
    DispatchSucceeded { subject: String, body: String },
    /// The dispatch adapter failed; `retry` marks a retry attempt so the
    /// ledger distinguishes `retry_failed` from a first `failed`.
    DispatchFailed { reason: String, retry: bool },
    /// Tracking pixel request observed.
    PixelOpen(OpenDetails),
    /// Provider webhook: message delivered.
    WebhookDelivered,
    /// Provider webhook: message opened or clicked.
    WebhookOpen(OpenDetails),
    /// Provider webhook: terminal failure.
    WebhookBounce {
        kind: BounceKind,
        reason: Option<String>,
    },
    /// Delivery fallback sweep: enough time elapsed since SENT with no
    /// later signal.
    DeliveryWindowElapsed,
}

/// The full projected set of mutable recipient fields after a signal.
///
/// The repository writes every field; unchanged values are carried over from
/// the current model so callers never merge partial updates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientWrites {
    pub status: EmailStatus,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTimeWithTimeZone>,
    pub sent_subject: Option<String>,
    pub sent_body: Option<String>,
    pub opened_at: Option<DateTimeWithTimeZone>,
    pub open_count: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub geo_location: Option<String>,
}

impl RecipientWrites {
    fn carry_over(current: &Recipient) -> Self {
        Self {
            status: current.status,
            last_error: current.last_error.clone(),
            sent_at: current.sent_at,
            sent_subject: current.sent_subject.clone(),
            sent_body: current.sent_body.clone(),
            opened_at: current.opened_at,
            open_count: current.open_count,
            ip_address: current.ip_address.clone(),
            user_agent: current.user_agent.clone(),
            geo_location: current.geo_location.clone(),
        }
    }
}

/// Ledger row to append for an applied signal.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event: String,
    pub status: EmailStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub geo_location: Option<String>,
    pub error_reason: Option<String>,
    pub payload: Option<JsonValue>,
    pub timestamp: DateTimeWithTimeZone,
}

impl EventDraft {
    fn new(event: &str, status: EmailStatus, timestamp: DateTimeWithTimeZone) -> Self {
        Self {
            event: event.to_string(),
            status,
            ip_address: None,
            user_agent: None,
            geo_location: None,
            error_reason: None,
            payload: None,
            timestamp,
        }
    }

    /// Attach the raw provider payload for audit purposes.
    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Result of reconciling one signal against a recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub writes: RecipientWrites,
    pub event: EventDraft,
}

/// Maps one signal onto the recipient's next state and ledger entry.
///
/// Returns `None` when the signal does not apply (currently only the
/// delivery heuristic observed against a recipient no longer in SENT).
pub fn reconcile(current: &Recipient, signal: Signal, now: DateTime<Utc>) -> Option<Reconciled> {
    let now: DateTimeWithTimeZone = now.fixed_offset();
    let mut writes = RecipientWrites::carry_over(current);

    let event = match signal {
        Signal::DispatchSucceeded { subject, body } => {
            writes.status = EmailStatus::Sent;
            writes.last_error = None;
            writes.sent_at = Some(now);
            writes.sent_subject = Some(subject);
            writes.sent_body = Some(body);
            EventDraft::new("sent", writes.status, now)
        }
        Signal::DispatchFailed { reason, retry } => {
            writes.status = EmailStatus::Failed;
            writes.last_error = Some(reason.clone());
            writes.sent_at = None;
            writes.sent_subject = None;
            writes.sent_body = None;
            let tag = if retry { "retry_failed" } else { "failed" };
            let mut event = EventDraft::new(tag, writes.status, now);
            event.error_reason = Some(reason);
            event
        }
        Signal::PixelOpen(details) | Signal::WebhookOpen(details) => {
            writes.status = EmailStatus::Opened;
            // openedAt keeps the earliest observation; the counter and the
            // latest tracking metadata always advance.
            writes.opened_at = current.opened_at.or(Some(now));
            writes.open_count = current.open_count + 1;
            writes.ip_address = details.ip_address.clone().or(writes.ip_address);
            writes.user_agent = details.user_agent.clone().or(writes.user_agent);
            writes.geo_location = details.geo_location.clone().or(writes.geo_location);
            let mut event = EventDraft::new("open", writes.status, now);
            event.ip_address = details.ip_address;
            event.user_agent = details.user_agent;
            event.geo_location = details.geo_location;
            event
        }
        Signal::WebhookDelivered => {
            // An open already observed outranks a delivery confirmation.
            if current.status != EmailStatus::Opened {
                writes.status = EmailStatus::Delivered;
            }
            writes.last_error = None;
            EventDraft::new("delivered", writes.status, now)
        }
        Signal::WebhookBounce { kind, reason } => {
            writes.status = kind.status();
            let reason = reason.unwrap_or_else(|| kind.generic_reason().to_string());
            writes.last_error = Some(reason.clone());
            let mut event = EventDraft::new(kind.event_tag(), writes.status, now);
            event.error_reason = Some(reason);
            event
        }
        Signal::DeliveryWindowElapsed => {
            // Lowest-confidence source: only presume delivery from SENT.
            if current.status != EmailStatus::Sent {
                return None;
            }
            writes.status = EmailStatus::Delivered;
            EventDraft::new("delivered", writes.status, now)
        }
    };

    Some(Reconciled { writes, event })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn recipient(status: EmailStatus) -> Recipient {
        let created = Utc.with_ymd_and_hms(2025, 11, 1, 9, 0, 0).unwrap();
        Recipient {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            name: Some("Ann".to_string()),
            country: None,
            phone: None,
            linkedin: None,
            github: None,
            status,
            last_error: None,
            sent_at: None,
            sent_subject: None,
            sent_body: None,
            opened_at: None,
            open_count: 0,
            ip_address: None,
            user_agent: None,
            geo_location: None,
            created_at: created.fixed_offset(),
            updated_at: created.fixed_offset(),
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn dispatch_success_records_rendered_copy() {
        let current = recipient(EmailStatus::Sending);
        let now = at(10, 0);

        let result = reconcile(
            &current,
            Signal::DispatchSucceeded {
                subject: "Hi Ann".to_string(),
                body: "Hello Ann".to_string(),
            },
            now,
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Sent);
        assert_eq!(result.writes.sent_at, Some(now.fixed_offset()));
        assert_eq!(result.writes.sent_subject.as_deref(), Some("Hi Ann"));
        assert_eq!(result.writes.sent_body.as_deref(), Some("Hello Ann"));
        assert_eq!(result.writes.last_error, None);
        assert_eq!(result.event.event, "sent");
        assert_eq!(result.event.status, EmailStatus::Sent);
    }

    #[test]
    fn dispatch_failure_records_reason_and_clears_sent_copy() {
        let mut current = recipient(EmailStatus::Sending);
        current.sent_subject = Some("old".to_string());

        let result = reconcile(
            &current,
            Signal::DispatchFailed {
                reason: "connection refused".to_string(),
                retry: false,
            },
            at(10, 0),
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Failed);
        assert_eq!(
            result.writes.last_error.as_deref(),
            Some("connection refused")
        );
        assert_eq!(result.writes.sent_at, None);
        assert_eq!(result.writes.sent_subject, None);
        assert_eq!(result.event.event, "failed");
        assert_eq!(
            result.event.error_reason.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn retry_failure_uses_retry_failed_tag() {
        let current = recipient(EmailStatus::Sending);

        let result = reconcile(
            &current,
            Signal::DispatchFailed {
                reason: "boom".to_string(),
                retry: true,
            },
            at(10, 0),
        )
        .unwrap();

        assert_eq!(result.event.event, "retry_failed");
        assert_eq!(result.writes.status, EmailStatus::Failed);
    }

    #[test]
    fn sent_can_regress_to_failed_on_retry() {
        // Transitions are not monotonic by design.
        let current = recipient(EmailStatus::Sent);

        let result = reconcile(
            &current,
            Signal::DispatchFailed {
                reason: "boom".to_string(),
                retry: true,
            },
            at(10, 0),
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Failed);
    }

    #[test]
    fn first_open_sets_opened_at_and_counter() {
        let current = recipient(EmailStatus::Delivered);
        let now = at(11, 0);

        let result = reconcile(
            &current,
            Signal::PixelOpen(OpenDetails {
                ip_address: Some("203.0.113.9".to_string()),
                user_agent: Some("Gmail on Mac Desktop".to_string()),
                geo_location: Some("Berlin, BE, Germany".to_string()),
            }),
            now,
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Opened);
        assert_eq!(result.writes.opened_at, Some(now.fixed_offset()));
        assert_eq!(result.writes.open_count, 1);
        assert_eq!(result.writes.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(result.event.event, "open");
    }

    #[test]
    fn opened_at_never_moves_forward_but_counter_advances() {
        let first_open = at(11, 0);
        let mut current = recipient(EmailStatus::Opened);
        current.opened_at = Some(first_open.fixed_offset());
        current.open_count = 3;
        current.geo_location = Some("Berlin, BE, Germany".to_string());

        let result = reconcile(
            &current,
            Signal::WebhookOpen(OpenDetails {
                ip_address: Some("198.51.100.1".to_string()),
                user_agent: None,
                geo_location: Some("Paris, IDF, France".to_string()),
            }),
            at(15, 30),
        )
        .unwrap();

        // Earliest open preserved, latest metadata overwritten.
        assert_eq!(result.writes.opened_at, Some(first_open.fixed_offset()));
        assert_eq!(result.writes.open_count, 4);
        assert_eq!(
            result.writes.geo_location.as_deref(),
            Some("Paris, IDF, France")
        );
    }

    #[test]
    fn open_without_metadata_keeps_previous_tracking_data() {
        let mut current = recipient(EmailStatus::Opened);
        current.opened_at = Some(at(11, 0).fixed_offset());
        current.open_count = 1;
        current.ip_address = Some("203.0.113.9".to_string());

        let result = reconcile(&current, Signal::PixelOpen(OpenDetails::default()), at(12, 0))
            .unwrap();

        assert_eq!(result.writes.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(result.event.ip_address, None);
    }

    #[test]
    fn webhook_delivered_clears_last_error() {
        let mut current = recipient(EmailStatus::Sent);
        current.last_error = Some("stale".to_string());

        let result = reconcile(&current, Signal::WebhookDelivered, at(10, 5)).unwrap();

        assert_eq!(result.writes.status, EmailStatus::Delivered);
        assert_eq!(result.writes.last_error, None);
        assert_eq!(result.event.event, "delivered");
    }

    #[test]
    fn webhook_delivered_does_not_downgrade_opened() {
        let mut current = recipient(EmailStatus::Opened);
        current.opened_at = Some(at(9, 30).fixed_offset());
        current.open_count = 2;

        let result = reconcile(&current, Signal::WebhookDelivered, at(10, 5)).unwrap();

        assert_eq!(result.writes.status, EmailStatus::Opened);
        // The ledger still records the delivery confirmation.
        assert_eq!(result.event.event, "delivered");
        assert_eq!(result.event.status, EmailStatus::Opened);
    }

    #[test]
    fn bounce_maps_to_its_terminal_status_with_reason() {
        let current = recipient(EmailStatus::Sent);

        let result = reconcile(
            &current,
            Signal::WebhookBounce {
                kind: BounceKind::Bounced,
                reason: Some("550 mailbox unavailable".to_string()),
            },
            at(10, 3),
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Bounced);
        assert_eq!(
            result.writes.last_error.as_deref(),
            Some("550 mailbox unavailable")
        );
        assert_eq!(result.event.event, "bounce");
    }

    #[test]
    fn bounce_without_reason_falls_back_to_generic_message() {
        let current = recipient(EmailStatus::Sent);

        let result = reconcile(
            &current,
            Signal::WebhookBounce {
                kind: BounceKind::Dropped,
                reason: None,
            },
            at(10, 3),
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Dropped);
        assert_eq!(
            result.writes.last_error.as_deref(),
            Some("Message dropped by provider")
        );
        assert_eq!(result.event.event, "dropped");
    }

    #[test]
    fn delivery_window_applies_only_from_sent() {
        let current = recipient(EmailStatus::Sent);
        let result = reconcile(&current, Signal::DeliveryWindowElapsed, at(10, 10)).unwrap();
        assert_eq!(result.writes.status, EmailStatus::Delivered);
        assert_eq!(result.event.event, "delivered");

        for status in [
            EmailStatus::Ready,
            EmailStatus::Opened,
            EmailStatus::Delivered,
            EmailStatus::Bounced,
            EmailStatus::Failed,
        ] {
            let current = recipient(status);
            assert!(
                reconcile(&current, Signal::DeliveryWindowElapsed, at(10, 10)).is_none(),
                "heuristic should not apply from {:?}",
                status
            );
        }
    }

    #[test]
    fn retry_success_from_bounced_clears_last_error() {
        let mut current = recipient(EmailStatus::Bounced);
        current.last_error = Some("550 mailbox unavailable".to_string());

        let result = reconcile(
            &current,
            Signal::DispatchSucceeded {
                subject: "Hi".to_string(),
                body: "Hello".to_string(),
            },
            at(12, 0),
        )
        .unwrap();

        assert_eq!(result.writes.status, EmailStatus::Sent);
        assert_eq!(result.writes.last_error, None);
    }
}

//! Realtime notifications over the Pusher Channels HTTP API.
//!
//! Open events are pushed to a single well-known channel so connected
//! dashboards update without polling. Broadcasting is strictly best-effort:
//! failures are logged and never affect tracking or webhook processing.
//! Clients without a realtime connection fall back to polling
//! `/api/events/latest`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::Serialize;
use sha2::Sha256;

use crate::config::AppConfig;
use crate::models::EmailStatus;

/// Channel all recipient updates are published on.
pub const CHANNEL: &str = "email-updates";
/// Event name for open notifications.
pub const EVENT_EMAIL_OPENED: &str = "email-opened";

type HmacSha256 = Hmac<Sha256>;

/// Payload pushed to clients when a recipient opens an email.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOpenedPayload {
    pub email_id: String,
    pub status: EmailStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<String>,
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    name: &'a str,
    channel: &'a str,
    data: String,
}

/// Publishes events to the Pusher Channels HTTP API.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    client: reqwest::Client,
    api_base: String,
    app_id: String,
    key: String,
    secret: String,
}

impl Broadcaster {
    /// Builds a broadcaster when all four Pusher settings are present,
    /// otherwise `None` and the service runs without realtime push.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let app_id = config.pusher_app_id.clone()?;
        let key = config.pusher_key.clone()?;
        let secret = config.pusher_secret.clone()?;
        let cluster = config.pusher_cluster.clone()?;

        Some(Self {
            client: reqwest::Client::new(),
            api_base: format!("https://api-{cluster}.pusher.com"),
            app_id,
            key,
            secret,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    /// Pushes an open notification. Errors are logged, not returned.
    pub async fn broadcast_email_opened(&self, payload: &EmailOpenedPayload) {
        let data = match serde_json::to_string(payload) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize realtime payload");
                return;
            }
        };

        let body = TriggerBody {
            name: EVENT_EMAIL_OPENED,
            channel: CHANNEL,
            data,
        };
        let body = match serde_json::to_string(&body) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize trigger body");
                return;
            }
        };

        let path = format!("/apps/{}/events", self.app_id);
        let Some(query) = self.signed_query("POST", &path, &body, Utc::now().timestamp()) else {
            tracing::error!("Failed to sign realtime trigger request");
            return;
        };
        let url = format!("{}{}?{}", self.api_base, path, query);

        match self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(
                    email_id = %payload.email_id,
                    "Broadcasted email-opened event"
                );
            }
            Ok(response) => {
                tracing::warn!(
                    status = %response.status(),
                    "Realtime broadcast rejected by Pusher"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "Realtime broadcast request failed");
            }
        }
    }

    /// Builds the authenticated query string per the Pusher HTTP API: query
    /// keys in sorted order, signed with HMAC-SHA256 over
    /// `METHOD\npath\nquery`.
    fn signed_query(&self, method: &str, path: &str, body: &str, timestamp: i64) -> Option<String> {
        let body_md5 = hex::encode(Md5::digest(body.as_bytes()));

        let query = format!(
            "auth_key={}&auth_timestamp={}&auth_version=1.0&body_md5={}",
            self.key, timestamp, body_md5
        );

        let to_sign = format!("{method}\n{path}\n{query}");
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Some(format!("{query}&auth_signature={signature}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> Broadcaster {
        let config = AppConfig {
            pusher_app_id: Some("12345".to_string()),
            pusher_key: Some("key".to_string()),
            pusher_secret: Some("secret".to_string()),
            pusher_cluster: Some("eu".to_string()),
            ..Default::default()
        };
        Broadcaster::from_config(&config).expect("configured")
    }

    #[test]
    fn from_config_requires_all_settings() {
        let config = AppConfig {
            pusher_app_id: Some("12345".to_string()),
            pusher_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(Broadcaster::from_config(&config).is_none());
    }

    #[test]
    fn cluster_determines_api_host() {
        assert_eq!(broadcaster().api_base, "https://api-eu.pusher.com");
    }

    #[test]
    fn signed_query_is_deterministic() {
        let b = broadcaster();
        let query = b
            .signed_query("POST", "/apps/12345/events", "{}", 1_700_000_000)
            .unwrap();

        assert!(query.starts_with("auth_key=key&auth_timestamp=1700000000&auth_version=1.0&"));
        // md5("{}")
        assert!(query.contains("body_md5=99914b932bd37a50b983c5e7c90ae93b"));
        let signature = query
            .rsplit_once("auth_signature=")
            .map(|(_, s)| s)
            .unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));

        // Same inputs, same signature.
        assert_eq!(
            Some(query),
            b.signed_query("POST", "/apps/12345/events", "{}", 1_700_000_000)
        );
    }

    #[tokio::test]
    async fn broadcast_posts_trigger_with_auth_params() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps/12345/events"))
            .and(query_param("auth_key", "key"))
            .and(query_param("auth_version", "1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let b = broadcaster().with_api_base(server.uri());
        b.broadcast_email_opened(&EmailOpenedPayload {
            email_id: "abc".to_string(),
            status: EmailStatus::Opened,
            opened_at: None,
            open_count: Some(1),
            ip_address: None,
            user_agent: None,
            geo_location: None,
        })
        .await;
    }
}

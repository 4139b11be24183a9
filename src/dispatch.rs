//! Outbound mail dispatch across the two supported providers.
//!
//! SMTP takes precedence whenever host, user and pass are all configured;
//! SendGrid is the fallback. Open tracking differs per provider: the SMTP
//! path appends our own tracking pixel to the HTML part, the SendGrid path
//! enables provider open tracking and tags the message with the recipient id
//! so webhook events can be correlated back.
//!
//! Dispatch never returns `Err`: every failure is folded into a
//! [`SendOutcome`] so the batch loop can record it per recipient and keep
//! going.

use std::sync::Arc;

use chrono::Utc;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::personalize::strip_html;

/// Configured dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Smtp,
    Sendgrid,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Smtp => "smtp",
            Provider::Sendgrid => "sendgrid",
        }
    }
}

/// Per-recipient dispatch result. Failures carry the provider's message for
/// the recipient's `last_error` and ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl SendOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Sends personalized mail through the configured provider.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: Arc<AppConfig>,
    http: reqwest::Client,
}

impl Mailer {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// SMTP wins when fully configured; otherwise SendGrid.
    pub fn provider(&self) -> Provider {
        if self.config.smtp_configured() {
            Provider::Smtp
        } else {
            Provider::Sendgrid
        }
    }

    /// Sends one message, tagged with the recipient id for open tracking.
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        recipient_id: Uuid,
    ) -> SendOutcome {
        let provider = self.provider();
        tracing::info!(provider = provider.as_str(), to, "Dispatching email");

        match provider {
            Provider::Smtp => self.send_via_smtp(to, subject, html_body, recipient_id).await,
            Provider::Sendgrid => {
                self.send_via_sendgrid(to, subject, html_body, recipient_id)
                    .await
            }
        }
    }

    /// Tracking pixel tag for the SMTP path; the timestamp query defeats
    /// image caches so repeat opens register.
    fn tracking_pixel(&self, recipient_id: Uuid) -> String {
        let base = self.config.app_base_url.trim_end_matches('/');
        let url = format!(
            "{}/track/{}?t={}",
            base,
            recipient_id,
            Utc::now().timestamp_millis()
        );
        format!(
            "<img src=\"{url}\" width=\"1\" height=\"1\" \
             style=\"display:none;width:1px;height:1px;border:0;\" alt=\"\" />"
        )
    }

    async fn send_via_smtp(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        recipient_id: Uuid,
    ) -> SendOutcome {
        let (Some(host), Some(user), Some(pass)) = (
            self.config.smtp_host.as_deref(),
            self.config.smtp_user.clone(),
            self.config.smtp_pass.clone(),
        ) else {
            return SendOutcome::failed(
                "SMTP credentials not configured. Set SMTP_HOST, SMTP_USER and SMTP_PASS.",
            );
        };

        let from_email = self
            .config
            .from_email
            .as_deref()
            .unwrap_or(user.as_str())
            .to_string();
        let from: Mailbox = match format!("{} <{}>", self.config.from_name, from_email).parse() {
            Ok(mailbox) => mailbox,
            Err(err) => return SendOutcome::failed(format!("Invalid sender address: {err}")),
        };
        let to_mailbox: Mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(err) => return SendOutcome::failed(format!("Invalid recipient address: {err}")),
        };

        // Pixel goes in the HTML part only; the plain part stays clean.
        let html_with_pixel = format!("{}{}", html_body, self.tracking_pixel(recipient_id));
        let plain = strip_html(html_body);

        let message = match Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(plain, html_with_pixel))
        {
            Ok(message) => message,
            Err(err) => return SendOutcome::failed(format!("Failed to build message: {err}")),
        };

        let port = self.config.smtp_port;
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        };
        let transport = match builder {
            Ok(builder) => builder
                .port(port)
                .credentials(Credentials::new(user, pass))
                .build(),
            Err(err) => return SendOutcome::failed(format!("SMTP transport error: {err}")),
        };

        match transport.send(message).await {
            Ok(_) => {
                tracing::info!(to, "Email sent via SMTP");
                SendOutcome::ok()
            }
            Err(err) => {
                tracing::error!(error = %err, to, "SMTP send failed");
                SendOutcome::failed(err.to_string())
            }
        }
    }

    async fn send_via_sendgrid(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        recipient_id: Uuid,
    ) -> SendOutcome {
        let Some(api_key) = self.config.sendgrid_api_key.as_deref() else {
            return SendOutcome::failed("SendGrid API key not configured");
        };
        let Some(from_email) = self.config.from_email.as_deref() else {
            return SendOutcome::failed("FROM_EMAIL not configured");
        };

        let payload = json!({
            "personalizations": [{
                "to": [{ "email": to }],
                "custom_args": { "emailId": recipient_id.to_string() },
            }],
            "from": {
                "email": from_email,
                "name": self.config.from_name,
            },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": strip_html(html_body) },
                { "type": "text/html", "value": html_body },
            ],
            "tracking_settings": {
                "open_tracking": { "enable": true },
            },
        });

        let url = format!(
            "{}/v3/mail/send",
            self.config.sendgrid_api_base.trim_end_matches('/')
        );

        let response = match self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, to, "SendGrid request failed");
                return SendOutcome::failed(err.to_string());
            }
        };

        if response.status().is_success() {
            tracing::info!(to, "Email sent via SendGrid");
            return SendOutcome::ok();
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(%status, body, to, "SendGrid rejected the message");
        SendOutcome::failed(format!("SendGrid error {status}: {body}"))
    }
}

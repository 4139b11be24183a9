//! # Webhook Signature Verification
//!
//! Verifies the provider's signed-event-webhook header pair using
//! HMAC-SHA256 with constant-time comparison. Verification only runs when a
//! signing key is configured; without one the endpoint accepts events
//! unverified.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Signature header carrying `v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Timestamp header carrying the Unix seconds the provider signed over.
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

const SIGNATURE_PREFIX: &str = "v1=";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Missing required timestamp header: {header}")]
    MissingTimestamp { header: String },

    #[error("Invalid timestamp format: {header}")]
    InvalidTimestamp { header: String },

    #[error("Timestamp too old: {seconds}s old, max allowed: {max_seconds}s")]
    TimestampTooOld { seconds: u64, max_seconds: u64 },

    #[error("Timestamp too far in future: {seconds}s in future, max allowed: {max_seconds}s")]
    TimestampTooFuture { seconds: u64, max_seconds: u64 },
}

impl VerificationError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies the signature over `v1:{timestamp}:{body}` with timestamp
/// tolerance checking.
pub fn verify_signature(
    body: &[u8],
    signature_header: &str,
    timestamp_header: &str,
    secret: &str,
    tolerance_seconds: u64,
) -> VerificationResult<()> {
    tracing::debug!(
        body_size = body.len(),
        tolerance_seconds,
        "Starting webhook signature verification"
    );

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: SIGNATURE_HEADER.to_string(),
        });
    }

    if timestamp_header.is_empty() {
        return Err(VerificationError::MissingTimestamp {
            header: TIMESTAMP_HEADER.to_string(),
        });
    }

    let timestamp =
        timestamp_header
            .parse::<u64>()
            .map_err(|_| VerificationError::InvalidTimestamp {
                header: format!("{TIMESTAMP_HEADER} must be a valid Unix timestamp"),
            })?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| VerificationError::InvalidTimestamp {
            header: "Failed to get current time".to_string(),
        })?
        .as_secs();

    let time_diff = now.abs_diff(timestamp);
    if time_diff > tolerance_seconds {
        if now > timestamp {
            return Err(VerificationError::TimestampTooOld {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            });
        }
        return Err(VerificationError::TimestampTooFuture {
            seconds: time_diff,
            max_seconds: tolerance_seconds,
        });
    }

    let Some(expected_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return Err(VerificationError::InvalidSignatureFormat {
            header: format!("{SIGNATURE_HEADER} must start with '{SIGNATURE_PREFIX}'"),
        });
    };

    let provided_bytes =
        hex::decode(expected_hex).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: format!("{SIGNATURE_HEADER} contains invalid hex"),
        })?;

    let base_string = format!("v1:{}:{}", timestamp, String::from_utf8_lossy(body));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(base_string.as_bytes());

    // verify_slice compares in constant time.
    mac.verify_slice(&provided_bytes)
        .map_err(|_| VerificationError::VerificationFailed)
}

/// Verifies an inbound webhook request against the configured signing key.
/// A missing key disables verification entirely.
pub fn verify_webhook_request(
    body: &[u8],
    headers: &HeaderMap,
    config: &AppConfig,
) -> VerificationResult<()> {
    let Some(secret) = config.webhook_signing_key.as_deref() else {
        return Ok(());
    };

    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    let timestamp_header = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    verify_signature(
        body,
        signature_header,
        timestamp_header,
        secret,
        config.webhook_tolerance_seconds,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], timestamp: u64, secret: &str) -> String {
        let base_string = format!("v1:{}:{}", timestamp, String::from_utf8_lossy(body));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(base_string.as_bytes());
        format!("v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn valid_signature_verifies() {
        let body = b"[{\"event\":\"delivered\"}]";
        let timestamp = now_secs();
        let signature = sign(body, timestamp, "secret");

        assert!(verify_signature(body, &signature, &timestamp.to_string(), "secret", 300).is_ok());
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let timestamp = now_secs();
        let signature = sign(body, timestamp, "other-secret");

        assert!(matches!(
            verify_signature(body, &signature, &timestamp.to_string(), "secret", 300),
            Err(VerificationError::VerificationFailed)
        ));
    }

    #[test]
    fn tampered_body_fails() {
        let timestamp = now_secs();
        let signature = sign(b"original", timestamp, "secret");

        assert!(
            verify_signature(b"tampered", &signature, &timestamp.to_string(), "secret", 300)
                .is_err()
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let body = b"payload";
        let timestamp = now_secs() - 400;
        let signature = sign(body, timestamp, "secret");

        assert!(matches!(
            verify_signature(body, &signature, &timestamp.to_string(), "secret", 300),
            Err(VerificationError::TimestampTooOld { .. })
        ));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let body = b"payload";
        let timestamp = now_secs().to_string();

        assert!(verify_signature(body, "", &timestamp, "secret", 300).is_err());
        assert!(verify_signature(body, "v1=abc", "", "secret", 300).is_err());
        assert!(verify_signature(body, "no-prefix", &timestamp, "secret", 300).is_err());
        assert!(verify_signature(body, "v1=zzzz", &timestamp, "secret", 300).is_err());
    }

    #[test]
    fn unconfigured_key_skips_verification() {
        let config = AppConfig::default();
        let headers = HeaderMap::new();

        assert!(verify_webhook_request(b"{}", &headers, &config).is_ok());
    }

    #[test]
    fn configured_key_enforces_headers() {
        let config = AppConfig {
            webhook_signing_key: Some("secret".to_string()),
            ..Default::default()
        };
        let headers = HeaderMap::new();

        assert!(verify_webhook_request(b"{}", &headers, &config).is_err());

        let timestamp = now_secs();
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            sign(b"{}", timestamp, "secret").parse().unwrap(),
        );
        headers.insert(
            TIMESTAMP_HEADER,
            timestamp.to_string().parse().unwrap(),
        );
        assert!(verify_webhook_request(b"{}", &headers, &config).is_ok());
    }
}

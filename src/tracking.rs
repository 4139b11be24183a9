//! Open-tracking support: the transparent pixel, user-agent humanization,
//! and best-effort IP geolocation.

use std::sync::OnceLock;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::config::AppConfig;

/// 1x1 transparent GIF, base64-encoded.
const TRANSPARENT_PIXEL_B64: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// Raw bytes of the 1x1 transparent GIF served to tracking requests.
pub fn pixel_bytes() -> &'static [u8] {
    static PIXEL: OnceLock<Vec<u8>> = OnceLock::new();
    PIXEL
        .get_or_init(|| {
            BASE64
                .decode(TRANSPARENT_PIXEL_B64)
                .expect("pixel constant is valid base64")
        })
        .as_slice()
}

/// Condenses a raw User-Agent header into a `client on os device` label.
pub fn parse_user_agent(ua: &str) -> String {
    if ua.is_empty() {
        return "Unknown".to_string();
    }

    let mut device = "Desktop";
    if ua.contains("Mobile") || ua.contains("Android") {
        device = "Mobile";
    }
    if ua.contains("iPad") || ua.contains("Tablet") {
        device = "Tablet";
    }

    let client = if ua.contains("Gmail") {
        "Gmail"
    } else if ua.contains("Outlook") || ua.contains("Microsoft") {
        "Outlook"
    } else if ua.contains("Yahoo") {
        "Yahoo Mail"
    } else if ua.contains("Chrome") {
        "Chrome"
    } else if ua.contains("Safari") {
        "Safari"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Edge") {
        "Edge"
    } else {
        "Unknown"
    };

    let os = if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Mac") {
        "Mac"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        ""
    };

    format!("{} on {} {}", client, os, device)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Geolocation fields of interest from the lookup service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoData {
    #[serde(rename = "country_name")]
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    error: bool,
    #[serde(flatten)]
    data: GeoData,
}

/// Joins city, region and country into a single display string.
pub fn format_geo_location(geo: &GeoData) -> Option<String> {
    let parts: Vec<&str> = [geo.city.as_deref(), geo.region.as_deref(), geo.country.as_deref()]
        .into_iter()
        .flatten()
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn is_private_ip(ip: &str) -> bool {
    ip == "127.0.0.1"
        || ip == "::1"
        || ip.starts_with("192.168.")
        || ip.starts_with("10.")
        || ip == "Unknown"
}

/// Best-effort IP geolocation client backed by an external lookup service.
#[derive(Debug, Clone)]
pub struct GeoLocator {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl GeoLocator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.geo_api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.geo_timeout_ms),
        }
    }

    /// Looks up geolocation for `ip`. Returns `None` for private or unknown
    /// addresses and on any lookup failure; opens are tracked regardless.
    pub async fn lookup(&self, ip: &str) -> Option<GeoData> {
        if is_private_ip(ip) {
            return None;
        }

        let url = format!("{}/{}/json/", self.api_base, ip);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("User-Agent", "outreach/1.0")
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), ip, "Geo lookup returned non-success status");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, ip, "Geo lookup request failed");
                return None;
            }
        };

        match response.json::<GeoResponse>().await {
            Ok(parsed) if !parsed.error => Some(parsed.data),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, ip, "Geo lookup returned unparseable body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_decodes_to_gif() {
        let bytes = pixel_bytes();
        assert_eq!(&bytes[..6], b"GIF89a");
        assert_eq!(bytes.len(), 42);
    }

    #[test]
    fn user_agent_humanization() {
        assert_eq!(parse_user_agent(""), "Unknown");
        assert_eq!(
            parse_user_agent("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0"),
            "Chrome on Windows Desktop"
        );
        assert_eq!(
            parse_user_agent("Mozilla/5.0 (Linux; Android 13) Mobile Safari"),
            "Safari on Android Mobile"
        );
        assert_eq!(parse_user_agent("something opaque"), "Unknown on Desktop");
    }

    #[test]
    fn geo_formatting_joins_present_parts() {
        let geo = GeoData {
            country: Some("Germany".to_string()),
            city: Some("Berlin".to_string()),
            region: None,
        };
        assert_eq!(format_geo_location(&geo), Some("Berlin, Germany".to_string()));
        assert_eq!(format_geo_location(&GeoData::default()), None);
    }

    #[test]
    fn private_ips_are_skipped() {
        for ip in ["127.0.0.1", "::1", "192.168.1.5", "10.0.0.2", "Unknown"] {
            assert!(is_private_ip(ip), "{ip} should be private");
        }
        assert!(!is_private_ip("203.0.113.9"));
    }

    #[tokio::test]
    async fn lookup_parses_service_response() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/203.0.113.9/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "city": "Berlin",
                "region": "BE",
                "country_name": "Germany"
            })))
            .mount(&server)
            .await;

        let config = AppConfig {
            geo_api_base: server.uri(),
            ..Default::default()
        };
        let locator = GeoLocator::new(&config);

        let geo = locator.lookup("203.0.113.9").await.expect("geo data");
        assert_eq!(format_geo_location(&geo).as_deref(), Some("Berlin, BE, Germany"));
    }

    #[tokio::test]
    async fn lookup_error_body_yields_none() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/198.51.100.1/json/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": true,
                "reason": "RateLimited"
            })))
            .mount(&server)
            .await;

        let config = AppConfig {
            geo_api_base: server.uri(),
            ..Default::default()
        };
        let locator = GeoLocator::new(&config);

        assert!(locator.lookup("198.51.100.1").await.is_none());
    }
}

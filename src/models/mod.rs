//! # Data Models
//!
//! This module contains all the data models used throughout the Outreach API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod email_event;
pub mod recipient;
pub mod template;

pub use email_event::Model as EmailEvent;
pub use recipient::{EmailStatus, Model as Recipient};
pub use template::Model as Template;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "outreach".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

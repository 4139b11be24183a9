//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities, providing a clean API for data access.

pub mod email_event;
pub mod recipient;
pub mod template;

pub use email_event::EmailEventRepository;
pub use recipient::RecipientRepository;
pub use template::TemplateRepository;

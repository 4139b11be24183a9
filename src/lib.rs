//! # Outreach API Library
//!
//! This library provides the core functionality for the Outreach API service:
//! recipient and template management, batch dispatch, open/delivery tracking
//! and the append-only event ledger behind it.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod models;
pub mod personalize;
pub mod realtime;
pub mod reconcile;
pub mod repositories;
pub mod sender;
pub mod server;
pub mod telemetry;
pub mod tracking;
pub mod webhook_verification;
pub use migration;

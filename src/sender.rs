//! Batch sender: sequential dispatch over ready recipients with a fixed
//! inter-send delay.
//!
//! Partial failure is expected and non-fatal. Each recipient is marked
//! SENDING, rendered against the active template, dispatched, reconciled and
//! ledgered before the loop moves on. One recipient's failure never halts
//! the batch; the fixed delay is a provider rate-limit guard, not an
//! adaptive backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatch::Mailer;
use crate::models::recipient::Model as RecipientModel;
use crate::models::{EmailStatus, Template};
use crate::personalize;
use crate::reconcile::{self, Signal};
use crate::repositories::{RecipientRepository, TemplateRepository};

/// Errors surfaced to the send endpoints.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("No active template found. Please save a template first.")]
    NoActiveTemplate,
    #[error("No emails ready to send")]
    NothingToSend,
    #[error("Recipient not found")]
    RecipientNotFound,
    #[error("Can only retry failed, blocked, bounced, or dropped emails")]
    NotRetryable,
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Per-recipient outcome of a batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SendResultEntry {
    pub id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate counts for a finished batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<SendResultEntry>,
}

/// Orchestrates template rendering, dispatch and reconciliation for batches
/// and retries.
#[derive(Debug, Clone)]
pub struct BatchSender {
    config: Arc<AppConfig>,
    mailer: Arc<Mailer>,
    recipients: RecipientRepository,
    templates: TemplateRepository,
}

impl BatchSender {
    pub fn new(
        config: Arc<AppConfig>,
        mailer: Arc<Mailer>,
        recipients: RecipientRepository,
        templates: TemplateRepository,
    ) -> Self {
        Self {
            config,
            mailer,
            recipients,
            templates,
        }
    }

    /// Sends to every recipient currently in READY status.
    pub async fn send_all(&self) -> Result<BatchSummary, SendError> {
        let template = self.active_template().await?;
        let batch = self.recipients.find_ready().await?;
        if batch.is_empty() {
            return Err(SendError::NothingToSend);
        }
        Ok(self.run_batch(batch, &template).await)
    }

    /// Sends to an explicitly selected subset; only READY recipients among
    /// the ids are eligible.
    pub async fn send_selected(&self, ids: &[Uuid]) -> Result<BatchSummary, SendError> {
        let template = self.active_template().await?;
        let batch: Vec<RecipientModel> = self
            .recipients
            .find_by_ids(ids)
            .await?
            .into_iter()
            .filter(|r| r.status == EmailStatus::Ready)
            .collect();
        if batch.is_empty() {
            return Err(SendError::NothingToSend);
        }
        Ok(self.run_batch(batch, &template).await)
    }

    /// Retries a single recipient in a terminal failure status, re-rendering
    /// against the currently active template.
    pub async fn retry(&self, id: Uuid) -> Result<RecipientModel, SendError> {
        let recipient = self
            .recipients
            .find_by_id(id)
            .await?
            .ok_or(SendError::RecipientNotFound)?;

        if !recipient.status.is_retryable() {
            return Err(SendError::NotRetryable);
        }

        let template = self.active_template().await?;
        let updated = self.send_one(recipient, &template, true).await?;
        Ok(updated)
    }

    async fn active_template(&self) -> Result<Template, SendError> {
        self.templates
            .active()
            .await?
            .ok_or(SendError::NoActiveTemplate)
    }

    async fn run_batch(&self, batch: Vec<RecipientModel>, template: &Template) -> BatchSummary {
        let total = batch.len();
        let mut results = Vec::with_capacity(total);

        for (index, recipient) in batch.into_iter().enumerate() {
            let id = recipient.id;
            let entry = match self.send_one(recipient, template, false).await {
                Ok(updated) => SendResultEntry {
                    id,
                    success: updated.status == EmailStatus::Sent,
                    error: updated.last_error,
                },
                Err(err) => {
                    // A persistence error for one recipient never halts the
                    // batch.
                    tracing::error!(recipient_id = %id, error = %err, "Batch entry failed");
                    SendResultEntry {
                        id,
                        success: false,
                        error: Some(err.to_string()),
                    }
                }
            };
            results.push(entry);

            // Rate-limit guard between sends; skipped after the last one.
            if index + 1 < total {
                tokio::time::sleep(Duration::from_millis(self.config.send_delay_ms)).await;
            }
        }

        let sent = results.iter().filter(|r| r.success).count();
        BatchSummary {
            total,
            sent,
            failed: total - sent,
            results,
        }
    }

    /// One full send cycle: mark SENDING, render, dispatch, reconcile,
    /// append the ledger row.
    async fn send_one(
        &self,
        recipient: RecipientModel,
        template: &Template,
        retry: bool,
    ) -> Result<RecipientModel, DbErr> {
        let recipient = self.recipients.mark_sending(recipient).await?;

        let rendered = personalize::render(template, &recipient);
        let outcome = self
            .mailer
            .send(&recipient.email, &rendered.subject, &rendered.body, recipient.id)
            .await;

        let signal = if outcome.success {
            Signal::DispatchSucceeded {
                subject: rendered.subject,
                body: rendered.body,
            }
        } else {
            Signal::DispatchFailed {
                reason: outcome
                    .error
                    .unwrap_or_else(|| "Unknown dispatch error".to_string()),
                retry,
            }
        };

        // Dispatch signals always apply.
        let Some(reconciled) = reconcile::reconcile(&recipient, signal, Utc::now()) else {
            return Ok(recipient);
        };
        self.recipients.apply(recipient.id, &reconciled).await
    }
}

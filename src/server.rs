//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Outreach API.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::dispatch::Mailer;
use crate::handlers;
use crate::realtime::Broadcaster;
use crate::repositories::{EmailEventRepository, RecipientRepository, TemplateRepository};
use crate::sender::BatchSender;
use crate::tracking::GeoLocator;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<Mailer>,
    pub broadcaster: Option<Arc<Broadcaster>>,
    pub geo: Arc<GeoLocator>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        let mailer = Arc::new(Mailer::new(config.clone()));
        let broadcaster = Broadcaster::from_config(&config).map(Arc::new);
        let geo = Arc::new(GeoLocator::new(&config));

        Self {
            config,
            db: Arc::new(db),
            mailer,
            broadcaster,
            geo,
        }
    }

    pub fn recipients(&self) -> RecipientRepository {
        RecipientRepository::new(self.db.clone())
    }

    pub fn templates(&self) -> TemplateRepository {
        TemplateRepository::new(self.db.clone())
    }

    pub fn events(&self) -> EmailEventRepository {
        EmailEventRepository::new(self.db.clone())
    }

    pub fn sender(&self) -> BatchSender {
        BatchSender::new(
            self.config.clone(),
            self.mailer.clone(),
            self.recipients(),
            self.templates(),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/api/emails",
            get(handlers::recipients::list_recipients).post(handlers::recipients::create_recipient),
        )
        .route(
            "/api/emails/send-all",
            post(handlers::send::send_all),
        )
        .route(
            "/api/emails/send-selected",
            post(handlers::send::send_selected),
        )
        .route(
            "/api/emails/{id}",
            axum::routing::delete(handlers::recipients::delete_recipient),
        )
        .route(
            "/api/emails/{id}/events",
            get(handlers::recipients::recipient_events),
        )
        .route("/api/emails/{id}/retry", post(handlers::send::retry))
        .route(
            "/api/template",
            get(handlers::templates::get_active_template).put(handlers::templates::save_template),
        )
        .route("/api/templates", get(handlers::templates::list_templates))
        .route("/api/events/latest", get(handlers::events::latest_event))
        .route(
            "/api/webhooks/sendgrid",
            post(handlers::webhooks::receive_events).get(handlers::webhooks::probe),
        )
        .route("/track/{id}", get(handlers::track::track_open))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let state = AppState::new(config.clone(), db);
    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on: {}", addr);
    println!("Running in profile: {}", config.profile);

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::recipients::list_recipients,
        crate::handlers::recipients::create_recipient,
        crate::handlers::recipients::delete_recipient,
        crate::handlers::recipients::recipient_events,
        crate::handlers::templates::get_active_template,
        crate::handlers::templates::save_template,
        crate::handlers::templates::list_templates,
        crate::handlers::send::send_all,
        crate::handlers::send::send_selected,
        crate::handlers::send::retry,
        crate::handlers::events::latest_event,
        crate::handlers::webhooks::receive_events,
        crate::handlers::webhooks::probe,
        crate::handlers::track::track_open,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::EmailStatus,
            crate::error::ApiError,
            crate::handlers::types::RecipientDto,
            crate::handlers::types::TemplateDto,
            crate::handlers::types::EmailEventDto,
            crate::handlers::recipients::CreateRecipientDto,
            crate::handlers::templates::SaveTemplateDto,
            crate::handlers::send::SendSelectedDto,
            crate::handlers::send::BatchResultDto,
            crate::handlers::send::BatchSummaryDto,
            crate::handlers::events::LatestEventDto,
        )
    ),
    info(
        title = "Outreach API",
        description = "Bulk email outreach with per-recipient delivery and open tracking",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

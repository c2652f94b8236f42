pub mod auth;
pub mod availability;
pub mod bookings;
pub mod cache;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod jobs;
pub mod notifications;
pub mod pricing;
pub mod store;
pub mod subscriptions;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use auth::TokenService;
use availability::AvailabilityQueryService;
use bookings::BookingLifecycleManager;
use cache::{MemoryCache, QueryCache, RedisCache};
use config::{AppConfig, StoreBackend};
use ingestion::IngestionPipeline;
use jobs::{JobExecutor, JobQueue, JobRegistry};
use notifications::NotificationHub;
use pricing::PricingEngine;
use store::{MemoryStore, PgStore, Store};
use subscriptions::{rate_limit, RateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub availability: Arc<AvailabilityQueryService>,
    pub bookings: Arc<BookingLifecycleManager>,
    pub ingestion: Arc<IngestionPipeline>,
    pub notifications: Arc<NotificationHub>,
    pub jobs: JobQueue,
    pub tokens: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub webhook_secret: Option<String>,
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limiter.clone()
    }
}

impl AppState {
    /// Wire the services together and start the job workers
    ///
    /// Must run inside a tokio runtime.
    pub fn build(config: &AppConfig, store: Arc<dyn Store>, cache: Arc<dyn QueryCache>) -> Self {
        let availability = Arc::new(AvailabilityQueryService::new(
            store.clone(),
            cache,
            config.cache_ttl,
            config.max_query_range_days,
        ));
        let notifications = Arc::new(NotificationHub::new());
        let bookings = Arc::new(BookingLifecycleManager::new(
            store.clone(),
            availability.clone(),
            PricingEngine::with_currency(config.currency.clone()),
            notifications.clone(),
        ));
        let ingestion = Arc::new(IngestionPipeline::new(store.clone(), availability.clone()));

        let executor = Arc::new(JobExecutor::new(bookings.clone(), ingestion.clone()));
        let jobs = JobQueue::start(
            executor,
            Arc::new(JobRegistry::with_retention(config.jobs.retention)),
            config.jobs.clone(),
        );

        Self {
            rate_limiter: Arc::new(RateLimiter::new(store.clone(), config.cache_ttl)),
            tokens: Arc::new(TokenService::new(&config.jwt_secret)),
            webhook_secret: config.webhook_secret.clone(),
            store,
            availability,
            bookings,
            ingestion,
            notifications,
            jobs,
        }
    }
}

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        availability::handlers::check_availability_handler,
        ingestion::handlers::ingest_handler,
        bookings::handlers::create_booking_handler,
        bookings::handlers::list_bookings_handler,
        bookings::handlers::get_booking_handler,
        bookings::handlers::update_booking_handler,
        bookings::handlers::cancel_booking_handler,
        bookings::handlers::pricing_preview_handler,
        jobs::handlers::get_job_status_handler,
        jobs::handlers::list_dead_letters_handler,
        jobs::handlers::replay_job_handler,
        chat::handlers::webhook_handler,
    ),
    components(
        schemas(
            error::ErrorResponse,
            availability::models::AvailabilityResult,
            availability::models::RoomListing,
            availability::models::DayDetail,
            ingestion::models::PropertyInput,
            ingestion::models::RoomInput,
            ingestion::models::DayInput,
            ingestion::models::IngestionAccepted,
            bookings::models::Booking,
            bookings::models::BookingStatus,
            bookings::models::CreateBookingRequest,
            bookings::models::UpdateBookingRequest,
            bookings::models::PricingPreview,
            bookings::models::BookingAccepted,
            pricing::PriceBreakdown,
            pricing::DailyRate,
            jobs::JobRecord,
            jobs::JobStatus,
            jobs::JobAccepted,
            chat::models::WebhookRequest,
            chat::models::QueryResult,
            chat::models::IntentRef,
            chat::models::ChatParams,
            chat::models::WebhookResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "availability", description = "Availability queries and ingestion"),
        (name = "bookings", description = "Booking lifecycle and pricing"),
        (name = "jobs", description = "Status and replay of queued work"),
        (name = "chat", description = "Intent classifier webhook"),
        (name = "health", description = "Liveness")
    ),
    info(
        title = "Booking API",
        version = "1.0.0",
        description = "Hotel availability and booking service"
    )
)]
pub struct ApiDoc;

/// Registers the bearer JWT scheme the protected paths refer to
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Handler for GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = String, example = json!({"status": "ok"}))
    ),
    tag = "health"
)]
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the application router
///
/// Every `/api` route except the chat webhook requires a bearer token and
/// counts against the caller's plan limit.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route(
            "/api/availability",
            get(availability::handlers::check_availability_handler),
        )
        .route(
            "/api/availability/ingest",
            post(ingestion::handlers::ingest_handler),
        )
        .route(
            "/api/bookings",
            get(bookings::handlers::list_bookings_handler)
                .post(bookings::handlers::create_booking_handler),
        )
        .route(
            "/api/bookings/pricing-preview",
            get(bookings::handlers::pricing_preview_handler),
        )
        .route(
            "/api/bookings/:id",
            get(bookings::handlers::get_booking_handler)
                .put(bookings::handlers::update_booking_handler)
                .delete(bookings::handlers::cancel_booking_handler),
        )
        .route(
            "/api/jobs/dead-letters",
            get(jobs::handlers::list_dead_letters_handler),
        )
        .route("/api/jobs/:id", get(jobs::handlers::get_job_status_handler))
        .route("/api/jobs/:id/replay", post(jobs::handlers::replay_job_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health))
        .route("/api/dialogflow/webhook", post(chat::handlers::webhook_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or(config::ConfigError::Missing("DATABASE_URL"))?;

            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url).await?;

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations completed successfully");

            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

async fn connect_cache(config: &AppConfig) -> Arc<dyn QueryCache> {
    let Some(url) = config.redis_url.as_deref() else {
        return Arc::new(MemoryCache::new());
    };
    match RedisCache::new(url).await {
        Ok(cache) => {
            tracing::info!("Availability cache backed by Redis");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!("Redis unavailable ({}), using in-process cache", e);
            Arc::new(MemoryCache::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("booking_api=debug,tower_http=info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Booking API - Starting...");

    let config = AppConfig::from_env()?;
    let store = connect_store(&config).await?;
    let cache = connect_cache(&config).await;
    if config.webhook_secret.is_none() {
        tracing::warn!("DIALOGFLOW_WEBHOOK_SECRET is not set; the chat webhook rejects all calls");
    }

    let app = create_router(AppState::build(&config, store, cache));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Booking API is running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests;

use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod middleware;
mod pg;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leadreg Merge API",
        version = "0.1.0",
        description = "Duplicate detection and record merge for the lead registry: \
                       check profiles for likely duplicates, preview a field-by-field \
                       merge plan, execute an approved merge, and undo one from its snapshot."
    ),
    paths(
        routes::health::health_check,
        routes::duplicates::check_duplicates,
        routes::duplicates::bulk_check_duplicates,
        routes::merge::preview_merge,
        routes::merge::execute_merge,
        routes::merge::undo_merge,
    ),
    components(schemas(
        HealthResponse,
        routes::duplicates::DuplicateCheckRequest,
        routes::duplicates::DuplicateCheckResponse,
        routes::duplicates::BulkDuplicateCheckRequest,
        routes::duplicates::BulkDuplicateCheckResponse,
        routes::merge::MergePreviewRequest,
        routes::merge::UndoMergeRequest,
        leadreg_core::error::ApiError,
        leadreg_core::identity::IdentityField,
        leadreg_core::identity::IdentityProfile,
        leadreg_core::matching::MatchType,
        leadreg_core::matching::FieldMatch,
        leadreg_core::matching::DuplicateCandidate,
        leadreg_core::leads::Lead,
        leadreg_core::leads::BudgetStatus,
        leadreg_core::leads::PurchaseTimeline,
        leadreg_core::leads::RetirementStamp,
        leadreg_core::leads::DependentKind,
        leadreg_core::leads::DependentRecord,
        leadreg_core::leads::MigrationMarker,
        leadreg_core::leads::MergeAuditRecord,
        leadreg_core::leads::AuditEntry,
        leadreg_core::decisions::MergeFieldDecision,
        leadreg_core::decisions::MergePreview,
        leadreg_core::engine::BulkCheckItem,
        leadreg_core::engine::MergeRequest,
        leadreg_core::engine::MergeResult,
        leadreg_core::engine::RestoredRecord,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadreg_api=debug,leadreg_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState {
        store: pg::PgStore::new(pool),
        config: leadreg_core::DedupConfig::default(),
    };

    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::duplicates::router())
        .merge(routes::merge::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Leadreg API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

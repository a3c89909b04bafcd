pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::{ConfigError, IdentityConfig, ServiceConfig};
pub use scheduler::ReconcileScheduler;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Toolshed API",
        version = "0.1.0",
        description = "Install, track and reconcile developer tools on this workstation"
    ),
    paths(
        routes::health_check,
        routes::list_software,
        routes::list_installed,
        routes::list_installed_for_owner,
        routes::check_command,
        routes::install_software,
        routes::scan_software,
        routes::update_version,
        routes::uninstall_software,
        routes::check_updates,
        routes::sse::install_progress_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::CheckCommandRequest,
        routes::UpdateVersionRequest,
        routes::ScanResponse,
        error::ErrorResponse,
        orchestrator::InstallRequest,
        orchestrator::SoftwareListing,
        orchestrator::CommandCheck,
        orchestrator::UpdateStatus,
        orchestrator::ScanReport,
        events::ProgressEvent,
        toolshed_core::InstalledRecord,
        toolshed_core::InstallStatus,
        toolshed_core::PackageKind,
        toolshed_core::CatalogEntry,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "software", description = "Catalog, installs and reconciliation"),
        (name = "events", description = "Install progress streaming (SSE)"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", ApiDoc::openapi()))
        .route("/health", get(routes::health_check))
        .route("/api/software", get(routes::list_software))
        .route("/api/software/installed", get(routes::list_installed))
        .route(
            "/api/software/users/{owner_id}",
            get(routes::list_installed_for_owner),
        )
        .route("/api/software/check-command", post(routes::check_command))
        .route("/api/software/install", post(routes::install_software))
        .route("/api/software/scan", post(routes::scan_software))
        .route(
            "/api/software/install-progress",
            get(routes::sse::install_progress_stream),
        )
        .route(
            "/api/software/{app_id}",
            axum::routing::put(routes::update_version).delete(routes::uninstall_software),
        )
        .route(
            "/api/software/{app_id}/updates",
            get(routes::check_updates),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

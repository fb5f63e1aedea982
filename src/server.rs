//! # Server Configuration
//!
//! Router assembly, shared state and the OpenAPI document for the regroup
//! HTTP surface.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::queue::TaskQueue;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub queue: Arc<dyn TaskQueue>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/merges", post(handlers::merges::create_merge))
        .route(
            "/groups/{group_id}/rehash",
            post(handlers::groups::rehash_group),
        )
        .route(
            "/teams/{team_id}/groups/new",
            get(handlers::groups::list_new_groups),
        )
        .route(
            "/redirects/{group_id}",
            get(handlers::redirects::resolve_redirect),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .nest("/v1", operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` is cancelled
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state
        .config
        .bind_addr()
        .context("Invalid server address")?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    Ok(())
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::merges::create_merge,
        crate::handlers::groups::rehash_group,
        crate::handlers::groups::list_new_groups,
        crate::handlers::redirects::resolve_redirect,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthStatus,
            crate::handlers::merges::MergeRequest,
            crate::handlers::merges::MergeAccepted,
            crate::handlers::groups::RehashAccepted,
            crate::handlers::groups::GroupInfo,
            crate::handlers::groups::NewGroupsQuery,
            crate::handlers::redirects::ResolvedGroup,
            crate::error::ApiError,
        )
    ),
    modifiers(&BearerSecurity),
    info(
        title = "Regroup API",
        description = "Merge and rehash of error groups",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

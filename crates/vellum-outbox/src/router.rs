//! Route table for the registry and pipeline endpoints.
//!
//! The host application mounts this router under its own prefix and is
//! responsible for authentication; every request must carry a
//! [`TenantContext`](crate::models::TenantContext) extension before it
//! reaches these routes.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;

use crate::config::PipelineConfig;
use crate::error::OutboxError;
use crate::handlers;
use crate::services::{RegistryService, ScheduledContentPublisher};
use crate::tenant_refs::TenantRefResolver;

/// Shared state behind the outbox routes.
#[derive(Clone)]
pub struct OutboxState {
    pub pool: PgPool,
    pub config: PipelineConfig,
    pub registry: Arc<RegistryService>,
    pub publisher: Option<Arc<dyn ScheduledContentPublisher>>,
}

impl OutboxState {
    /// Build state with a registry wired to the same pool and config.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Internal` if the registry's HTTP client cannot
    /// be built.
    pub fn new(pool: PgPool, config: PipelineConfig) -> Result<Self, OutboxError> {
        let resolver = Arc::new(TenantRefResolver::new(pool.clone()));
        let registry = Arc::new(RegistryService::new(
            pool.clone(),
            resolver,
            config.http_timeout(),
        )?);

        Ok(Self {
            pool,
            config,
            registry,
            publisher: None,
        })
    }

    /// Attach a scheduled-content publisher used by on-demand pipeline runs.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn ScheduledContentPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

/// Build the outbox router.
pub fn outbox_router(state: OutboxState) -> Router {
    Router::new()
        .route(
            "/webhooks",
            post(handlers::webhooks::create_webhook).get(handlers::webhooks::list_webhooks),
        )
        .route(
            "/webhooks/:id",
            get(handlers::webhooks::get_webhook)
                .patch(handlers::webhooks::update_webhook)
                .delete(handlers::webhooks::delete_webhook),
        )
        .route(
            "/webhooks/:id/rotate-secret",
            post(handlers::webhooks::rotate_secret),
        )
        .route("/webhooks/:id/test", post(handlers::webhooks::test_webhook))
        .route("/pipeline/run", post(handlers::pipeline::run_pipeline))
        .with_state(state)
}

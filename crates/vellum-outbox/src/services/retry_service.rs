//! Retry scheduler: requeues failed jobs whose backoff window has elapsed.
//!
//! Fixed-delay backoff: a failed job becomes eligible once its last update is
//! at least the configured interval in the past and its attempt budget
//! remains. Jobs at or over budget are never requeued; they wait for
//! dead-letter cleanup.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::tenant_refs::TenantRefResolver;
use vellum_db::models::WebhookOutboxJob;

/// Counts returned by one retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RetrySummary {
    /// Failed jobs reset to pending.
    pub requeued: u64,
}

/// Bulk-requeues backoff-elapsed failed jobs.
pub struct RetryScheduler {
    pool: PgPool,
    resolver: Arc<TenantRefResolver>,
    max_attempts: i32,
    backoff_ms: i64,
}

impl RetryScheduler {
    pub fn new(
        pool: PgPool,
        resolver: Arc<TenantRefResolver>,
        max_attempts: i32,
        backoff_ms: i64,
    ) -> Self {
        Self {
            pool,
            resolver,
            max_attempts,
            backoff_ms,
        }
    }

    /// Reset eligible failed jobs to pending, optionally for one tenant.
    pub async fn run(&self, tenant_ref: Option<&str>) -> Result<RetrySummary, sqlx::Error> {
        let tenant_refs = match tenant_ref {
            Some(r) => Some(self.resolver.expand(r).await?),
            None => None,
        };

        let requeued = WebhookOutboxJob::requeue_eligible(
            &self.pool,
            self.max_attempts,
            self.backoff_ms,
            tenant_refs.as_deref(),
        )
        .await?;

        if requeued > 0 {
            tracing::info!(
                target: "webhook_delivery",
                requeued,
                backoff_ms = self.backoff_ms,
                max_attempts = self.max_attempts,
                "Requeued failed jobs for retry"
            );
        }

        Ok(RetrySummary { requeued })
    }
}

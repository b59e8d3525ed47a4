//! Dead-letter cleanup: purges failed jobs that exhausted their budget.
//!
//! The only deletion path for outbox jobs, and irreversible. Jobs still under
//! their attempt budget are never touched regardless of age; exhausted jobs
//! are kept through a grace period for diagnosis before deletion.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::tenant_refs::TenantRefResolver;
use vellum_db::models::WebhookOutboxJob;

/// Counts returned by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CleanupSummary {
    /// Dead-lettered jobs deleted.
    pub purged: u64,
}

/// Deletes aged-out dead letters.
pub struct DeadLetterCleanup {
    pool: PgPool,
    resolver: Arc<TenantRefResolver>,
    max_attempts: i32,
    grace_ms: i64,
}

impl DeadLetterCleanup {
    pub fn new(
        pool: PgPool,
        resolver: Arc<TenantRefResolver>,
        max_attempts: i32,
        grace_ms: i64,
    ) -> Self {
        Self {
            pool,
            resolver,
            max_attempts,
            grace_ms,
        }
    }

    /// Delete exhausted failed jobs older than the grace period, optionally
    /// for one tenant.
    pub async fn run(&self, tenant_ref: Option<&str>) -> Result<CleanupSummary, sqlx::Error> {
        let tenant_refs = match tenant_ref {
            Some(r) => Some(self.resolver.expand(r).await?),
            None => None,
        };

        let purged = WebhookOutboxJob::purge_dead_letters(
            &self.pool,
            self.max_attempts,
            self.grace_ms,
            tenant_refs.as_deref(),
        )
        .await?;

        if purged > 0 {
            tracing::info!(
                target: "webhook_delivery",
                purged,
                grace_ms = self.grace_ms,
                max_attempts = self.max_attempts,
                "Purged dead-lettered jobs"
            );
        }

        Ok(CleanupSummary { purged })
    }
}

//! Pipeline orchestration: runs the outbox stages in order for a tenant.
//!
//! Stage order is publish, fanout, retry, dispatch, cleanup. Fanout and
//! dispatch drain their backlog in repeated batches until a pass examines
//! nothing; retry runs before dispatch so a job that failed on an earlier
//! run and whose backoff has elapsed is delivered in the same run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::config::PipelineConfig;
use crate::error::OutboxError;
use crate::services::cleanup_service::{CleanupSummary, DeadLetterCleanup};
use crate::services::dispatch_service::{DispatchSummary, Dispatcher};
use crate::services::fanout_service::{FanoutProcessor, FanoutSummary};
use crate::services::retry_service::{RetryScheduler, RetrySummary};
use crate::tenant_refs::TenantRefResolver;
use vellum_db::models::Tenant;

/// Hook for publishing scheduled content whose publish time has arrived,
/// before fanout runs. The host application decides what "scheduled content"
/// means; the pipeline only cares that due items become pending events.
#[async_trait]
pub trait ScheduledContentPublisher: Send + Sync {
    /// Publish due items for one tenant, returning how many were published.
    async fn publish_due(&self, tenant_ref: &str) -> Result<u64, OutboxError>;
}

/// Per-tenant result of one full pipeline run.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantRunSummary {
    pub tenant_ref: String,
    /// Scheduled items published before fanout.
    pub published: u64,
    pub fanout: FanoutSummary,
    pub retry: RetrySummary,
    pub dispatch: DispatchSummary,
    pub cleanup: CleanupSummary,
}

/// Aggregate result of a run across all active tenants.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunReport {
    pub tenants: Vec<TenantRunSummary>,
    pub events_processed: u64,
    pub events_queued: u64,
    pub jobs_delivered: u64,
    pub jobs_failed: u64,
    pub retries_requeued: u64,
    pub dead_letters_purged: u64,
}

impl PipelineRunReport {
    fn absorb(&mut self, summary: TenantRunSummary) {
        self.events_processed += summary.fanout.processed;
        self.events_queued += summary.fanout.queued;
        self.jobs_delivered += summary.dispatch.succeeded;
        self.jobs_failed += summary.dispatch.failed;
        self.retries_requeued += summary.retry.requeued;
        self.dead_letters_purged += summary.cleanup.purged;
        self.tenants.push(summary);
    }
}

/// Runs the outbox pipeline end to end.
pub struct PipelineRunner {
    pool: PgPool,
    config: PipelineConfig,
    fanout: FanoutProcessor,
    retry: RetryScheduler,
    dispatcher: Dispatcher,
    cleanup: DeadLetterCleanup,
    publisher: Option<Arc<dyn ScheduledContentPublisher>>,
}

impl PipelineRunner {
    /// Build a runner and its stage services from one config.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Internal` if the dispatcher's HTTP client
    /// cannot be built.
    pub fn new(pool: PgPool, config: PipelineConfig) -> Result<Self, OutboxError> {
        let resolver = Arc::new(TenantRefResolver::new(pool.clone()));

        let fanout = FanoutProcessor::new(
            pool.clone(),
            Arc::clone(&resolver),
            config.event_max_attempts,
        );
        let retry = RetryScheduler::new(
            pool.clone(),
            Arc::clone(&resolver),
            config.max_attempts,
            config.retry_backoff_ms,
        );
        let dispatcher = Dispatcher::new(
            pool.clone(),
            Arc::clone(&resolver),
            config.max_attempts,
            config.http_timeout(),
        )?;
        let cleanup = DeadLetterCleanup::new(
            pool.clone(),
            Arc::clone(&resolver),
            config.max_attempts,
            config.dead_letter_grace_ms,
        );

        Ok(Self {
            pool,
            config,
            fanout,
            retry,
            dispatcher,
            cleanup,
            publisher: None,
        })
    }

    /// Attach a scheduled-content publisher to run before fanout.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn ScheduledContentPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run all stages for one tenant.
    pub async fn run_for_tenant(&self, tenant_ref: &str) -> Result<TenantRunSummary, OutboxError> {
        let mut summary = TenantRunSummary {
            tenant_ref: tenant_ref.to_string(),
            ..TenantRunSummary::default()
        };

        if let Some(publisher) = &self.publisher {
            summary.published = publisher.publish_due(tenant_ref).await?;
            if summary.published > 0 {
                tracing::info!(
                    target: "outbox_pipeline",
                    tenant_ref = %tenant_ref,
                    published = summary.published,
                    "Published scheduled content"
                );
            }
        }

        // Drain the event backlog; each pass claims a fresh batch.
        loop {
            let pass = self
                .fanout
                .run(self.config.fanout_limit, Some(tenant_ref))
                .await?;
            summary.fanout.processed += pass.processed;
            summary.fanout.queued += pass.queued;
            summary.fanout.skipped += pass.skipped;
            summary.fanout.failed += pass.failed;
            if pass.processed == 0 {
                break;
            }
        }

        summary.retry = self.retry.run(Some(tenant_ref)).await?;

        loop {
            let pass = self
                .dispatcher
                .run(self.config.dispatch_limit, Some(tenant_ref))
                .await?;
            summary.dispatch.processed += pass.processed;
            summary.dispatch.succeeded += pass.succeeded;
            summary.dispatch.failed += pass.failed;
            summary.dispatch.skipped += pass.skipped;
            summary.dispatch.stranded += pass.stranded;
            if pass.processed == 0 {
                break;
            }
        }

        summary.cleanup = self.cleanup.run(Some(tenant_ref)).await?;

        tracing::info!(
            target: "outbox_pipeline",
            tenant_ref = %tenant_ref,
            published = summary.published,
            events_queued = summary.fanout.queued,
            jobs_requeued = summary.retry.requeued,
            jobs_delivered = summary.dispatch.succeeded,
            jobs_failed = summary.dispatch.failed,
            purged = summary.cleanup.purged,
            "Pipeline run complete"
        );

        Ok(summary)
    }

    /// Run the pipeline for every active tenant. One tenant's failure is
    /// logged and does not stop the remaining tenants.
    pub async fn run_all(&self) -> Result<PipelineRunReport, OutboxError> {
        let tenants = Tenant::list_active(&self.pool).await?;
        let mut report = PipelineRunReport::default();

        for tenant in tenants {
            match self.run_for_tenant(&tenant.slug).await {
                Ok(summary) => report.absorb(summary),
                Err(e) => {
                    tracing::error!(
                        target: "outbox_pipeline",
                        tenant_id = %tenant.id,
                        tenant_slug = %tenant.slug,
                        error = %e,
                        "Pipeline run failed for tenant"
                    );
                }
            }
        }

        tracing::info!(
            target: "outbox_pipeline",
            tenants = report.tenants.len(),
            events_processed = report.events_processed,
            events_queued = report.events_queued,
            jobs_delivered = report.jobs_delivered,
            jobs_failed = report.jobs_failed,
            retries_requeued = report.retries_requeued,
            dead_letters_purged = report.dead_letters_purged,
            "Pipeline run complete for all tenants"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(tenant_ref: &str) -> TenantRunSummary {
        TenantRunSummary {
            tenant_ref: tenant_ref.to_string(),
            published: 0,
            fanout: FanoutSummary {
                processed: 4,
                queued: 3,
                skipped: 1,
                failed: 0,
            },
            retry: RetrySummary { requeued: 2 },
            dispatch: DispatchSummary {
                processed: 5,
                succeeded: 4,
                failed: 1,
                skipped: 0,
                stranded: 0,
            },
            cleanup: CleanupSummary { purged: 6 },
        }
    }

    #[test]
    fn test_report_aggregates_every_stage() {
        let mut report = PipelineRunReport::default();
        report.absorb(summary("acme"));
        report.absorb(summary("globex"));

        assert_eq!(report.tenants.len(), 2);
        assert_eq!(report.events_processed, 8);
        assert_eq!(report.events_queued, 6);
        assert_eq!(report.jobs_delivered, 8);
        assert_eq!(report.jobs_failed, 2);
        assert_eq!(report.retries_requeued, 4);
        assert_eq!(report.dead_letters_purged, 12);
    }
}

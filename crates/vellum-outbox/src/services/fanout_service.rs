//! Fanout processor: expands pending domain events into outbox jobs.
//!
//! Claims pending events with a conditional update (losing a claim race is
//! counted as a skip, not an error), resolves the tenant's subscribed
//! webhooks, and writes one delivery job per subscriber as an atomic set.
//! Events with no interested subscriber are terminally skipped with a
//! diagnostic reason; any processing error reverts the event to pending with
//! an incremented retry count so it is retried on a later pass rather than
//! lost.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::models::DeliveryEnvelope;
use crate::tenant_refs::TenantRefResolver;
use vellum_db::models::{CreateWebhookOutboxJob, DomainEvent, Webhook, WebhookOutboxJob};

/// Number of candidate webhooks logged when an event is skipped.
const SKIP_SAMPLE_SIZE: i64 = 5;

/// Counts returned by one fanout pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct FanoutSummary {
    /// Events examined (claim attempted).
    pub processed: u64,
    /// Events expanded into jobs.
    pub queued: u64,
    /// Events terminally skipped, plus claim races lost.
    pub skipped: u64,
    /// Events reverted to pending after an error.
    pub failed: u64,
}

/// Expands pending domain events into per-destination delivery jobs.
pub struct FanoutProcessor {
    pool: PgPool,
    resolver: Arc<TenantRefResolver>,
    event_max_attempts: i32,
}

impl FanoutProcessor {
    pub fn new(pool: PgPool, resolver: Arc<TenantRefResolver>, event_max_attempts: i32) -> Self {
        Self {
            pool,
            resolver,
            event_max_attempts,
        }
    }

    /// Run one fanout pass over at most `limit` pending events, oldest first,
    /// optionally restricted to one tenant.
    ///
    /// # Errors
    ///
    /// Only total inability to start the batch (the initial pending query
    /// failing) is returned; per-event errors are absorbed into the summary.
    pub async fn run(
        &self,
        limit: i64,
        tenant_ref: Option<&str>,
    ) -> Result<FanoutSummary, sqlx::Error> {
        let tenant_refs = match tenant_ref {
            Some(r) => Some(self.resolver.expand(r).await?),
            None => None,
        };

        let events =
            DomainEvent::list_claimable(&self.pool, limit, tenant_refs.as_deref()).await?;

        let mut summary = FanoutSummary::default();

        for event in events {
            summary.processed += 1;

            match self.process_event(&event).await {
                Ok(FanoutOutcome::Queued) => summary.queued += 1,
                Ok(FanoutOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    let error = e.to_string();
                    tracing::error!(
                        target: "outbox_fanout",
                        event_id = %event.id,
                        tenant_ref = %event.tenant_ref,
                        event_type = %event.event_type,
                        error = %error,
                        "Fanout failed, reverting event to pending"
                    );
                    if let Err(release_err) =
                        DomainEvent::release_for_retry(&self.pool, event.id, &error).await
                    {
                        tracing::error!(
                            target: "outbox_fanout",
                            event_id = %event.id,
                            error = %release_err,
                            "Failed to revert event to pending"
                        );
                    }
                }
            }
        }

        tracing::info!(
            target: "outbox_fanout",
            processed = summary.processed,
            queued = summary.queued,
            skipped = summary.skipped,
            failed = summary.failed,
            "Fanout pass complete"
        );

        Ok(summary)
    }

    /// Process one event end to end. Assumes the event is currently pending;
    /// claims it, expands subscribers, writes the job set, and finalizes the
    /// event status.
    async fn process_event(&self, event: &DomainEvent) -> Result<FanoutOutcome, sqlx::Error> {
        if !DomainEvent::claim(&self.pool, event.id).await? {
            // Another worker won the race; not an error.
            tracing::debug!(
                target: "outbox_fanout",
                event_id = %event.id,
                "Claim lost, skipping"
            );
            return Ok(FanoutOutcome::Skipped);
        }

        if event.retry_count >= self.event_max_attempts {
            let reason = format!(
                "fanout retry budget exhausted ({} attempts)",
                event.retry_count
            );
            tracing::warn!(
                target: "outbox_fanout",
                event_id = %event.id,
                tenant_ref = %event.tenant_ref,
                retry_count = event.retry_count,
                "Event exceeded fanout budget, skipping terminally"
            );
            DomainEvent::mark_skipped(&self.pool, event.id, &reason).await?;
            return Ok(FanoutOutcome::Skipped);
        }

        let tenant_refs = self.resolver.expand(&event.tenant_ref).await?;
        let active = Webhook::find_active_by_tenant_refs(&self.pool, &tenant_refs).await?;

        if active.is_empty() {
            self.log_skip_sample(event, &tenant_refs).await;
            DomainEvent::mark_skipped(&self.pool, event.id, "no active webhook destinations")
                .await?;
            return Ok(FanoutOutcome::Skipped);
        }

        let subscribed: Vec<&Webhook> = active
            .iter()
            .filter(|hook| hook.subscribes_to(&event.event_type))
            .collect();

        if subscribed.is_empty() {
            tracing::info!(
                target: "outbox_fanout",
                event_id = %event.id,
                tenant_ref = %event.tenant_ref,
                event_type = %event.event_type,
                active_webhooks = active.len(),
                "No subscription matches event type, skipping"
            );
            DomainEvent::mark_skipped(
                &self.pool,
                event.id,
                "no webhook subscription matches event type",
            )
            .await?;
            return Ok(FanoutOutcome::Skipped);
        }

        // One job per subscriber. Serializing the envelope per job gives each
        // job an independent deep snapshot: later mutation of the event can
        // never reach an already-created job.
        let envelope = DeliveryEnvelope::for_event(event);
        let mut jobs = Vec::with_capacity(subscribed.len());
        for hook in &subscribed {
            let payload = serde_json::to_value(&envelope)
                .map_err(|e| sqlx::Error::Protocol(format!("envelope serialization: {e}")))?;
            jobs.push(CreateWebhookOutboxJob {
                tenant_ref: event.tenant_ref.clone(),
                webhook_id: hook.id,
                event_id: event.id,
                event_type: event.event_type.clone(),
                payload,
            });
        }

        WebhookOutboxJob::insert_batch(&self.pool, &jobs).await?;
        DomainEvent::mark_queued(&self.pool, event.id).await?;

        tracing::info!(
            target: "outbox_fanout",
            event_id = %event.id,
            tenant_ref = %event.tenant_ref,
            event_type = %event.event_type,
            jobs = jobs.len(),
            "Event queued"
        );

        Ok(FanoutOutcome::Queued)
    }

    /// Log a small sample of candidate webhooks (any status) so a skipped
    /// event can be diagnosed without querying the registry by hand.
    async fn log_skip_sample(&self, event: &DomainEvent, tenant_refs: &[String]) {
        match Webhook::sample_by_tenant_refs(&self.pool, tenant_refs, SKIP_SAMPLE_SIZE).await {
            Ok(sample) if !sample.is_empty() => {
                for hook in &sample {
                    tracing::info!(
                        target: "outbox_fanout",
                        event_id = %event.id,
                        webhook_id = %hook.id,
                        webhook_tenant_ref = %hook.tenant_ref,
                        is_active = hook.is_active,
                        events = ?hook.events,
                        "Skip candidate"
                    );
                }
            }
            Ok(_) => {
                tracing::info!(
                    target: "outbox_fanout",
                    event_id = %event.id,
                    tenant_ref = %event.tenant_ref,
                    "No webhooks registered for tenant"
                );
            }
            Err(e) => {
                tracing::debug!(
                    target: "outbox_fanout",
                    event_id = %event.id,
                    error = %e,
                    "Failed to sample skip candidates"
                );
            }
        }
    }
}

enum FanoutOutcome {
    Queued,
    Skipped,
}

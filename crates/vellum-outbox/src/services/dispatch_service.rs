//! Dispatcher: delivers claimed outbox jobs to their destinations.
//!
//! Claims pending jobs with a conditional update, signs the stored envelope
//! bytes, POSTs under a cancellation-bound timeout, and records the outcome.
//! A missing or inactive destination finalizes the job as done (retrying a
//! gone destination is pointless and would pollute failure-rate signals).
//! A single job's failure never aborts the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::error::OutboxError;
use crate::signing;
use crate::tenant_refs::TenantRefResolver;
use vellum_db::models::{Webhook, WebhookOutboxJob};

/// Header carrying the hex HMAC-SHA256 signature of the body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the event type.
pub const EVENT_TYPE_HEADER: &str = "X-Webhook-Event";

/// Response body bytes kept for logging.
const RESPONSE_SNIPPET_LIMIT: usize = 500;

/// Counts returned by one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchSummary {
    /// Jobs examined (claim attempted).
    pub processed: u64,
    /// Jobs finalized done (including gone-destination finalizations).
    pub succeeded: u64,
    /// Jobs marked failed.
    pub failed: u64,
    /// Claim races lost.
    pub skipped: u64,
    /// Jobs claimed but left in processing because recording the outcome
    /// failed; they need manual attention.
    pub stranded: u64,
}

impl DispatchSummary {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Done => self.succeeded += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::ClaimLost => self.skipped += 1,
            JobOutcome::Stranded => self.stranded += 1,
        }
    }
}

/// Outcome of a single signed POST.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub duration: Duration,
    /// Truncated response body, for logs only; never persisted.
    pub response_snippet: Option<String>,
}

/// Delivers outbox jobs over HTTP with HMAC-signed payloads.
pub struct Dispatcher {
    pool: PgPool,
    resolver: Arc<TenantRefResolver>,
    http_client: Client,
    max_attempts: i32,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Internal` if the HTTP client cannot be built.
    pub fn new(
        pool: PgPool,
        resolver: Arc<TenantRefResolver>,
        max_attempts: i32,
        timeout: Duration,
    ) -> Result<Self, OutboxError> {
        let http_client = Client::builder()
            .user_agent("vellum-outbox/1.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OutboxError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            resolver,
            http_client,
            max_attempts,
            timeout,
        })
    }

    /// Run one dispatch pass over at most `limit` pending jobs, oldest first,
    /// optionally restricted to one tenant.
    ///
    /// # Errors
    ///
    /// Only total inability to start the batch is returned; per-job errors
    /// are absorbed into the summary.
    pub async fn run(
        &self,
        limit: i64,
        tenant_ref: Option<&str>,
    ) -> Result<DispatchSummary, sqlx::Error> {
        let tenant_refs = match tenant_ref {
            Some(r) => Some(self.resolver.expand(r).await?),
            None => None,
        };

        let jobs =
            WebhookOutboxJob::list_claimable(&self.pool, limit, tenant_refs.as_deref()).await?;

        let mut summary = DispatchSummary::default();

        for job in jobs {
            summary.processed += 1;

            let outcome = match self.process_job(&job).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        job_id = %job.id,
                        tenant_ref = %job.tenant_ref,
                        error = %e,
                        "Failed to record dispatch outcome; job remains in processing and needs manual attention"
                    );
                    JobOutcome::Stranded
                }
            };
            summary.record(outcome);
        }

        tracing::info!(
            target: "webhook_delivery",
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            stranded = summary.stranded,
            "Dispatch pass complete"
        );

        Ok(summary)
    }

    async fn process_job(&self, job: &WebhookOutboxJob) -> Result<JobOutcome, sqlx::Error> {
        if !WebhookOutboxJob::claim(&self.pool, job.id).await? {
            tracing::debug!(
                target: "webhook_delivery",
                job_id = %job.id,
                "Claim lost, skipping"
            );
            return Ok(JobOutcome::ClaimLost);
        }

        let tenant_refs = self.resolver.expand(&job.tenant_ref).await?;
        let webhook =
            Webhook::find_active_by_id(&self.pool, &tenant_refs, job.webhook_id).await?;

        let Some(webhook) = webhook else {
            // Destination deleted or deactivated: finalize, don't retry.
            tracing::info!(
                target: "webhook_delivery",
                job_id = %job.id,
                webhook_id = %job.webhook_id,
                tenant_ref = %job.tenant_ref,
                "Destination missing or inactive, finalizing job as done"
            );
            WebhookOutboxJob::mark_done(
                &self.pool,
                job.id,
                Some("destination webhook missing or inactive"),
            )
            .await?;
            return Ok(JobOutcome::Done);
        };

        let body = match serde_json::to_vec(&job.payload) {
            Ok(b) => b,
            Err(e) => {
                // Unserializable payloads never improve with retries.
                let retry_count = job.retry_count + 1;
                let error = self.annotate_terminal(
                    format!("payload serialization failed: {e}"),
                    retry_count,
                );
                WebhookOutboxJob::mark_failed(&self.pool, job.id, retry_count, &error).await?;
                return Ok(JobOutcome::Failed);
            }
        };

        let attempt = post_signed(
            &self.http_client,
            &webhook.url,
            &webhook.secret,
            &job.event_type,
            body,
            self.timeout,
        )
        .await;

        let duration_ms = attempt.duration.as_millis() as u64;

        if attempt.success {
            tracing::info!(
                target: "webhook_delivery",
                job_id = %job.id,
                webhook_id = %webhook.id,
                event_id = %job.event_id,
                tenant_ref = %job.tenant_ref,
                status_code = attempt.status_code,
                duration_ms,
                "Webhook delivery succeeded"
            );
            WebhookOutboxJob::mark_done(&self.pool, job.id, None).await?;
            Ok(JobOutcome::Done)
        } else {
            let retry_count = job.retry_count + 1;
            let error = self.annotate_terminal(
                attempt
                    .error
                    .clone()
                    .unwrap_or_else(|| "delivery failed".to_string()),
                retry_count,
            );

            tracing::warn!(
                target: "webhook_delivery",
                job_id = %job.id,
                webhook_id = %webhook.id,
                event_id = %job.event_id,
                tenant_ref = %job.tenant_ref,
                status_code = attempt.status_code,
                duration_ms,
                retry_count,
                max_attempts = self.max_attempts,
                error = %error,
                response_snippet = attempt.response_snippet.as_deref().unwrap_or(""),
                "Webhook delivery failed"
            );

            WebhookOutboxJob::mark_failed(&self.pool, job.id, retry_count, &error).await?;
            Ok(JobOutcome::Failed)
        }
    }

    /// Append the terminal marker once a job's budget is spent.
    fn annotate_terminal(&self, error: String, retry_count: i32) -> String {
        if retry_count >= self.max_attempts {
            format!("{error} (terminal: retry budget exhausted)")
        } else {
            error
        }
    }
}

enum JobOutcome {
    Done,
    Failed,
    ClaimLost,
    /// Claimed, but recording the outcome failed; the row stays in processing.
    Stranded,
}

/// POST `body` to `url` with signature and event-type headers, bounded by
/// `timeout` (the in-flight call is aborted on expiry).
///
/// This is the single signed-delivery primitive: the dispatcher and the
/// registry's synchronous test delivery both go through it.
pub async fn post_signed(
    client: &Client,
    url: &str,
    secret: &str,
    event_type: &str,
    body: Vec<u8>,
    timeout: Duration,
) -> DeliveryAttempt {
    let signature = signing::compute_signature(secret, &body);
    let start = Instant::now();

    let result = client
        .post(url)
        .timeout(timeout)
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(EVENT_TYPE_HEADER, event_type)
        .body(body)
        .send()
        .await;

    let duration = start.elapsed();

    match result {
        Ok(response) => {
            let status = response.status();
            let snippet = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(RESPONSE_SNIPPET_LIMIT)
                .collect::<String>();

            if status.is_success() {
                DeliveryAttempt {
                    success: true,
                    status_code: Some(status.as_u16()),
                    error: None,
                    duration,
                    response_snippet: Some(snippet),
                }
            } else {
                DeliveryAttempt {
                    success: false,
                    status_code: Some(status.as_u16()),
                    error: Some(format!("HTTP {}", status.as_u16())),
                    duration,
                    response_snippet: Some(snippet),
                }
            }
        }
        Err(e) => {
            let error = if e.is_timeout() {
                format!("request timeout ({}ms)", timeout.as_millis())
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                format!("request error: {e}")
            };

            DeliveryAttempt {
                success: false,
                status_code: None,
                error: Some(error),
                duration,
                response_snippet: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_each_outcome_once() {
        let mut summary = DispatchSummary::default();
        summary.record(JobOutcome::Done);
        summary.record(JobOutcome::Failed);
        summary.record(JobOutcome::ClaimLost);
        summary.record(JobOutcome::Stranded);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.stranded, 1);
    }

    #[test]
    fn test_stranded_jobs_are_not_counted_as_failed() {
        let mut summary = DispatchSummary::default();
        summary.record(JobOutcome::Stranded);
        summary.record(JobOutcome::Stranded);

        assert_eq!(summary.failed, 0);
        assert_eq!(summary.stranded, 2);
    }
}

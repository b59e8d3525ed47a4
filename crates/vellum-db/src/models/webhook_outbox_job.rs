//! `WebhookOutboxJob` model — the durable per-destination delivery queue.
//!
//! Jobs are created only by the fanout processor (one per subscribed webhook,
//! inserted as an atomic set), mutated by the dispatcher and the retry
//! scheduler, and deleted only by dead-letter cleanup. Claims are conditional
//! updates so concurrent dispatchers never double-deliver a claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A single webhook delivery job.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookOutboxJob {
    pub id: Uuid,
    pub tenant_ref: String,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    /// Immutable deep snapshot of the delivery envelope taken at fanout time.
    pub payload: serde_json::Value,
    pub status: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create one delivery job.
#[derive(Debug, Clone)]
pub struct CreateWebhookOutboxJob {
    pub tenant_ref: String,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl WebhookOutboxJob {
    /// Insert a batch of jobs in one transaction.
    ///
    /// The fanout set for an event is all-or-nothing: either every subscriber
    /// gets a job or the event is reverted for retry.
    pub async fn insert_batch(
        pool: &PgPool,
        jobs: &[CreateWebhookOutboxJob],
    ) -> Result<u64, sqlx::Error> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        for job in jobs {
            sqlx::query(
                r"
                INSERT INTO webhook_outbox_jobs
                    (tenant_ref, webhook_id, event_id, event_type, payload)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(&job.tenant_ref)
            .bind(job.webhook_id)
            .bind(job.event_id)
            .bind(&job.event_type)
            .bind(&job.payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(jobs.len() as u64)
    }

    /// Fetch a job by id.
    pub async fn find_by_id(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<WebhookOutboxJob>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, webhook_id, event_id, event_type, payload,
                   status, retry_count, last_error, created_at, updated_at
            FROM webhook_outbox_jobs
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List pending jobs oldest-first, optionally restricted to a set of
    /// tenant representations.
    pub async fn list_claimable(
        pool: &PgPool,
        limit: i64,
        tenant_refs: Option<&[String]>,
    ) -> Result<Vec<WebhookOutboxJob>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, webhook_id, event_id, event_type, payload,
                   status, retry_count, last_error, created_at, updated_at
            FROM webhook_outbox_jobs
            WHERE status = 'pending'
              AND ($2::text[] IS NULL OR tenant_ref = ANY($2::text[]))
            ORDER BY created_at ASC
            LIMIT $1
            ",
        )
        .bind(limit)
        .bind(tenant_refs)
        .fetch_all(pool)
        .await
    }

    /// Attempt to claim a pending job for dispatch. Returns `false` when
    /// another worker won the race.
    pub async fn claim(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhook_outbox_jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Finalize a claimed job as done. `note` is recorded for deliveries
    /// short-circuited because the destination is gone; a real success clears
    /// the error.
    pub async fn mark_done(
        pool: &PgPool,
        id: Uuid,
        note: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhook_outbox_jobs
            SET status = 'done', last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            ",
        )
        .bind(id)
        .bind(note)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a delivery failure on a claimed job.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        retry_count: i32,
        last_error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhook_outbox_jobs
            SET status = 'failed', retry_count = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            ",
        )
        .bind(id)
        .bind(retry_count)
        .bind(last_error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Requeue failed jobs whose backoff window has elapsed and whose attempt
    /// budget remains. Returns the number of jobs reset to pending.
    pub async fn requeue_eligible(
        pool: &PgPool,
        max_attempts: i32,
        backoff_ms: i64,
        tenant_refs: Option<&[String]>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhook_outbox_jobs
            SET status = 'pending', updated_at = NOW()
            WHERE status = 'failed'
              AND retry_count < $1
              AND updated_at <= NOW() - make_interval(secs => $2::double precision / 1000.0)
              AND ($3::text[] IS NULL OR tenant_ref = ANY($3::text[]))
            ",
        )
        .bind(max_attempts)
        .bind(backoff_ms)
        .bind(tenant_refs)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete failed jobs that exhausted their budget and aged past the grace
    /// period. The only deletion path for jobs; under-budget jobs are never
    /// touched regardless of age.
    pub async fn purge_dead_letters(
        pool: &PgPool,
        max_attempts: i32,
        grace_ms: i64,
        tenant_refs: Option<&[String]>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM webhook_outbox_jobs
            WHERE status = 'failed'
              AND retry_count >= $1
              AND updated_at <= NOW() - make_interval(secs => $2::double precision / 1000.0)
              AND ($3::text[] IS NULL OR tenant_ref = ANY($3::text[]))
            ",
        )
        .bind(max_attempts)
        .bind(grace_ms)
        .bind(tenant_refs)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// All jobs created for an event, oldest first.
    pub async fn list_for_event(
        pool: &PgPool,
        event_id: Uuid,
    ) -> Result<Vec<WebhookOutboxJob>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, webhook_id, event_id, event_type, payload,
                   status, retry_count, last_error, created_at, updated_at
            FROM webhook_outbox_jobs
            WHERE event_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Number of jobs created for an event.
    pub async fn count_for_event(pool: &PgPool, event_id: Uuid) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM webhook_outbox_jobs WHERE event_id = $1
            ",
        )
        .bind(event_id)
        .fetch_one(pool)
        .await?;

        Ok(row.0)
    }
}

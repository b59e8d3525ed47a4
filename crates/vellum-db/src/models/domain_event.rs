//! `DomainEvent` model — the append-only log of pending facts.
//!
//! Producers insert rows with status `pending`; the fanout processor is the
//! only writer afterwards. Events are never deleted by the pipeline. The
//! claim step is a conditional update: it succeeds only if the row still has
//! the expected prior status, which is what makes concurrent fanout workers
//! safe without locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A recorded domain fact awaiting fanout.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    /// Tenant reference as the producer wrote it (UUID text, simple UUID, or slug).
    pub tenant_ref: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
    pub status: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Event-insertion contract used by producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDomainEvent {
    pub tenant_ref: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DomainEvent {
    /// Insert a new pending event. This is the only write dependency producers
    /// have on the pipeline.
    pub async fn create(pool: &PgPool, data: CreateDomainEvent) -> Result<DomainEvent, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO domain_events (tenant_ref, event_type, occurred_at, payload, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_ref, event_type, occurred_at, payload, metadata,
                      status, retry_count, last_error, created_at, updated_at
            ",
        )
        .bind(&data.tenant_ref)
        .bind(&data.event_type)
        .bind(data.occurred_at)
        .bind(&data.payload)
        .bind(&data.metadata)
        .fetch_one(pool)
        .await
    }

    /// Fetch an event by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DomainEvent>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, event_type, occurred_at, payload, metadata,
                   status, retry_count, last_error, created_at, updated_at
            FROM domain_events
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List pending events oldest-first, optionally restricted to a set of
    /// tenant representations.
    pub async fn list_claimable(
        pool: &PgPool,
        limit: i64,
        tenant_refs: Option<&[String]>,
    ) -> Result<Vec<DomainEvent>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, event_type, occurred_at, payload, metadata,
                   status, retry_count, last_error, created_at, updated_at
            FROM domain_events
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

    /// Attempt to claim a pending event for processing.
    ///
    /// Conditional update: returns `false` when another worker already moved
    /// the event out of `pending`.
    pub async fn claim(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE domain_events
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a claimed event as queued (jobs written) and clear any stale error.
    pub async fn mark_queued(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE domain_events
            SET status = 'queued', last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a claimed event as skipped with a diagnostic reason.
    ///
    /// Skipped is a terminal non-error state: no subscriber wanted the event,
    /// or its fanout retry budget ran out.
    pub async fn mark_skipped(pool: &PgPool, id: Uuid, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE domain_events
            SET status = 'skipped', last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            ",
        )
        .bind(id)
        .bind(reason)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revert a claimed event to pending after a processing failure,
    /// incrementing its retry count and recording the error.
    pub async fn release_for_retry(
        pool: &PgPool,
        id: Uuid,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE domain_events
            SET status = 'pending', retry_count = retry_count + 1,
                last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            ",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

//! Webhook destination model.
//!
//! Destinations are owned by tenant admins through the registry; the pipeline
//! itself only reads them. Rows may hold any representation of their tenant in
//! `tenant_ref` (legacy data mixes UUID text, hyphenless UUID, and slugs), so
//! lookups take the expanded representation set rather than a single id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Subscription token meaning "all event types".
pub const WILDCARD_EVENT: &str = "*";

/// A tenant-configured delivery destination.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub tenant_ref: String,
    pub url: String,
    /// Shared HMAC secret; empty means unsigned delivery.
    pub secret: String,
    pub is_active: bool,
    /// Subscribed event types; contains [`WILDCARD_EVENT`] for "all".
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a webhook.
#[derive(Debug, Clone)]
pub struct CreateWebhook {
    pub tenant_ref: String,
    pub url: String,
    pub secret: String,
    pub is_active: bool,
    pub events: Vec<String>,
}

/// Partial update of a webhook. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhook {
    pub url: Option<String>,
    pub secret: Option<String>,
    pub is_active: Option<bool>,
    pub events: Option<Vec<String>>,
}

impl Webhook {
    /// Returns `true` if this webhook subscribes to the given event type,
    /// either explicitly or through the wildcard.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e == WILDCARD_EVENT || e == event_type)
    }

    /// Insert a new webhook.
    pub async fn create(pool: &PgPool, data: CreateWebhook) -> Result<Webhook, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO webhooks (tenant_ref, url, secret, is_active, events)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            ",
        )
        .bind(&data.tenant_ref)
        .bind(&data.url)
        .bind(&data.secret)
        .bind(data.is_active)
        .bind(&data.events)
        .fetch_one(pool)
        .await
    }

    /// Find a webhook by id within a tenant's representation set.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_refs: &[String],
        id: Uuid,
    ) -> Result<Option<Webhook>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            FROM webhooks
            WHERE id = $1 AND tenant_ref = ANY($2::text[])
            ",
        )
        .bind(id)
        .bind(tenant_refs)
        .fetch_optional(pool)
        .await
    }

    /// Find an active webhook by id within a tenant's representation set.
    pub async fn find_active_by_id(
        pool: &PgPool,
        tenant_refs: &[String],
        id: Uuid,
    ) -> Result<Option<Webhook>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            FROM webhooks
            WHERE id = $1 AND tenant_ref = ANY($2::text[]) AND is_active
            ",
        )
        .bind(id)
        .bind(tenant_refs)
        .fetch_optional(pool)
        .await
    }

    /// All active webhooks for any of the tenant's representations.
    pub async fn find_active_by_tenant_refs(
        pool: &PgPool,
        tenant_refs: &[String],
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            FROM webhooks
            WHERE tenant_ref = ANY($1::text[]) AND is_active
            ORDER BY created_at ASC
            ",
        )
        .bind(tenant_refs)
        .fetch_all(pool)
        .await
    }

    /// A small sample of webhooks in any status, for skip diagnostics.
    pub async fn sample_by_tenant_refs(
        pool: &PgPool,
        tenant_refs: &[String],
        limit: i64,
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            FROM webhooks
            WHERE tenant_ref = ANY($1::text[])
            ORDER BY created_at ASC
            LIMIT $2
            ",
        )
        .bind(tenant_refs)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Paginated listing for the registry surface.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_refs: &[String],
        limit: i64,
        offset: i64,
        is_active: Option<bool>,
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            FROM webhooks
            WHERE tenant_ref = ANY($1::text[])
              AND ($4::boolean IS NULL OR is_active = $4)
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(tenant_refs)
        .bind(limit)
        .bind(offset)
        .bind(is_active)
        .fetch_all(pool)
        .await
    }

    /// Count webhooks for pagination.
    pub async fn count_by_tenant(
        pool: &PgPool,
        tenant_refs: &[String],
        is_active: Option<bool>,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*)
            FROM webhooks
            WHERE tenant_ref = ANY($1::text[])
              AND ($2::boolean IS NULL OR is_active = $2)
            ",
        )
        .bind(tenant_refs)
        .bind(is_active)
        .fetch_one(pool)
        .await?;

        Ok(row.0)
    }

    /// Apply a partial update, returning the new row if it exists.
    pub async fn update(
        pool: &PgPool,
        tenant_refs: &[String],
        id: Uuid,
        data: UpdateWebhook,
    ) -> Result<Option<Webhook>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE webhooks
            SET url = COALESCE($3, url),
                secret = COALESCE($4, secret),
                is_active = COALESCE($5, is_active),
                events = COALESCE($6, events),
                updated_at = NOW()
            WHERE id = $1 AND tenant_ref = ANY($2::text[])
            RETURNING id, tenant_ref, url, secret, is_active, events, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(tenant_refs)
        .bind(data.url)
        .bind(data.secret)
        .bind(data.is_active)
        .bind(data.events)
        .fetch_optional(pool)
        .await
    }

    /// Replace the shared secret. In-flight dispatches signed with the old
    /// secret are an accepted race.
    pub async fn rotate_secret(
        pool: &PgPool,
        tenant_refs: &[String],
        id: Uuid,
        new_secret: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE webhooks
            SET secret = $3, updated_at = NOW()
            WHERE id = $1 AND tenant_ref = ANY($2::text[])
            ",
        )
        .bind(id)
        .bind(tenant_refs)
        .bind(new_secret)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a webhook. Outstanding jobs for it are finalized by the
    /// dispatcher as done-with-note on their next claim.
    pub async fn delete(
        pool: &PgPool,
        tenant_refs: &[String],
        id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM webhooks
            WHERE id = $1 AND tenant_ref = ANY($2::text[])
            ",
        )
        .bind(id)
        .bind(tenant_refs)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook_with_events(events: Vec<&str>) -> Webhook {
        Webhook {
            id: Uuid::new_v4(),
            tenant_ref: "acme".to_string(),
            url: "https://example.com/hook".to_string(),
            secret: String::new(),
            is_active: true,
            events: events.into_iter().map(String::from).collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_subscribes_to_exact_type() {
        let hook = webhook_with_events(vec!["content.published", "content.deleted"]);
        assert!(hook.subscribes_to("content.published"));
        assert!(!hook.subscribes_to("form.submitted"));
    }

    #[test]
    fn test_subscribes_to_wildcard() {
        let hook = webhook_with_events(vec![WILDCARD_EVENT]);
        assert!(hook.subscribes_to("content.published"));
        assert!(hook.subscribes_to("anything.at.all"));
    }

    #[test]
    fn test_empty_events_subscribes_to_nothing() {
        let hook = webhook_with_events(vec![]);
        assert!(!hook.subscribes_to("content.published"));
    }
}

//! Tenant model.
//!
//! Tenants are owned by the host CMS; the pipeline only reads them to resolve
//! tenant references and to enumerate the tenants a full run covers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A tenant of the platform.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// URL-safe slug, unique across all tenants (e.g. "acme-corp").
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data needed to create a tenant (bootstrap and test support).
#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
}

impl Tenant {
    /// Find a tenant by its primary key.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, name, slug, is_active, created_at, updated_at
            FROM tenants
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find a tenant by its slug.
    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, name, slug, is_active, created_at, updated_at
            FROM tenants
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
    }

    /// List all active tenants, oldest first.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, name, slug, is_active, created_at, updated_at
            FROM tenants
            WHERE is_active
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(pool)
        .await
    }

    /// Insert a new tenant.
    pub async fn create(pool: &PgPool, data: CreateTenant) -> Result<Tenant, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO tenants (name, slug)
            VALUES ($1, $2)
            RETURNING id, name, slug, is_active, created_at, updated_at
            ",
        )
        .bind(&data.name)
        .bind(&data.slug)
        .fetch_one(pool)
        .await
    }
}

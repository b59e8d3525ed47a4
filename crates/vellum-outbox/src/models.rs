//! API request/response types and the outbound wire envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use vellum_db::models::{DomainEvent, Webhook};

// ---------------------------------------------------------------------------
// Tenant context
// ---------------------------------------------------------------------------

/// Tenant identity injected as a request extension by the host's routing and
/// auth layer. The pipeline never authenticates; it only scopes.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Canonical tenant reference (UUID text or slug).
    pub tenant_ref: String,
}

impl TenantContext {
    pub fn new(tenant_ref: impl Into<String>) -> Self {
        Self {
            tenant_ref: tenant_ref.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound wire envelope
// ---------------------------------------------------------------------------

/// JSON body POSTed to webhook destinations.
///
/// Field names are part of the external contract and use camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEnvelope {
    pub id: Uuid,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl DeliveryEnvelope {
    /// Build the envelope for a domain event.
    pub fn for_event(event: &DomainEvent) -> Self {
        Self {
            id: event.id,
            tenant_id: event.tenant_ref.clone(),
            event_type: event.event_type.clone(),
            occurred_at: event.occurred_at,
            payload: event.payload.clone(),
            metadata: event.metadata.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry requests/responses
// ---------------------------------------------------------------------------

/// Request body for creating a webhook.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    /// Shared secret; omitted or empty means "generate one".
    #[validate(length(max = 256))]
    pub secret: Option<String>,
    /// Subscribed event types; empty or absent means all events.
    pub events: Option<Vec<String>>,
    /// Defaults to active.
    pub is_active: Option<bool>,
}

/// Request body for partially updating a webhook.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateWebhookRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: Option<String>,
    #[validate(length(max = 256))]
    pub secret: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Webhook representation returned by the registry. The secret is omitted;
/// it is only disclosed on create and rotate.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub tenant_ref: String,
    pub url: String,
    pub is_active: bool,
    pub events: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookResponse {
    fn from(hook: Webhook) -> Self {
        Self {
            id: hook.id,
            tenant_ref: hook.tenant_ref,
            url: hook.url,
            is_active: hook.is_active,
            events: hook.events,
            created_at: hook.created_at,
            updated_at: hook.updated_at,
        }
    }
}

/// Response to webhook creation; the only time the initial secret is shown.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookCreatedResponse {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    pub secret: String,
}

/// Response to secret rotation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RotateSecretResponse {
    pub id: Uuid,
    pub secret: String,
    pub rotated_at: DateTime<Utc>,
}

/// Query parameters for listing webhooks.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListWebhooksQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub is_active: Option<bool>,
}

fn default_limit() -> i64 {
    50
}

/// Paginated webhook list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookListResponse {
    pub items: Vec<WebhookResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Outcome of a synchronous test delivery.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TestDeliveryResponse {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

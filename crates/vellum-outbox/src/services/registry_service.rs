//! Webhook registry: CRUD, secret management, and synchronous test delivery.
//!
//! Owns the destination records the pipeline reads. Creation validates the
//! URL and normalizes the subscription list (empty means wildcard); the
//! secret is accepted as given or generated. Rotation issues a fresh secret —
//! dispatches already in flight with the old secret are an accepted race.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::OutboxError;
use crate::models::{
    CreateWebhookRequest, DeliveryEnvelope, ListWebhooksQuery, RotateSecretResponse,
    TestDeliveryResponse, UpdateWebhookRequest, WebhookCreatedResponse, WebhookListResponse,
    WebhookResponse,
};
use crate::services::dispatch_service::post_signed;
use crate::signing;
use crate::tenant_refs::TenantRefResolver;
use crate::validation;
use vellum_db::models::{CreateWebhook, UpdateWebhook, Webhook};

/// Event type used for synchronous test deliveries.
pub const TEST_EVENT_TYPE: &str = "webhook.test";

/// Service for webhook registry operations.
pub struct RegistryService {
    pool: PgPool,
    resolver: Arc<TenantRefResolver>,
    http_client: Client,
    http_timeout: Duration,
    allow_http: bool,
    allow_internal: bool,
}

impl RegistryService {
    /// Create a registry service with its own HTTP client for test sends.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Internal` if the HTTP client cannot be built.
    pub fn new(
        pool: PgPool,
        resolver: Arc<TenantRefResolver>,
        http_timeout: Duration,
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
            http_timeout,
            allow_http: false,
            allow_internal: false,
        })
    }

    /// Allow plain-HTTP destinations (for development and testing).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Allow private/internal destinations (for development and testing).
    #[must_use]
    pub fn with_allow_internal(mut self, allow: bool) -> Self {
        self.allow_internal = allow;
        self
    }

    /// Create a new webhook destination. The response is the only place the
    /// accepted-or-generated secret is disclosed in full.
    pub async fn create_webhook(
        &self,
        tenant_ref: &str,
        request: CreateWebhookRequest,
    ) -> Result<WebhookCreatedResponse, OutboxError> {
        validation::validate_webhook_url(&request.url, self.allow_http, self.allow_internal)?;

        let secret = match request.secret {
            Some(s) if !s.is_empty() => s,
            _ => signing::generate_secret(),
        };

        let hook = Webhook::create(
            &self.pool,
            CreateWebhook {
                tenant_ref: tenant_ref.to_string(),
                url: request.url,
                secret: secret.clone(),
                is_active: request.is_active.unwrap_or(true),
                events: validation::normalize_event_list(request.events),
            },
        )
        .await?;

        tracing::info!(
            target: "webhook_registry",
            webhook_id = %hook.id,
            tenant_ref = %tenant_ref,
            url = %hook.url,
            "Webhook created"
        );

        Ok(WebhookCreatedResponse {
            webhook: WebhookResponse::from(hook),
            secret,
        })
    }

    /// List webhooks for a tenant with pagination.
    pub async fn list_webhooks(
        &self,
        tenant_ref: &str,
        query: ListWebhooksQuery,
    ) -> Result<WebhookListResponse, OutboxError> {
        let limit = query.limit.clamp(1, 100);
        let offset = query.offset.max(0);
        let tenant_refs = self.resolver.expand(tenant_ref).await?;

        let hooks =
            Webhook::list_by_tenant(&self.pool, &tenant_refs, limit, offset, query.is_active)
                .await?;
        let total = Webhook::count_by_tenant(&self.pool, &tenant_refs, query.is_active).await?;

        Ok(WebhookListResponse {
            items: hooks.into_iter().map(WebhookResponse::from).collect(),
            total,
            limit,
            offset,
        })
    }

    /// Get a single webhook.
    pub async fn get_webhook(
        &self,
        tenant_ref: &str,
        id: Uuid,
    ) -> Result<WebhookResponse, OutboxError> {
        let tenant_refs = self.resolver.expand(tenant_ref).await?;
        let hook = Webhook::find_by_id(&self.pool, &tenant_refs, id)
            .await?
            .ok_or(OutboxError::WebhookNotFound)?;

        Ok(WebhookResponse::from(hook))
    }

    /// Apply a partial update.
    pub async fn update_webhook(
        &self,
        tenant_ref: &str,
        id: Uuid,
        request: UpdateWebhookRequest,
    ) -> Result<WebhookResponse, OutboxError> {
        if let Some(ref url) = request.url {
            validation::validate_webhook_url(url, self.allow_http, self.allow_internal)?;
        }

        let tenant_refs = self.resolver.expand(tenant_ref).await?;
        let hook = Webhook::update(
            &self.pool,
            &tenant_refs,
            id,
            UpdateWebhook {
                url: request.url,
                secret: request.secret.filter(|s| !s.is_empty()),
                is_active: request.is_active,
                events: request.events.map(|e| validation::normalize_event_list(Some(e))),
            },
        )
        .await?
        .ok_or(OutboxError::WebhookNotFound)?;

        Ok(WebhookResponse::from(hook))
    }

    /// Delete a webhook.
    pub async fn delete_webhook(&self, tenant_ref: &str, id: Uuid) -> Result<(), OutboxError> {
        let tenant_refs = self.resolver.expand(tenant_ref).await?;
        if !Webhook::delete(&self.pool, &tenant_refs, id).await? {
            return Err(OutboxError::WebhookNotFound);
        }

        tracing::info!(
            target: "webhook_registry",
            webhook_id = %id,
            tenant_ref = %tenant_ref,
            "Webhook deleted"
        );

        Ok(())
    }

    /// Issue a fresh secret for a webhook and return it.
    pub async fn rotate_secret(
        &self,
        tenant_ref: &str,
        id: Uuid,
    ) -> Result<RotateSecretResponse, OutboxError> {
        let tenant_refs = self.resolver.expand(tenant_ref).await?;
        let secret = signing::generate_secret();

        if !Webhook::rotate_secret(&self.pool, &tenant_refs, id, &secret).await? {
            return Err(OutboxError::WebhookNotFound);
        }

        tracing::info!(
            target: "webhook_registry",
            webhook_id = %id,
            tenant_ref = %tenant_ref,
            "Webhook secret rotated"
        );

        Ok(RotateSecretResponse {
            id,
            secret,
            rotated_at: Utc::now(),
        })
    }

    /// Deliver a synthetic event to the webhook immediately, bypassing the
    /// outbox but using the same signing and logging path as the dispatcher.
    /// Intended for interactive registry feedback.
    pub async fn send_test(
        &self,
        tenant_ref: &str,
        id: Uuid,
    ) -> Result<TestDeliveryResponse, OutboxError> {
        let tenant_refs = self.resolver.expand(tenant_ref).await?;
        let hook = Webhook::find_by_id(&self.pool, &tenant_refs, id)
            .await?
            .ok_or(OutboxError::WebhookNotFound)?;

        let envelope = DeliveryEnvelope {
            id: Uuid::new_v4(),
            tenant_id: tenant_ref.to_string(),
            event_type: TEST_EVENT_TYPE.to_string(),
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "message": "test delivery" }),
            metadata: serde_json::json!({ "test": true }),
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| OutboxError::Internal(format!("envelope serialization: {e}")))?;

        let attempt = post_signed(
            &self.http_client,
            &hook.url,
            &hook.secret,
            TEST_EVENT_TYPE,
            body,
            self.http_timeout,
        )
        .await;

        tracing::info!(
            target: "webhook_delivery",
            webhook_id = %hook.id,
            tenant_ref = %tenant_ref,
            success = attempt.success,
            status_code = attempt.status_code,
            duration_ms = attempt.duration.as_millis() as u64,
            "Test delivery finished"
        );

        Ok(TestDeliveryResponse {
            success: attempt.success,
            status_code: attempt.status_code,
            error: attempt.error,
            duration_ms: attempt.duration.as_millis() as u64,
        })
    }
}

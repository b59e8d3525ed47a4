//! HTTP handlers for the webhook registry.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiResult, OutboxError};
use crate::models::{
    CreateWebhookRequest, ListWebhooksQuery, RotateSecretResponse, TenantContext,
    TestDeliveryResponse, UpdateWebhookRequest, WebhookCreatedResponse, WebhookListResponse,
    WebhookResponse,
};
use crate::router::OutboxState;

/// Create a webhook destination.
#[utoipa::path(
    post,
    path = "/webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook created", body = WebhookCreatedResponse),
        (status = 400, description = "Invalid URL or request"),
    ),
    tag = "webhooks"
)]
pub async fn create_webhook(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Json(request): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookCreatedResponse>)> {
    request
        .validate()
        .map_err(|e| OutboxError::Validation(e.to_string()))?;

    let created = state
        .registry
        .create_webhook(&tenant.tenant_ref, request)
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// List webhooks for the tenant.
#[utoipa::path(
    get,
    path = "/webhooks",
    params(ListWebhooksQuery),
    responses(
        (status = 200, description = "Webhook list", body = WebhookListResponse),
    ),
    tag = "webhooks"
)]
pub async fn list_webhooks(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ListWebhooksQuery>,
) -> ApiResult<Json<WebhookListResponse>> {
    let list = state
        .registry
        .list_webhooks(&tenant.tenant_ref, query)
        .await?;

    Ok(Json(list))
}

/// Get one webhook.
#[utoipa::path(
    get,
    path = "/webhooks/{id}",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "Webhook", body = WebhookResponse),
        (status = 404, description = "Webhook not found"),
    ),
    tag = "webhooks"
)]
pub async fn get_webhook(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let hook = state.registry.get_webhook(&tenant.tenant_ref, id).await?;
    Ok(Json(hook))
}

/// Partially update a webhook.
#[utoipa::path(
    patch,
    path = "/webhooks/{id}",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "Updated webhook", body = WebhookResponse),
        (status = 400, description = "Invalid URL or request"),
        (status = 404, description = "Webhook not found"),
    ),
    tag = "webhooks"
)]
pub async fn update_webhook(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    request
        .validate()
        .map_err(|e| OutboxError::Validation(e.to_string()))?;

    let hook = state
        .registry
        .update_webhook(&tenant.tenant_ref, id, request)
        .await?;

    Ok(Json(hook))
}

/// Delete a webhook.
#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 404, description = "Webhook not found"),
    ),
    tag = "webhooks"
)]
pub async fn delete_webhook(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.registry.delete_webhook(&tenant.tenant_ref, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotate a webhook's signing secret.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/rotate-secret",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "New secret", body = RotateSecretResponse),
        (status = 404, description = "Webhook not found"),
    ),
    tag = "webhooks"
)]
pub async fn rotate_secret(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RotateSecretResponse>> {
    let rotated = state.registry.rotate_secret(&tenant.tenant_ref, id).await?;
    Ok(Json(rotated))
}

/// Send a synthetic test event to a webhook immediately.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/test",
    params(("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "Delivery outcome", body = TestDeliveryResponse),
        (status = 404, description = "Webhook not found"),
    ),
    tag = "webhooks"
)]
pub async fn test_webhook(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TestDeliveryResponse>> {
    let outcome = state.registry.send_test(&tenant.tenant_ref, id).await?;
    Ok(Json(outcome))
}

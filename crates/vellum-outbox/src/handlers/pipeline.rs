//! HTTP handler for on-demand pipeline runs.

use axum::extract::{Extension, State};
use axum::Json;

use crate::config::PipelineOverrides;
use crate::error::ApiResult;
use crate::models::TenantContext;
use crate::router::OutboxState;
use crate::services::{PipelineRunner, TenantRunSummary};

/// Run the full pipeline for the calling tenant, with optional per-run
/// tuning overrides.
#[utoipa::path(
    post,
    path = "/pipeline/run",
    request_body = PipelineOverrides,
    responses(
        (status = 200, description = "Run summary", body = TenantRunSummary),
    ),
    tag = "pipeline"
)]
pub async fn run_pipeline(
    State(state): State<OutboxState>,
    Extension(tenant): Extension<TenantContext>,
    overrides: Option<Json<PipelineOverrides>>,
) -> ApiResult<Json<TenantRunSummary>> {
    let config = match overrides {
        Some(Json(ovr)) => state.config.clone().with_overrides(&ovr),
        None => state.config.clone(),
    };

    let mut runner = PipelineRunner::new(state.pool.clone(), config)?;
    if let Some(publisher) = &state.publisher {
        runner = runner.with_publisher(publisher.clone());
    }

    let summary = runner.run_for_tenant(&tenant.tenant_ref).await?;
    Ok(Json(summary))
}

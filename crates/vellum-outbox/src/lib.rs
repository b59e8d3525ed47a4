//! Transactional outbox pipeline for webhook delivery.
//!
//! Domain events written by producers are expanded into per-destination
//! delivery jobs (fanout), delivered over HTTP with HMAC-SHA256 signed
//! payloads (dispatch), retried on a fixed backoff, and dead-lettered after
//! their attempt budget. A registry manages webhook destinations and
//! secrets. The pipeline can run on demand per tenant, for all tenants, or
//! on an interval via [`worker::PipelineWorker`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod signing;
pub mod tenant_refs;
pub mod validation;
pub mod worker;

pub use config::{PipelineConfig, PipelineOverrides};
pub use error::{ApiResult, ErrorResponse, OutboxError};
pub use models::{DeliveryEnvelope, TenantContext};
pub use router::{outbox_router, OutboxState};
pub use services::{
    DeadLetterCleanup, Dispatcher, FanoutProcessor, PipelineRunReport, PipelineRunner,
    RegistryService, RetryScheduler, ScheduledContentPublisher, TenantRunSummary,
};
pub use tenant_refs::TenantRefResolver;
pub use worker::PipelineWorker;

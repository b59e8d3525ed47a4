//! Business logic for the outbox pipeline and webhook registry.

pub mod cleanup_service;
pub mod dispatch_service;
pub mod fanout_service;
pub mod pipeline_service;
pub mod registry_service;
pub mod retry_service;

pub use cleanup_service::{CleanupSummary, DeadLetterCleanup};
pub use dispatch_service::{
    DeliveryAttempt, DispatchSummary, Dispatcher, EVENT_TYPE_HEADER, SIGNATURE_HEADER,
};
pub use fanout_service::{FanoutProcessor, FanoutSummary};
pub use pipeline_service::{
    PipelineRunReport, PipelineRunner, ScheduledContentPublisher, TenantRunSummary,
};
pub use registry_service::{RegistryService, TEST_EVENT_TYPE};
pub use retry_service::{RetryScheduler, RetrySummary};

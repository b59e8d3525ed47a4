//! Database entity models for vellum-db.

pub mod domain_event;
pub mod tenant;
pub mod webhook;
pub mod webhook_outbox_job;

pub use domain_event::{CreateDomainEvent, DomainEvent};
pub use tenant::{CreateTenant, Tenant};
pub use webhook::{CreateWebhook, UpdateWebhook, Webhook, WILDCARD_EVENT};
pub use webhook_outbox_job::{CreateWebhookOutboxJob, WebhookOutboxJob};

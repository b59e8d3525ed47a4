//! HTTP request handlers.

pub mod pipeline;
pub mod webhooks;

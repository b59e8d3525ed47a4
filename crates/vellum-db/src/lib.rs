//! PostgreSQL persistence layer for the vellum outbox pipeline.
//!
//! Entity models with type-safe query methods, embedded SQL migrations, and a
//! unified error type. All status transitions out of claimable states use
//! conditional updates (`WHERE status = '<expected>'`) so that concurrent
//! workers race safely without external locks.

pub mod error;
pub mod migrations;
pub mod models;

pub use error::DbError;
pub use migrations::run_migrations;

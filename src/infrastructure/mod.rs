//! Infrastructure Layer
//!
//! Implementations of the application's ports:
//! - Database pool and repositories (PostgreSQL)
//! - Cache and rate-limit storage (Redis)
//! - Realtime fan-out between instances (Redis pub/sub)
//! - Payment providers (Stripe, manual)
//! - Prometheus metrics
//! - Background jobs

pub mod cache;
pub mod database;
pub mod jobs;
pub mod metrics;
pub mod payments;
pub mod pubsub;
pub mod repositories;

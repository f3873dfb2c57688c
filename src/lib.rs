//! # KoiHire Marketplace Library
//!
//! Backend for a freelance marketplace with:
//! - Client-posted projects with freelancer bids
//! - Freelancer service listings sold as tiered packages
//! - Escrowed payments, a per-user ledger and payouts
//! - Direct messaging and notifications pushed over a realtime gateway
//! - Admin moderation, dispute resolution and an audit log
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Entities, status transition tables and repository traits
//! - **Application Layer**: Marketplace services, ports and DTOs
//! - **Infrastructure Layer**: PostgreSQL, Redis, Stripe and background jobs
//! - **Presentation Layer**: HTTP handlers, middleware and the realtime gateway
//!
//! ## Module Structure
//!
//! ```text
//! koihire/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects and repository traits
//! +-- application/    Services, payment/event ports and DTOs
//! +-- infrastructure/ Repositories, cache, pub/sub, payments, jobs
//! +-- presentation/   HTTP routes, middleware and WebSocket gateway
//! +-- shared/         Errors, pagination, snowflake IDs
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;

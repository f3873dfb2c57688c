//! HTTP Handlers
//!
//! Request handlers for all HTTP endpoints, one module per resource.

pub mod admin;
pub mod applications;
pub mod auth;
pub mod catalog;
pub mod conversations;
pub mod escrows;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod payouts;
pub mod projects;
pub mod reviews;
pub mod users;

//! HTTP surface: routing, extractors, handlers and service wiring.

pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod services;

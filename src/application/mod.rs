//! Application Layer
//!
//! Contains business logic services and data transfer objects (DTOs).
//! This layer orchestrates the flow of data between the presentation
//! and domain layers, and defines the ports (payments, realtime events)
//! that infrastructure implements.

pub mod actor;
pub mod audit;
pub mod dto;
pub mod events;
pub mod payments;
pub mod services;

pub use actor::Actor;

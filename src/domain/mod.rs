//! # Domain Layer
//!
//! Core marketplace rules, independent of HTTP and storage.
//!
//! ## Structure
//!
//! - **entities**: Users, projects, bids, service listings, orders, escrow,
//!   ledger, payouts, conversations, notifications, reviews, audit log
//! - **value_objects**: Listing tiers and money helpers
//! - **services**: Fee policy
//!
//! Every status enum carries its own transition table; repositories enforce
//! the same transitions with conditional updates.

#[macro_use]
mod macros;

pub mod entities;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use services::*;
pub use value_objects::*;

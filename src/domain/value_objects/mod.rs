//! # Value Objects

mod listing_tier;
mod money;

pub use listing_tier::ListingTier;
pub use money::{format_cents, Cents};

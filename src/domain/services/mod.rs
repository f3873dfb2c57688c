//! # Domain Services
//!
//! Pure business rules that span entities.

mod fee_policy;

pub use fee_policy::{FeePolicy, FeeSplit};

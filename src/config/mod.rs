//! # Configuration Module
//!
//! Application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use koihire::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Platform fee: {} bps", settings.platform.fee_bps);
//! ```

mod settings;

pub use settings::*;

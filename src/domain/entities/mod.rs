//! Domain entities and their repository traits.

mod application;
mod audit;
mod conversation;
mod escrow;
mod message;
mod notification;
mod order;
mod payout;
mod project;
mod review;
mod service_listing;
mod session;
mod transaction;
mod user;

pub use application::*;
pub use audit::*;
pub use conversation::*;
pub use escrow::*;
pub use message::*;
pub use notification::*;
pub use order::*;
pub use payout::*;
pub use project::*;
pub use review::*;
pub use service_listing::*;
pub use session::*;
pub use transaction::*;
pub use user::*;

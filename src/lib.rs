pub mod auction;
pub mod bidding;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod message_broker;
pub mod notifier;
pub mod scheduler;
pub mod store;
pub mod transaction;

pub use auction::AuctionManager;
pub use config::AuctionConfig;
pub use error::{AuctionError, ErrorKind, Result};

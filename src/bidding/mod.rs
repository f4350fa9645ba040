pub mod commands;
pub mod model;

pub use commands::{BidCoordinator, BidReceipt, PlaceBidCommand};

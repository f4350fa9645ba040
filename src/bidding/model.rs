use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Bid model, append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: String,
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
}

// Values needed to append a bid row
#[derive(Debug, Clone)]
pub struct NewBid {
    pub auction_id: i64,
    pub bidder_id: String,
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
}

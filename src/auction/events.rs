use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum AuctionEvent {
    // A bid was accepted
    BidPlaced {
        auction_id: i64,
        auction_code: String,
        bidder_id: String,
        amount: i64,
        timestamp: DateTime<Utc>,
    },
    // The previous top bidder lost the lead and was refunded
    Outbid {
        auction_id: i64,
        auction_code: String,
        outbid_user_id: String,
        new_bidder_id: String,
        amount: i64,
        timestamp: DateTime<Utc>,
    },
    // The auction was settled, winner is None when nobody bid
    AuctionEnded {
        auction_id: i64,
        auction_code: String,
        item_name: String,
        seller_id: String,
        winner_id: Option<String>,
        final_price: i64,
        timestamp: DateTime<Utc>,
    },
}

impl AuctionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuctionEvent::BidPlaced { .. } => "BidPlaced",
            AuctionEvent::Outbid { .. } => "Outbid",
            AuctionEvent::AuctionEnded { .. } => "AuctionEnded",
        }
    }

    pub fn auction_id(&self) -> i64 {
        match self {
            AuctionEvent::BidPlaced { auction_id, .. }
            | AuctionEvent::Outbid { auction_id, .. }
            | AuctionEvent::AuctionEnded { auction_id, .. } => *auction_id,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Auction status, terminal once it leaves Active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Active,
    Completed,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "active",
            AuctionStatus::Completed => "completed",
            AuctionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuctionStatus::Active)
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AuctionStatus::Active),
            "completed" => Ok(AuctionStatus::Completed),
            "cancelled" => Ok(AuctionStatus::Cancelled),
            other => Err(format!("unknown auction status: {}", other)),
        }
    }
}

// Auction model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub code: String,
    pub item_id: i64,
    pub seller_id: String,
    pub start_price: i64,
    pub current_price: i64,
    pub min_increment: i64,
    pub top_bidder_id: Option<String>,
    pub previous_bidder_id: Option<String>,
    pub previous_bid_amount: Option<i64>,
    pub status: AuctionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub last_bid_time: Option<DateTime<Utc>>,
    pub bid_count: i32,
    pub message_id: Option<String>,
    pub channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    pub fn has_bids(&self) -> bool {
        self.top_bidder_id.is_some() || self.bid_count > 0
    }

    /// Lowest amount the next bid may offer
    pub fn minimum_next_bid(&self) -> i64 {
        self.current_price + self.min_increment
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

// Values needed to insert a fresh auction row
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub code: String,
    pub item_id: i64,
    pub seller_id: String,
    pub start_price: i64,
    pub min_increment: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// Field changes applied to an auction by an accepted bid
#[derive(Debug, Clone)]
pub struct BidUpdate {
    pub auction_id: i64,
    pub bidder_id: String,
    pub amount: i64,
    pub previous_bidder_id: Option<String>,
    pub previous_bid_amount: Option<i64>,
    pub bid_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// Catalog entry of an auctionable item, owned by the item module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemInfo {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub tier: i32,
}

impl ItemInfo {
    /// Display name with tier stars and category, as shown in chat messages
    pub fn display_name(&self) -> String {
        if (1..=5).contains(&self.tier) {
            format!(
                "{} {} [{}]",
                "★".repeat(self.tier as usize),
                self.name,
                self.category
            )
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_terminality() {
        for status in [
            AuctionStatus::Active,
            AuctionStatus::Completed,
            AuctionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<AuctionStatus>(), Ok(status));
        }
        assert!(!AuctionStatus::Active.is_terminal());
        assert!(AuctionStatus::Cancelled.is_terminal());
        assert!("paused".parse::<AuctionStatus>().is_err());
    }

    #[test]
    fn test_display_name_uses_stars_for_known_tiers() {
        let item = ItemInfo {
            id: 1,
            name: "Golden Lotus".to_string(),
            category: "flora".to_string(),
            tier: 3,
        };
        assert_eq!(item.display_name(), "★★★ Golden Lotus [flora]");

        let plain = ItemInfo { tier: 0, ..item };
        assert_eq!(plain.display_name(), "Golden Lotus");
    }
}

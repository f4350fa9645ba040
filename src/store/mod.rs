/// Persistence seam of the auction engine
/// `AuctionStore` serves reads and opens transactions, `StoreTx` is one open transaction.
/// Row-locking reads (`lock_*`) behave like `SELECT ... FOR UPDATE`.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionStatus, BidUpdate, ItemInfo, NewAuction};
use crate::bidding::model::{Bid, NewBid};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// endregion: --- Imports

// region:    --- Modules
pub mod memory;
pub mod postgres;
mod queries;

pub use memory::InMemoryStore;
pub use postgres::PgAuctionStore;
// endregion: --- Modules

// region:    --- Isolation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}
// endregion: --- Isolation

// region:    --- Store Traits
/// One open transaction. Dropping it without `commit` discards every change.
#[async_trait]
pub trait StoreTx: Send {
    /// Locks and returns the auction row
    async fn lock_auction(&mut self, auction_id: i64) -> Result<Option<Auction>>;

    async fn insert_auction(&mut self, auction: &NewAuction) -> Result<Auction>;

    async fn apply_bid(&mut self, update: &BidUpdate) -> Result<()>;

    /// Moves an Active auction to `status`, returns false when it was no longer Active
    async fn finish_auction(&mut self, auction_id: i64, status: AuctionStatus) -> Result<bool>;

    async fn insert_bid(&mut self, bid: &NewBid) -> Result<Bid>;

    /// Locks the inventory row and returns its amount
    async fn lock_inventory(&mut self, owner_id: &str, item_id: i64) -> Result<Option<i64>>;

    async fn upsert_inventory(&mut self, owner_id: &str, item_id: i64, amount: i64) -> Result<()>;

    /// Decrements only when at least `amount` is owned, returns whether a row changed
    async fn decrement_inventory(&mut self, owner_id: &str, item_id: i64, amount: i64)
        -> Result<bool>;

    async fn delete_inventory(&mut self, owner_id: &str, item_id: i64) -> Result<bool>;

    /// Locks the balance row and returns the balance
    async fn lock_balance(&mut self, owner_id: &str) -> Result<Option<i64>>;

    async fn adjust_balance(&mut self, owner_id: &str, delta: i64) -> Result<bool>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn StoreTx>>;

    async fn get_auction(&self, auction_id: i64) -> Result<Option<Auction>>;

    async fn get_auction_by_code(&self, code: &str) -> Result<Option<Auction>>;

    async fn auction_code_exists(&self, code: &str) -> Result<bool>;

    async fn active_auctions(&self) -> Result<Vec<Auction>>;

    /// Active auctions whose `end_time` is at or before `now`, oldest first
    async fn expired_auctions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Auction>>;

    /// Bids of one auction, highest first
    async fn auction_bids(&self, auction_id: i64) -> Result<Vec<Bid>>;

    /// Bids placed by one bidder, newest first
    async fn bidder_bids(&self, bidder_id: &str) -> Result<Vec<Bid>>;

    async fn recent_completed_auctions(&self, item_id: i64, limit: i64) -> Result<Vec<Auction>>;

    async fn set_auction_message(
        &self,
        auction_id: i64,
        message_id: &str,
        channel_id: &str,
    ) -> Result<bool>;

    async fn item_info(&self, item_id: i64) -> Result<Option<ItemInfo>>;

    async fn inventory_amount(&self, owner_id: &str, item_id: i64) -> Result<i64>;

    async fn balance(&self, owner_id: &str) -> Result<Option<i64>>;

    /// Deletes inventory rows whose amount dropped to zero
    async fn cleanup_zero_inventory(&self) -> Result<u64>;
}
// endregion: --- Store Traits

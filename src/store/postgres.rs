// region:    --- Imports
use super::queries;
use super::{AuctionStore, IsolationLevel, StoreTx};
use crate::auction::model::{Auction, AuctionStatus, BidUpdate, ItemInfo, NewAuction};
use crate::bidding::model::{Bid, NewBid};
use crate::database::DatabaseManager;
use crate::error::{AuctionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// endregion: --- Imports

// region:    --- Auction Row
/// Raw `auctions` row, status stored as text
#[derive(Debug, FromRow)]
struct AuctionRow {
    id: i64,
    code: String,
    item_id: i64,
    seller_id: String,
    start_price: i64,
    current_price: i64,
    min_increment: i64,
    top_bidder_id: Option<String>,
    previous_bidder_id: Option<String>,
    previous_bid_amount: Option<i64>,
    status: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    last_bid_time: Option<DateTime<Utc>>,
    bid_count: i32,
    message_id: Option<String>,
    channel_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = AuctionError;

    fn try_from(row: AuctionRow) -> Result<Self> {
        let status = row
            .status
            .parse::<AuctionStatus>()
            .map_err(AuctionError::Fatal)?;
        Ok(Auction {
            id: row.id,
            code: row.code,
            item_id: row.item_id,
            seller_id: row.seller_id,
            start_price: row.start_price,
            current_price: row.current_price,
            min_increment: row.min_increment,
            top_bidder_id: row.top_bidder_id,
            previous_bidder_id: row.previous_bidder_id,
            previous_bid_amount: row.previous_bid_amount,
            status,
            start_time: row.start_time,
            end_time: row.end_time,
            last_bid_time: row.last_bid_time,
            bid_count: row.bid_count,
            message_id: row.message_id,
            channel_id: row.channel_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_auctions(rows: Vec<AuctionRow>) -> Result<Vec<Auction>> {
    rows.into_iter().map(Auction::try_from).collect()
}
// endregion: --- Auction Row

// region:    --- Postgres Store
/// PostgreSQL-backed store
pub struct PgAuctionStore {
    pool: Arc<PgPool>,
    statement_timeout: Duration,
}

impl PgAuctionStore {
    pub fn new(db_manager: &DatabaseManager, statement_timeout: Duration) -> Self {
        Self {
            pool: db_manager.get_pool(),
            statement_timeout,
        }
    }
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(isolation.as_sql()).execute(&mut *tx).await?;
        // SET cannot take bind parameters
        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&set_timeout).execute(&mut *tx).await?;
        debug!("{:<12} --> transaction opened ({:?})", "Store", isolation);
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn get_auction(&self, auction_id: i64) -> Result<Option<Auction>> {
        let row = sqlx::query_as::<_, AuctionRow>(&queries::get_auction())
            .bind(auction_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(Auction::try_from).transpose()
    }

    async fn get_auction_by_code(&self, code: &str) -> Result<Option<Auction>> {
        let row = sqlx::query_as::<_, AuctionRow>(&queries::get_auction_by_code())
            .bind(code)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(Auction::try_from).transpose()
    }

    async fn auction_code_exists(&self, code: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(queries::AUCTION_CODE_EXISTS)
            .bind(code)
            .fetch_one(&*self.pool)
            .await?;
        Ok(exists)
    }

    async fn active_auctions(&self) -> Result<Vec<Auction>> {
        let rows = sqlx::query_as::<_, AuctionRow>(&queries::get_active_auctions())
            .fetch_all(&*self.pool)
            .await?;
        into_auctions(rows)
    }

    async fn expired_auctions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Auction>> {
        let rows = sqlx::query_as::<_, AuctionRow>(&queries::get_expired_auctions())
            .bind(now)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        into_auctions(rows)
    }

    async fn auction_bids(&self, auction_id: i64) -> Result<Vec<Bid>> {
        let bids = sqlx::query_as::<_, Bid>(queries::GET_AUCTION_BIDS)
            .bind(auction_id)
            .fetch_all(&*self.pool)
            .await?;
        Ok(bids)
    }

    async fn bidder_bids(&self, bidder_id: &str) -> Result<Vec<Bid>> {
        let bids = sqlx::query_as::<_, Bid>(queries::GET_BIDDER_BIDS)
            .bind(bidder_id)
            .fetch_all(&*self.pool)
            .await?;
        Ok(bids)
    }

    async fn recent_completed_auctions(&self, item_id: i64, limit: i64) -> Result<Vec<Auction>> {
        let rows = sqlx::query_as::<_, AuctionRow>(&queries::get_recent_completed_auctions())
            .bind(item_id)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        into_auctions(rows)
    }

    async fn set_auction_message(
        &self,
        auction_id: i64,
        message_id: &str,
        channel_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(queries::SET_AUCTION_MESSAGE)
            .bind(auction_id)
            .bind(message_id)
            .bind(channel_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn item_info(&self, item_id: i64) -> Result<Option<ItemInfo>> {
        let item = sqlx::query_as::<_, ItemInfo>(queries::GET_ITEM)
            .bind(item_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(item)
    }

    async fn inventory_amount(&self, owner_id: &str, item_id: i64) -> Result<i64> {
        let amount = sqlx::query_scalar::<_, i64>(queries::GET_INVENTORY)
            .bind(owner_id)
            .bind(item_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(amount.unwrap_or(0))
    }

    async fn balance(&self, owner_id: &str) -> Result<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(queries::GET_BALANCE)
            .bind(owner_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(balance)
    }

    async fn cleanup_zero_inventory(&self) -> Result<u64> {
        let result = sqlx::query(queries::CLEANUP_ZERO_INVENTORY)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
// endregion: --- Postgres Store

// region:    --- Postgres Transaction
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_auction(&mut self, auction_id: i64) -> Result<Option<Auction>> {
        let row = sqlx::query_as::<_, AuctionRow>(&queries::lock_auction())
            .bind(auction_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Auction::try_from).transpose()
    }

    async fn insert_auction(&mut self, auction: &NewAuction) -> Result<Auction> {
        let row = sqlx::query_as::<_, AuctionRow>(&queries::insert_auction())
            .bind(&auction.code)
            .bind(auction.item_id)
            .bind(&auction.seller_id)
            .bind(auction.start_price)
            .bind(auction.min_increment)
            .bind(auction.start_time)
            .bind(auction.end_time)
            .bind(Utc::now())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                // the only unique constraint an insert can hit is auctions.code
                if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    AuctionError::DuplicateAuctionCode(auction.code.clone())
                } else {
                    AuctionError::from(e)
                }
            })?;
        Auction::try_from(row)
    }

    async fn apply_bid(&mut self, update: &BidUpdate) -> Result<()> {
        let result = sqlx::query(queries::APPLY_BID)
            .bind(update.auction_id)
            .bind(&update.bidder_id)
            .bind(update.amount)
            .bind(&update.previous_bidder_id)
            .bind(update.previous_bid_amount)
            .bind(update.bid_time)
            .bind(update.end_time)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuctionError::AuctionNotActive(update.auction_id));
        }
        Ok(())
    }

    async fn finish_auction(&mut self, auction_id: i64, status: AuctionStatus) -> Result<bool> {
        let result = sqlx::query(queries::FINISH_AUCTION)
            .bind(auction_id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_bid(&mut self, bid: &NewBid) -> Result<Bid> {
        let bid = sqlx::query_as::<_, Bid>(queries::INSERT_BID)
            .bind(bid.auction_id)
            .bind(&bid.bidder_id)
            .bind(bid.amount)
            .bind(bid.bid_time)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(bid)
    }

    async fn lock_inventory(&mut self, owner_id: &str, item_id: i64) -> Result<Option<i64>> {
        let amount = sqlx::query_scalar::<_, i64>(queries::LOCK_INVENTORY)
            .bind(owner_id)
            .bind(item_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(amount)
    }

    async fn upsert_inventory(&mut self, owner_id: &str, item_id: i64, amount: i64) -> Result<()> {
        sqlx::query(queries::UPSERT_INVENTORY)
            .bind(owner_id)
            .bind(item_id)
            .bind(amount)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn decrement_inventory(
        &mut self,
        owner_id: &str,
        item_id: i64,
        amount: i64,
    ) -> Result<bool> {
        let result = sqlx::query(queries::DECREMENT_INVENTORY)
            .bind(owner_id)
            .bind(item_id)
            .bind(amount)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_inventory(&mut self, owner_id: &str, item_id: i64) -> Result<bool> {
        let result = sqlx::query(queries::DELETE_INVENTORY)
            .bind(owner_id)
            .bind(item_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_balance(&mut self, owner_id: &str) -> Result<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(queries::LOCK_BALANCE)
            .bind(owner_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(balance)
    }

    async fn adjust_balance(&mut self, owner_id: &str, delta: i64) -> Result<bool> {
        let result = sqlx::query(queries::ADJUST_BALANCE)
            .bind(owner_id)
            .bind(delta)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
// endregion: --- Postgres Transaction

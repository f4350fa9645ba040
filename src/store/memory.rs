/// In-memory store for tests and local runs
/// A transaction takes the whole state lock and works on a copy, so transactions are
/// serial and a rollback simply drops the copy.
// region:    --- Imports
use super::{AuctionStore, IsolationLevel, StoreTx};
use crate::auction::model::{Auction, AuctionStatus, BidUpdate, ItemInfo, NewAuction};
use crate::bidding::model::{Bid, NewBid};
use crate::error::{AuctionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

// endregion: --- Imports

// region:    --- Memory State
#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_auction_id: i64,
    next_bid_id: i64,
    auctions: BTreeMap<i64, Auction>,
    bids: Vec<Bid>,
    items: HashMap<i64, ItemInfo>,
    inventory: HashMap<(String, i64), i64>,
    balances: HashMap<String, i64>,
}
// endregion: --- Memory State

// region:    --- Memory Store
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_commits: Arc<AtomicU32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catalog entry
    pub async fn add_item(&self, item: ItemInfo) {
        self.state.lock().await.items.insert(item.id, item);
    }

    pub async fn set_balance(&self, owner_id: &str, balance: i64) {
        self.state
            .lock()
            .await
            .balances
            .insert(owner_id.to_string(), balance);
    }

    pub async fn set_inventory(&self, owner_id: &str, item_id: i64, amount: i64) {
        self.state
            .lock()
            .await
            .inventory
            .insert((owner_id.to_string(), item_id), amount);
    }

    /// Overrides an auction's end time, for simulating elapsed time
    pub async fn force_end_time(&self, auction_id: i64, end_time: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().await;
        match state.auctions.get_mut(&auction_id) {
            Some(auction) => {
                auction.end_time = end_time;
                true
            }
            None => false,
        }
    }

    /// Makes the next `count` commits fail with a transient error
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub async fn total_balance(&self) -> i64 {
        self.state.lock().await.balances.values().sum()
    }

    pub async fn has_inventory_row(&self, owner_id: &str, item_id: i64) -> bool {
        self.state
            .lock()
            .await
            .inventory
            .contains_key(&(owner_id.to_string(), item_id))
    }
}

#[async_trait]
impl AuctionStore for InMemoryStore {
    async fn begin(&self, _isolation: IsolationLevel) -> Result<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            failing_commits: Arc::clone(&self.failing_commits),
        }))
    }

    async fn get_auction(&self, auction_id: i64) -> Result<Option<Auction>> {
        Ok(self.state.lock().await.auctions.get(&auction_id).cloned())
    }

    async fn get_auction_by_code(&self, code: &str) -> Result<Option<Auction>> {
        let state = self.state.lock().await;
        Ok(state.auctions.values().find(|a| a.code == code).cloned())
    }

    async fn auction_code_exists(&self, code: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.auctions.values().any(|a| a.code == code))
    }

    async fn active_auctions(&self) -> Result<Vec<Auction>> {
        let state = self.state.lock().await;
        let mut auctions: Vec<Auction> = state
            .auctions
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        auctions.sort_by_key(|a| a.end_time);
        Ok(auctions)
    }

    async fn expired_auctions(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Auction>> {
        let mut auctions: Vec<Auction> = self
            .active_auctions()
            .await?
            .into_iter()
            .filter(|a| a.is_expired_at(now))
            .collect();
        auctions.truncate(limit.max(0) as usize);
        Ok(auctions)
    }

    async fn auction_bids(&self, auction_id: i64) -> Result<Vec<Bid>> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.amount.cmp(&a.amount));
        Ok(bids)
    }

    async fn bidder_bids(&self, bidder_id: &str) -> Result<Vec<Bid>> {
        let state = self.state.lock().await;
        let mut bids: Vec<Bid> = state
            .bids
            .iter()
            .filter(|b| b.bidder_id == bidder_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.bid_time.cmp(&a.bid_time).then(b.id.cmp(&a.id)));
        Ok(bids)
    }

    async fn recent_completed_auctions(&self, item_id: i64, limit: i64) -> Result<Vec<Auction>> {
        let state = self.state.lock().await;
        let mut auctions: Vec<Auction> = state
            .auctions
            .values()
            .filter(|a| {
                a.item_id == item_id
                    && a.status == AuctionStatus::Completed
                    && a.top_bidder_id.is_some()
            })
            .cloned()
            .collect();
        auctions.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        auctions.truncate(limit.max(0) as usize);
        Ok(auctions)
    }

    async fn set_auction_message(
        &self,
        auction_id: i64,
        message_id: &str,
        channel_id: &str,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.auctions.get_mut(&auction_id) {
            Some(auction) => {
                auction.message_id = Some(message_id.to_string());
                auction.channel_id = Some(channel_id.to_string());
                auction.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn item_info(&self, item_id: i64) -> Result<Option<ItemInfo>> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn inventory_amount(&self, owner_id: &str, item_id: i64) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .inventory
            .get(&(owner_id.to_string(), item_id))
            .copied()
            .unwrap_or(0))
    }

    async fn balance(&self, owner_id: &str) -> Result<Option<i64>> {
        Ok(self.state.lock().await.balances.get(owner_id).copied())
    }

    async fn cleanup_zero_inventory(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.inventory.len();
        state.inventory.retain(|_, amount| *amount > 0);
        Ok((before - state.inventory.len()) as u64)
    }
}
// endregion: --- Memory Store

// region:    --- Memory Transaction
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    failing_commits: Arc<AtomicU32>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_auction(&mut self, auction_id: i64) -> Result<Option<Auction>> {
        Ok(self.working.auctions.get(&auction_id).cloned())
    }

    async fn insert_auction(&mut self, auction: &NewAuction) -> Result<Auction> {
        if self.working.auctions.values().any(|a| a.code == auction.code) {
            return Err(AuctionError::DuplicateAuctionCode(auction.code.clone()));
        }
        self.working.next_auction_id += 1;
        let now = Utc::now();
        let record = Auction {
            id: self.working.next_auction_id,
            code: auction.code.clone(),
            item_id: auction.item_id,
            seller_id: auction.seller_id.clone(),
            start_price: auction.start_price,
            current_price: auction.start_price,
            min_increment: auction.min_increment,
            top_bidder_id: None,
            previous_bidder_id: None,
            previous_bid_amount: None,
            status: AuctionStatus::Active,
            start_time: auction.start_time,
            end_time: auction.end_time,
            last_bid_time: None,
            bid_count: 0,
            message_id: None,
            channel_id: None,
            created_at: now,
            updated_at: now,
        };
        self.working.auctions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn apply_bid(&mut self, update: &BidUpdate) -> Result<()> {
        let auction = self
            .working
            .auctions
            .get_mut(&update.auction_id)
            .filter(|a| a.is_active() && a.current_price < update.amount)
            .ok_or(AuctionError::AuctionNotActive(update.auction_id))?;
        auction.top_bidder_id = Some(update.bidder_id.clone());
        auction.current_price = update.amount;
        auction.previous_bidder_id = update.previous_bidder_id.clone();
        auction.previous_bid_amount = update.previous_bid_amount;
        auction.last_bid_time = Some(update.bid_time);
        auction.end_time = auction.end_time.max(update.end_time);
        auction.bid_count += 1;
        auction.updated_at = update.bid_time;
        Ok(())
    }

    async fn finish_auction(&mut self, auction_id: i64, status: AuctionStatus) -> Result<bool> {
        match self.working.auctions.get_mut(&auction_id) {
            Some(auction) if auction.is_active() => {
                auction.status = status;
                auction.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_bid(&mut self, bid: &NewBid) -> Result<Bid> {
        self.working.next_bid_id += 1;
        let record = Bid {
            id: self.working.next_bid_id,
            auction_id: bid.auction_id,
            bidder_id: bid.bidder_id.clone(),
            amount: bid.amount,
            bid_time: bid.bid_time,
        };
        self.working.bids.push(record.clone());
        Ok(record)
    }

    async fn lock_inventory(&mut self, owner_id: &str, item_id: i64) -> Result<Option<i64>> {
        Ok(self
            .working
            .inventory
            .get(&(owner_id.to_string(), item_id))
            .copied())
    }

    async fn upsert_inventory(&mut self, owner_id: &str, item_id: i64, amount: i64) -> Result<()> {
        *self
            .working
            .inventory
            .entry((owner_id.to_string(), item_id))
            .or_insert(0) += amount;
        Ok(())
    }

    async fn decrement_inventory(
        &mut self,
        owner_id: &str,
        item_id: i64,
        amount: i64,
    ) -> Result<bool> {
        match self
            .working
            .inventory
            .get_mut(&(owner_id.to_string(), item_id))
        {
            Some(owned) if *owned >= amount => {
                *owned -= amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_inventory(&mut self, owner_id: &str, item_id: i64) -> Result<bool> {
        Ok(self
            .working
            .inventory
            .remove(&(owner_id.to_string(), item_id))
            .is_some())
    }

    async fn lock_balance(&mut self, owner_id: &str) -> Result<Option<i64>> {
        Ok(self.working.balances.get(owner_id).copied())
    }

    async fn adjust_balance(&mut self, owner_id: &str, delta: i64) -> Result<bool> {
        match self.working.balances.get_mut(owner_id) {
            Some(balance) if *balance + delta >= 0 => {
                *balance += delta;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let pending_failures = self.failing_commits.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_commits
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(AuctionError::transient("simulated serialization failure"));
        }
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
// endregion: --- Memory Transaction

/// Auction manager
/// Public entry point of the engine. Owns the active index and wires the lifecycle,
/// bid coordinator and scheduler together. Timers are armed and disarmed here.
// region:    --- Imports
use crate::auction::index::ActiveIndex;
use crate::auction::lifecycle::{CompletionHook, LifecycleManager};
use crate::auction::model::Auction;
use crate::bidding::commands::{BidCoordinator, BidReceipt, PlaceBidCommand};
use crate::bidding::model::Bid;
use crate::config::AuctionConfig;
use crate::error::{AuctionError, Result};
use crate::notifier::AuctionNotifier;
use crate::scheduler::{AuctionScheduler, RecoveryReport};
use crate::store::AuctionStore;
use crate::transaction::{RetryPolicy, TransactionCoordinator};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// endregion: --- Imports

// region:    --- Auction Manager
pub struct AuctionManager {
    config: AuctionConfig,
    store: Arc<dyn AuctionStore>,
    index: Arc<ActiveIndex>,
    lifecycle: Arc<LifecycleManager>,
    bids: BidCoordinator,
    scheduler: Arc<AuctionScheduler>,
}

impl AuctionManager {
    pub fn new(store: Arc<dyn AuctionStore>, notifier: AuctionNotifier, config: AuctionConfig) -> Self {
        let coordinator = TransactionCoordinator::new(Arc::clone(&store), config.transaction_timeout);
        let index = Arc::new(ActiveIndex::new());
        let lifecycle = Arc::new(LifecycleManager::new(
            coordinator.clone(),
            Arc::clone(&index),
            notifier.clone(),
            config.clone(),
        ));
        let bid_policy = RetryPolicy::new(config.bid_retries, Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(1));
        let bids = BidCoordinator::new(
            coordinator,
            Arc::clone(&index),
            notifier,
            config.anti_snipe_window,
            bid_policy,
        );
        let scheduler = Arc::new(AuctionScheduler::new(
            Arc::clone(&lifecycle),
            config.sweep_interval,
            config.sweep_batch_size,
        ));
        Self {
            config,
            store,
            index,
            lifecycle,
            bids,
            scheduler,
        }
    }

    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<ActiveIndex> {
        &self.index
    }

    pub fn scheduler(&self) -> &Arc<AuctionScheduler> {
        &self.scheduler
    }

    /// Registers the callback run after each settlement
    pub async fn set_completion_hook(&self, hook: CompletionHook) {
        self.lifecycle.set_completion_hook(hook).await;
    }

    // region:    --- Commands
    pub async fn create_auction(
        &self,
        item_id: i64,
        seller_id: &str,
        start_price: i64,
        duration: Duration,
    ) -> Result<Auction> {
        let auction = self
            .lifecycle
            .create_auction(item_id, seller_id, start_price, duration)
            .await?;
        self.scheduler.schedule(auction.id, auction.end_time);
        Ok(auction)
    }

    pub async fn place_bid(&self, auction_id: i64, bidder_id: &str, amount: i64) -> Result<BidReceipt> {
        let receipt = self
            .bids
            .place_bid(PlaceBidCommand {
                auction_id,
                bidder_id: bidder_id.to_string(),
                amount,
            })
            .await?;
        if receipt.extended {
            self.scheduler.schedule(auction_id, receipt.auction.end_time);
        }
        Ok(receipt)
    }

    pub async fn cancel_auction(&self, auction_id: i64, requester_id: &str) -> Result<Auction> {
        let auction = self.lifecycle.cancel_auction(auction_id, requester_id).await?;
        self.scheduler.cancel(auction_id);
        Ok(auction)
    }

    /// Settles the auction now, regardless of its end time
    pub async fn complete_auction(&self, auction_id: i64) -> Result<Option<Auction>> {
        self.scheduler.cancel(auction_id);
        self.lifecycle.complete_auction(auction_id).await
    }

    /// Stores the chat message that announced the auction
    pub async fn attach_message(&self, auction_id: i64, message_id: &str, channel_id: &str) -> Result<()> {
        if !self
            .store
            .set_auction_message(auction_id, message_id, channel_id)
            .await?
        {
            return Err(AuctionError::AuctionNotFound(auction_id.to_string()));
        }
        if let Some(mut auction) = self.index.get(auction_id).await {
            auction.message_id = Some(message_id.to_string());
            auction.channel_id = Some(channel_id.to_string());
            self.index.insert(auction).await;
        }
        Ok(())
    }
    // endregion: --- Commands

    // region:    --- Queries
    /// Open auctions that have not reached their end time, soonest ending first
    pub async fn get_active_auctions(&self) -> Result<Vec<Auction>> {
        let now = Utc::now();
        let auctions = self.store.active_auctions().await?;
        Ok(auctions
            .into_iter()
            .filter(|auction| !auction.is_expired_at(now))
            .collect())
    }

    pub async fn get_by_id(&self, auction_id: i64) -> Result<Auction> {
        if let Some(auction) = self.index.get(auction_id).await {
            return Ok(auction);
        }
        self.store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| AuctionError::AuctionNotFound(auction_id.to_string()))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Auction> {
        self.store
            .get_auction_by_code(code)
            .await?
            .ok_or_else(|| AuctionError::AuctionNotFound(code.to_string()))
    }

    /// Bid history of one auction, highest first
    pub async fn get_auction_bids(&self, auction_id: i64) -> Result<Vec<Bid>> {
        self.get_by_id(auction_id).await?;
        self.store.auction_bids(auction_id).await
    }

    /// Bids placed by one user, newest first
    pub async fn get_bidder_bids(&self, bidder_id: &str) -> Result<Vec<Bid>> {
        self.store.bidder_bids(bidder_id).await
    }

    /// Latest settled auctions of an item that had a winner
    pub async fn get_recent_completed(&self, item_id: i64, limit: i64) -> Result<Vec<Auction>> {
        self.store.recent_completed_auctions(item_id, limit).await
    }
    // endregion: --- Queries

    // region:    --- Lifecycle
    pub async fn recover_active_auctions(&self) -> Result<RecoveryReport> {
        self.scheduler.recover_active_auctions().await
    }

    pub fn start(&self) {
        self.scheduler.start();
        info!("{:<12} --> auction engine started", "Manager");
    }

    /// Stops the sweep and pending timers, open auctions stay Active for the next recovery
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        if self.index.is_empty().await {
            info!("{:<12} --> auction engine stopped", "Manager");
        } else {
            info!(
                "{:<12} --> auction engine stopped ({} auctions left open)",
                "Manager",
                self.index.len().await
            );
        }
    }
    // endregion: --- Lifecycle
}
// endregion: --- Auction Manager

/// Auction lifecycle: creation with escrow, settlement, seller cancellation
// region:    --- Imports
use crate::auction::id_generator::IdGenerator;
use crate::auction::index::ActiveIndex;
use crate::auction::model::{Auction, AuctionStatus, NewAuction};
use crate::config::AuctionConfig;
use crate::error::{AuctionError, Result};
use crate::notifier::AuctionNotifier;
use crate::store::{AuctionStore, IsolationLevel, StoreTx};
use crate::transaction::{RetryPolicy, TransactionCoordinator};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

/// Called with every auction that settled, outside the settlement transaction
pub type CompletionHook = Arc<dyn Fn(&Auction) + Send + Sync>;

/// Outcome of one settlement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Settled(Auction),
    /// Completed or cancelled by someone else first
    AlreadyFinished,
    /// Still running, its end time lies in the future
    NotDue(Auction),
}

// region:    --- Lifecycle Manager
pub struct LifecycleManager {
    coordinator: TransactionCoordinator,
    id_generator: IdGenerator,
    index: Arc<ActiveIndex>,
    notifier: AuctionNotifier,
    config: AuctionConfig,
    settlement_policy: RetryPolicy,
    completion_hook: RwLock<Option<CompletionHook>>,
}

impl LifecycleManager {
    pub fn new(
        coordinator: TransactionCoordinator,
        index: Arc<ActiveIndex>,
        notifier: AuctionNotifier,
        config: AuctionConfig,
    ) -> Self {
        let id_generator = IdGenerator::new(Arc::clone(coordinator.store()), &config);
        let settlement_policy = RetryPolicy::new(config.settlement_retries, config.settlement_backoff);
        Self {
            coordinator,
            id_generator,
            index,
            notifier,
            config,
            settlement_policy,
            completion_hook: RwLock::new(None),
        }
    }

    pub fn index(&self) -> &Arc<ActiveIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn AuctionStore> {
        self.coordinator.store()
    }

    pub async fn set_completion_hook(&self, hook: CompletionHook) {
        *self.completion_hook.write().await = Some(hook);
    }

    /// Escrows one unit of the item and opens the auction.
    /// Arming the completion timer is left to the caller.
    pub async fn create_auction(
        &self,
        item_id: i64,
        seller_id: &str,
        start_price: i64,
        duration: Duration,
    ) -> Result<Auction> {
        if duration < self.config.min_auction_time || duration > self.config.max_auction_time {
            return Err(AuctionError::invalid_duration(
                duration,
                self.config.min_auction_time,
                self.config.max_auction_time,
            ));
        }
        if start_price <= 0 {
            return Err(AuctionError::InvalidStartPrice(start_price));
        }

        let chrono_duration =
            chrono::Duration::from_std(duration).map_err(|e| AuctionError::Fatal(e.to_string()))?;

        // a code can be taken between minting and the insert, that attempt rolls back and re-mints
        let mut created = None;
        for attempt in 1..=self.id_generator.retries() {
            let code = self.id_generator.generate_auction_id(item_id).await?;
            let start_time = Utc::now();
            let new_auction = NewAuction {
                code,
                item_id,
                seller_id: seller_id.to_string(),
                start_price,
                min_increment: self.config.min_bid_increment,
                start_time,
                end_time: start_time + chrono_duration,
            };
            match self.open_auction(new_auction).await {
                Ok(auction) => {
                    created = Some(auction);
                    break;
                }
                Err(AuctionError::DuplicateAuctionCode(code)) => warn!(
                    "{:<12} --> code {} taken at insert (attempt {}), minting again",
                    "Lifecycle", code, attempt
                ),
                Err(e) => return Err(e),
            }
        }
        let auction =
            created.ok_or(AuctionError::IDGenerationExhausted(self.id_generator.retries()))?;

        self.index.insert(auction.clone()).await;
        info!(
            "{:<12} --> auction {} created (id={}, item={}, seller={}, ends {})",
            "Lifecycle", auction.code, auction.id, auction.item_id, auction.seller_id, auction.end_time
        );
        Ok(auction)
    }

    /// Escrows one unit and inserts the auction row in one serializable transaction
    async fn open_auction(&self, new_auction: NewAuction) -> Result<Auction> {
        self.coordinator
            .with_transaction(IsolationLevel::Serializable, move |tx| {
                Box::pin(async move {
                    TransactionCoordinator::remove_item_from_inventory(
                        tx,
                        &new_auction.seller_id,
                        new_auction.item_id,
                        1,
                    )
                    .await
                    .map_err(|e| match e {
                        AuctionError::InsufficientQuantity { item_id, .. } => {
                            AuctionError::ItemNotOwned(item_id)
                        }
                        other => other,
                    })?;
                    tx.insert_auction(&new_auction).await
                })
            })
            .await
    }

    /// Settles an auction now, whatever its end time. Returns `None` when it had already left Active.
    pub async fn complete_auction(&self, auction_id: i64) -> Result<Option<Auction>> {
        match self.settle_auction(auction_id, false).await? {
            Completion::Settled(auction) => Ok(Some(auction)),
            Completion::AlreadyFinished | Completion::NotDue(_) => Ok(None),
        }
    }

    /// Settles an auction only if its end time has passed, checked again under the row lock.
    /// Used by the timer and the sweep, a bid may have extended the auction since they looked.
    pub async fn complete_if_due(&self, auction_id: i64) -> Result<Completion> {
        self.settle_auction(auction_id, true).await
    }

    async fn settle_auction(&self, auction_id: i64, only_if_due: bool) -> Result<Completion> {
        let current = self
            .store()
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| AuctionError::AuctionNotFound(auction_id.to_string()))?;
        if current.status.is_terminal() {
            self.index.remove(auction_id).await;
            debug!(
                "{:<12} --> auction {} already {}, nothing to settle",
                "Lifecycle", auction_id, current.status
            );
            return Ok(Completion::AlreadyFinished);
        }
        if only_if_due && !current.is_expired_at(Utc::now()) {
            return Ok(Completion::NotDue(current));
        }

        let settled = self
            .settlement_policy
            .run("settlement", |_| {
                self.coordinator
                    .with_transaction(IsolationLevel::ReadCommitted, move |tx| {
                        Box::pin(settle(tx, auction_id, only_if_due))
                    })
            })
            .await;

        let completed = match settled {
            Ok(Completion::Settled(completed)) => completed,
            Ok(Completion::AlreadyFinished) => {
                self.index.remove(auction_id).await;
                return Ok(Completion::AlreadyFinished);
            }
            Ok(Completion::NotDue(auction)) => {
                debug!(
                    "{:<12} --> auction {} was extended to {}, not settling yet",
                    "Lifecycle", auction.code, auction.end_time
                );
                return Ok(Completion::NotDue(auction));
            }
            Err(e) => {
                error!(
                    "{:<12} --> settlement of auction {} failed: {}",
                    "Lifecycle", auction_id, e
                );
                return Err(e);
            }
        };

        self.index.remove(auction_id).await;
        info!(
            "{:<12} --> auction {} completed (winner={:?}, price={})",
            "Lifecycle", completed.code, completed.top_bidder_id, completed.current_price
        );

        let item_name = match self.store().item_info(completed.item_id).await {
            Ok(Some(item)) => item.display_name(),
            _ => format!("item #{}", completed.item_id),
        };
        self.notifier.notify_auction_end(&completed, &item_name);

        if let Some(hook) = self.completion_hook.read().await.as_ref() {
            hook(&completed);
        }
        Ok(Completion::Settled(completed))
    }

    /// Seller-initiated cancellation, refused once any bid exists
    pub async fn cancel_auction(&self, auction_id: i64, requester_id: &str) -> Result<Auction> {
        let requester_id = requester_id.to_string();
        let cancelled = self
            .coordinator
            .with_transaction(IsolationLevel::ReadCommitted, move |tx| {
                Box::pin(async move {
                    let auction = tx
                        .lock_auction(auction_id)
                        .await?
                        .ok_or_else(|| AuctionError::AuctionNotFound(auction_id.to_string()))?;
                    if auction.seller_id != requester_id {
                        return Err(AuctionError::NotSeller(auction_id));
                    }
                    if !auction.is_active() {
                        return Err(AuctionError::AuctionNotActive(auction_id));
                    }
                    if auction.has_bids() {
                        return Err(AuctionError::AuctionHasBids(auction_id));
                    }
                    if !tx.finish_auction(auction_id, AuctionStatus::Cancelled).await? {
                        return Err(AuctionError::AuctionNotActive(auction_id));
                    }
                    TransactionCoordinator::add_item_to_inventory(
                        tx,
                        &auction.seller_id,
                        auction.item_id,
                        1,
                    )
                    .await?;
                    Ok(Auction {
                        status: AuctionStatus::Cancelled,
                        updated_at: Utc::now(),
                        ..auction
                    })
                })
            })
            .await?;

        self.index.remove(auction_id).await;
        info!(
            "{:<12} --> auction {} cancelled by seller {}",
            "Lifecycle", cancelled.code, cancelled.seller_id
        );
        Ok(cancelled)
    }
}
// endregion: --- Lifecycle Manager

// region:    --- Settlement
/// Item to the winner and price to the seller, or the item back to the seller without bids.
/// The winner's funds were debited when the bid was accepted.
async fn settle(tx: &mut dyn StoreTx, auction_id: i64, only_if_due: bool) -> Result<Completion> {
    let auction = match tx.lock_auction(auction_id).await? {
        Some(auction) if auction.is_active() => auction,
        _ => return Ok(Completion::AlreadyFinished),
    };
    if only_if_due && !auction.is_expired_at(Utc::now()) {
        return Ok(Completion::NotDue(auction));
    }
    if !tx
        .finish_auction(auction_id, AuctionStatus::Completed)
        .await?
    {
        return Ok(Completion::AlreadyFinished);
    }

    match &auction.top_bidder_id {
        Some(winner_id) => {
            TransactionCoordinator::add_item_to_inventory(tx, winner_id, auction.item_id, 1)
                .await?;
            TransactionCoordinator::validate_and_update_balance(
                tx,
                &auction.seller_id,
                auction.current_price,
            )
            .await?;
        }
        None => {
            TransactionCoordinator::add_item_to_inventory(
                tx,
                &auction.seller_id,
                auction.item_id,
                1,
            )
            .await?;
        }
    }

    Ok(Completion::Settled(Auction {
        status: AuctionStatus::Completed,
        updated_at: Utc::now(),
        ..auction
    }))
}
// endregion: --- Settlement

/// Bid placement
/// One serializable transaction per bid: validate, move funds, update the auction, append the bid.
// region:    --- Imports
use crate::auction::index::ActiveIndex;
use crate::auction::model::{Auction, BidUpdate};
use crate::bidding::model::{Bid, NewBid};
use crate::error::{AuctionError, Result};
use crate::notifier::AuctionNotifier;
use crate::store::{IsolationLevel, StoreTx};
use crate::transaction::{RetryPolicy, TransactionCoordinator};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// endregion: --- Imports

// region:    --- Commands
#[derive(Debug, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: String,
    pub amount: i64,
}

/// Outcome of an accepted bid
#[derive(Debug, Serialize, Clone)]
pub struct BidReceipt {
    pub auction: Auction,
    pub bid: Bid,
    /// Previous top bidder, refunded in the same transaction
    pub outbid_user_id: Option<String>,
    /// Whether the bid pushed `end_time` forward
    pub extended: bool,
}
// endregion: --- Commands

// region:    --- Bid Coordinator
pub struct BidCoordinator {
    coordinator: TransactionCoordinator,
    index: Arc<ActiveIndex>,
    notifier: AuctionNotifier,
    anti_snipe_window: Duration,
    retry_policy: RetryPolicy,
}

impl BidCoordinator {
    pub fn new(
        coordinator: TransactionCoordinator,
        index: Arc<ActiveIndex>,
        notifier: AuctionNotifier,
        anti_snipe_window: Duration,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            coordinator,
            index,
            notifier,
            anti_snipe_window,
            retry_policy,
        }
    }

    /// Applies one bid, retrying the transaction on serialization conflicts.
    /// Notifications go out only after the commit.
    pub async fn place_bid(&self, cmd: PlaceBidCommand) -> Result<BidReceipt> {
        info!("{:<12} --> place bid: {:?}", "Command", cmd);
        let window = self.anti_snipe_window;

        let receipt = self
            .coordinator
            .with_retrying_transaction(
                &self.retry_policy,
                "place bid",
                IsolationLevel::Serializable,
                move |tx| Box::pin(apply_bid(tx, cmd.clone(), window)),
            )
            .await?;

        self.index.insert(receipt.auction.clone()).await;
        info!(
            "{:<12} --> bid accepted: auction={}, bidder={}, amount={}, ends {}{}",
            "Command",
            receipt.auction.code,
            receipt.bid.bidder_id,
            receipt.bid.amount,
            receipt.auction.end_time,
            if receipt.extended { " (extended)" } else { "" }
        );

        self.notifier
            .notify_bid(&receipt.auction, &receipt.bid.bidder_id, receipt.bid.amount);
        if let Some(outbid_user_id) = &receipt.outbid_user_id {
            self.notifier.notify_outbid(
                &receipt.auction,
                outbid_user_id,
                &receipt.bid.bidder_id,
                receipt.bid.amount,
            );
        }
        Ok(receipt)
    }
}
// endregion: --- Bid Coordinator

// region:    --- Bid Transaction
async fn apply_bid(
    tx: &mut dyn StoreTx,
    cmd: PlaceBidCommand,
    anti_snipe_window: Duration,
) -> Result<BidReceipt> {
    let now = Utc::now();
    let auction = tx
        .lock_auction(cmd.auction_id)
        .await?
        .ok_or_else(|| AuctionError::AuctionNotFound(cmd.auction_id.to_string()))?;

    if !auction.is_active() || auction.is_expired_at(now) {
        return Err(AuctionError::AuctionNotActive(auction.id));
    }
    if cmd.bidder_id == auction.seller_id {
        return Err(AuctionError::SelfBid);
    }
    if auction.top_bidder_id.as_deref() == Some(cmd.bidder_id.as_str()) {
        return Err(AuctionError::AlreadyTopBidder);
    }
    let minimum = auction.minimum_next_bid();
    if cmd.amount < minimum {
        return Err(AuctionError::BidTooLow {
            amount: cmd.amount,
            minimum,
        });
    }

    TransactionCoordinator::validate_and_update_balance(tx, &cmd.bidder_id, -cmd.amount).await?;
    let previous_bidder_id = auction.top_bidder_id.clone();
    if let Some(previous) = &previous_bidder_id {
        TransactionCoordinator::validate_and_update_balance(tx, previous, auction.current_price)
            .await?;
    }

    let window = chrono::Duration::from_std(anti_snipe_window)
        .map_err(|e| AuctionError::Fatal(e.to_string()))?;
    let extended = auction.end_time - now <= window;
    let end_time = if extended {
        (now + window).max(auction.end_time)
    } else {
        auction.end_time
    };

    let previous_bid_amount = previous_bidder_id.as_ref().map(|_| auction.current_price);
    tx.apply_bid(&BidUpdate {
        auction_id: auction.id,
        bidder_id: cmd.bidder_id.clone(),
        amount: cmd.amount,
        previous_bidder_id: previous_bidder_id.clone(),
        previous_bid_amount,
        bid_time: now,
        end_time,
    })
    .await?;
    let bid = tx
        .insert_bid(&NewBid {
            auction_id: auction.id,
            bidder_id: cmd.bidder_id.clone(),
            amount: cmd.amount,
            bid_time: now,
        })
        .await?;

    Ok(BidReceipt {
        auction: Auction {
            top_bidder_id: Some(cmd.bidder_id),
            current_price: cmd.amount,
            previous_bidder_id: previous_bidder_id.clone(),
            previous_bid_amount,
            last_bid_time: Some(now),
            end_time,
            bid_count: auction.bid_count + 1,
            updated_at: now,
            ..auction
        },
        bid,
        outbid_user_id: previous_bidder_id,
        extended,
    })
}
// endregion: --- Bid Transaction

/// Outbound auction notifications
/// Delivery runs on spawned tasks after the triggering transaction committed. Failures are
/// logged and dropped, auction state never depends on them.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::Auction;
use crate::message_broker::KafkaProducer;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

// endregion: --- Imports

// region:    --- Notify Error
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("kafka delivery failed: {0}")]
    Kafka(String),

    #[error("webhook request failed: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error("webhook responded with status {0}")]
    WebhookStatus(u16),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
// endregion: --- Notify Error

// region:    --- Sinks
/// Destination for auction events
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &AuctionEvent) -> Result<(), NotifyError>;
}

/// Chat-facing text for an event
pub fn message_text(event: &AuctionEvent) -> String {
    match event {
        AuctionEvent::BidPlaced {
            auction_code,
            bidder_id,
            amount,
            ..
        } => format!(
            "[BID] <@{}> placed a bid of {} on Auction {}",
            bidder_id, amount, auction_code
        ),
        AuctionEvent::Outbid {
            auction_code,
            outbid_user_id,
            new_bidder_id,
            amount,
            ..
        } => format!(
            "[OUTBID] <@{}> was outbid on Auction {} by <@{}> with {}",
            outbid_user_id, auction_code, new_bidder_id, amount
        ),
        AuctionEvent::AuctionEnded {
            auction_code,
            item_name,
            seller_id,
            winner_id: Some(winner_id),
            final_price,
            ..
        } => format!(
            "[ENDED] Auction {} for {} ended, <@{}> won it for {}, paid to <@{}>",
            auction_code, item_name, winner_id, final_price, seller_id
        ),
        AuctionEvent::AuctionEnded {
            auction_code,
            item_name,
            seller_id,
            winner_id: None,
            ..
        } => format!(
            "[ENDED] Auction {} for {} ended with no bids, the item was returned to <@{}>",
            auction_code, item_name, seller_id
        ),
    }
}

/// Writes events to the tracing log only
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &AuctionEvent) -> Result<(), NotifyError> {
        info!("{:<12} --> {}", "Notify", message_text(event));
        Ok(())
    }
}

/// Publishes events as JSON, keyed by auction id
pub struct KafkaSink {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaSink {
    pub fn new(producer: KafkaProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for KafkaSink {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn deliver(&self, event: &AuctionEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        let key = event.auction_id().to_string();
        self.producer
            .send_message(&self.topic, &key, &payload, Duration::from_secs(0))
            .await
            .map_err(NotifyError::Kafka)
    }
}

/// Posts the chat text plus the raw event to a webhook
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &AuctionEvent) -> Result<(), NotifyError> {
        let body = json!({
            "content": message_text(event),
            "event": event,
        });
        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::WebhookStatus(response.status().as_u16()));
        }
        Ok(())
    }
}
// endregion: --- Sinks

// region:    --- Auction Notifier
#[derive(Clone)]
pub struct AuctionNotifier {
    sink: Arc<dyn NotificationSink>,
    timeout: Duration,
}

impl AuctionNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub fn notify_bid(&self, auction: &Auction, bidder_id: &str, amount: i64) -> JoinHandle<()> {
        self.dispatch(AuctionEvent::BidPlaced {
            auction_id: auction.id,
            auction_code: auction.code.clone(),
            bidder_id: bidder_id.to_string(),
            amount,
            timestamp: Utc::now(),
        })
    }

    pub fn notify_outbid(
        &self,
        auction: &Auction,
        outbid_user_id: &str,
        new_bidder_id: &str,
        amount: i64,
    ) -> JoinHandle<()> {
        self.dispatch(AuctionEvent::Outbid {
            auction_id: auction.id,
            auction_code: auction.code.clone(),
            outbid_user_id: outbid_user_id.to_string(),
            new_bidder_id: new_bidder_id.to_string(),
            amount,
            timestamp: Utc::now(),
        })
    }

    pub fn notify_auction_end(&self, auction: &Auction, item_name: &str) -> JoinHandle<()> {
        self.dispatch(AuctionEvent::AuctionEnded {
            auction_id: auction.id,
            auction_code: auction.code.clone(),
            item_name: item_name.to_string(),
            seller_id: auction.seller_id.clone(),
            winner_id: auction.top_bidder_id.clone(),
            final_price: auction.current_price,
            timestamp: Utc::now(),
        })
    }

    fn dispatch(&self, event: AuctionEvent) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;
        tokio::spawn(async move {
            match time::timeout(timeout, sink.deliver(&event)).await {
                Ok(Ok(())) => debug!(
                    "{:<12} --> {} delivered via {} (auction {})",
                    "Notify",
                    event.event_type(),
                    sink.name(),
                    event.auction_id()
                ),
                Ok(Err(e)) => warn!(
                    "{:<12} --> {} via {} failed: {}",
                    "Notify",
                    event.event_type(),
                    sink.name(),
                    e
                ),
                Err(_) => warn!(
                    "{:<12} --> {} via {} timed out after {:?}",
                    "Notify",
                    event.event_type(),
                    sink.name(),
                    timeout
                ),
            }
        })
    }
}
// endregion: --- Auction Notifier

/// Auction code generation
/// Codes are a readable prefix derived from the item plus a short random suffix.
/// Collisions are detected against the store and retried with a fresh suffix.
// region:    --- Imports
use crate::auction::model::ItemInfo;
use crate::config::AuctionConfig;
use crate::error::{AuctionError, Result};
use crate::store::AuctionStore;
use crate::transaction::RetryPolicy;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, warn};

// endregion: --- Imports

const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// region:    --- ID Generator
pub struct IdGenerator {
    store: Arc<dyn AuctionStore>,
    // guards minting only, never held by store transactions
    mint_lock: Mutex<()>,
    retries: u32,
    timeout: Duration,
    suffix_length: usize,
    backoff: RetryPolicy,
}

impl IdGenerator {
    pub fn new(store: Arc<dyn AuctionStore>, config: &AuctionConfig) -> Self {
        Self {
            store,
            mint_lock: Mutex::new(()),
            retries: config.id_generation_retries,
            timeout: config.id_generation_timeout,
            suffix_length: config.id_suffix_length,
            backoff: RetryPolicy::new(config.id_generation_retries, Duration::from_millis(1))
                .without_jitter(),
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Mints a code that is not yet used by any auction
    pub async fn generate_auction_id(&self, item_id: i64) -> Result<String> {
        let item = self
            .store
            .item_info(item_id)
            .await?
            .ok_or(AuctionError::ItemNotFound(item_id))?;
        let prefix = build_prefix(&item);

        let _guard = self.mint_lock.lock().await;
        match time::timeout(self.timeout, self.mint_unique(&prefix)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{:<12} --> generation for prefix {} timed out after {:?}",
                    "IdGenerator", prefix, self.timeout
                );
                Err(AuctionError::IDGenerationExhausted(self.retries))
            }
        }
    }

    async fn mint_unique(&self, prefix: &str) -> Result<String> {
        for attempt in 0..self.retries {
            let candidate = format!("{}{}", prefix, random_suffix(self.suffix_length));
            match self.store.auction_code_exists(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => debug!("{:<12} --> collision on {}", "IdGenerator", candidate),
                Err(e) => warn!(
                    "{:<12} --> existence check for {} failed: {}",
                    "IdGenerator", candidate, e
                ),
            }
            if attempt + 1 < self.retries {
                time::sleep(self.backoff.delay_for(attempt)).await;
            }
        }
        Err(AuctionError::IDGenerationExhausted(self.retries))
    }
}
// endregion: --- ID Generator

// region:    --- Helpers
/// Initials of the first two words (or the first two letters of a single word, padded
/// with `X`), then the category initial and the tier
pub fn build_prefix(item: &ItemInfo) -> String {
    let words: Vec<&str> = item.name.split_whitespace().collect();
    let mut prefix: String = match words.as_slice() {
        [] => "XX".to_string(),
        [word] => {
            let letters: String = word.chars().take(2).collect();
            if letters.chars().count() < 2 {
                format!("{}X", letters)
            } else {
                letters
            }
        }
        [first, second, ..] => first.chars().take(1).chain(second.chars().take(1)).collect(),
    };
    if let Some(initial) = item.category.chars().next() {
        prefix.push(initial);
    }
    prefix = prefix.to_uppercase();
    prefix.push_str(&item.tier.to_string());
    prefix
}

fn random_suffix(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}
// endregion: --- Helpers

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::NewAuction;
    use crate::store::{InMemoryStore, IsolationLevel, StoreTx};
    use chrono::Utc;

    fn item(name: &str, category: &str, tier: i32) -> ItemInfo {
        ItemInfo {
            id: 1,
            name: name.to_string(),
            category: category.to_string(),
            tier,
        }
    }

    #[test]
    fn test_prefix_shapes() {
        assert_eq!(build_prefix(&item("golden lotus", "flora", 3)), "GLF3");
        assert_eq!(build_prefix(&item("Mirror of Dawn", "relic", 5)), "MOR5");
        assert_eq!(build_prefix(&item("phoenix", "beast", 2)), "PHB2");
        assert_eq!(build_prefix(&item("x", "", 1)), "XX1");
    }

    #[test]
    fn test_suffix_is_alphanumeric() {
        let suffix = random_suffix(6);
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_generated_code_uses_item_prefix() {
        let store = InMemoryStore::new();
        store.add_item(item("golden lotus", "flora", 3)).await;
        let generator = IdGenerator::new(Arc::new(store), &AuctionConfig::default());

        let code = generator.generate_auction_id(1).await.unwrap();
        assert!(code.starts_with("GLF3"));
        assert_eq!(code.len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_item_is_rejected() {
        let generator = IdGenerator::new(Arc::new(InMemoryStore::new()), &AuctionConfig::default());
        assert!(matches!(
            generator.generate_auction_id(99).await,
            Err(AuctionError::ItemNotFound(99))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_keyspace_exhausts_retries() {
        let store = InMemoryStore::new();
        store.add_item(item("golden lotus", "flora", 3)).await;
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        for symbol in SUFFIX_ALPHABET {
            tx.insert_auction(&NewAuction {
                code: format!("GLF3{}", *symbol as char),
                item_id: 1,
                seller_id: "seller".to_string(),
                start_price: 100,
                min_increment: 100,
                start_time: Utc::now(),
                end_time: Utc::now(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let config = AuctionConfig {
            id_suffix_length: 1,
            ..AuctionConfig::default()
        };
        let generator = IdGenerator::new(Arc::new(store), &config);
        assert!(matches!(
            generator.generate_auction_id(1).await,
            Err(AuctionError::IDGenerationExhausted(5))
        ));
    }
}

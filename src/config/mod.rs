/// Engine and service configuration
/// Every option can be overridden through environment variables, unset options keep their defaults.
// region:    --- Imports
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Config Error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
// endregion: --- Config Error

// region:    --- Auction Config
/// Economic and timing rules of the auction engine
#[derive(Debug, Clone)]
pub struct AuctionConfig {
    pub min_bid_increment: i64,
    pub min_auction_time: Duration,
    pub max_auction_time: Duration,
    pub anti_snipe_window: Duration,
    pub id_generation_retries: u32,
    pub id_generation_timeout: Duration,
    pub id_suffix_length: usize,
    pub sweep_interval: Duration,
    pub sweep_batch_size: i64,
    pub transaction_timeout: Duration,
    pub settlement_retries: u32,
    pub settlement_backoff: Duration,
    pub bid_retries: u32,
    pub notification_timeout: Duration,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            min_bid_increment: 100,
            min_auction_time: Duration::from_secs(10),
            max_auction_time: Duration::from_secs(24 * 60 * 60),
            anti_snipe_window: Duration::from_secs(10),
            id_generation_retries: 5,
            id_generation_timeout: Duration::from_secs(5),
            id_suffix_length: 2,
            sweep_interval: Duration::from_secs(15),
            sweep_batch_size: 10,
            transaction_timeout: Duration::from_secs(30),
            settlement_retries: 3,
            settlement_backoff: Duration::from_secs(1),
            bid_retries: 3,
            notification_timeout: Duration::from_secs(5),
        }
    }
}

impl AuctionConfig {
    /// Reads `AUCTION_*` variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            min_bid_increment: parse_or("AUCTION_MIN_BID_INCREMENT", defaults.min_bid_increment)?,
            min_auction_time: secs_or("AUCTION_MIN_TIME_SECS", defaults.min_auction_time)?,
            max_auction_time: secs_or("AUCTION_MAX_TIME_SECS", defaults.max_auction_time)?,
            anti_snipe_window: secs_or("AUCTION_ANTI_SNIPE_SECS", defaults.anti_snipe_window)?,
            id_generation_retries: parse_or(
                "AUCTION_ID_GENERATION_RETRIES",
                defaults.id_generation_retries,
            )?,
            id_generation_timeout: millis_or(
                "AUCTION_ID_GENERATION_TIMEOUT_MS",
                defaults.id_generation_timeout,
            )?,
            id_suffix_length: parse_or("AUCTION_ID_SUFFIX_LENGTH", defaults.id_suffix_length)?,
            sweep_interval: secs_or("AUCTION_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            sweep_batch_size: parse_or("AUCTION_SWEEP_BATCH_SIZE", defaults.sweep_batch_size)?,
            transaction_timeout: millis_or(
                "AUCTION_TRANSACTION_TIMEOUT_MS",
                defaults.transaction_timeout,
            )?,
            settlement_retries: parse_or(
                "AUCTION_SETTLEMENT_RETRIES",
                defaults.settlement_retries,
            )?,
            settlement_backoff: millis_or(
                "AUCTION_SETTLEMENT_BACKOFF_MS",
                defaults.settlement_backoff,
            )?,
            bid_retries: parse_or("AUCTION_BID_RETRIES", defaults.bid_retries)?,
            notification_timeout: millis_or(
                "AUCTION_NOTIFICATION_TIMEOUT_MS",
                defaults.notification_timeout,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects combinations the engine cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_bid_increment <= 0 {
            return Err(ConfigError::Invalid {
                key: "AUCTION_MIN_BID_INCREMENT",
                value: self.min_bid_increment.to_string(),
            });
        }
        if self.min_auction_time > self.max_auction_time {
            return Err(ConfigError::Invalid {
                key: "AUCTION_MIN_TIME_SECS",
                value: format!(
                    "{}s exceeds the maximum of {}s",
                    self.min_auction_time.as_secs(),
                    self.max_auction_time.as_secs()
                ),
            });
        }
        if self.id_suffix_length == 0 {
            return Err(ConfigError::Invalid {
                key: "AUCTION_ID_SUFFIX_LENGTH",
                value: "0".to_string(),
            });
        }
        if self.settlement_retries == 0 || self.id_generation_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "AUCTION_*_RETRIES",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
// endregion: --- Auction Config

// region:    --- Service Config
/// Which outbound notification sink the service wires up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierKind {
    Log,
    Kafka { brokers: String, topic: String },
    Webhook { url: String },
}

/// Process-level settings for the HTTP service binary
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: String,
    pub notifier: NotifierKind,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 5u32)?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let notifier = match env::var("NOTIFIER").unwrap_or_else(|_| "log".to_string()).as_str() {
            "log" => NotifierKind::Log,
            "kafka" => NotifierKind::Kafka {
                brokers: env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
                topic: env::var("NOTIFY_TOPIC")
                    .unwrap_or_else(|_| "auction-notifications".to_string()),
            },
            "webhook" => NotifierKind::Webhook {
                url: env::var("NOTIFY_WEBHOOK_URL")
                    .map_err(|_| ConfigError::Missing("NOTIFY_WEBHOOK_URL"))?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "NOTIFIER",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            notifier,
        })
    }
}
// endregion: --- Service Config

// region:    --- Helpers
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_or(key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_or(key, default.as_millis() as u64).map(Duration::from_millis)
}
// endregion: --- Helpers

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AuctionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_bid_increment, 100);
        assert_eq!(config.anti_snipe_window, Duration::from_secs(10));
        assert_eq!(config.settlement_retries, 3);
    }

    #[test]
    fn test_rejects_inverted_duration_bounds() {
        let config = AuctionConfig {
            min_auction_time: Duration::from_secs(100),
            max_auction_time: Duration::from_secs(10),
            ..AuctionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "AUCTION_MIN_TIME_SECS", .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_increment() {
        let config = AuctionConfig {
            min_bid_increment: 0,
            ..AuctionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

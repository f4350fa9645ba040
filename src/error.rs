// region:    --- Imports
use std::time::Duration;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Error Kind
/// Coarse classification used by callers to decide how to present an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Forbidden,
    NotFound,
    Resource,
    Transient,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Resource => "RESOURCE",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Fatal => "FATAL",
        }
    }
}
// endregion: --- Error Kind

// region:    --- Auction Error
#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("auction duration {requested}s is outside the allowed range [{min}s, {max}s]")]
    InvalidDuration { requested: i64, min: i64, max: i64 },

    #[error("start price must be positive, got {0}")]
    InvalidStartPrice(i64),

    #[error("bid of {amount} is too low, minimum is {minimum}")]
    BidTooLow { amount: i64, minimum: i64 },

    #[error("seller cannot bid on their own auction")]
    SelfBid,

    #[error("auction {0} is not active")]
    AuctionNotActive(i64),

    #[error("bidder is already the highest bidder")]
    AlreadyTopBidder,

    #[error("auction code {0} is already taken")]
    DuplicateAuctionCode(String),

    #[error("auction {0} already has bids and cannot be cancelled")]
    AuctionHasBids(i64),

    #[error("only the seller can cancel auction {0}")]
    NotSeller(i64),

    #[error("auction {0} not found")]
    AuctionNotFound(String),

    #[error("item {0} not found")]
    ItemNotFound(i64),

    #[error("insufficient balance (has {available}, needs {required})")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("insufficient quantity of item {item_id} (has {available}, needs {required})")]
    InsufficientQuantity {
        item_id: i64,
        available: i64,
        required: i64,
    },

    #[error("item {0} is not owned by the seller")]
    ItemNotOwned(i64),

    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("transaction timed out after {0:?}")]
    TransactionTimeout(Duration),

    #[error("failed to generate a unique auction ID after {0} attempts")]
    IDGenerationExhausted(u32),

    #[error("database error: {message}")]
    Store { message: String, transient: bool },

    #[error("{0}")]
    Fatal(String),
}

impl AuctionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuctionError::InvalidDuration { .. }
            | AuctionError::InvalidStartPrice(_)
            | AuctionError::BidTooLow { .. }
            | AuctionError::SelfBid => ErrorKind::Validation,
            AuctionError::AuctionNotActive(_)
            | AuctionError::AlreadyTopBidder
            | AuctionError::DuplicateAuctionCode(_)
            | AuctionError::AuctionHasBids(_) => ErrorKind::Conflict,
            AuctionError::NotSeller(_) => ErrorKind::Forbidden,
            AuctionError::AuctionNotFound(_) | AuctionError::ItemNotFound(_) => {
                ErrorKind::NotFound
            }
            AuctionError::InsufficientBalance { .. }
            | AuctionError::InsufficientQuantity { .. }
            | AuctionError::ItemNotOwned(_)
            | AuctionError::AccountNotFound(_) => ErrorKind::Resource,
            AuctionError::TransactionTimeout(_) => ErrorKind::Transient,
            AuctionError::Store { transient, .. } => {
                if *transient {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Fatal
                }
            }
            AuctionError::IDGenerationExhausted(_) | AuctionError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Stable machine-readable code, one per variant
    pub fn code(&self) -> &'static str {
        match self {
            AuctionError::InvalidDuration { .. } => "INVALID_DURATION",
            AuctionError::InvalidStartPrice(_) => "INVALID_START_PRICE",
            AuctionError::BidTooLow { .. } => "BID_TOO_LOW",
            AuctionError::SelfBid => "SELF_BID",
            AuctionError::AuctionNotActive(_) => "AUCTION_NOT_ACTIVE",
            AuctionError::AlreadyTopBidder => "ALREADY_TOP_BIDDER",
            AuctionError::DuplicateAuctionCode(_) => "DUPLICATE_AUCTION_CODE",
            AuctionError::AuctionHasBids(_) => "AUCTION_HAS_BIDS",
            AuctionError::NotSeller(_) => "NOT_SELLER",
            AuctionError::AuctionNotFound(_) => "AUCTION_NOT_FOUND",
            AuctionError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            AuctionError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AuctionError::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            AuctionError::ItemNotOwned(_) => "ITEM_NOT_OWNED",
            AuctionError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            AuctionError::TransactionTimeout(_) => "TRANSACTION_TIMEOUT",
            AuctionError::IDGenerationExhausted(_) => "ID_GENERATION_EXHAUSTED",
            AuctionError::Store { .. } => "STORE_ERROR",
            AuctionError::Fatal(_) => "FATAL",
        }
    }

    pub fn invalid_duration(requested: Duration, min: Duration, max: Duration) -> Self {
        AuctionError::InvalidDuration {
            requested: requested.as_secs() as i64,
            min: min.as_secs() as i64,
            max: max.as_secs() as i64,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        AuctionError::Store {
            message: message.into(),
            transient: true,
        }
    }
}

// SQLSTATE codes postgres uses for conflicts that succeed on retry
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";

impl From<sqlx::Error> for AuctionError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::Database(db) => matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) | Some(LOCK_NOT_AVAILABLE)
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
            _ => false,
        };
        AuctionError::Store {
            message: err.to_string(),
            transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuctionError>;
// endregion: --- Auction Error

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AuctionError::SelfBid.kind(), ErrorKind::Validation);
        assert_eq!(AuctionError::AlreadyTopBidder.kind(), ErrorKind::Conflict);
        assert_eq!(AuctionError::ItemNotOwned(1).kind(), ErrorKind::Resource);
        assert_eq!(
            AuctionError::IDGenerationExhausted(5).kind(),
            ErrorKind::Fatal
        );
        assert!(AuctionError::transient("lock timeout").is_transient());
        assert!(AuctionError::TransactionTimeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: AuctionError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_transient());

        let err: AuctionError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}

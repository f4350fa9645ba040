/// Transaction boundary and the economic primitives every mutation goes through
pub mod coordinator;
pub mod retry;

pub use coordinator::{TransactionCoordinator, TxFuture};
pub use retry::RetryPolicy;

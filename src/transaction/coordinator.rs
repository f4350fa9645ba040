/// Transaction coordinator
/// Opens bounded transactions on the store and provides the item/currency primitives.
/// Inventory and balance rows are only ever changed through the associated functions below.
// region:    --- Imports
use super::retry::RetryPolicy;
use crate::error::{AuctionError, Result};
use crate::store::{AuctionStore, IsolationLevel, StoreTx};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

// endregion: --- Imports

/// Future returned by a transaction body, borrowing the open transaction
pub type TxFuture<'c, R> = Pin<Box<dyn Future<Output = Result<R>> + Send + 'c>>;

// region:    --- Transaction Coordinator
#[derive(Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn AuctionStore>,
    timeout: Duration,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn AuctionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn AuctionStore> {
        &self.store
    }

    /// Runs `f` in one transaction, commits on `Ok`, rolls back on error or timeout
    pub async fn with_transaction<R, F>(&self, isolation: IsolationLevel, f: F) -> Result<R>
    where
        R: Send,
        F: for<'c> FnOnce(&'c mut dyn StoreTx) -> TxFuture<'c, R> + Send,
    {
        let mut tx = self.store.begin(isolation).await?;
        let outcome = time::timeout(self.timeout, f(&mut *tx)).await;
        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("{:<12} --> rollback failed: {}", "Transaction", rollback_err);
                }
                debug!("{:<12} --> rolled back: {}", "Transaction", e);
                Err(e)
            }
            Err(_) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("{:<12} --> rollback failed: {}", "Transaction", rollback_err);
                }
                warn!(
                    "{:<12} --> timed out after {:?}, rolled back",
                    "Transaction", self.timeout
                );
                Err(AuctionError::TransactionTimeout(self.timeout))
            }
        }
    }

    /// Re-runs the whole transaction while it fails with a transient error
    pub async fn with_retrying_transaction<R, F>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        isolation: IsolationLevel,
        f: F,
    ) -> Result<R>
    where
        R: Send,
        F: for<'c> Fn(&'c mut dyn StoreTx) -> TxFuture<'c, R> + Send + Sync,
    {
        policy
            .run(label, |_| self.with_transaction(isolation, &f))
            .await
    }

    // region:    --- Primitives
    /// Increments the owner's row or inserts a new one
    pub async fn add_item_to_inventory(
        tx: &mut dyn StoreTx,
        owner_id: &str,
        item_id: i64,
        amount: i64,
    ) -> Result<()> {
        tx.upsert_inventory(owner_id, item_id, amount).await
    }

    /// Removes `amount` units, deleting the row once it reaches zero
    pub async fn remove_item_from_inventory(
        tx: &mut dyn StoreTx,
        owner_id: &str,
        item_id: i64,
        amount: i64,
    ) -> Result<()> {
        let owned = tx.lock_inventory(owner_id, item_id).await?.unwrap_or(0);
        let insufficient = AuctionError::InsufficientQuantity {
            item_id,
            available: owned,
            required: amount,
        };
        if owned < amount {
            return Err(insufficient);
        }
        let changed = if owned == amount {
            tx.delete_inventory(owner_id, item_id).await?
        } else {
            tx.decrement_inventory(owner_id, item_id, amount).await?
        };
        if !changed {
            return Err(insufficient);
        }
        Ok(())
    }

    /// Locks the balance row, then applies `delta`. Returns the new balance.
    pub async fn validate_and_update_balance(
        tx: &mut dyn StoreTx,
        owner_id: &str,
        delta: i64,
    ) -> Result<i64> {
        let balance = tx
            .lock_balance(owner_id)
            .await?
            .ok_or_else(|| AuctionError::AccountNotFound(owner_id.to_string()))?;
        let insufficient = AuctionError::InsufficientBalance {
            available: balance,
            required: -delta,
        };
        if balance + delta < 0 {
            return Err(insufficient);
        }
        if !tx.adjust_balance(owner_id, delta).await? {
            return Err(insufficient);
        }
        Ok(balance + delta)
    }

    pub async fn transfer_item(
        tx: &mut dyn StoreTx,
        from_id: &str,
        to_id: &str,
        item_id: i64,
        amount: i64,
    ) -> Result<()> {
        Self::remove_item_from_inventory(tx, from_id, item_id, amount).await?;
        Self::add_item_to_inventory(tx, to_id, item_id, amount).await
    }

    pub async fn transfer_balance(
        tx: &mut dyn StoreTx,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<()> {
        if amount <= 0 {
            return Err(AuctionError::Fatal(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        Self::validate_and_update_balance(tx, from_id, -amount).await?;
        Self::validate_and_update_balance(tx, to_id, amount).await?;
        Ok(())
    }
    // endregion: --- Primitives
}
// endregion: --- Transaction Coordinator

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn coordinator(store: &InMemoryStore) -> TransactionCoordinator {
        TransactionCoordinator::new(Arc::new(store.clone()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_error_rolls_back_every_change() {
        let store = InMemoryStore::new();
        store.set_balance("alice", 500).await;
        store.set_inventory("alice", 1, 2).await;
        let coordinator = coordinator(&store);

        let result: Result<()> = coordinator
            .with_transaction(IsolationLevel::ReadCommitted, |tx| {
                Box::pin(async move {
                    TransactionCoordinator::remove_item_from_inventory(tx, "alice", 1, 1).await?;
                    TransactionCoordinator::validate_and_update_balance(tx, "alice", -900).await?;
                    Ok::<_, AuctionError>(())
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(AuctionError::InsufficientBalance {
                available: 500,
                required: 900
            })
        ));
        assert_eq!(store.inventory_amount("alice", 1).await.unwrap(), 2);
        assert_eq!(store.balance("alice").await.unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_remove_deletes_row_at_zero() {
        let store = InMemoryStore::new();
        store.set_inventory("alice", 1, 1).await;
        let coordinator = coordinator(&store);

        coordinator
            .with_transaction(IsolationLevel::ReadCommitted, |tx| {
                Box::pin(TransactionCoordinator::remove_item_from_inventory(
                    tx, "alice", 1, 1,
                ))
            })
            .await
            .unwrap();

        assert!(!store.has_inventory_row("alice", 1).await);
    }

    #[tokio::test]
    async fn test_remove_more_than_owned_fails() {
        let store = InMemoryStore::new();
        store.set_inventory("alice", 1, 1).await;
        let coordinator = coordinator(&store);

        let result = coordinator
            .with_transaction(IsolationLevel::ReadCommitted, |tx| {
                Box::pin(TransactionCoordinator::remove_item_from_inventory(
                    tx, "alice", 1, 3,
                ))
            })
            .await;

        assert!(matches!(
            result,
            Err(AuctionError::InsufficientQuantity {
                item_id: 1,
                available: 1,
                required: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_transfers_conserve_totals() {
        let store = InMemoryStore::new();
        store.set_balance("alice", 300).await;
        store.set_balance("bob", 100).await;
        store.set_inventory("alice", 9, 2).await;
        let coordinator = coordinator(&store);

        coordinator
            .with_transaction(IsolationLevel::Serializable, |tx| {
                Box::pin(async move {
                    TransactionCoordinator::transfer_balance(tx, "alice", "bob", 250).await?;
                    TransactionCoordinator::transfer_item(tx, "alice", "bob", 9, 1).await
                })
            })
            .await
            .unwrap();

        assert_eq!(store.balance("alice").await.unwrap(), Some(50));
        assert_eq!(store.balance("bob").await.unwrap(), Some(350));
        assert_eq!(store.total_balance().await, 400);
        assert_eq!(store.inventory_amount("alice", 9).await.unwrap(), 1);
        assert_eq!(store.inventory_amount("bob", 9).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_is_reported() {
        let store = InMemoryStore::new();
        let coordinator = coordinator(&store);

        let result = coordinator
            .with_transaction(IsolationLevel::ReadCommitted, |tx| {
                Box::pin(TransactionCoordinator::validate_and_update_balance(
                    tx, "ghost", 10,
                ))
            })
            .await;

        assert!(matches!(result, Err(AuctionError::AccountNotFound(id)) if id == "ghost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_transaction_survives_commit_conflicts() {
        let store = InMemoryStore::new();
        store.set_balance("alice", 100).await;
        store.fail_next_commits(2);
        let coordinator = coordinator(&store);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let balance = coordinator
            .with_retrying_transaction(&policy, "credit", IsolationLevel::Serializable, |tx| {
                Box::pin(TransactionCoordinator::validate_and_update_balance(
                    tx, "alice", 25,
                ))
            })
            .await
            .unwrap();

        assert_eq!(balance, 125);
        assert_eq!(store.balance("alice").await.unwrap(), Some(125));
    }
}

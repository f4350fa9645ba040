use crate::auction::model::Auction;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory map of open auctions, advisory only (the store is the system of record).
/// Its lock is never held across a store call.
#[derive(Debug, Default)]
pub struct ActiveIndex {
    auctions: RwLock<HashMap<i64, Auction>>,
}

impl ActiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes an entry
    pub async fn insert(&self, auction: Auction) {
        self.auctions.write().await.insert(auction.id, auction);
    }

    pub async fn remove(&self, auction_id: i64) -> Option<Auction> {
        self.auctions.write().await.remove(&auction_id)
    }

    pub async fn get(&self, auction_id: i64) -> Option<Auction> {
        self.auctions.read().await.get(&auction_id).cloned()
    }

    pub async fn contains(&self, auction_id: i64) -> bool {
        self.auctions.read().await.contains_key(&auction_id)
    }

    pub async fn len(&self) -> usize {
        self.auctions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.auctions.read().await.is_empty()
    }

    /// Drops every entry and loads `auctions` instead
    pub async fn replace_all(&self, auctions: Vec<Auction>) {
        let mut index = self.auctions.write().await;
        index.clear();
        index.extend(auctions.into_iter().map(|a| (a.id, a)));
    }
}

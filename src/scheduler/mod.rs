/// Auction expiry scheduler
/// Two producers of "auction expired": one timer per open auction and a periodic sweep.
/// Both end in `LifecycleManager::complete_if_due`, which settles each auction at most once
/// and re-checks the end time under the row lock. An auction that turns out not to be due
/// gets its timer re-armed.
// region:    --- Imports
use crate::auction::lifecycle::{Completion, LifecycleManager};
use crate::error::Result;
use crate::store::AuctionStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

/// What a recovery pass found
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub armed: usize,
    pub completed: usize,
    /// Settled or cancelled by another actor before recovery reached them
    pub already_settled: usize,
    pub failed: usize,
}

// region:    --- Auction Scheduler
pub struct AuctionScheduler {
    lifecycle: Arc<LifecycleManager>,
    sweep_interval: Duration,
    sweep_batch_size: i64,
    // auction id -> (generation, timer task)
    timers: Mutex<HashMap<i64, (u64, AbortHandle)>>,
    generation: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AuctionScheduler {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        sweep_interval: Duration,
        sweep_batch_size: i64,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            lifecycle,
            sweep_interval,
            sweep_batch_size,
            timers: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            shutdown_tx,
            sweep_handle: Mutex::new(None),
        }
    }

    fn store(&self) -> &Arc<dyn AuctionStore> {
        self.lifecycle.store()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<i64, (u64, AbortHandle)>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // region:    --- Timers
    /// Arms (or re-arms) the completion timer of an auction
    pub fn schedule(self: &Arc<Self>, auction_id: i64, end_time: DateTime<Utc>) {
        let delay = (end_time - Utc::now()).to_std().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut timers = self.timers();
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            scheduler.fire(auction_id, generation).await;
        });
        if let Some((_, previous)) = timers.insert(auction_id, (generation, task.abort_handle())) {
            previous.abort();
        }
        debug!(
            "{:<12} --> timer armed for auction {} in {:?}",
            "Scheduler", auction_id, delay
        );
    }

    /// Disarms the timer without firing it
    pub fn cancel(&self, auction_id: i64) -> bool {
        match self.timers().remove(&auction_id) {
            Some((_, timer)) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers().len()
    }

    pub fn is_scheduled(&self, auction_id: i64) -> bool {
        self.timers().contains_key(&auction_id)
    }

    async fn fire(self: &Arc<Self>, auction_id: i64, generation: u64) {
        {
            let mut timers = self.timers();
            match timers.get(&auction_id) {
                Some((current, _)) if *current == generation => {
                    timers.remove(&auction_id);
                }
                _ => return,
            }
        }

        match self.settle_expired(auction_id).await {
            Some(Completion::Settled(auction)) => info!(
                "{:<12} --> timer settled auction {}",
                "Scheduler", auction.code
            ),
            Some(Completion::AlreadyFinished) => debug!(
                "{:<12} --> timer found auction {} already settled",
                "Scheduler", auction_id
            ),
            Some(Completion::NotDue(_)) | None => {}
        }
    }
    // endregion: --- Timers

    // region:    --- Sweep
    /// Starts the periodic sweep until `shutdown`
    pub fn start(self: &Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(scheduler.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately, recovery already covered it
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.sweep().await {
                            error!("{:<12} --> sweep failed: {}", "Scheduler", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("{:<12} --> sweep stopped", "Scheduler");
        });

        let mut sweep_handle = self
            .sweep_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = sweep_handle.replace(handle) {
            previous.abort();
        }
        info!(
            "{:<12} --> sweep started (every {:?})",
            "Scheduler", self.sweep_interval
        );
    }

    /// Settles every expired Active auction in batches, then purges empty inventory rows.
    /// Returns how many auctions this pass settled.
    pub async fn sweep(self: &Arc<Self>) -> Result<usize> {
        let mut settled = 0;
        loop {
            let expired = self
                .store()
                .expired_auctions(Utc::now(), self.sweep_batch_size)
                .await?;
            let batch_len = expired.len();
            let mut settled_in_batch = 0;
            for auction in expired {
                if let Some(Completion::Settled(_)) = self.settle_expired(auction.id).await {
                    settled_in_batch += 1;
                }
            }
            settled += settled_in_batch;
            if (batch_len as i64) < self.sweep_batch_size || settled_in_batch == 0 {
                break;
            }
        }

        match self.store().cleanup_zero_inventory().await {
            Ok(0) => {}
            Ok(purged) => debug!(
                "{:<12} --> purged {} empty inventory rows",
                "Scheduler", purged
            ),
            Err(e) => warn!("{:<12} --> inventory cleanup failed: {}", "Scheduler", e),
        }

        if settled > 0 {
            info!("{:<12} --> sweep settled {} auctions", "Scheduler", settled);
        }
        Ok(settled)
    }

    /// Settles the auction if it is due, re-arming its timer when a bid extended it.
    /// `None` means settlement failed, the error is logged.
    async fn settle_expired(self: &Arc<Self>, auction_id: i64) -> Option<Completion> {
        self.cancel(auction_id);
        match self.lifecycle.complete_if_due(auction_id).await {
            Ok(Completion::NotDue(auction)) => {
                self.schedule(auction_id, auction.end_time);
                Some(Completion::NotDue(auction))
            }
            Ok(completion) => Some(completion),
            Err(e) => {
                error!(
                    "{:<12} --> failed to settle expired auction {}: {}",
                    "Scheduler", auction_id, e
                );
                None
            }
        }
    }
    // endregion: --- Sweep

    // region:    --- Recovery
    /// Reloads Active auctions after a restart: expired ones are settled right away,
    /// the rest get a timer for their remaining time
    pub async fn recover_active_auctions(self: &Arc<Self>) -> Result<RecoveryReport> {
        let active = self.store().active_auctions().await?;
        self.lifecycle.index().replace_all(active.clone()).await;

        let now = Utc::now();
        let mut report = RecoveryReport::default();
        for auction in active {
            if auction.is_expired_at(now) {
                match self.settle_expired(auction.id).await {
                    Some(Completion::Settled(_)) => report.completed += 1,
                    Some(Completion::AlreadyFinished) => report.already_settled += 1,
                    Some(Completion::NotDue(_)) => report.armed += 1,
                    None => report.failed += 1,
                }
            } else {
                self.schedule(auction.id, auction.end_time);
                report.armed += 1;
            }
        }

        info!(
            "{:<12} --> recovery: {} timers armed, {} settled, {} already settled, {} failed",
            "Scheduler", report.armed, report.completed, report.already_settled, report.failed
        );
        Ok(report)
    }
    // endregion: --- Recovery

    /// Stops the sweep and drops pending timers without firing them
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let sweep = self
            .sweep_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = sweep {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("{:<12} --> sweep task ended abnormally: {}", "Scheduler", e);
                }
            }
        }

        let timers: Vec<(i64, (u64, AbortHandle))> = self.timers().drain().collect();
        for (_, (_, timer)) in &timers {
            timer.abort();
        }
        info!(
            "{:<12} --> shut down, {} pending timers cancelled",
            "Scheduler",
            timers.len()
        );
    }
}
// endregion: --- Auction Scheduler

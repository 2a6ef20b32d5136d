//! Per-episode mutual exclusion.
//!
//! Reconciling one episode is a read-render-write sequence; two concurrent
//! runs for the same episode could both see "no card" and render twice.
//! Different episodes never contend.

use std::collections::HashMap;
use std::sync::Arc;

use cardsync_core::types::DbId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct EpisodeLocks {
    locks: Mutex<HashMap<DbId, Arc<Mutex<()>>>>,
}

impl EpisodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `episode_id`. Held until the guard drops.
    pub async fn acquire(&self, episode_id: DbId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(episode_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop entries no task is holding or waiting on.
    pub async fn prune(&self) {
        self.locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

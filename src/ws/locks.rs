use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Exclusive hold on a drag item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    pub holder: i64,
    pub acquired_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGrant {
    /// The item was free.
    Acquired,
    /// The caller already held it; the timestamp moved forward.
    Refreshed,
    /// Another user's lock had outlived the TTL and was taken over.
    Reclaimed { previous: i64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("drag item is already locked by user {holder}")]
    HeldByOther { holder: i64 },
}

/// Soft locks on drag items, keyed by item id.
///
/// A lock older than the TTL counts as free even before the sweeper removes it.
/// Each operation runs under the DashMap entry lock for its key, so two users can
/// never both see an item as free.
pub struct LockTable {
    locks: DashMap<i64, Lock>,
    ttl: Duration,
}

impl LockTable {
    pub fn new(ttl: Duration) -> Self {
        Self { locks: DashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, lock: &Lock, now: Instant) -> bool {
        now.saturating_duration_since(lock.acquired_at) > self.ttl
    }

    pub fn acquire(&self, item_id: i64, user_id: i64) -> Result<LockGrant, LockError> {
        self.acquire_at(item_id, user_id, Instant::now())
    }

    pub fn acquire_at(&self, item_id: i64, user_id: i64, now: Instant) -> Result<LockGrant, LockError> {
        let fresh = Lock { holder: user_id, acquired_at: now };
        match self.locks.entry(item_id) {
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(LockGrant::Acquired)
            }
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                if current.holder == user_id {
                    slot.insert(fresh);
                    Ok(LockGrant::Refreshed)
                } else if self.is_expired(&current, now) {
                    slot.insert(fresh);
                    Ok(LockGrant::Reclaimed { previous: current.holder })
                } else {
                    Err(LockError::HeldByOther { holder: current.holder })
                }
            }
        }
    }

    /// Moves the timestamp of a lock the user still validly holds. An expired lock is dropped instead.
    pub fn refresh(&self, item_id: i64, user_id: i64) -> bool {
        self.refresh_at(item_id, user_id, Instant::now())
    }

    pub fn refresh_at(&self, item_id: i64, user_id: i64, now: Instant) -> bool {
        match self.locks.entry(item_id) {
            Entry::Occupied(mut slot) if slot.get().holder == user_id => {
                if self.is_expired(slot.get(), now) {
                    slot.remove();
                    false
                } else {
                    slot.get_mut().acquired_at = now;
                    true
                }
            }
            _ => false,
        }
    }

    /// Drops the lock if `user_id` holds it. Releasing someone else's lock, or a missing one, is a no-op.
    pub fn release(&self, item_id: i64, user_id: i64) -> bool {
        self.locks
            .remove_if(&item_id, |_, lock| lock.holder == user_id)
            .is_some()
    }

    /// Drops every lock held by the user; returns how many were released.
    pub fn release_all_held_by(&self, user_id: i64) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| lock.holder != user_id);
        before.saturating_sub(self.locks.len())
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.locks.retain(|_, lock| {
            let keep = !self.is_expired(lock, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// The user currently holding the item, ignoring locks past their TTL.
    #[cfg(test)]
    pub fn holder_at(&self, item_id: i64, now: Instant) -> Option<i64> {
        self.locks
            .get(&item_id)
            .filter(|lock| !self.is_expired(lock, now))
            .map(|lock| lock.holder)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Starts the process-wide sweeper that reclaims expired locks on a fixed period.
pub fn spawn_lock_sweeper(locks: Arc<LockTable>, every: Duration) -> JoinHandle<()> {
    info!("Lock sweeper started (ttl {:?}, every {:?})", locks.ttl(), every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = locks.sweep_expired();
            if removed > 0 {
                debug!("Lock sweeper reclaimed {} expired lock(s)", removed);
            }
        }
    })
}

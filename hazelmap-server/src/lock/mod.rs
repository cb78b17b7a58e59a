//! Per-key reentrant locks with FIFO hand-off.
//!
//! A lock is owned by a [`LockOwner`] (a client endpoint plus the thread id
//! the client reported). The owner may acquire the same key repeatedly; each
//! acquisition needs a matching `unlock`. When the hold count drops to zero
//! the lock passes directly to the longest-waiting caller.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hazelmap_core::{Data, HazelmapError, Result};
use tokio::sync::{oneshot, Notify};

use crate::listener::EndpointId;

/// Identity of a lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockOwner {
    /// Connection the request came from.
    pub endpoint: EndpointId,
    /// Thread id reported by the client.
    pub thread_id: i64,
}

impl LockOwner {
    /// Creates a lock owner.
    pub fn new(endpoint: EndpointId, thread_id: i64) -> Self {
        Self {
            endpoint,
            thread_id,
        }
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/thread-{}", self.endpoint, self.thread_id)
    }
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    owner: LockOwner,
    grant: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct LockState {
    owner: Option<LockOwner>,
    hold_count: u32,
    waiters: VecDeque<Waiter>,
}

impl LockState {
    /// Passes a free lock to the first waiter still listening.
    fn hand_off(&mut self) {
        debug_assert_eq!(self.hold_count, 0);
        self.owner = None;
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.grant.send(()).is_ok() {
                self.owner = Some(waiter.owner);
                self.hold_count = 1;
                return;
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.owner.is_none() && self.waiters.is_empty()
    }

    fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

/// The key locks of one map.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<Data, LockState>>,
    next_waiter_id: AtomicU64,
    released: Notify,
}

impl LockTable {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<Data, LockState>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Notified every time a lock is released, handed off or forced open.
    ///
    /// Callers waiting for a key to become writable create a `notified()`
    /// future before checking [`is_locked_by_other`](Self::is_locked_by_other).
    pub fn released(&self) -> &Notify {
        &self.released
    }

    /// Acquires the lock, waiting as long as needed.
    ///
    /// Fails with `Cancelled` only if the waiter is dropped from the queue
    /// because its endpoint disconnected.
    pub async fn lock(&self, key: &Data, owner: LockOwner) -> Result<()> {
        if self.acquire(key, owner, None).await? {
            Ok(())
        } else {
            Err(HazelmapError::Cancelled(format!("lock wait of {owner} was cancelled")))
        }
    }

    /// Acquires the lock only if it is free or already held by `owner`.
    pub fn try_lock(&self, key: &Data, owner: LockOwner) -> bool {
        let mut locks = self.locks();
        let state = locks.entry(key.clone()).or_default();
        match state.owner {
            None => {
                state.owner = Some(owner);
                state.hold_count = 1;
                true
            }
            Some(current) if current == owner => {
                state.hold_count += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Acquires the lock, waiting at most `timeout`.
    ///
    /// A zero timeout never suspends. Returns `false` if the lock could not
    /// be acquired in time; a timed-out waiter leaves no trace in the queue.
    pub async fn try_lock_timeout(&self, key: &Data, owner: LockOwner, timeout: Duration) -> Result<bool> {
        if timeout.is_zero() {
            return Ok(self.try_lock(key, owner));
        }
        self.acquire(key, owner, Some(timeout)).await
    }

    async fn acquire(&self, key: &Data, owner: LockOwner, timeout: Option<Duration>) -> Result<bool> {
        if self.try_lock(key, owner) {
            return Ok(true);
        }

        let mut wait = {
            let mut locks = self.locks();
            // Re-check under the same guard that enqueues, so a release in
            // between cannot be missed.
            let state = locks.entry(key.clone()).or_default();
            if state.owner.is_none() {
                state.owner = Some(owner);
                state.hold_count = 1;
                return Ok(true);
            }
            let (tx, rx) = oneshot::channel();
            let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
            state.waiters.push_back(Waiter {
                id,
                owner,
                grant: tx,
            });
            tracing::trace!(owner = %owner, waiter = id, queued = state.waiters.len(), "waiting for key lock");
            PendingGrant {
                table: self,
                key: key.clone(),
                id,
                owner,
                grant: rx,
                settled: false,
            }
        };

        let received = match timeout {
            None => Some((&mut wait.grant).await),
            Some(timeout) => tokio::time::timeout(timeout, &mut wait.grant).await.ok(),
        };

        match received {
            Some(Ok(())) => {
                wait.settled = true;
                Ok(true)
            }
            // Sender dropped: the waiter was purged by release_all.
            Some(Err(_)) => {
                wait.settled = true;
                Ok(false)
            }
            None => Ok(wait.settle_timeout()),
        }
    }

    /// Releases one hold of the lock.
    ///
    /// Fails with `IllegalState` if the key is not locked or is locked by
    /// another owner.
    pub fn unlock(&self, key: &Data, owner: LockOwner) -> Result<()> {
        let mut locks = self.locks();
        let state = locks
            .get_mut(key)
            .filter(|state| state.owner.is_some())
            .ok_or_else(|| {
                HazelmapError::IllegalState(format!("{owner} cannot unlock a key that is not locked"))
            })?;
        match state.owner {
            Some(current) if current != owner => {
                return Err(HazelmapError::IllegalState(format!(
                    "{owner} cannot unlock a key locked by {current}"
                )));
            }
            _ => {}
        }

        state.hold_count -= 1;
        if state.hold_count == 0 {
            state.hand_off();
            if state.is_idle() {
                locks.remove(key);
            }
            drop(locks);
            self.released.notify_waiters();
        }
        Ok(())
    }

    /// Releases the lock regardless of owner and hold count.
    ///
    /// Returns `false` if the key was not locked.
    pub fn force_unlock(&self, key: &Data) -> bool {
        let mut locks = self.locks();
        let Some(state) = locks.get_mut(key).filter(|state| state.owner.is_some()) else {
            return false;
        };
        tracing::debug!(owner = ?state.owner, "forcing key unlock");
        state.hold_count = 0;
        state.hand_off();
        if state.is_idle() {
            locks.remove(key);
        }
        drop(locks);
        self.released.notify_waiters();
        true
    }

    /// Returns `true` if the key is locked.
    pub fn is_locked(&self, key: &Data) -> bool {
        self.lock_owner(key).is_some()
    }

    /// Returns the current owner of the key lock.
    pub fn lock_owner(&self, key: &Data) -> Option<LockOwner> {
        self.locks().get(key).and_then(|state| state.owner)
    }

    /// Returns the hold count of the key lock, 0 when unlocked.
    pub fn hold_count(&self, key: &Data) -> u32 {
        self.locks().get(key).map_or(0, |state| state.hold_count)
    }

    /// Returns `true` if the key is locked by someone other than `caller`.
    pub fn is_locked_by_other(&self, key: &Data, caller: LockOwner) -> bool {
        self.lock_owner(key).is_some_and(|owner| owner != caller)
    }

    /// Returns the number of locked keys.
    pub fn locked_count(&self) -> usize {
        self.locks().values().filter(|s| s.owner.is_some()).count()
    }

    /// Releases every lock held by an endpoint and drops its queued waiters.
    ///
    /// Returns the number of keys released.
    pub fn release_all(&self, endpoint: EndpointId) -> usize {
        let mut released = 0;
        let mut locks = self.locks();
        locks.retain(|_, state| {
            state.waiters.retain(|w| w.owner.endpoint != endpoint);
            if state.owner.is_some_and(|o| o.endpoint == endpoint) {
                state.hold_count = 0;
                state.hand_off();
                released += 1;
            }
            !state.is_idle()
        });
        drop(locks);

        if released > 0 {
            tracing::debug!(endpoint = %endpoint, released, "released locks of endpoint");
            self.released.notify_waiters();
        }
        released
    }
}

/// A queued lock request.
///
/// Dropping it before it settles removes the waiter from the queue, or
/// passes the lock on if it had already been granted.
struct PendingGrant<'a> {
    table: &'a LockTable,
    key: Data,
    id: u64,
    owner: LockOwner,
    grant: oneshot::Receiver<()>,
    settled: bool,
}

impl PendingGrant<'_> {
    /// Resolves a timed-out wait. Returns `true` if the grant won the race.
    fn settle_timeout(&mut self) -> bool {
        self.settled = true;
        let mut locks = self.table.locks();
        if let Some(state) = locks.get_mut(&self.key) {
            if state.remove_waiter(self.id) {
                if state.is_idle() {
                    locks.remove(&self.key);
                }
                return false;
            }
        }
        // Not queued any more: the grant was sent under the table lock.
        self.grant.try_recv().is_ok()
    }
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut locks = self.table.locks();
        let Some(state) = locks.get_mut(&self.key) else {
            return;
        };
        if state.remove_waiter(self.id) {
            if state.is_idle() {
                locks.remove(&self.key);
            }
            return;
        }
        if self.grant.try_recv().is_ok() && state.owner == Some(self.owner) {
            tracing::trace!(owner = %self.owner, "passing on lock granted to a cancelled waiter");
            state.hold_count = 0;
            state.hand_off();
            if state.is_idle() {
                locks.remove(&self.key);
            }
            drop(locks);
            self.table.released.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn owner(thread_id: i64) -> LockOwner {
        LockOwner::new(EndpointId::from_uuid(uuid::Uuid::nil()), thread_id)
    }

    fn key() -> Data {
        Data::from("k")
    }

    #[test]
    fn test_reentrant_lock_and_extra_unlock() {
        let table = LockTable::new();
        let a = owner(1);
        assert!(table.try_lock(&key(), a));
        assert!(table.try_lock(&key(), a));
        assert_eq!(table.hold_count(&key()), 2);

        table.unlock(&key(), a).unwrap();
        assert!(table.is_locked(&key()));
        table.unlock(&key(), a).unwrap();
        assert!(!table.is_locked(&key()));

        let err = table.unlock(&key(), a).unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_unlock_by_non_owner_fails() {
        let table = LockTable::new();
        assert!(table.try_lock(&key(), owner(1)));
        assert!(table.unlock(&key(), owner(2)).unwrap_err().is_illegal_state());
        assert!(table.is_locked_by_other(&key(), owner(2)));
        assert!(!table.is_locked_by_other(&key(), owner(1)));
    }

    #[test]
    fn test_try_lock_contended() {
        let table = LockTable::new();
        assert!(table.try_lock(&key(), owner(1)));
        assert!(!table.try_lock(&key(), owner(2)));
        assert!(table.try_lock(&Data::from("other"), owner(2)));
    }

    #[test]
    fn test_force_unlock() {
        let table = LockTable::new();
        assert!(!table.force_unlock(&key()));
        table.try_lock(&key(), owner(1));
        table.try_lock(&key(), owner(1));
        assert!(table.force_unlock(&key()));
        assert!(!table.is_locked(&key()));
        assert_eq!(table.locked_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_timeout_never_waits() {
        let table = LockTable::new();
        table.try_lock(&key(), owner(1));
        let acquired = table
            .try_lock_timeout(&key(), owner(2), Duration::ZERO)
            .await
            .unwrap();
        assert!(!acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_waiter_leaves_no_trace() {
        let table = LockTable::new();
        table.try_lock(&key(), owner(1));
        let acquired = table
            .try_lock_timeout(&key(), owner(2), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(!acquired);

        table.unlock(&key(), owner(1)).unwrap();
        assert!(!table.is_locked(&key()));
    }

    #[tokio::test]
    async fn test_fifo_hand_off() {
        let table = Arc::new(LockTable::new());
        table.try_lock(&key(), owner(1));

        let t = table.clone();
        let second = tokio::spawn(async move { t.lock(&key(), owner(2)).await });
        tokio::task::yield_now().await;
        while table.locks().get(&key()).map_or(0, |s| s.waiters.len()) < 1 {
            tokio::task::yield_now().await;
        }
        let t = table.clone();
        let third = tokio::spawn(async move { t.lock(&key(), owner(3)).await });
        while table.locks().get(&key()).map_or(0, |s| s.waiters.len()) < 2 {
            tokio::task::yield_now().await;
        }

        table.unlock(&key(), owner(1)).unwrap();
        assert_eq!(table.lock_owner(&key()), Some(owner(2)));
        second.await.unwrap().unwrap();

        table.unlock(&key(), owner(2)).unwrap();
        assert_eq!(table.lock_owner(&key()), Some(owner(3)));
        third.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_waiter_is_skipped() {
        let table = Arc::new(LockTable::new());
        table.try_lock(&key(), owner(1));

        let t = table.clone();
        let waiter = tokio::spawn(async move { t.lock(&key(), owner(2)).await });
        while table.locks().get(&key()).map_or(0, |s| s.waiters.len()) < 1 {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        let _ = waiter.await;

        table.unlock(&key(), owner(1)).unwrap();
        assert!(!table.is_locked(&key()));
    }

    #[tokio::test]
    async fn test_release_all_for_endpoint() {
        let table = Arc::new(LockTable::new());
        let gone = EndpointId::new();
        let stays = EndpointId::new();
        table.try_lock(&Data::from("a"), LockOwner::new(gone, 1));
        table.try_lock(&Data::from("b"), LockOwner::new(gone, 1));
        table.try_lock(&Data::from("c"), LockOwner::new(stays, 1));

        let t = table.clone();
        let next = LockOwner::new(stays, 2);
        let waiter = tokio::spawn(async move { t.lock(&Data::from("a"), next).await });
        while table.locks().get(&Data::from("a")).map_or(0, |s| s.waiters.len()) < 1 {
            tokio::task::yield_now().await;
        }

        assert_eq!(table.release_all(gone), 2);
        waiter.await.unwrap().unwrap();
        assert_eq!(table.lock_owner(&Data::from("a")), Some(next));
        assert!(!table.is_locked(&Data::from("b")));
        assert!(table.is_locked(&Data::from("c")));
    }
}

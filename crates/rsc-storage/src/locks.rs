use rsc_types::{EscrowId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Row identity for exclusive locking.
///
/// The derived ordering is the global acquisition order: all keys taken
/// together are acquired sorted, so two callers never wait on each other
/// in opposite directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    User(UserId),
    Escrow(EscrowId),
}

/// Held row locks; dropping the guard releases every row.
pub struct RowGuard {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl RowGuard {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }

    pub fn holds(&self, key: LockKey) -> bool {
        self.keys.contains(&key)
    }
}

/// Per-row exclusive locks, the in-process equivalent of `SELECT ... FOR UPDATE`.
///
/// Locks are not re-entrant. Components lock at their public entry points
/// and stage writes through internal helpers that assume the lock is held.
#[derive(Default)]
pub struct RowLocks {
    slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: LockKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, key: LockKey) -> RowGuard {
        self.acquire_many([key]).await
    }

    pub async fn acquire_many(&self, keys: impl IntoIterator<Item = LockKey>) -> RowGuard {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(*key).lock_owned().await);
        }
        trace!(rows = ?keys, "🔒 Row locks acquired");

        RowGuard {
            keys,
            _guards: guards,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_blocks_second_holder() {
        let locks = Arc::new(RowLocks::new());
        let guard = locks.acquire(LockKey::User(UserId(1))).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(LockKey::User(UserId(1))).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_acquire_many_sorts_and_dedups() {
        let locks = RowLocks::new();
        let guard = locks
            .acquire_many([
                LockKey::Escrow(EscrowId(2)),
                LockKey::User(UserId(9)),
                LockKey::User(UserId(3)),
                LockKey::User(UserId(9)),
            ])
            .await;

        assert_eq!(
            guard.keys(),
            &[
                LockKey::User(UserId(3)),
                LockKey::User(UserId(9)),
                LockKey::Escrow(EscrowId(2)),
            ]
        );
        assert!(guard.holds(LockKey::Escrow(EscrowId(2))));
    }

    #[tokio::test]
    async fn test_opposite_order_requests_do_not_deadlock() {
        let locks = Arc::new(RowLocks::new());
        let mut handles = Vec::new();
        for i in 0..20u64 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 {
                    [LockKey::User(UserId(1)), LockKey::User(UserId(2))]
                } else {
                    [LockKey::User(UserId(2)), LockKey::User(UserId(1))]
                };
                let _g = locks.acquire_many(keys).await;
                tokio::task::yield_now().await;
            }));
        }
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}

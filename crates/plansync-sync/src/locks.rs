//! Per-entity mutual exclusion.
//!
//! Each slot also remembers the last push that succeeded while the slot was
//! alive, so a push that waited behind another one for the same entity can
//! see what that one already did.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// A confirmed push: the remote id it produced and the fingerprint of the
/// payload it sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPush {
    pub remote_id: String,
    pub fingerprint: String,
}

type Slot = Arc<tokio::sync::Mutex<Option<LastPush>>>;

/// One async mutex per `local_id`, created on first use and dropped once
/// nobody holds or waits on it.
#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl EntityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder has `local_id` locked.
    pub async fn lock(&self, local_id: Uuid) -> EntityGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(local_id).or_default())
        };
        let guard = slot.lock_owned().await;
        EntityGuard {
            locks: self,
            local_id,
            guard: Some(guard),
        }
    }

    /// Number of entities currently locked or waited on.
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held for the duration of one remote call on an entity.
#[derive(Debug)]
pub struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    local_id: Uuid,
    guard: Option<OwnedMutexGuard<Option<LastPush>>>,
}

impl EntityGuard<'_> {
    /// The last push recorded by an earlier holder, if any.
    #[must_use]
    pub fn last_push(&self) -> Option<&LastPush> {
        self.guard.as_deref().and_then(Option::as_ref)
    }

    pub fn set_last_push(&mut self, last_push: LastPush) {
        if let Some(guard) = self.guard.as_mut() {
            **guard = Some(last_push);
        }
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map's own reference is the last one: no holder, no waiter.
        if slots
            .get(&self.local_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.local_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn entries_are_released_after_use() {
        let locks = EntityLocks::new();
        let id = Uuid::new_v4();
        {
            let _guard = locks.lock(id).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn same_entity_is_serialized() {
        let locks = EntityLocks::new();
        let id = Uuid::new_v4();
        let in_flight = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        let work = || async {
            let _guard = locks.lock(id).await;
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        };
        tokio::join!(work(), work(), work());

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn waiter_sees_push_recorded_by_previous_holder() {
        let locks = EntityLocks::new();
        let id = Uuid::new_v4();

        let mut first = locks.lock(id).await;
        assert!(first.last_push().is_none());

        let waiter = async {
            let second = locks.lock(id).await;
            second.last_push().cloned()
        };
        let release = async {
            tokio::task::yield_now().await;
            first.set_last_push(LastPush {
                remote_id: "632910392".to_owned(),
                fingerprint: "abc".to_owned(),
            });
            drop(first);
        };
        let (seen, ()) = tokio::join!(waiter, release);

        assert_eq!(seen.map(|p| p.remote_id), Some("632910392".to_owned()));
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn memory_is_dropped_with_the_slot() {
        let locks = EntityLocks::new();
        let id = Uuid::new_v4();
        {
            let mut guard = locks.lock(id).await;
            guard.set_last_push(LastPush {
                remote_id: "1".to_owned(),
                fingerprint: "f".to_owned(),
            });
        }
        assert!(locks.lock(id).await.last_push().is_none());
    }

    #[tokio::test]
    async fn different_entities_do_not_block() {
        let locks = EntityLocks::new();
        let a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
        drop(a);
    }
}

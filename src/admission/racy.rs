//! Optimistic check-then-act admission
//!
//! This strategy reproduces, on purpose, the overflow bug that motivates
//! the scripted design. Every step below is individually atomic, but the
//! sequence is not: between any two steps, arbitrarily many concurrent
//! attempts may interleave. None of it may be strengthened; the benchmark
//! exists to measure how badly it misbehaves.

use std::sync::Arc;

use async_trait::async_trait;

use super::{AdmissionStrategy, Outcome};
use crate::pool::Pool;
use crate::store::{StoreClient, StoreResult};

const FULL: &str = "true";

/// Admission strategy composed of independent store calls.
///
/// Members live in a list keyed by the pool, because the append operation
/// is the only primitive that reports the resulting length in the same
/// round trip. The full flag is a cached signal written by whichever
/// attempt first observes the pool reaching capacity; until that write
/// lands, every other attempt reads a stale "not full".
pub struct RacyAdmission {
    store: Arc<dyn StoreClient>,
}

impl RacyAdmission {
    /// Create a strategy over the given store
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AdmissionStrategy for RacyAdmission {
    fn name(&self) -> &str {
        "racy"
    }

    async fn admit(&self, pool: &Pool, actor: &str) -> StoreResult<Outcome> {
        let members_key = pool.members_key();

        // Step 1: cached full flag. Can be stale for arbitrarily long.
        if self.store.get(&pool.full_key()).await?.as_deref() == Some(FULL) {
            return Ok(Outcome::RejectedFull);
        }

        // Step 2: duplicate check, racing against other appends of the
        // same actor id.
        if self
            .store
            .position_of(&members_key, actor)
            .await?
            .is_some()
        {
            return Ok(Outcome::RejectedDuplicate);
        }

        // Step 3: append and learn the resulting length.
        let length = self.store.push(&members_key, actor).await?;

        // Step 4: overflow. The append already happened and is kept; this
        // is the measured failure mode, not something to roll back.
        if length > u64::from(pool.capacity) {
            return Ok(Outcome::RejectedFull);
        }

        // Step 5: first writer wins; redundant writes are harmless.
        if length == u64::from(pool.capacity) {
            self.store.set(&pool.full_key(), FULL).await?;
        }

        Ok(Outcome::Admitted)
    }

    async fn occupancy(&self, pool: &Pool) -> StoreResult<u64> {
        let members = self.store.range(&pool.members_key(), 0, -1).await?;
        Ok(members.len() as u64)
    }

    async fn roster(&self, pool: &Pool) -> StoreResult<Vec<String>> {
        self.store.range(&pool.members_key(), 0, -1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    async fn setup(capacity: u32) -> (Arc<MemoryStore>, RacyAdmission, Pool) {
        let store = Arc::new(MemoryStore::new());
        let pool = Pool::new("p0", capacity);
        store
            .set(&pool.full_key(), "false")
            .await
            .expect("reset flag");
        let strategy = RacyAdmission::new(Arc::clone(&store) as Arc<dyn StoreClient>);
        (store, strategy, pool)
    }

    #[tokio::test]
    async fn test_admits_below_capacity() {
        let (_store, strategy, pool) = setup(3).await;

        for i in 0..3 {
            let outcome = strategy.admit(&pool, &i.to_string()).await.unwrap();
            assert_eq!(outcome, Outcome::Admitted);
        }
        assert_eq!(strategy.occupancy(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_full_flag_set_at_capacity() {
        let (store, strategy, pool) = setup(2).await;

        strategy.admit(&pool, "a").await.unwrap();
        assert_eq!(
            store.get(&pool.full_key()).await.unwrap(),
            Some("false".into())
        );

        strategy.admit(&pool, "b").await.unwrap();
        assert_eq!(
            store.get(&pool.full_key()).await.unwrap(),
            Some("true".into())
        );

        // Later attempts see the flag and reject without touching the list.
        assert_eq!(
            strategy.admit(&pool, "c").await.unwrap(),
            Outcome::RejectedFull
        );
        assert_eq!(strategy.occupancy(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_when_visible() {
        let (_store, strategy, pool) = setup(5).await;

        strategy.admit(&pool, "alice").await.unwrap();
        assert_eq!(
            strategy.admit(&pool, "alice").await.unwrap(),
            Outcome::RejectedDuplicate
        );
        assert_eq!(strategy.occupancy(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_check_loses_under_interleaving() {
        // Both attempts pass the membership check before either append
        // becomes visible, so the same actor is admitted twice. This is
        // the inherent gap of the check-then-act design, surfaced rather
        // than hidden.
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(1)));
        let pool = Arc::new(Pool::new("p0", 10));
        store.set(&pool.full_key(), "false").await.unwrap();
        let strategy = Arc::new(RacyAdmission::new(
            Arc::clone(&store) as Arc<dyn StoreClient>
        ));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let strategy = Arc::clone(&strategy);
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(
                async move { strategy.admit(&pool, "alice").await },
            ));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == Outcome::Admitted {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 2);
        let roster = strategy.roster(&pool).await.unwrap();
        assert_eq!(roster, vec!["alice", "alice"]);
    }

    #[tokio::test]
    async fn test_overflow_keeps_side_effect() {
        let (store, strategy, pool) = setup(2).await;

        // The pool is already past capacity but no attempt has cached the
        // full flag yet, the exact window the race opens.
        store.push(&pool.members_key(), "a").await.unwrap();
        store.push(&pool.members_key(), "b").await.unwrap();

        let outcome = strategy.admit(&pool, "c").await.unwrap();
        assert_eq!(outcome, Outcome::RejectedFull);

        // The append is retained: occupancy now exceeds capacity.
        assert_eq!(strategy.occupancy(&pool).await.unwrap(), 3);
        assert_eq!(strategy.roster(&pool).await.unwrap(), vec!["a", "b", "c"]);
    }
}

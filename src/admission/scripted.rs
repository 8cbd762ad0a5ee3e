//! Atomic scripted admission

use std::sync::Arc;

use async_trait::async_trait;

use super::{AdmissionStrategy, Outcome};
use crate::pool::Pool;
use crate::store::{AtomicScript, ScriptValue, StoreClient, StoreError, StoreResult};

/// The whole admission decision in one script execution.
///
/// KEYS: member set, admission counter, declared capacity. ARGV: actor id.
/// Returns `{1, "admitted"}`, `{0, "duplicate"}`, or `{0, "full"}`. The
/// store serializes script executions against the same keys, so concurrent
/// attempts observe either the state before or after a whole decision,
/// never between its steps.
const ADMIT: AtomicScript = AtomicScript::new(
    "admit",
    r#"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 1 then
    return {0, 'duplicate'}
end
local count = tonumber(redis.call('GET', KEYS[2])) or 0
local capacity = tonumber(redis.call('GET', KEYS[3])) or 0
if count >= capacity then
    return {0, 'full'}
end
redis.call('SADD', KEYS[1], ARGV[1])
redis.call('INCR', KEYS[2])
return {1, 'admitted'}
"#,
);

/// Atomic withdrawal, the inverse of admission.
///
/// KEYS: member set, admission counter. ARGV: actor id. Returns 1 when a
/// member was removed, 0 when the actor was not a member.
const RELEASE: AtomicScript = AtomicScript::new(
    "release",
    r#"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('SREM', KEYS[1], ARGV[1])
redis.call('DECR', KEYS[2])
return 1
"#,
);

/// Admission strategy backed by atomic scripted execution.
///
/// Members live in a set keyed by the pool; the counter key shadows the
/// set cardinality so the script reads a plain counter instead of paying a
/// cardinality call per decision.
pub struct ScriptedAdmission {
    store: Arc<dyn StoreClient>,
}

impl ScriptedAdmission {
    /// Create a strategy over the given store
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    /// Withdraw a previously admitted actor, freeing its slot.
    ///
    /// Returns `true` when the actor was a member and has been removed.
    pub async fn release(&self, pool: &Pool, actor: &str) -> StoreResult<bool> {
        let keys = [pool.members_key(), pool.count_key()];
        let reply = self
            .store
            .run_atomic(&RELEASE, &keys, &[actor.to_string()])
            .await?;

        match reply.as_int() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(StoreError::Script(format!(
                "unexpected release reply: {reply:?}"
            ))),
        }
    }

    /// Read back occupancy, declared capacity, and whether the pool is full
    pub async fn status(&self, pool: &Pool) -> StoreResult<(u64, u32, bool)> {
        let occupancy = self.store.cardinality(&pool.members_key()).await?;
        let capacity: u32 = self
            .store
            .get(&pool.capacity_key())
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok((occupancy, capacity, occupancy >= u64::from(capacity)))
    }

    fn parse_admit_reply(reply: &ScriptValue) -> StoreResult<Outcome> {
        if let ScriptValue::Array(items) = reply {
            if let [ok, status] = items.as_slice() {
                match (ok.as_int(), status.as_text()) {
                    (Some(1), Some("admitted")) => return Ok(Outcome::Admitted),
                    (Some(0), Some("duplicate")) => return Ok(Outcome::RejectedDuplicate),
                    (Some(0), Some("full")) => return Ok(Outcome::RejectedFull),
                    _ => {}
                }
            }
        }
        Err(StoreError::Script(format!(
            "unexpected admit reply: {reply:?}"
        )))
    }
}

#[async_trait]
impl AdmissionStrategy for ScriptedAdmission {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn admit(&self, pool: &Pool, actor: &str) -> StoreResult<Outcome> {
        let keys = [pool.members_key(), pool.count_key(), pool.capacity_key()];
        let reply = self
            .store
            .run_atomic(&ADMIT, &keys, &[actor.to_string()])
            .await?;
        Self::parse_admit_reply(&reply)
    }

    async fn occupancy(&self, pool: &Pool) -> StoreResult<u64> {
        self.store.cardinality(&pool.members_key()).await
    }

    async fn roster(&self, pool: &Pool) -> StoreResult<Vec<String>> {
        self.store.members(&pool.members_key()).await
    }
}

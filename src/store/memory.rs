//! In-memory store fake for deterministic tests
//!
//! Backs the same operation set as the real store with a mutex-guarded map.
//! Two knobs make it useful beyond plain unit tests: injected per-operation
//! latency widens race windows so the racy strategy's overflow reproduces
//! reliably, and injected failures exercise retry handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AtomicScript, ScriptValue, StoreClient, StoreError, StoreResult};

/// One stored value; kinds mirror the store's collection types
#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    List(Vec<String>),
    // Insertion-ordered, matching what the real store exposes in practice
    Set(Vec<String>),
}

/// In-memory [`StoreClient`] implementation
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    latency: Option<Duration>,
    fail_remaining: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every operation, simulating a network round
    /// trip and widening the windows between non-atomic calls
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` operations with `StoreError::Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    async fn begin(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failed = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected failure".into()));
        }

        Ok(())
    }

    fn parse_count(entry: Option<&Entry>) -> i64 {
        match entry {
            Some(Entry::Text(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Native equivalent of the admit script, executed under the lock
    fn run_admit(
        entries: &mut HashMap<String, Entry>,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptValue> {
        let [members_key, count_key, capacity_key] = keys else {
            return Err(StoreError::Script("admit expects 3 keys".into()));
        };
        let [actor] = args else {
            return Err(StoreError::Script("admit expects 1 arg".into()));
        };

        let is_member = match entries.get(members_key) {
            Some(Entry::Set(members)) => members.contains(actor),
            Some(_) => {
                return Err(StoreError::WrongType {
                    key: members_key.clone(),
                })
            }
            None => false,
        };
        if is_member {
            return Ok(ScriptValue::Array(vec![
                ScriptValue::Int(0),
                ScriptValue::Text("duplicate".into()),
            ]));
        }

        let count = Self::parse_count(entries.get(count_key));
        let capacity = Self::parse_count(entries.get(capacity_key));
        if count >= capacity {
            return Ok(ScriptValue::Array(vec![
                ScriptValue::Int(0),
                ScriptValue::Text("full".into()),
            ]));
        }

        match entries
            .entry(members_key.clone())
            .or_insert_with(|| Entry::Set(Vec::new()))
        {
            Entry::Set(members) => members.push(actor.clone()),
            _ => unreachable!("membership checked above"),
        }
        entries.insert(count_key.clone(), Entry::Text((count + 1).to_string()));

        Ok(ScriptValue::Array(vec![
            ScriptValue::Int(1),
            ScriptValue::Text("admitted".into()),
        ]))
    }

    /// Native equivalent of the release script, executed under the lock
    fn run_release(
        entries: &mut HashMap<String, Entry>,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptValue> {
        let [members_key, count_key] = keys else {
            return Err(StoreError::Script("release expects 2 keys".into()));
        };
        let [actor] = args else {
            return Err(StoreError::Script("release expects 1 arg".into()));
        };

        let removed = match entries.get_mut(members_key) {
            Some(Entry::Set(members)) => {
                if let Some(pos) = members.iter().position(|m| m == actor) {
                    members.remove(pos);
                    true
                } else {
                    false
                }
            }
            Some(_) => {
                return Err(StoreError::WrongType {
                    key: members_key.clone(),
                })
            }
            None => false,
        };

        if !removed {
            return Ok(ScriptValue::Int(0));
        }

        let count = Self::parse_count(entries.get(count_key));
        entries.insert(count_key.clone(), Entry::Text((count - 1).to_string()));

        Ok(ScriptValue::Int(1))
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Text(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.begin().await?;
        let mut entries = self.entries.lock().await;
        entries.insert(key.into(), Entry::Text(value.into()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.begin().await?;
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        Ok(entries.contains_key(key))
    }

    async fn push(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.begin().await?;
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.into())
            .or_insert_with(|| Entry::List(Vec::new()))
        {
            Entry::List(items) => {
                items.push(value.into());
                Ok(items.len() as u64)
            }
            _ => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn position_of(&self, key: &str, value: &str) -> StoreResult<Option<u64>> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::List(items)) => {
                Ok(items.iter().position(|v| v == value).map(|p| p as u64))
            }
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn range(&self, key: &str, start: i64, end: i64) -> StoreResult<Vec<String>> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        let items = match entries.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(items)) => items,
            Some(_) => return Err(StoreError::WrongType { key: key.into() }),
        };

        let len = items.len() as i64;
        let normalize = |i: i64| if i < 0 { len + i } else { i };
        let start = normalize(start).max(0);
        let end = normalize(end).min(len - 1);
        if start > end || len == 0 {
            return Ok(Vec::new());
        }

        Ok(items[start as usize..=end as usize].to_vec())
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(0),
            Some(Entry::Set(members)) => Ok(members.len() as u64),
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn is_member(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(false),
            Some(Entry::Set(members)) => Ok(members.iter().any(|m| m == value)),
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn add_member(&self, key: &str, value: &str) -> StoreResult<()> {
        self.begin().await?;
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.into())
            .or_insert_with(|| Entry::Set(Vec::new()))
        {
            Entry::Set(members) => {
                if !members.iter().any(|m| m == value) {
                    members.push(value.into());
                }
                Ok(())
            }
            _ => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.begin().await?;
        let entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(members)) => Ok(members.clone()),
            Some(_) => Err(StoreError::WrongType { key: key.into() }),
        }
    }

    async fn run_atomic(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptValue> {
        self.begin().await?;
        // One lock acquisition for the whole script: nothing interleaves.
        let mut entries = self.entries.lock().await;
        match script.name() {
            "admit" => Self::run_admit(&mut entries, keys, args),
            "release" => Self::run_release(&mut entries, keys, args),
            other => Err(StoreError::Script(format!("unknown script: {other}"))),
        }
    }
}

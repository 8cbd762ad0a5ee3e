//! Retrying decorator for transient store outages

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AtomicScript, ScriptValue, StoreClient, StoreError, StoreResult};

/// Wraps any [`StoreClient`] and retries operations that fail with
/// `StoreError::Unavailable`, sleeping with exponential backoff between
/// attempts. Deterministic errors (wrong type, script failures) pass
/// through untouched.
///
/// The reference benchmark runs without retries so that store failures are
/// visible in the results; the CLI enables this wrapper on request.
pub struct RetryingStore {
    inner: Arc<dyn StoreClient>,
    max_retries: usize,
    base_delay: Duration,
}

impl RetryingStore {
    /// Wrap `inner`, retrying up to `max_retries` times starting at
    /// `base_delay` and doubling after each failure
    pub fn new(inner: Arc<dyn StoreClient>, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    async fn run_with_retry<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "store operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl StoreClient for RetryingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.set(key, value).await })
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.delete(key).await })
            .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.exists(key).await })
            .await
    }

    async fn push(&self, key: &str, value: &str) -> StoreResult<u64> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.push(key, value).await })
            .await
    }

    async fn position_of(&self, key: &str, value: &str) -> StoreResult<Option<u64>> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.position_of(key, value).await })
            .await
    }

    async fn range(&self, key: &str, start: i64, end: i64) -> StoreResult<Vec<String>> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.range(key, start, end).await })
            .await
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.cardinality(key).await })
            .await
    }

    async fn is_member(&self, key: &str, value: &str) -> StoreResult<bool> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.is_member(key, value).await })
            .await
    }

    async fn add_member(&self, key: &str, value: &str) -> StoreResult<()> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.add_member(key, value).await })
            .await
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.members(key).await })
            .await
    }

    async fn run_atomic(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptValue> {
        let inner = &self.inner;
        self.run_with_retry(|| async move { inner.run_atomic(script, keys, args).await })
            .await
    }
}

impl std::fmt::Debug for RetryingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingStore")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

//! Redis-backed store client

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{AtomicScript, ScriptValue, StoreClient, StoreError, StoreResult};

/// [`StoreClient`] implementation over a real Redis server.
///
/// Holds one multiplexed connection; each operation clones it, which is
/// cheap and lets concurrent workers share the client through an `Arc`.
/// Scripts are evaluated server-side via EVALSHA with automatic loading on
/// first use.
#[derive(Debug, Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the store at `host:port` and verify the connection
    pub async fn connect(host: &str, port: u16) -> StoreResult<Self> {
        let client = redis::Client::open(format!("redis://{host}:{port}/"))
            .map_err(StoreError::from)?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::from)?;

        // Fail fast on a dead endpoint instead of at the first admission.
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(StoreError::from)?;

        Ok(Self { connection })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::TypeError {
            // Key kind mismatch; the key name is not recoverable here.
            StoreError::WrongType {
                key: String::new(),
            }
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

fn convert_value(value: redis::Value) -> ScriptValue {
    match value {
        redis::Value::Nil => ScriptValue::Nil,
        redis::Value::Int(i) => ScriptValue::Int(i),
        redis::Value::BulkString(bytes) => {
            ScriptValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        redis::Value::SimpleString(s) => ScriptValue::Text(s),
        redis::Value::Okay => ScriptValue::Text("OK".into()),
        redis::Value::Array(items) => {
            ScriptValue::Array(items.into_iter().map(convert_value).collect())
        }
        other => ScriptValue::Text(format!("{other:?}")),
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        Ok(conn.exists(key).await?)
    }

    async fn push(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        Ok(conn.rpush(key, value).await?)
    }

    async fn position_of(&self, key: &str, value: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn();
        let position: Option<u64> = redis::cmd("LPOS")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(position)
    }

    async fn range(&self, key: &str, start: i64, end: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.lrange(key, start as isize, end as isize).await?)
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        Ok(conn.scard(key).await?)
    }

    async fn is_member(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        Ok(conn.sismember(key, value).await?)
    }

    async fn add_member(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: () = conn.sadd(key, value).await?;
        Ok(())
    }

    async fn members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        Ok(conn.smembers(key).await?)
    }

    async fn run_atomic(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptValue> {
        let mut conn = self.conn();
        let lua = redis::Script::new(script.source());
        let mut invocation = lua.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }

        let value: redis::Value = invocation.invoke_async(&mut conn).await?;
        Ok(convert_value(value))
    }
}

//! Redis-backed ephemeral store shared by every relay process.
//!
//! Records use `SET .. PX` for TTLs and `SET .. NX PX` for creation. The
//! conditional answer write runs as a Lua script so the compare and the
//! write happen atomically on the server. Wakeups travel over Redis
//! `PUBLISH` / `SUBSCRIBE`.

use std::time::Duration;

use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tracing::{info, warn};

use super::{EphemeralStore, StoreFuture, Subscription, Wakeup};
use crate::Result;

const CAS_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
    return 1
end
return 0
";

/// Cross-process [`EphemeralStore`] backed by a Redis server.
pub struct RedisStore {
    client: Client,
    conn: MultiplexedConnection,
    cas: Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the URL is invalid or the server is
    /// unreachable.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("connected to redis question store");
        Ok(Self {
            client,
            conn,
            cas: Script::new(CAS_SCRIPT),
        })
    }
}

/// `PX` argument for `ttl`; Redis rejects expiries beyond `i64` milliseconds.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

impl EphemeralStore for RedisStore {
    fn get(&self, key: &str) -> StoreFuture<'_, Option<Vec<u8>>> {
        let key = key.to_owned();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let value: Option<Vec<u8>> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreFuture<'_, ()> {
        let key = key.to_owned();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreFuture<'_, bool> {
        let key = key.to_owned();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StoreFuture<'_, bool> {
        let key = key.to_owned();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let swapped: i64 = self
                .cas
                .key(&key)
                .arg(expected)
                .arg(value)
                .arg(ttl_millis(ttl))
                .invoke_async(&mut conn)
                .await?;
            Ok(swapped == 1)
        })
    }

    fn publish(&self, channel: &str, payload: &str) -> StoreFuture<'_, ()> {
        let channel = channel.to_owned();
        let payload = payload.to_owned();
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let _receivers: i64 = redis::cmd("PUBLISH")
                .arg(&channel)
                .arg(&payload)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn subscribe(&self, channel: &str) -> StoreFuture<'_, Subscription> {
        let channel = channel.to_owned();
        Box::pin(async move {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(&channel).await?;
            let wakeups = pubsub.into_on_message().filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(Wakeup::Topic(payload)),
                    Err(err) => {
                        warn!(?err, "undecodable pub/sub payload; forcing re-read");
                        Some(Wakeup::Missed)
                    }
                }
            });
            Ok(Box::pin(wakeups) as Subscription)
        })
    }
}

//! TTL key/value store with publish/subscribe used for question records.
//!
//! The [`EphemeralStore`] trait is the only shared mutable resource for
//! question state. [`memory::MemoryStore`] serves a single process and the
//! test suite; the `redis-store` feature adds a backend that shares
//! records and wakeups across processes.

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis_store;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;

use crate::config::{GlobalConfig, StoreBackend};
use crate::Result;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Live subscription to a pub/sub channel. Dropping it unsubscribes.
pub type Subscription = Pin<Box<dyn Stream<Item = Wakeup> + Send>>;

/// Item yielded by a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wakeup {
    /// A message published on the subscribed channel.
    Topic(String),
    /// The subscriber fell behind and messages were dropped; re-read state.
    Missed,
}

/// TTL-capable key/value backend with atomic writes and pub/sub.
///
/// Implementations must make [`set_nx`](Self::set_nx) and
/// [`compare_and_swap`](Self::compare_and_swap) atomic with respect to
/// every other writer of the same key, and must never return an expired
/// value.
pub trait EphemeralStore: Send + Sync {
    /// Read the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend is unreachable.
    fn get(&self, key: &str) -> StoreFuture<'_, Option<Vec<u8>>>;

    /// Write `value` at `key` unconditionally, replacing any TTL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend is unreachable.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreFuture<'_, ()>;

    /// Create `key` only if it is absent. Returns `true` when created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend is unreachable.
    fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreFuture<'_, bool>;

    /// Replace the value at `key` only if it still equals `expected`.
    /// Returns `true` when the swap happened.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend is unreachable.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Vec<u8>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> StoreFuture<'_, bool>;

    /// Broadcast `payload` to every current subscriber of `channel`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend is unreachable.
    fn publish(&self, channel: &str, payload: &str) -> StoreFuture<'_, ()>;

    /// Subscribe to `channel`. Messages published after this future
    /// resolves are delivered to the returned stream.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the backend is unreachable.
    fn subscribe(&self, channel: &str) -> StoreFuture<'_, Subscription>;
}

/// Build the store selected by `config`.
///
/// The memory backend is returned together with its concrete handle so the
/// caller can start the expiry reaper.
///
/// # Errors
///
/// Returns `AppError::Store` if the Redis backend cannot connect, or
/// `AppError::Config` if Redis was requested without the `redis-store`
/// feature.
#[cfg_attr(not(feature = "redis-store"), allow(clippy::unused_async))]
pub async fn from_config(
    config: &GlobalConfig,
) -> Result<(Arc<dyn EphemeralStore>, Option<Arc<memory::MemoryStore>>)> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(memory::MemoryStore::new());
            Ok((Arc::clone(&store) as Arc<dyn EphemeralStore>, Some(store)))
        }
        #[cfg(feature = "redis-store")]
        StoreBackend::Redis => {
            let store = redis_store::RedisStore::connect(&config.store.redis_url).await?;
            Ok((Arc::new(store), None))
        }
        #[cfg(not(feature = "redis-store"))]
        StoreBackend::Redis => Err(crate::AppError::Config(
            "store backend \"redis\" requires the redis-store feature".into(),
        )),
    }
}

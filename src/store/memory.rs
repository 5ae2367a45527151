//! In-process ephemeral store.
//!
//! Values live in a mutex-guarded map with an expiry instant each. Expired
//! entries are hidden from readers immediately and physically removed by
//! the reaper task. Pub/sub is a `tokio::sync::broadcast` channel, so
//! wakeups only reach waiters in the same process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EphemeralStore, StoreFuture, Subscription, Wakeup};

const EVENT_CAPACITY: usize = 1024;

/// Expiry used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: expiry(Instant::now(), ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
struct Published {
    channel: String,
    payload: String,
}

/// Single-process [`EphemeralStore`].
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    events: broadcast::Sender<Published>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the store holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl EphemeralStore for MemoryStore {
    fn get(&self, key: &str) -> StoreFuture<'_, Option<Vec<u8>>> {
        let key = key.to_owned();
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.lock().await;
            match entries.get(&key) {
                Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreFuture<'_, ()> {
        let key = key.to_owned();
        Box::pin(async move {
            self.entries.lock().await.insert(key, Entry::new(value, ttl));
            Ok(())
        })
    }

    fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreFuture<'_, bool> {
        let key = key.to_owned();
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.lock().await;
            if entries.get(&key).is_some_and(|entry| entry.is_live(now)) {
                return Ok(false);
            }
            entries.insert(key, Entry::new(value, ttl));
            Ok(true)
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
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.lock().await;
            let matches = entries
                .get(&key)
                .is_some_and(|entry| entry.is_live(now) && entry.value == expected);
            if !matches {
                return Ok(false);
            }
            entries.insert(key, Entry::new(value, ttl));
            Ok(true)
        })
    }

    fn publish(&self, channel: &str, payload: &str) -> StoreFuture<'_, ()> {
        let message = Published {
            channel: channel.to_owned(),
            payload: payload.to_owned(),
        };
        Box::pin(async move {
            // No receivers is not an error for pub/sub.
            let receivers = self.events.send(message).unwrap_or(0);
            debug!(receivers, "published wakeup");
            Ok(())
        })
    }

    fn subscribe(&self, channel: &str) -> StoreFuture<'_, Subscription> {
        let channel = channel.to_owned();
        let rx = self.events.subscribe();
        Box::pin(async move {
            let wakeups = stream::unfold(rx, move |mut rx| {
                let channel = channel.clone();
                async move {
                    loop {
                        match rx.recv().await {
                            Ok(msg) if msg.channel == channel => {
                                return Some((Wakeup::Topic(msg.payload), rx));
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, %channel, "subscriber lagged behind publishers");
                                return Some((Wakeup::Missed, rx));
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        }
                    }
                }
            });
            Ok(Box::pin(wakeups) as Subscription)
        })
    }
}

/// Spawn the background task that purges expired entries.
///
/// The task ticks every `interval` until `cancel` fires.
#[must_use]
pub fn spawn_reaper(
    store: Arc<MemoryStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("store reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = store.purge_expired().await;
                    if removed > 0 {
                        debug!(removed, "purged expired question records");
                    }
                }
            }
        }
    })
}

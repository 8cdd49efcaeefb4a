//! Resilient store facade.
//!
//! Single point of contact with the backing key-value store. Every store and
//! codec failure is absorbed here: readers observe a miss, writers observe
//! nothing, and the failure is logged with the key it hit. A store outage
//! therefore degrades the system to "always compute", never to "always
//! fail".
//!
//! The facade preserves the distinction between "absent" (no entry) and
//! "present but empty" (an explicitly cached JSON `null`): `get` and
//! `get_or_load` return a cached null as-is, `get_non_null` treats it as a
//! miss.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::codec::{Codec, CodecError};
use super::keys::CacheKey;
use super::store::{StoreBackend, StoreCommand, StoreReply};

const METRIC_CACHE_HIT: &str = "multicache_cache_hit_total";
const METRIC_CACHE_MISS: &str = "multicache_cache_miss_total";
const METRIC_STORE_DEGRADED: &str = "multicache_store_degraded_total";
const METRIC_ENTRY_SKIPPED: &str = "multicache_entry_skipped_total";

/// Outcome of one single-key read, before any typed decoding.
enum Fetch {
    /// Entry present; `Value::Null` means an explicitly cached null.
    Hit(serde_json::Value),
    Miss,
    /// Store or codec failure; callers take the degraded path.
    Failed,
}

/// Resilient wrapper around one backing store and one codec.
///
/// `default_ttl` applies to the single-key write paths (`put` and the
/// write-back inside `get_or_load`/`get_non_null`); batch writes carry their
/// own TTL per call.
pub struct CacheFacade {
    store: Arc<dyn StoreBackend>,
    codec: Arc<dyn Codec>,
    default_ttl: Duration,
}

impl CacheFacade {
    pub fn new(store: Arc<dyn StoreBackend>, codec: Arc<dyn Codec>, default_ttl: Duration) -> Self {
        Self {
            store,
            codec,
            default_ttl,
        }
    }

    /// Returns the decoded value, or `None` when the entry is absent or the
    /// read failed. Callers cannot distinguish a miss from a failure, which
    /// is the point.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.fetch(key).await {
            Fetch::Hit(value) => match serde_json::from_value(value) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    counter!(METRIC_ENTRY_SKIPPED).increment(1);
                    warn!(key = %key, error = %err, "cached entry has unexpected shape; treating as miss");
                    None
                }
            },
            Fetch::Miss | Fetch::Failed => None,
        }
    }

    /// Returns the cached value if present, an explicitly cached null
    /// included (use `T = Option<U>` to observe it). Otherwise invokes
    /// `loader`, caching and returning its result.
    ///
    /// When the facade's own read fails, `loader` serves the call directly
    /// and its result is not cached. A `loader` failure propagates unchanged.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.fetch(key).await {
            Fetch::Hit(value) => match serde_json::from_value(value) {
                Ok(decoded) => return Ok(decoded),
                Err(err) => {
                    counter!(METRIC_ENTRY_SKIPPED).increment(1);
                    warn!(key = %key, error = %err, "cached entry has unexpected shape; reloading");
                }
            },
            Fetch::Miss => {}
            Fetch::Failed => return loader().await,
        }

        let value = loader().await?;
        self.put(key, &value).await;
        Ok(value)
    }

    /// Like [`get_or_load`](Self::get_or_load), but a cached null counts as
    /// a miss: the loader runs again and its result is re-cached, a `None`
    /// result included. Use when negative caching of "no value" must not
    /// short-circuit readers.
    pub async fn get_non_null<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        loader: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        match self.fetch(key).await {
            Fetch::Hit(value) if !value.is_null() => match serde_json::from_value(value) {
                Ok(decoded) => return Ok(Some(decoded)),
                Err(err) => {
                    counter!(METRIC_ENTRY_SKIPPED).increment(1);
                    warn!(key = %key, error = %err, "cached entry has unexpected shape; reloading");
                }
            },
            Fetch::Hit(_) => {
                debug!(key = %key, "cached null treated as miss");
            }
            Fetch::Miss => {}
            Fetch::Failed => return loader().await,
        }

        let value = loader().await?;
        self.put(key, &value).await;
        Ok(value)
    }

    /// Best-effort write with the facade's default TTL.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let Some((encoded_key, encoded_value)) = self.encode_entry(key, value) else {
            return;
        };
        if let Err(err) = self
            .store
            .set_ex(&encoded_key, encoded_value, self.default_ttl)
            .await
        {
            counter!(METRIC_STORE_DEGRADED).increment(1);
            warn!(key = %key, error = %err, "store write failed; entry not cached");
        }
    }

    /// Best-effort delete.
    pub async fn evict(&self, key: &CacheKey) {
        let encoded = match self.codec.encode_key(key) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key = %key, error = %err, "cache key not encodable; nothing to evict");
                return;
            }
        };
        if let Err(err) = self.store.del(&encoded).await {
            counter!(METRIC_STORE_DEGRADED).increment(1);
            warn!(key = %key, error = %err, "store delete failed");
        }
    }

    /// Best-effort wipe of the whole store.
    pub async fn clear(&self) {
        if let Err(err) = self.store.clear().await {
            counter!(METRIC_STORE_DEGRADED).increment(1);
            warn!(error = %err, "store clear failed");
        }
    }

    /// Reads `keys` in one pipelined round trip.
    ///
    /// The result always has one slot per input key, in input order. A key
    /// that fails to encode contributes no store command and its slot is
    /// `None`; a reply that fails to decode also degrades to `None`. Total
    /// failure of the round trip yields all-`None`, indistinguishable from a
    /// full miss.
    pub async fn multi_get<T: DeserializeOwned>(&self, keys: &[CacheKey]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }

        // slots[i] holds the command index serving keys[i], when one exists.
        let mut commands = Vec::with_capacity(keys.len());
        let mut slots: Vec<Option<usize>> = Vec::with_capacity(keys.len());
        for key in keys {
            match self.codec.encode_key(key) {
                Ok(encoded) => {
                    slots.push(Some(commands.len()));
                    commands.push(StoreCommand::Get { key: encoded });
                }
                Err(err) => {
                    counter!(METRIC_ENTRY_SKIPPED).increment(1);
                    warn!(key = %key, error = %err, "cache key not encodable; slot left empty");
                    slots.push(None);
                }
            }
        }

        let replies = if commands.is_empty() {
            Vec::new()
        } else {
            match self.store.pipeline(commands).await {
                Ok(replies) => replies,
                Err(err) => {
                    counter!(METRIC_STORE_DEGRADED).increment(1);
                    warn!(
                        keys = keys.len(),
                        error = %err,
                        "pipelined read failed; treating all keys as misses"
                    );
                    Vec::new()
                }
            }
        };

        keys.iter()
            .zip(slots)
            .map(|(key, slot)| {
                let decoded = slot
                    .and_then(|index| replies.get(index))
                    .and_then(|reply| match reply {
                        StoreReply::Value(Some(bytes)) => self.decode_slot(key, bytes),
                        _ => None,
                    });
                if decoded.is_some() {
                    counter!(METRIC_CACHE_HIT).increment(1);
                } else {
                    counter!(METRIC_CACHE_MISS).increment(1);
                }
                decoded
            })
            .collect()
    }

    /// Writes `entries` in one pipelined round trip, each with `ttl`.
    ///
    /// Entries whose key or value fails to encode are skipped individually
    /// with a warning; partial success is acceptable. Total failure of the
    /// round trip is logged and swallowed.
    pub async fn multi_put<'a, T, I>(&self, entries: I, ttl: Duration)
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (CacheKey, &'a T)>,
    {
        let mut commands = Vec::new();
        for (key, value) in entries {
            let Some((encoded_key, encoded_value)) = self.encode_entry(&key, value) else {
                continue;
            };
            commands.push(StoreCommand::SetEx {
                key: encoded_key,
                value: encoded_value,
                ttl,
            });
        }
        if commands.is_empty() {
            return;
        }

        let entry_count = commands.len();
        if let Err(err) = self.store.pipeline(commands).await {
            counter!(METRIC_STORE_DEGRADED).increment(1);
            warn!(
                entries = entry_count,
                error = %err,
                "pipelined write failed; entries not cached"
            );
        }
    }

    async fn fetch(&self, key: &CacheKey) -> Fetch {
        let encoded = match self.codec.encode_key(key) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_ENTRY_SKIPPED).increment(1);
                warn!(key = %key, error = %err, "cache key not encodable; treating as miss");
                return Fetch::Failed;
            }
        };
        match self.store.get(&encoded).await {
            Ok(Some(bytes)) => match self.codec.decode(&bytes) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    Fetch::Hit(value)
                }
                Err(err) => {
                    counter!(METRIC_ENTRY_SKIPPED).increment(1);
                    warn!(key = %key, error = %err, "cached entry not decodable; treating as miss");
                    Fetch::Failed
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                Fetch::Miss
            }
            Err(err) => {
                counter!(METRIC_STORE_DEGRADED).increment(1);
                warn!(key = %key, error = %err, "store read failed; treating as miss");
                Fetch::Failed
            }
        }
    }

    fn decode_slot<T: DeserializeOwned>(&self, key: &CacheKey, bytes: &[u8]) -> Option<T> {
        let decoded = self
            .codec
            .decode(bytes)
            .and_then(|value| serde_json::from_value(value).map_err(CodecError::Decode));
        match decoded {
            Ok(value) => Some(value),
            Err(err) => {
                counter!(METRIC_ENTRY_SKIPPED).increment(1);
                warn!(key = %key, error = %err, "cached entry not decodable; slot left empty");
                None
            }
        }
    }

    fn encode_entry<T: Serialize>(&self, key: &CacheKey, value: &T) -> Option<(Bytes, Bytes)> {
        let encoded_key = match self.codec.encode_key(key) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_ENTRY_SKIPPED).increment(1);
                warn!(key = %key, error = %err, "cache key not encodable; entry skipped");
                return None;
            }
        };
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                counter!(METRIC_ENTRY_SKIPPED).increment(1);
                warn!(key = %key, error = %err, "value not serializable; entry skipped");
                return None;
            }
        };
        let encoded_value = match self.codec.encode(&value) {
            Ok(encoded) => encoded,
            Err(err) => {
                counter!(METRIC_ENTRY_SKIPPED).increment(1);
                warn!(key = %key, error = %err, "value not encodable; entry skipped");
                return None;
            }
        };
        Some((encoded_key, encoded_value))
    }
}

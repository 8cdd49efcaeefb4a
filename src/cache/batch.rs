//! Batch cache-aside reconciliation.
//!
//! `load_batch` is the protocol in one place: derive store keys, read them
//! in one pipelined round trip, partition into hits and misses, invoke the
//! loader for exactly the misses, write the fresh values back with the
//! configured TTL, and re-key the merged objects by the configured field.
//!
//! Concurrent calls for overlapping keys are not serialized: two misses for
//! the same key may both invoke the loader and both write back, last write
//! wins. Callers needing at-most-once loads must add their own per-key
//! mutual exclusion.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::facade::CacheFacade;
use super::keys::{CacheKey, FieldValue};

const METRIC_RESULT_DROPPED: &str = "multicache_result_dropped_total";
const METRIC_BATCH_LOAD_MS: &str = "multicache_batch_load_ms";

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_KEY_PARAM: &str = "id";
pub const DEFAULT_TTL_SECONDS: u64 = 180;
pub const DEFAULT_RESULT_KEY_FIELD: &str = "id";

/// Per-operation cache parameters.
///
/// Resolved fresh for every call and passed explicitly; nothing is cached
/// across calls, so a changed declaration takes effect immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Namespace prefix for every store key of this operation.
    pub namespace: String,
    /// Name of the declared parameter holding the key collection.
    pub key_param: String,
    /// Entry lifetime in seconds for written-back values.
    pub ttl_seconds: u64,
    /// Name of the field used to re-key the merged result.
    pub result_key_field: String,
}

impl BatchConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key_param: DEFAULT_KEY_PARAM.to_string(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            result_key_field: DEFAULT_RESULT_KEY_FIELD.to_string(),
        }
    }

    pub fn key_param(mut self, name: impl Into<String>) -> Self {
        self.key_param = name.into();
        self
    }

    pub fn ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    pub fn result_key_field(mut self, field: impl Into<String>) -> Self {
        self.result_key_field = field.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

// ============================================================================
// Field Access
// ============================================================================

/// Extracts the result-map key from one loaded object.
///
/// Resolved once per binding, not re-resolved by name per object. The
/// serde-based form reads the configured field from the object's serialized
/// representation; [`FieldAccessor::with`] supplies a typed closure when the
/// call site can extract without serializing.
pub struct FieldAccessor<T> {
    field: String,
    get: Arc<dyn Fn(&T) -> Option<FieldValue> + Send + Sync>,
}

impl<T: Serialize> FieldAccessor<T> {
    pub fn by_name(field: impl Into<String>) -> Self {
        let field = field.into();
        let name = field.clone();
        let get = Arc::new(move |object: &T| {
            let value = serde_json::to_value(object).ok()?;
            value.get(&name).and_then(FieldValue::from_json)
        });
        Self { field, get }
    }
}

impl<T> FieldAccessor<T> {
    /// Wraps a typed extractor. `field` only labels diagnostics.
    pub fn with(
        field: impl Into<String>,
        get: impl Fn(&T) -> Option<FieldValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            field: field.into(),
            get: Arc::new(get),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn extract(&self, object: &T) -> Option<FieldValue> {
        (self.get)(object)
    }
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            get: Arc::clone(&self.get),
        }
    }
}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The reconciliation engine.
pub struct BatchCache {
    facade: Arc<CacheFacade>,
}

impl BatchCache {
    pub fn new(facade: Arc<CacheFacade>) -> Self {
        Self { facade }
    }

    /// Runs one batch cache-aside call.
    ///
    /// Store failures never abort the batch: affected keys degrade to misses
    /// and are re-loaded. A `loader` failure propagates unchanged, since the
    /// source of truth is unavailable and no cached answer can substitute.
    /// Objects whose key field cannot be extracted are dropped from the
    /// result with a warning.
    #[instrument(skip_all, fields(namespace = %config.namespace, keys = raw_keys.len()))]
    pub async fn load_batch<K, T, F, Fut, E>(
        &self,
        config: &BatchConfig,
        accessor: &FieldAccessor<T>,
        raw_keys: &[K],
        loader: F,
    ) -> Result<HashMap<FieldValue, T>, E>
    where
        K: fmt::Display + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned,
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = Result<HashMap<K, T>, E>>,
    {
        if raw_keys.is_empty() {
            return Ok(HashMap::new());
        }
        let started_at = Instant::now();

        // Derive store keys in input order, duplicates preserved.
        let cache_keys: Vec<CacheKey> = raw_keys
            .iter()
            .map(|raw| CacheKey::new(&config.namespace, raw))
            .collect();

        // One pipelined read, then partition into hits and misses. A cached
        // null or an undecodable entry counts as a miss for that key.
        let slots = self.facade.multi_get::<serde_json::Value>(&cache_keys).await;
        let mut hits: Vec<T> = Vec::new();
        let mut misses: Vec<K> = Vec::new();
        for (raw, slot) in raw_keys.iter().zip(slots) {
            match slot {
                Some(value) if !value.is_null() => {
                    match decode_entry(&config.namespace, raw, value) {
                        Some(mut objects) => hits.append(&mut objects),
                        None => misses.push(raw.clone()),
                    }
                }
                _ => misses.push(raw.clone()),
            }
        }
        debug!(hits = hits.len(), misses = misses.len(), "batch partitioned");

        // Loader sees exactly the miss list; fresh values are written back
        // with the configured TTL. Keys the loader omits stay uncached.
        let mut loaded: HashMap<K, T> = HashMap::new();
        if !misses.is_empty() {
            loaded = loader(misses).await?;
            let entries: Vec<(CacheKey, &T)> = loaded
                .iter()
                .map(|(raw, value)| (CacheKey::new(&config.namespace, raw), value))
                .collect();
            self.facade.multi_put(entries, config.ttl()).await;
        }

        // Merge and re-key by the extracted field; last writer wins on
        // colliding keys.
        let mut result = HashMap::with_capacity(hits.len() + loaded.len());
        for object in hits.into_iter().chain(loaded.into_values()) {
            match accessor.extract(&object) {
                Some(field) => {
                    result.insert(field, object);
                }
                None => {
                    counter!(METRIC_RESULT_DROPPED).increment(1);
                    warn!(
                        namespace = %config.namespace,
                        field = accessor.field(),
                        "result object lacks a usable key field; dropped"
                    );
                }
            }
        }

        histogram!(METRIC_BATCH_LOAD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(result)
    }
}

/// Decodes one cached entry into result objects: a JSON array fans out to
/// its elements, anything else decodes as a single object.
fn decode_entry<T: DeserializeOwned>(
    namespace: &str,
    raw: &impl fmt::Display,
    value: serde_json::Value,
) -> Option<Vec<T>> {
    let decoded = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>(),
        other => serde_json::from_value(other).map(|object| vec![object]),
    };
    match decoded {
        Ok(objects) => Some(objects),
        Err(err) => {
            warn!(namespace, key = %raw, error = %err, "cached entry has unexpected shape; reloading");
            None
        }
    }
}

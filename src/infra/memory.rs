//! In-process store backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::cache::{StoreBackend, StoreCommand, StoreError, StoreReply};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    expires_at: Instant,
}

impl StoredEntry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Concurrent in-process store with per-entry lifetimes.
///
/// Entries expire lazily: a dead entry is dropped the first time it is
/// touched after its deadline.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<Vec<u8>, StoredEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().live())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, when present and live.
    pub fn ttl(&self, key: &[u8]) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    fn read(&self, key: &[u8]) -> Option<Bytes> {
        let value = self
            .entries
            .get(key)
            .and_then(|entry| entry.live().then(|| entry.value.clone()));
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.live());
        }
        value
    }

    fn write(&self, key: Vec<u8>, value: Bytes, ttl: Duration) {
        self.entries.insert(
            key,
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        Ok(self.read(key))
    }

    async fn set_ex(&self, key: &[u8], value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.write(key.to_vec(), value, ttl);
        Ok(())
    }

    async fn del(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>, StoreError> {
        // In-process there is no round trip to batch; replies still come
        // back one per command, in command order.
        Ok(commands
            .into_iter()
            .map(|command| match command {
                StoreCommand::Get { key } => StoreReply::Value(self.read(&key)),
                StoreCommand::SetEx { key, value, ttl } => {
                    self.write(key.to_vec(), value, ttl);
                    StoreReply::Stored
                }
            })
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_values() {
        let store = InMemoryStore::new();

        store
            .set_ex(b"alpha", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get(b"alpha").await.unwrap(),
            Some(Bytes::from_static(b"1"))
        );
        assert_eq!(store.get(b"beta").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let store = InMemoryStore::new();

        store
            .set_ex(b"alpha", Bytes::from_static(b"1"), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get(b"alpha").await.unwrap(), None);
        assert!(store.is_empty());
        assert_eq!(store.ttl(b"alpha"), None);
    }

    #[tokio::test]
    async fn ttl_reports_the_remaining_lifetime() {
        let store = InMemoryStore::new();

        store
            .set_ex(b"alpha", Bytes::from_static(b"1"), Duration::from_secs(30))
            .await
            .unwrap();

        let remaining = store.ttl(b"alpha").expect("entry should be live");
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
        assert_eq!(store.ttl(b"missing"), None);
    }

    #[tokio::test]
    async fn pipeline_replies_in_command_order() {
        let store = InMemoryStore::new();

        let replies = store
            .pipeline(vec![
                StoreCommand::SetEx {
                    key: Bytes::from_static(b"alpha"),
                    value: Bytes::from_static(b"1"),
                    ttl: Duration::from_secs(60),
                },
                StoreCommand::Get {
                    key: Bytes::from_static(b"alpha"),
                },
                StoreCommand::Get {
                    key: Bytes::from_static(b"missing"),
                },
            ])
            .await
            .unwrap();

        assert_eq!(replies.len(), 3);
        assert!(matches!(replies[0], StoreReply::Stored));
        assert!(matches!(
            &replies[1],
            StoreReply::Value(Some(value)) if value.as_ref() == b"1"
        ));
        assert!(matches!(replies[2], StoreReply::Value(None)));
    }

    #[tokio::test]
    async fn del_and_clear_remove_entries() {
        let store = InMemoryStore::new();

        store
            .set_ex(b"alpha", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_ex(b"beta", Bytes::from_static(b"2"), Duration::from_secs(60))
            .await
            .unwrap();

        store.del(b"alpha").await.unwrap();
        assert_eq!(store.get(b"alpha").await.unwrap(), None);
        assert_eq!(store.len(), 1);

        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}

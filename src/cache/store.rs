//! Backing store contract.
//!
//! The key-value store itself is an external collaborator. This module pins
//! down the one surface the cache layer needs from it: single-key get,
//! set-with-expiry, delete, clear, and a pipelined batch of heterogeneous
//! commands answered in submission order.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport or protocol failure talking to the backing store.
///
/// Never escapes the facade: readers observe a miss, writers observe
/// nothing, and the failure is logged where it happened.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// One command in a pipelined batch.
#[derive(Debug, Clone)]
pub enum StoreCommand {
    Get { key: Bytes },
    SetEx { key: Bytes, value: Bytes, ttl: Duration },
}

/// The answer to one pipelined command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply {
    /// Reply to [`StoreCommand::Get`].
    Value(Option<Bytes>),
    /// Reply to [`StoreCommand::SetEx`].
    Stored,
}

/// Minimal key-value store surface used by the cache layer.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError>;

    /// Writes `value` under `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &[u8], value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    async fn del(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Drops every entry the store holds.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Executes `commands` as one round trip.
    ///
    /// Implementations must answer every command: `replies.len()` equals
    /// `commands.len()` and `replies[i]` answers `commands[i]`.
    async fn pipeline(&self, commands: Vec<StoreCommand>) -> Result<Vec<StoreReply>, StoreError>;
}

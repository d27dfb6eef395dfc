//! Call-state store
//!
//! A key-by-`call_id` map of per-call runtime flags with TTL. Two tiers:
//! process-local hot data (live sessions, the ledger, task handles) lives in
//! the server's call registry and never touches this crate; the fields here
//! are the ones any worker might need when carrier webhooks land on a
//! different process than the one holding the session.
//!
//! Every update is a field-level merge; whole-record replacement would let
//! two workers wipe each other's writes.

pub mod entry;
pub mod memory;
pub mod redis_store;

pub use entry::{CallStateEntry, CallStateUpdate, ControlFlag};
pub use memory::InMemoryCallStateStore;
pub use redis_store::RedisCallStateStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Store of shared call state. Each field has a single producer; consumers
/// are many.
#[async_trait]
pub trait CallStateStore: Send + Sync {
    async fn get(&self, call_id: &str) -> Result<Option<CallStateEntry>, StoreError>;

    /// Field-merging update: fields not present in `update` are preserved.
    /// Refreshes the entry TTL.
    async fn merge(&self, call_id: &str, update: CallStateUpdate) -> Result<(), StoreError>;

    /// Track one outstanding carrier playback.
    async fn add_playback_id(&self, call_id: &str, playback_id: &str) -> Result<(), StoreError>;

    /// Untrack a finished playback; returns how many remain. Webhook
    /// handlers on any worker call this, and the session-holding worker
    /// watches the count to start its silence timer.
    async fn remove_playback_id(
        &self,
        call_id: &str,
        playback_id: &str,
    ) -> Result<usize, StoreError>;

    /// Drop the entry entirely (call teardown).
    async fn remove(&self, call_id: &str) -> Result<(), StoreError>;

    /// Cross-worker signal for this call.
    async fn publish_flag(&self, call_id: &str, flag: ControlFlag) -> Result<(), StoreError>;

    /// Stream of flags published for this call (including by other workers).
    async fn subscribe_flags(
        &self,
        call_id: &str,
    ) -> Result<mpsc::Receiver<ControlFlag>, StoreError>;

    /// Whether entries are visible across processes.
    fn is_distributed(&self) -> bool;
}

//! In-process store tier
//!
//! Default backend for single-worker deployments and tests. Same merge and
//! TTL semantics as the Redis tier, minus cross-process visibility.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use parley_config::constants::store::CALL_STATE_TTL_SECS;

use crate::entry::{CallStateEntry, CallStateUpdate, ControlFlag};
use crate::{CallStateStore, StoreError};

struct Slot {
    entry: CallStateEntry,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCallStateStore {
    slots: DashMap<String, Slot>,
    subscribers: DashMap<String, Vec<mpsc::Sender<ControlFlag>>>,
    ttl: Duration,
}

impl InMemoryCallStateStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            subscribers: DashMap::new(),
            ttl: Duration::from_secs(CALL_STATE_TTL_SECS),
        }
    }

    #[cfg(test)]
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            subscribers: DashMap::new(),
            ttl,
        }
    }

    fn fresh(&self, slot: &Slot) -> bool {
        slot.expires_at > Instant::now()
    }
}

#[async_trait]
impl CallStateStore for InMemoryCallStateStore {
    async fn get(&self, call_id: &str) -> Result<Option<CallStateEntry>, StoreError> {
        // The guard must drop before any removal touches the same shard
        let (entry, expired) = match self.slots.get(call_id) {
            Some(slot) if self.fresh(&slot) => (Some(slot.entry.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            self.slots.remove(call_id);
        }
        Ok(entry)
    }

    async fn merge(&self, call_id: &str, update: CallStateUpdate) -> Result<(), StoreError> {
        let mut slot = self.slots.entry(call_id.to_string()).or_insert_with(|| Slot {
            entry: CallStateEntry::default(),
            expires_at: Instant::now() + self.ttl,
        });
        update.apply(&mut slot.entry);
        slot.expires_at = Instant::now() + self.ttl;
        Ok(())
    }

    async fn add_playback_id(&self, call_id: &str, playback_id: &str) -> Result<(), StoreError> {
        let mut slot = self.slots.entry(call_id.to_string()).or_insert_with(|| Slot {
            entry: CallStateEntry::default(),
            expires_at: Instant::now() + self.ttl,
        });
        slot.entry.current_playback_ids.insert(playback_id.to_string());
        Ok(())
    }

    async fn remove_playback_id(
        &self,
        call_id: &str,
        playback_id: &str,
    ) -> Result<usize, StoreError> {
        match self.slots.get_mut(call_id) {
            Some(mut slot) => {
                slot.entry.current_playback_ids.remove(playback_id);
                Ok(slot.entry.current_playback_ids.len())
            }
            None => Ok(0),
        }
    }

    async fn remove(&self, call_id: &str) -> Result<(), StoreError> {
        self.slots.remove(call_id);
        self.subscribers.remove(call_id);
        Ok(())
    }

    async fn publish_flag(&self, call_id: &str, flag: ControlFlag) -> Result<(), StoreError> {
        if let Some(mut subs) = self.subscribers.get_mut(call_id) {
            subs.retain(|tx| tx.try_send(flag).is_ok());
        }
        Ok(())
    }

    async fn subscribe_flags(
        &self,
        call_id: &str,
    ) -> Result<mpsc::Receiver<ControlFlag>, StoreError> {
        let (tx, rx) = mpsc::channel(32);
        self.subscribers
            .entry(call_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

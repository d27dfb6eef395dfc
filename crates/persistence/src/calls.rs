//! Call record storage
//!
//! Only the worker holding a call's session appends to its transcript and
//! log, so append sequence numbers are kept in-process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scylla::{Session, SessionBuilder};

use parley_config::settings::ScyllaSettings;
use parley_config::AgentConfig;
use parley_core::{CallInfo, LatencyRecord, TranscriptEntry};

use crate::error::PersistenceError;
use crate::schema;

fn epoch_ms(t: Option<DateTime<Utc>>) -> Option<i64> {
    t.map(|t| t.timestamp_millis())
}

/// Durable store for calls, transcripts, latency logs, and agent snapshots.
#[async_trait]
pub trait CallLogStore: Send + Sync {
    /// Insert the call row when the carrier signals the call.
    async fn create_call(&self, info: &CallInfo) -> Result<(), PersistenceError>;

    /// Append one transcript entry. Entries are never rewritten.
    async fn append_transcript(
        &self,
        call_id: &str,
        entry: &TranscriptEntry,
    ) -> Result<(), PersistenceError>;

    /// Append one per-turn latency record.
    async fn append_latency(
        &self,
        call_id: &str,
        record: &LatencyRecord,
    ) -> Result<(), PersistenceError>;

    /// Write end timestamps and reason after the ledger flush.
    async fn finalize_call(&self, info: &CallInfo) -> Result<(), PersistenceError>;

    /// Agent snapshot used to configure new calls.
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>, PersistenceError>;

    async fn put_agent(&self, config: &AgentConfig) -> Result<(), PersistenceError>;
}

// ---------------------------------------------------------------------------
// ScyllaDB backend

pub struct ScyllaCallLogStore {
    session: Arc<Session>,
    keyspace: String,
    transcript_seq: Mutex<HashMap<String, i32>>,
    log_seq: Mutex<HashMap<String, i32>>,
}

impl ScyllaCallLogStore {
    /// Connect to the cluster and bootstrap the call-log schema. Hosts,
    /// keyspace and replication come from the process settings (file or
    /// `PARLEY_SCYLLA__*` env overrides).
    pub async fn connect(settings: &ScyllaSettings) -> Result<Self, PersistenceError> {
        tracing::info!(hosts = ?settings.hosts, keyspace = %settings.keyspace, "connecting to scylladb");

        let session = SessionBuilder::new()
            .known_nodes(&settings.hosts)
            .build()
            .await?;

        schema::create_keyspace(&session, &settings.keyspace, settings.replication_factor)
            .await?;
        schema::create_tables(&session, &settings.keyspace).await?;
        tracing::info!(keyspace = %settings.keyspace, "call-log schema ensured");

        Ok(Self {
            session: Arc::new(session),
            keyspace: settings.keyspace.clone(),
            transcript_seq: Mutex::new(HashMap::new()),
            log_seq: Mutex::new(HashMap::new()),
        })
    }

    fn next_seq(map: &Mutex<HashMap<String, i32>>, call_id: &str) -> i32 {
        let mut map = map.lock();
        let seq = map.entry(call_id.to_string()).or_insert(0);
        let current = *seq;
        *seq += 1;
        current
    }

    fn forget_call(&self, call_id: &str) {
        self.transcript_seq.lock().remove(call_id);
        self.log_seq.lock().remove(call_id);
    }
}

#[async_trait]
impl CallLogStore for ScyllaCallLogStore {
    async fn create_call(&self, info: &CallInfo) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.calls (call_id, agent_id, direction, from_number, to_number, created_at_ms, started_at_ms, answered_at_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        let direction = serde_json::to_string(&info.direction)?
            .trim_matches('"')
            .to_string();
        self.session
            .query_unpaged(
                query,
                (
                    &info.call_id,
                    &info.agent_id,
                    direction,
                    &info.from,
                    &info.to,
                    info.created_at.timestamp_millis(),
                    epoch_ms(info.started_at),
                    epoch_ms(info.answered_at),
                ),
            )
            .await?;
        tracing::debug!(call_id = %info.call_id, "call row created");
        Ok(())
    }

    async fn append_transcript(
        &self,
        call_id: &str,
        entry: &TranscriptEntry,
    ) -> Result<(), PersistenceError> {
        let seq = Self::next_seq(&self.transcript_seq, call_id);
        let query = format!(
            "INSERT INTO {}.call_transcript (call_id, seq, role, text, created_at_ms) VALUES (?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    call_id,
                    seq,
                    entry.role.as_str(),
                    &entry.text,
                    entry.timestamp.timestamp_millis(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn append_latency(
        &self,
        call_id: &str,
        record: &LatencyRecord,
    ) -> Result<(), PersistenceError> {
        let seq = Self::next_seq(&self.log_seq, call_id);
        let query = format!(
            "INSERT INTO {}.call_logs (call_id, seq, latency_json, created_at_ms) VALUES (?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    call_id,
                    seq,
                    serde_json::to_string(record)?,
                    Utc::now().timestamp_millis(),
                ),
            )
            .await?;
        Ok(())
    }

    async fn finalize_call(&self, info: &CallInfo) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET ended_at_ms = ?, end_reason = ? WHERE call_id = ?",
            self.keyspace
        );
        let reason = info.end_reason.map(|r| r.as_str()).unwrap_or("unknown");
        self.session
            .query_unpaged(query, (epoch_ms(info.ended_at), reason, &info.call_id))
            .await?;
        self.forget_call(&info.call_id);
        tracing::info!(call_id = %info.call_id, end_reason = reason, "call finalized");
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>, PersistenceError> {
        let query = format!(
            "SELECT config_json FROM {}.agents WHERE agent_id = ?",
            self.keyspace
        );
        let result = self.session.query_unpaged(query, (agent_id,)).await?;

        let Some(row) = result
            .maybe_first_row_typed::<(String,)>()
            .map_err(|e| PersistenceError::Decode(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&row.0)?))
    }

    async fn put_agent(&self, config: &AgentConfig) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.agents (agent_id, config_json, updated_at_ms) VALUES (?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    &config.agent_id,
                    serde_json::to_string(config)?,
                    Utc::now().timestamp_millis(),
                ),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend (tests, single-node dev)

#[derive(Default)]
struct MemoryInner {
    calls: HashMap<String, CallInfo>,
    transcripts: HashMap<String, Vec<TranscriptEntry>>,
    logs: HashMap<String, Vec<LatencyRecord>>,
    agents: HashMap<String, AgentConfig>,
}

#[derive(Default)]
pub struct InMemoryCallLogStore {
    inner: Mutex<MemoryInner>,
}

impl InMemoryCallLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self, call_id: &str) -> Vec<TranscriptEntry> {
        self.inner
            .lock()
            .transcripts
            .get(call_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn latency_records(&self, call_id: &str) -> Vec<LatencyRecord> {
        self.inner
            .lock()
            .logs
            .get(call_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn call(&self, call_id: &str) -> Option<CallInfo> {
        self.inner.lock().calls.get(call_id).cloned()
    }
}

#[async_trait]
impl CallLogStore for InMemoryCallLogStore {
    async fn create_call(&self, info: &CallInfo) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .calls
            .insert(info.call_id.clone(), info.clone());
        Ok(())
    }

    async fn append_transcript(
        &self,
        call_id: &str,
        entry: &TranscriptEntry,
    ) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .transcripts
            .entry(call_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn append_latency(
        &self,
        call_id: &str,
        record: &LatencyRecord,
    ) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .logs
            .entry(call_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn finalize_call(&self, info: &CallInfo) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .calls
            .insert(info.call_id.clone(), info.clone());
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentConfig>, PersistenceError> {
        Ok(self.inner.lock().agents.get(agent_id).cloned())
    }

    async fn put_agent(&self, config: &AgentConfig) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .agents
            .insert(config.agent_id.clone(), config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::CallDirection;

    #[tokio::test]
    async fn test_transcript_appends_in_order() {
        let store = InMemoryCallLogStore::new();
        store
            .append_transcript("cc-1", &TranscriptEntry::assistant("Hi."))
            .await
            .unwrap();
        store
            .append_transcript("cc-1", &TranscriptEntry::user("Hello"))
            .await
            .unwrap();

        let transcript = store.transcript("cc-1");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "Hi.");
        assert_eq!(transcript[1].text, "Hello");
    }

    #[tokio::test]
    async fn test_finalize_records_reason() {
        let store = InMemoryCallLogStore::new();
        let mut info = CallInfo::new("cc-1", "a-1", CallDirection::Outbound, "+1", "+2");
        store.create_call(&info).await.unwrap();

        info.mark_ended(parley_core::EndReason::VoicemailDetectedAmd);
        store.finalize_call(&info).await.unwrap();

        let stored = store.call("cc-1").unwrap();
        assert_eq!(
            stored.end_reason,
            Some(parley_core::EndReason::VoicemailDetectedAmd)
        );
    }

    #[tokio::test]
    async fn test_agent_snapshot_roundtrip() {
        let store = InMemoryCallLogStore::new();
        let config = AgentConfig::default();
        store.put_agent(&config).await.unwrap();
        let loaded = store.get_agent("default").await.unwrap().unwrap();
        assert_eq!(loaded.agent_id, "default");
    }
}

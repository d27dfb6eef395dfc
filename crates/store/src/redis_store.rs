//! Cross-process store tier
//!
//! Backs the shared fields with a Redis hash per call (`call:{id}`), a set
//! for outstanding playback ids, and pub/sub channels for control flags.
//! Merges are per-field HSETs, so concurrent workers can never wipe each
//! other's fields; entries expire after the call-state TTL.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use parley_config::constants::store::CALL_STATE_TTL_SECS;

use crate::entry::{CallStateEntry, CallStateUpdate, ControlFlag};
use crate::{CallStateStore, StoreError};

pub struct RedisCallStateStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisCallStateStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!(url = %url, "connected to redis call-state store");
        Ok(Self { client, conn })
    }

    fn hash_key(call_id: &str) -> String {
        format!("call:{call_id}")
    }

    fn playbacks_key(call_id: &str) -> String {
        format!("call:{call_id}:playbacks")
    }

    fn flags_channel(call_id: &str) -> String {
        format!("parley:flags:{call_id}")
    }
}

fn bool_field(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

fn parse_bool(map: &HashMap<String, String>, field: &str) -> bool {
    map.get(field).map(|v| v == "1").unwrap_or(false)
}

/// Flatten an update into `(field, value)` pairs; absent fields produce no
/// pair and therefore no write.
fn update_fields(update: &CallStateUpdate) -> Result<Vec<(String, String)>, StoreError> {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut push_bool = |name: &str, v: Option<bool>| {
        if let Some(v) = v {
            fields.push((name.to_string(), bool_field(v).to_string()));
        }
    };
    push_bool("user_has_spoken", update.user_has_spoken);
    push_bool("ai_has_responded", update.ai_has_responded);
    push_bool("greeting_in_flight", update.greeting_in_flight);
    push_bool("voicemail_detected", update.voicemail_detected);
    push_bool("agent_generating_response", update.agent_generating_response);
    push_bool("interrupt_in_progress", update.interrupt_in_progress);
    push_bool("silence_greeting_triggered", update.silence_greeting_triggered);
    push_bool("session_ready", update.session_ready);

    if let Some(at) = update.agent_last_spoke_at {
        fields.push(("agent_last_spoke_at".to_string(), at.to_rfc3339()));
    }
    if let Some(end) = update.playback_expected_end {
        fields.push(("playback_expected_end".to_string(), end.to_string()));
    }
    if let Some(ref texts) = update.recent_agent_texts {
        fields.push((
            "recent_agent_texts".to_string(),
            serde_json::to_string(texts)?,
        ));
    }
    if let Some(ref id) = update.comfort_noise_playback_id {
        fields.push((
            "comfort_noise_playback_id".to_string(),
            id.clone().unwrap_or_default(),
        ));
    }
    Ok(fields)
}

fn entry_from_hash(
    map: HashMap<String, String>,
    playback_ids: Vec<String>,
) -> CallStateEntry {
    CallStateEntry {
        user_has_spoken: parse_bool(&map, "user_has_spoken"),
        ai_has_responded: parse_bool(&map, "ai_has_responded"),
        greeting_in_flight: parse_bool(&map, "greeting_in_flight"),
        voicemail_detected: parse_bool(&map, "voicemail_detected"),
        agent_generating_response: parse_bool(&map, "agent_generating_response"),
        current_playback_ids: playback_ids.into_iter().collect(),
        agent_last_spoke_at: map
            .get("agent_last_spoke_at")
            .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc)),
        playback_expected_end: map
            .get("playback_expected_end")
            .and_then(|v| v.parse().ok()),
        interrupt_in_progress: parse_bool(&map, "interrupt_in_progress"),
        silence_greeting_triggered: parse_bool(&map, "silence_greeting_triggered"),
        recent_agent_texts: map
            .get("recent_agent_texts")
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default(),
        comfort_noise_playback_id: map
            .get("comfort_noise_playback_id")
            .filter(|v| !v.is_empty())
            .cloned(),
        session_ready: parse_bool(&map, "session_ready"),
    }
}

#[async_trait]
impl CallStateStore for RedisCallStateStore {
    async fn get(&self, call_id: &str) -> Result<Option<CallStateEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(Self::hash_key(call_id)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        let playback_ids: Vec<String> = conn.smembers(Self::playbacks_key(call_id)).await?;
        Ok(Some(entry_from_hash(map, playback_ids)))
    }

    async fn merge(&self, call_id: &str, update: CallStateUpdate) -> Result<(), StoreError> {
        let fields = update_fields(&update)?;
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let key = Self::hash_key(call_id);
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.expire(&key, CALL_STATE_TTL_SECS as i64).await?;
        Ok(())
    }

    async fn add_playback_id(&self, call_id: &str, playback_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::playbacks_key(call_id);
        let _: () = conn.sadd(&key, playback_id).await?;
        let _: () = conn.expire(&key, CALL_STATE_TTL_SECS as i64).await?;
        Ok(())
    }

    async fn remove_playback_id(
        &self,
        call_id: &str,
        playback_id: &str,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::playbacks_key(call_id);
        let _: () = conn.srem(&key, playback_id).await?;
        let remaining: usize = conn.scard(&key).await?;
        Ok(remaining)
    }

    async fn remove(&self, call_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(vec![Self::hash_key(call_id), Self::playbacks_key(call_id)])
            .await?;
        Ok(())
    }

    async fn publish_flag(&self, call_id: &str, flag: ControlFlag) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(Self::flags_channel(call_id), flag.as_str())
            .await?;
        Ok(())
    }

    async fn subscribe_flags(
        &self,
        call_id: &str,
    ) -> Result<mpsc::Receiver<ControlFlag>, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::flags_channel(call_id)).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                let Some(flag) = ControlFlag::parse(&payload) else {
                    continue;
                };
                if tx.send(flag).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_fields_skips_absent() {
        let update = CallStateUpdate::new().user_has_spoken(true);
        let fields = update_fields(&update).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0], ("user_has_spoken".to_string(), "1".to_string()));
    }

    #[test]
    fn test_entry_from_hash_roundtrip() {
        let mut map = HashMap::new();
        map.insert("user_has_spoken".to_string(), "1".to_string());
        map.insert("voicemail_detected".to_string(), "0".to_string());
        map.insert(
            "recent_agent_texts".to_string(),
            r#"["Hi there.","How can I help?"]"#.to_string(),
        );
        map.insert("playback_expected_end".to_string(), "1712345678.5".to_string());

        let entry = entry_from_hash(map, vec!["pb-1".to_string()]);
        assert!(entry.user_has_spoken);
        assert!(!entry.voicemail_detected);
        assert_eq!(entry.recent_agent_texts.len(), 2);
        assert_eq!(entry.playback_expected_end, Some(1712345678.5));
        assert!(entry.current_playback_ids.contains("pb-1"));
    }
}

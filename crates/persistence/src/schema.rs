//! ScyllaDB schema creation

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // One row per call
    let calls_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.calls (
            call_id TEXT,
            agent_id TEXT,
            direction TEXT,
            from_number TEXT,
            to_number TEXT,
            created_at_ms BIGINT,
            started_at_ms BIGINT,
            answered_at_ms BIGINT,
            ended_at_ms BIGINT,
            end_reason TEXT,
            PRIMARY KEY (call_id)
        )
    "#,
        keyspace
    );
    session
        .query_unpaged(calls_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create calls table: {}", e)))?;

    // Append-only transcript entries, clustered in order
    let transcript_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_transcript (
            call_id TEXT,
            seq INT,
            role TEXT,
            text TEXT,
            created_at_ms BIGINT,
            PRIMARY KEY ((call_id), seq)
        ) WITH CLUSTERING ORDER BY (seq ASC)
    "#,
        keyspace
    );
    session
        .query_unpaged(transcript_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("failed to create call_transcript table: {}", e))
        })?;

    // Append-only per-turn latency log
    let logs_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_logs (
            call_id TEXT,
            seq INT,
            latency_json TEXT,
            created_at_ms BIGINT,
            PRIMARY KEY ((call_id), seq)
        ) WITH CLUSTERING ORDER BY (seq ASC)
    "#,
        keyspace
    );
    session
        .query_unpaged(logs_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("failed to create call_logs table: {}", e))
        })?;

    // Agent configuration snapshots
    let agents_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.agents (
            agent_id TEXT,
            config_json TEXT,
            updated_at_ms BIGINT,
            PRIMARY KEY (agent_id)
        )
    "#,
        keyspace
    );
    session
        .query_unpaged(agents_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("failed to create agents table: {}", e))
        })?;

    Ok(())
}

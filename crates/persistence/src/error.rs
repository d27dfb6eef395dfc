//! Persistence error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("connection: {0}")]
    Connection(#[from] scylla::transport::errors::NewSessionError),

    #[error("query: {0}")]
    Query(#[from] scylla::transport::errors::QueryError),

    #[error("schema: {0}")]
    SchemaError(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row decode: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

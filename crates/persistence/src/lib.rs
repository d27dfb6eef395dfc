//! Durable persistence for call data
//!
//! Provides append-only storage for:
//! - Call records (one row per call, finalized with an end reason)
//! - Transcript entries (appended incrementally, never rewritten)
//! - Per-turn latency log entries
//! - Agent configuration snapshots (read at call start)
//!
//! `ScyllaCallLogStore::connect` takes the process settings, opens the
//! cluster session, and bootstraps the schema; `InMemoryCallLogStore` backs
//! tests and single-node development.

pub mod calls;
pub mod error;
pub mod schema;

pub use calls::{CallLogStore, InMemoryCallLogStore, ScyllaCallLogStore};
pub use error::PersistenceError;

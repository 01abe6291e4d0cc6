//! Event journal abstraction for durable, append-only domain events.
//!
//! Reducers never write to storage themselves. They return
//! [`Effect::Append`](crate::effect::Effect::Append) descriptions carrying
//! [`JournalRecord`]s, and the runtime hands those to an [`EventJournal`].
//! On start-up the application replays [`EventJournal::load_all`] to rebuild
//! its in-memory state.
//!
//! # Implementations
//!
//! - `InMemoryJournal` (in `supportdesk-runtime`): default and test journal
//! - `PostgresJournal` (in `supportdesk-postgres`): durable storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Error, Debug, Clone)]
pub enum JournalError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The journal cannot currently accept writes.
    #[error("Journal unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// One event, serialized for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Identifier of the aggregate the event belongs to.
    pub stream_id: String,
    /// Stable event type name (used for diagnostics and filtering).
    pub event_type: String,
    /// Event body.
    pub payload: serde_json::Value,
    /// When the event was produced.
    pub recorded_at: DateTime<Utc>,
}

impl JournalRecord {
    /// Serialize `event` into a record for `stream_id`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Serialization`] if the event cannot be encoded.
    pub fn encode<T: Serialize>(
        stream_id: impl Into<String>,
        event_type: impl Into<String>,
        event: &T,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, JournalError> {
        Ok(Self {
            stream_id: stream_id.into(),
            event_type: event_type.into(),
            payload: serde_json::to_value(event)?,
            recorded_at,
        })
    }

    /// Deserialize the payload back into an event.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Serialization`] if the payload does not match `T`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, JournalError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A record together with the global sequence number the journal assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Global, strictly increasing position in the journal.
    pub sequence: i64,
    /// The stored record.
    pub record: JournalRecord,
}

/// Append-only storage for domain events.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so reducers can capture an `Arc<dyn EventJournal>` inside effects.
pub trait EventJournal: Send + Sync {
    /// Append records atomically, in order.
    ///
    /// Returns the sequence number of the last record written.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the batch could not be written. No record of
    /// the batch is visible after a failure.
    fn append(
        &self,
        records: Vec<JournalRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>>;

    /// Load every record in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the journal cannot be read.
    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>>;
}

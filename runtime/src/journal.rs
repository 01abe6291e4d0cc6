//! In-memory [`EventJournal`] used when no database is configured and in tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use supportdesk_core::journal::{EventJournal, JournalError, JournalRecord, StoredRecord};

/// Process-local journal. Records are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    records: Mutex<Vec<StoredRecord>>,
}

impl InMemoryJournal {
    /// Create an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored record, in sequence order
    #[must_use]
    pub fn snapshot(&self) -> Vec<StoredRecord> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventJournal for InMemoryJournal {
    fn append(
        &self,
        records: Vec<JournalRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>> {
        Box::pin(async move {
            let mut stored = self
                .records
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            let mut sequence = stored.last().map_or(0, |last| last.sequence);
            for record in records {
                sequence += 1;
                stored.push(StoredRecord { sequence, record });
            }
            Ok(sequence)
        })
    }

    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>> {
        Box::pin(async move { Ok(self.snapshot()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(stream: &str) -> JournalRecord {
        JournalRecord {
            stream_id: stream.to_string(),
            event_type: "noted".to_string(),
            payload: serde_json::json!({ "stream": stream }),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sequences_are_global_and_gapless() {
        let journal = InMemoryJournal::new();
        assert_eq!(journal.append(vec![record("a"), record("b")]).await.unwrap(), 2);
        assert_eq!(journal.append(vec![record("a")]).await.unwrap(), 3);

        let loaded = journal.load_all().await.unwrap();
        let sequences: Vec<i64> = loaded.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(loaded[1].record.stream_id, "b");
    }

    #[tokio::test]
    async fn empty_append_keeps_position() {
        let journal = InMemoryJournal::new();
        assert_eq!(journal.append(Vec::new()).await.unwrap(), 0);
        assert!(journal.is_empty());
    }
}

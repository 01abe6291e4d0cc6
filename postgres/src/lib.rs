//! `PostgreSQL` event journal for Supportdesk.
//!
//! Implements [`EventJournal`] on a single append-only `ticket_events` table:
//! a `BIGSERIAL` sequence gives the global order, the event body is stored as
//! `JSONB`. Appends run in one transaction so a batch is either fully visible
//! or not at all.
//!
//! # Example
//!
//! ```ignore
//! use supportdesk_postgres::PostgresJournal;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let journal = PostgresJournal::connect("postgres://localhost/support", 10).await?;
//!     journal.migrate().await?;
//!     let history = journal.load_all().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::future::Future;
use std::pin::Pin;
use supportdesk_core::journal::{EventJournal, JournalError, JournalRecord, StoredRecord};

/// Embedded schema migrations.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Journal backed by a `PostgreSQL` connection pool.
#[derive(Debug, Clone)]
pub struct PostgresJournal {
    pool: PgPool,
}

impl PostgresJournal {
    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Database`] if the pool cannot be created.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, JournalError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL journal");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), JournalError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn append_batch(&self, records: Vec<JournalRecord>) -> Result<i64, JournalError> {
        if records.is_empty() {
            return self.last_sequence().await;
        }

        let count = records.len();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;

        let mut last = 0_i64;
        for record in records {
            let row = sqlx::query(
                r"
                INSERT INTO ticket_events (stream_id, event_type, payload, recorded_at)
                VALUES ($1, $2, $3, $4)
                RETURNING sequence
                ",
            )
            .bind(&record.stream_id)
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(record.recorded_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;

            last = row
                .try_get("sequence")
                .map_err(|e| JournalError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;

        metrics::counter!("journal.postgres.appended").increment(count as u64);
        Ok(last)
    }

    async fn last_sequence(&self) -> Result<i64, JournalError> {
        let row = sqlx::query("SELECT COALESCE(MAX(sequence), 0) AS last FROM ticket_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;

        row.try_get("last")
            .map_err(|e| JournalError::Database(e.to_string()))
    }

    async fn load_everything(&self) -> Result<Vec<StoredRecord>, JournalError> {
        let rows = sqlx::query(
            r"
            SELECT sequence, stream_id, event_type, payload, recorded_at
            FROM ticket_events
            ORDER BY sequence ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| JournalError::Database(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &PgRow) -> Result<StoredRecord, JournalError> {
    let get_err = |e: sqlx::Error| JournalError::Database(e.to_string());

    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(get_err)?;
    Ok(StoredRecord {
        sequence: row.try_get("sequence").map_err(get_err)?,
        record: JournalRecord {
            stream_id: row.try_get("stream_id").map_err(get_err)?,
            event_type: row.try_get("event_type").map_err(get_err)?,
            payload: row.try_get("payload").map_err(get_err)?,
            recorded_at,
        },
    })
}

impl EventJournal for PostgresJournal {
    fn append(
        &self,
        records: Vec<JournalRecord>,
    ) -> Pin<Box<dyn Future<Output = Result<i64, JournalError>> + Send + '_>> {
        Box::pin(self.append_batch(records))
    }

    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredRecord>, JournalError>> + Send + '_>> {
        Box::pin(self.load_everything())
    }
}

//! SQLite implementation of [`TriggerLoader`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use cadence_core::{TriggerError, TriggerId, TriggerLoader, TriggerRecord, TriggerResult};

use crate::schema::init_schema;

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

/// Store failures, reported to the engine as persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Trigger {0} does not exist")]
    NotFound(TriggerId),

    #[error("Stored trigger {trigger_id} is corrupt: {message}")]
    Corrupt { trigger_id: TriggerId, message: String },
}

impl From<StoreError> for TriggerError {
    fn from(e: StoreError) -> Self {
        TriggerError::Persistence(e.to_string())
    }
}

fn query_error(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

/// SQLite-backed trigger store.
pub struct SqliteTriggerLoader {
    conn: Connection,
}

impl SqliteTriggerLoader {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Self::init(conn).await
    }

    /// Open or create a file-backed database, creating parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Connection(format!("{}: {e}", parent.display())))?;
        }
        let conn = Connection::open(&path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(path = %path.display(), "Opened trigger store");
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(query_error)?;
        Ok(Self { conn })
    }

    /// Number of stored triggers.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM triggers", [], |row| row.get(0))?;
                Ok(usize::try_from(n).unwrap_or(0))
            })
            .await
            .map_err(query_error)
    }

    async fn select(&self, sql: &'static str, since_ms: Option<i64>) -> Result<Vec<TriggerRecord>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let map = |row: &rusqlite::Row<'_>| Ok((row.get::<_, TriggerId>(0)?, row.get::<_, String>(1)?));
                let rows = match since_ms {
                    Some(since) => stmt.query_map([since], map)?.collect::<Result<Vec<_>, _>>()?,
                    None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
                };
                Ok(rows)
            })
            .await
            .map_err(query_error)?;

        rows.into_iter()
            .map(|(id, data)| decode_row(id, &data))
            .collect()
    }
}

fn decode_row(id: TriggerId, data: &str) -> Result<TriggerRecord, StoreError> {
    let mut record = TriggerRecord::from_json(data).map_err(|e| StoreError::Corrupt {
        trigger_id: id,
        message: e.to_string(),
    })?;
    record.trigger_id = Some(id);
    Ok(record)
}

fn encode(record: &TriggerRecord) -> TriggerResult<String> {
    record.to_json()
}

#[async_trait]
impl TriggerLoader for SqliteTriggerLoader {
    async fn add_trigger(&self, record: &TriggerRecord) -> TriggerResult<TriggerId> {
        let mut record = record.clone();
        let source = record.source.clone();
        let modify_time = record.last_modify_time.timestamp_millis();
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO triggers (trigger_source, modify_time, data) VALUES (?1, ?2, '{}')",
                    params![source, modify_time],
                )?;
                let id = tx.last_insert_rowid();
                record.trigger_id = Some(id);
                let data = encode(&record).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                tx.execute("UPDATE triggers SET data = ?1 WHERE trigger_id = ?2", params![data, id])?;
                tx.commit()?;
                Ok(id)
            })
            .await
            .map_err(query_error)?;
        debug!(trigger_id = id, "Stored trigger");
        Ok(id)
    }

    async fn update_trigger(&self, record: &TriggerRecord) -> TriggerResult<()> {
        let id = record
            .trigger_id
            .ok_or_else(|| TriggerError::Persistence("cannot update a trigger without an id".into()))?;
        let data = encode(record)?;
        let source = record.source.clone();
        let modify_time = record.last_modify_time.timestamp_millis();
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE triggers SET trigger_source = ?1, modify_time = ?2, data = ?3 WHERE trigger_id = ?4",
                    params![source, modify_time, data, id],
                )?)
            })
            .await
            .map_err(query_error)?;
        if changed == 0 {
            return Err(StoreError::NotFound(id).into());
        }
        Ok(())
    }

    async fn remove_trigger(&self, id: TriggerId) -> TriggerResult<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM triggers WHERE trigger_id = ?1", [id])?;
                Ok(())
            })
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn load_trigger(&self, id: TriggerId) -> TriggerResult<Option<TriggerRecord>> {
        let data = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT data FROM triggers WHERE trigger_id = ?1", [id], |row| {
                        row.get::<_, String>(0)
                    })
                    .optional()?)
            })
            .await
            .map_err(query_error)?;
        Ok(data.map(|d| decode_row(id, &d)).transpose()?)
    }

    async fn load_triggers(&self) -> TriggerResult<Vec<TriggerRecord>> {
        Ok(self
            .select("SELECT trigger_id, data FROM triggers ORDER BY trigger_id", None)
            .await?)
    }

    async fn load_updated_triggers(&self, since: DateTime<Utc>) -> TriggerResult<Vec<TriggerRecord>> {
        Ok(self
            .select(
                "SELECT trigger_id, data FROM triggers WHERE modify_time > ?1 ORDER BY trigger_id",
                Some(since.timestamp_millis()),
            )
            .await?)
    }
}

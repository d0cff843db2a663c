//! Identity record lookup by identity key.

use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_rusqlite::Connection;

/// Identity metadata returned for a match. All fields are passed through
/// as stored; missing fields read as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fecha_nacimiento: String,
    #[serde(default)]
    pub tlf_emergencia: String,
    #[serde(default)]
    pub cedula: String,
    #[serde(default)]
    pub img_url: String,
}

/// An identity record together with its key, as imported and listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedRecord {
    pub key: String,
    #[serde(flatten)]
    pub record: IdentityRecord,
}

/// Key → record lookup. A missing record is `Ok(None)`, not an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<IdentityRecord>, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identity_records (
    key              TEXT PRIMARY KEY NOT NULL,
    label            TEXT,
    fecha_nacimiento TEXT,
    tlf_emergencia   TEXT,
    cedula           TEXT,
    img_url          TEXT
);
";

const SELECT_COLUMNS: &str = "key, label, fecha_nacimiento, tlf_emergencia, cedula, img_url";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<KeyedRecord> {
    let text = |idx: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    };
    Ok(KeyedRecord {
        key: row.get(0)?,
        record: IdentityRecord {
            label: text(1)?,
            fecha_nacimiento: text(2)?,
            tlf_emergencia: text(3)?,
            cedula: text(4)?,
            img_url: text(5)?,
        },
    })
}

/// SQLite-backed identity record store.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Insert or replace the record stored under `key`.
    pub async fn put(&self, key: &str, record: IdentityRecord) -> Result<(), StoreError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO identity_records
                         (key, label, fecha_nacimiento, tlf_emergencia, cedula, img_url)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    (
                        &key,
                        &record.label,
                        &record.fecha_nacimiento,
                        &record.tlf_emergencia,
                        &record.cedula,
                        &record.img_url,
                    ),
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Remove a record. Returns whether one existed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM identity_records WHERE key = ?1", [&key])?))
            .await?;
        Ok(removed > 0)
    }

    /// All records ordered by key.
    pub async fn list(&self) -> Result<Vec<KeyedRecord>, StoreError> {
        let records = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM identity_records ORDER BY key"
                ))?;
                let rows = stmt.query_map([], row_to_record)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let key = key.to_string();
        let record = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {SELECT_COLUMNS} FROM identity_records WHERE key = ?1"
                ))?;
                Ok(stmt.query_row([&key], row_to_record).optional()?)
            })
            .await?;
        Ok(record.map(|r| r.record))
    }
}

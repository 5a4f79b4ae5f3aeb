//! Partitioned record storage.
//!
//! A `Partition` mirrors the browser cache API: records are addressed by
//! a request key inside a named partition, `put` overwrites, and deleting
//! the partition drops everything in it (including expiration metadata).

use super::connection::CacheDb;
use crate::Error;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// One stored record: an opaque body plus the metadata of its capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
    /// RFC 3339 capture timestamp (UTC).
    pub captured_at: String,
}

impl StoredRecord {
    /// Build a record stamped with the current time.
    pub fn new(url: impl Into<String>, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            content_type: content_type.into(),
            body,
            captured_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Handle to one named partition.
#[derive(Clone, Debug)]
pub struct Partition {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open (creating if needed) a named partition.
    pub async fn open_partition(&self, name: &str) -> Result<Partition, Error> {
        let partition = Partition { db: self.clone(), name: name.to_string() };
        let owned = partition.name.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &owned)?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(partition)
    }

    /// Names of every existing partition, oldest first.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and everything stored in it.
    ///
    /// Returns false if the partition did not exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every partition. Returns the number removed.
    pub async fn clear_all(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM partitions", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

pub(super) fn ensure_partition(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub(super) fn upsert_record(
    conn: &rusqlite::Connection, name: &str, key: &str, record: &StoredRecord,
) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO sse_records (partition_name, cache_key, url, content_type, body, captured_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(partition_name, cache_key) DO UPDATE SET
             url = excluded.url,
             content_type = excluded.content_type,
             body = excluded.body,
             captured_at = excluded.captured_at",
        params![name, key, record.url, record.content_type, record.body, record.captured_at],
    )?;
    Ok(())
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn db(&self) -> &CacheDb {
        &self.db
    }

    /// Look up the record stored under `key`.
    pub async fn match_record(&self, key: &str) -> Result<Option<StoredRecord>, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<Option<StoredRecord>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, content_type, body, captured_at
                     FROM sse_records WHERE partition_name = ?1 AND cache_key = ?2",
                )?;

                let result = stmt.query_row(params![name, key], |row| {
                    Ok(StoredRecord {
                        url: row.get(0)?,
                        content_type: row.get(1)?,
                        body: row.get(2)?,
                        captured_at: row.get(3)?,
                    })
                });

                match result {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store `record` under `key`, replacing any previous record.
    ///
    /// Recreates the partition if it was cleared since it was opened.
    pub async fn put(&self, key: &str, record: &StoredRecord) -> Result<(), Error> {
        let name = self.name.clone();
        let key = key.to_string();
        let record = record.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &name)?;
                upsert_record(conn, &name, &key, &record)
            })
            .await
            .map_err(Error::from)
    }

    /// Every key in the partition, in first-insertion order.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT cache_key FROM sse_records WHERE partition_name = ?1 ORDER BY rowid")?;
                let keys = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the record (and its expiration metadata) stored under `key`.
    ///
    /// Returns false if nothing was stored.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM cache_expiration WHERE partition_name = ?1 AND cache_key = ?2",
                    params![name, key],
                )?;
                let count = tx.execute(
                    "DELETE FROM sse_records WHERE partition_name = ?1 AND cache_key = ?2",
                    params![name, key],
                )?;
                tx.commit()?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}

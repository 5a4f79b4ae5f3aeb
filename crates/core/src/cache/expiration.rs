//! Count and age eviction for a partition.
//!
//! Every successful write stamps its key with a timestamp and a per-partition
//! sequence number. Eviction first drops keys older than the age budget, then
//! the oldest survivors until the count budget fits. Equal timestamps are
//! ordered by sequence, so the most recently written key always wins.

use std::time::Duration;

use super::records::{Partition, StoredRecord, ensure_partition, upsert_record};
use crate::Error;
use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::{params, rusqlite};

fn stamp(conn: &rusqlite::Connection, name: &str, key: &str, written_at_ms: i64) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO cache_expiration (partition_name, cache_key, written_at_ms, seq)
         VALUES (?1, ?2, ?3,
             (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_expiration WHERE partition_name = ?1))
         ON CONFLICT(partition_name, cache_key) DO UPDATE SET
             written_at_ms = excluded.written_at_ms,
             seq = excluded.seq",
        params![name, key, written_at_ms],
    )?;
    Ok(())
}

/// Count and age budget for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub max_entries: usize,
    pub max_age: Duration,
}

impl ExpirationPolicy {
    pub fn new(max_entries: usize, max_age_seconds: u64) -> Self {
        Self { max_entries, max_age: Duration::from_secs(max_age_seconds) }
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(50, 24 * 60 * 60)
    }
}

/// Keyed write-timestamp bookkeeping for a single partition.
#[derive(Clone, Debug)]
pub struct ExpirationTracker {
    partition: Partition,
    policy: ExpirationPolicy,
}

impl ExpirationTracker {
    pub fn new(partition: Partition, policy: ExpirationPolicy) -> Self {
        Self { partition, policy }
    }

    pub fn policy(&self) -> ExpirationPolicy {
        self.policy
    }

    /// Stamp `key` as written now.
    pub async fn record_write(&self, key: &str) -> Result<(), Error> {
        self.record_write_at(key, Utc::now()).await
    }

    /// Stamp `key` as written at `at`, inserting it if new.
    pub async fn record_write_at(&self, key: &str, at: DateTime<Utc>) -> Result<(), Error> {
        let name = self.partition.name().to_string();
        let key = key.to_string();
        let written_at_ms = at.timestamp_millis();
        self.partition
            .db()
            .conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &name)?;
                stamp(conn, &name, &key, written_at_ms)
            })
            .await
            .map_err(Error::from)
    }

    /// Store `record` under `key` and stamp it as written now.
    ///
    /// Both happen in one transaction, so a record never exists without
    /// its expiration row.
    pub async fn store(&self, key: &str, record: &StoredRecord) -> Result<(), Error> {
        let name = self.partition.name().to_string();
        let key = key.to_string();
        let record = record.clone();
        let written_at_ms = Utc::now().timestamp_millis();
        self.partition
            .db()
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &name)?;
                upsert_record(&tx, &name, &key, &record)?;
                stamp(&tx, &name, &key, written_at_ms)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Last write time recorded for `key`.
    pub async fn timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let name = self.partition.name().to_string();
        let key = key.to_string();
        let millis = self
            .partition
            .db()
            .conn
            .call(move |conn| -> Result<Option<i64>, Error> {
                let result = conn.query_row(
                    "SELECT written_at_ms FROM cache_expiration WHERE partition_name = ?1 AND cache_key = ?2",
                    params![name, key],
                    |row| row.get(0),
                );
                match result {
                    Ok(ms) => Ok(Some(ms)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        Ok(millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    /// Evict with the configured policy as of now.
    ///
    /// Returns the evicted keys, age-expired first.
    pub async fn expire_entries(&self) -> Result<Vec<String>, Error> {
        self.expire_entries_at(Utc::now()).await
    }

    /// Evict with the configured policy as of `now`.
    pub async fn expire_entries_at(&self, now: DateTime<Utc>) -> Result<Vec<String>, Error> {
        let name = self.partition.name().to_string();
        let max_age_ms = i64::try_from(self.policy.max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = now.timestamp_millis().saturating_sub(max_age_ms);
        let max_entries = i64::try_from(self.policy.max_entries).unwrap_or(i64::MAX);

        let evicted = self
            .partition
            .db()
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;

                let mut evicted: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT cache_key FROM cache_expiration
                         WHERE partition_name = ?1 AND written_at_ms < ?2
                         ORDER BY written_at_ms ASC, seq ASC",
                    )?;
                    let keys = stmt
                        .query_map(params![name, cutoff_ms], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?;
                    keys
                };

                let over_budget: Vec<String> = {
                    let mut stmt = tx.prepare(
                        "SELECT cache_key FROM cache_expiration
                         WHERE partition_name = ?1 AND written_at_ms >= ?2
                         ORDER BY written_at_ms DESC, seq DESC
                         LIMIT -1 OFFSET ?3",
                    )?;
                    let keys = stmt
                        .query_map(params![name, cutoff_ms, max_entries], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?;
                    keys
                };
                evicted.extend(over_budget.into_iter().rev());

                for key in &evicted {
                    tx.execute(
                        "DELETE FROM sse_records WHERE partition_name = ?1 AND cache_key = ?2",
                        params![name, key],
                    )?;
                    tx.execute(
                        "DELETE FROM cache_expiration WHERE partition_name = ?1 AND cache_key = ?2",
                        params![name, key],
                    )?;
                }

                tx.commit()?;
                Ok(evicted)
            })
            .await
            .map_err(Error::from)?;

        if !evicted.is_empty() {
            tracing::debug!(partition = self.partition.name(), count = evicted.len(), "evicted cache entries");
        }

        Ok(evicted)
    }
}

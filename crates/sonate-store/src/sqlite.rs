//! SQLite implementation of [`LinkStore`].
//!
//! Uses rusqlite with bundled SQLite. Links are written verbatim so that a
//! persisted chain can be re-audited later, tampering included.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use sonate_core::{
    canonicalize, now_millis, CanonicalValue, ChainIntegrityError, ChainLink, HashChain,
    InsertResult, LinkStore, Sha256Hash,
};

use crate::error::{Result, StoreError};
use crate::migration;

const SELECT_LINK: &str =
    "SELECT hash, previous_hash, payload, timestamp, signature, metadata FROM chain_links";

/// SQLite-backed link store.
///
/// Thread-safe via an internal Mutex.
#[derive(Clone)]
pub struct SqliteLinkStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLinkStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn)
    }
}

/// Open (or create) a persisted chain at `path`.
pub fn open_chain(path: impl AsRef<Path>) -> Result<HashChain<SqliteLinkStore>> {
    Ok(HashChain::with_store(SqliteLinkStore::open(path)?))
}

fn insert_row(conn: &Connection, link: &ChainLink) -> Result<InsertResult> {
    let metadata = link
        .metadata
        .as_ref()
        .map(|map| {
            canonicalize(&CanonicalValue::Object(map.clone()))
                .map_err(|e| StoreError::Serialization(e.to_string()))
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
                })
        })
        .transpose()?;

    let changed = conn.execute(
        "INSERT OR IGNORE INTO chain_links (
            hash, previous_hash, payload, timestamp, signature, metadata, ingested_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            link.hash.as_bytes().as_slice(),
            link.previous_hash.as_bytes().as_slice(),
            link.payload.as_ref(),
            link.timestamp,
            link.signature.as_deref(),
            metadata,
            now_millis(),
        ],
    )?;

    Ok(if changed == 0 {
        InsertResult::AlreadyExists
    } else {
        InsertResult::Inserted
    })
}

struct LinkRow {
    hash: Vec<u8>,
    previous_hash: Vec<u8>,
    payload: Vec<u8>,
    timestamp: i64,
    signature: Option<String>,
    metadata: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkRow> {
    Ok(LinkRow {
        hash: row.get("hash")?,
        previous_hash: row.get("previous_hash")?,
        payload: row.get("payload")?,
        timestamp: row.get("timestamp")?,
        signature: row.get("signature")?,
        metadata: row.get("metadata")?,
    })
}

fn hash_from_blob(column: &str, blob: Vec<u8>) -> Result<Sha256Hash> {
    let bytes: [u8; 32] = blob
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("{column} is not 32 bytes")))?;
    Ok(Sha256Hash::from_bytes(bytes))
}

impl TryFrom<LinkRow> for ChainLink {
    type Error = StoreError;

    fn try_from(row: LinkRow) -> Result<Self> {
        let metadata = row
            .metadata
            .map(|json| {
                serde_json::from_str::<BTreeMap<String, CanonicalValue>>(&json)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()?;

        Ok(ChainLink {
            hash: hash_from_blob("hash", row.hash)?,
            previous_hash: hash_from_blob("previous_hash", row.previous_hash)?,
            payload: Bytes::from(row.payload),
            timestamp: row.timestamp,
            signature: row.signature,
            metadata,
        })
    }
}

impl LinkStore for SqliteLinkStore {
    fn insert_link(&self, link: &ChainLink) -> std::result::Result<InsertResult, ChainIntegrityError> {
        Ok(self.with_conn(|conn| insert_row(conn, link))?)
    }

    fn insert_links(
        &self,
        links: &[ChainLink],
    ) -> std::result::Result<Vec<InsertResult>, ChainIntegrityError> {
        let results = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let results = links
                .iter()
                .map(|link| insert_row(&tx, link))
                .collect::<Result<Vec<_>>>()?;
            tx.commit()?;
            Ok(results)
        });

        if let Err(e) = &results {
            tracing::warn!(error = %e, count = links.len(), "rolled back link batch");
        }
        Ok(results?)
    }

    fn get_link(
        &self,
        hash: &Sha256Hash,
    ) -> std::result::Result<Option<ChainLink>, ChainIntegrityError> {
        let link = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("{SELECT_LINK} WHERE hash = ?1"),
                    params![hash.as_bytes().as_slice()],
                    read_row,
                )
                .optional()?;
            row.map(ChainLink::try_from).transpose()
        })?;
        Ok(link)
    }

    fn contains_link(&self, hash: &Sha256Hash) -> std::result::Result<bool, ChainIntegrityError> {
        let found = self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chain_links WHERE hash = ?1",
                    params![hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })?;
        Ok(found)
    }

    fn links(&self) -> std::result::Result<Vec<ChainLink>, ChainIntegrityError> {
        let links = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_LINK} ORDER BY seq"))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ChainLink::try_from).collect::<Result<Vec<_>>>()
        })?;
        Ok(links)
    }

    fn link_count(&self) -> std::result::Result<usize, ChainIntegrityError> {
        let count = self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM chain_links", [], |row| row.get(0))?;
            Ok(count as usize)
        })?;
        Ok(count)
    }
}

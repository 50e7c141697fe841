use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use simcache_core::errors::{ErrorInfo, SimError};
use simcache_fp::Fingerprint;

use crate::record::RunSummary;

pub(crate) const INDEX_SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Filter accepted by `RunStore::list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            limit: None,
        }
    }
}

fn index_error(code: &str, err: impl ToString) -> SimError {
    SimError::Index(ErrorInfo::new(code, err.to_string()))
}

/// Returns true when SQLite reports the file itself as damaged rather than
/// merely busy.
pub(crate) fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if matches!(inner.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

/// SQLite index mapping fingerprints to unit locations and tags.
///
/// A fresh connection is opened per operation; SQLite's own locking
/// serializes concurrent writers from any number of processes.
#[derive(Debug, Clone)]
pub(crate) struct RunIndex {
    path: PathBuf,
}

impl RunIndex {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn connection(&self) -> Result<Connection, SimError> {
        self.connect().map_err(|err| {
            SimError::Index(
                ErrorInfo::new("store.index_open", err.to_string())
                    .with_context("path", self.path.display().to_string()),
            )
        })
    }

    /// Creates tables if needed. Errors are returned raw so the caller can
    /// tell corruption apart from contention.
    pub(crate) fn init(&self) -> Result<(), rusqlite::Error> {
        let conn = self.connect()?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS meta(version INTEGER NOT NULL);
            CREATE TABLE IF NOT EXISTS runs(
                fingerprint TEXT PRIMARY KEY,
                location TEXT NOT NULL,
                created_at TEXT NOT NULL,
                code_version TEXT NOT NULL,
                seed INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS run_tags(
                fingerprint TEXT NOT NULL,
                tag TEXT NOT NULL,
                PRIMARY KEY(fingerprint, tag),
                FOREIGN KEY(fingerprint) REFERENCES runs(fingerprint)
            );
            CREATE INDEX IF NOT EXISTS runs_created_at ON runs(created_at);
            CREATE INDEX IF NOT EXISTS run_tags_tag ON run_tags(tag);
            COMMIT;",
        )?;
        conn.execute(
            "INSERT INTO meta(version) SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM meta)",
            params![INDEX_SCHEMA_VERSION],
        )?;
        Ok(())
    }

    pub(crate) fn schema_version(&self) -> Result<Option<i64>, SimError> {
        let conn = self.connection()?;
        conn.query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(|err| index_error("store.index_schema", err))
    }

    pub(crate) fn location(&self, fp: &Fingerprint) -> Result<Option<String>, SimError> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT location FROM runs WHERE fingerprint = ?",
            [fp.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| index_error("store.index_lookup", err))
    }

    /// Inserts one run. Re-inserting an indexed fingerprint is a no-op.
    pub(crate) fn insert(&self, summary: &RunSummary, location: &str) -> Result<(), SimError> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|err| index_error("store.index_transaction", err))?;
        insert_row(&tx, summary, location)?;
        tx.commit()
            .map_err(|err| index_error("store.index_commit", err))
    }

    /// Replaces the whole index with `rows` in one transaction.
    pub(crate) fn replace_all(&self, rows: &[(RunSummary, String)]) -> Result<(), SimError> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|err| index_error("store.index_transaction", err))?;
        tx.execute_batch("DELETE FROM run_tags; DELETE FROM runs;")
            .map_err(|err| index_error("store.index_clear", err))?;
        for (summary, location) in rows {
            insert_row(&tx, summary, location)?;
        }
        tx.commit()
            .map_err(|err| index_error("store.index_commit", err))
    }

    pub(crate) fn list(&self, filter: &ListFilter) -> Result<Vec<RunSummary>, SimError> {
        let conn = self.connection()?;
        let mut sql = String::from(
            "SELECT r.fingerprint, r.created_at, r.code_version, r.seed FROM runs r",
        );
        if filter.tag.is_some() {
            sql.push_str(
                " WHERE EXISTS (SELECT 1 FROM run_tags t WHERE t.fingerprint = r.fingerprint AND t.tag = ?1)",
            );
        }
        sql.push_str(" ORDER BY r.created_at DESC, r.fingerprint ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|err| index_error("store.index_prepare", err))?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, String, i64)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        };
        let rows = match &filter.tag {
            Some(tag) => stmt.query_map([tag], map_row),
            None => stmt.query_map([], map_row),
        }
        .map_err(|err| index_error("store.index_query", err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| index_error("store.index_row", err))?;

        let mut tag_stmt = conn
            .prepare("SELECT tag FROM run_tags WHERE fingerprint = ? ORDER BY tag")
            .map_err(|err| index_error("store.index_prepare", err))?;
        let mut summaries = Vec::with_capacity(rows.len());
        for (fingerprint, created_at, code_version, seed) in rows {
            let tags = tag_stmt
                .query_map([&fingerprint], |row| row.get::<_, String>(0))
                .map_err(|err| index_error("store.index_query", err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| index_error("store.index_row", err))?;
            summaries.push(RunSummary {
                fingerprint: Fingerprint::parse(&fingerprint).map_err(|_| {
                    index_error("store.index_row", format!("malformed fingerprint {fingerprint}"))
                })?,
                created_at,
                tags,
                code_version,
                seed: seed as u64,
            });
        }
        Ok(summaries)
    }

    /// Fingerprints starting with `prefix`, at most `limit` of them.
    pub(crate) fn with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, SimError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT fingerprint FROM runs WHERE fingerprint LIKE ?1 || '%' ORDER BY fingerprint LIMIT ?2")
            .map_err(|err| index_error("store.index_prepare", err))?;
        let rows = stmt
            .query_map(params![prefix, limit as i64], |row| row.get::<_, String>(0))
            .map_err(|err| index_error("store.index_query", err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| index_error("store.index_row", err))
    }

    pub(crate) fn all_fingerprints(&self) -> Result<Vec<String>, SimError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT fingerprint FROM runs ORDER BY fingerprint")
            .map_err(|err| index_error("store.index_prepare", err))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|err| index_error("store.index_query", err))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| index_error("store.index_row", err))
    }
}

fn insert_row(conn: &Connection, summary: &RunSummary, location: &str) -> Result<(), SimError> {
    conn.execute(
        "INSERT OR IGNORE INTO runs(fingerprint, location, created_at, code_version, seed)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            summary.fingerprint.as_str(),
            location,
            &summary.created_at,
            &summary.code_version,
            // SQLite integers are signed; the bit pattern round-trips.
            summary.seed as i64,
        ],
    )
    .map_err(|err| index_error("store.index_insert", err))?;
    for tag in &summary.tags {
        conn.execute(
            "INSERT OR IGNORE INTO run_tags(fingerprint, tag) VALUES (?1, ?2)",
            params![summary.fingerprint.as_str(), tag],
        )
        .map_err(|err| index_error("store.index_insert", err))?;
    }
    Ok(())
}

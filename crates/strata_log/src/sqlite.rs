//! # SQLite Change Store
//!
//! Append-only `events` table plus the spatial query engine.
//!
//! ## Schema
//!
//! ```text
//! events
//! ├── event_id    INTEGER PK AUTOINCREMENT   insertion order
//! ├── world, x, y, z                         indexed location
//! ├── timestamp   INTEGER                    ms since epoch
//! ├── source      TEXT                       source name
//! ├── type        TEXT                       subject tag
//! ├── from_value, to_value TEXT              serialized subject values
//! ├── old_state, new_state BLOB              subject state blobs
//! └── reason      TEXT                       reason name
//! ```
//!
//! ## Queries
//!
//! Results are always ordered by `event_id DESC` (most recent first). A
//! distinct query keeps, per location, only the row with the smallest
//! `event_id` among the rows that pass every filter. The restriction is a
//! correlated sub-query so `LIMIT` counts distinct rows.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use strata_core::{
    Change, ChangeReason, ChangeSubject, Changes, Location, ResolvedQuery,
};

use crate::backend::{ChangeBackend, ChangeBatch, NameSourceResolver, SourceResolver};
use crate::error::{LogError, LogResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        event_id   INTEGER PRIMARY KEY AUTOINCREMENT,
        world      TEXT    NOT NULL,
        x          INTEGER NOT NULL,
        y          INTEGER NOT NULL,
        z          INTEGER NOT NULL,
        timestamp  INTEGER NOT NULL,
        source     TEXT    NOT NULL,
        type       TEXT    NOT NULL,
        from_value TEXT    NOT NULL,
        to_value   TEXT    NOT NULL,
        old_state  BLOB    NOT NULL,
        new_state  BLOB    NOT NULL,
        reason     TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS events_location ON events (world, x, z, y);
";

const INSERT: &str = "
    INSERT INTO events
        (world, x, y, z, timestamp, source, type, from_value, to_value, old_state, new_state, reason)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
";

const COLUMNS: &str = "world, x, y, z, timestamp, source, type, from_value, to_value, \
                       old_state, new_state, reason";

/// Raw row as read from the table, before resolution.
struct EventRow {
    world: String,
    x: i32,
    y: i32,
    z: i32,
    timestamp: i64,
    source: String,
    kind: String,
    from: String,
    to: String,
    old_state: Vec<u8>,
    new_state: Vec<u8>,
    reason: String,
}

impl EventRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            world: row.get(0)?,
            x: row.get(1)?,
            y: row.get(2)?,
            z: row.get(3)?,
            timestamp: row.get(4)?,
            source: row.get(5)?,
            kind: row.get(6)?,
            from: row.get(7)?,
            to: row.get(8)?,
            old_state: row.get(9)?,
            new_state: row.get(10)?,
            reason: row.get(11)?,
        })
    }
}

struct StoreInner {
    conn: Mutex<Connection>,
    resolver: Box<dyn SourceResolver>,
}

/// SQLite-backed change store. Clones share one connection.
#[derive(Clone)]
pub struct SqliteChangeStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SqliteChangeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChangeStore").finish_non_exhaustive()
    }
}

impl SqliteChangeStore {
    /// Opens (or creates) a database file and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> LogResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::info!("Opened change store at {}", path.as_ref().display());
        Self::with_connection(conn, NameSourceResolver)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> LogResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, NameSourceResolver)
    }

    /// Wraps an existing connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn with_connection(
        conn: Connection,
        resolver: impl SourceResolver + 'static,
    ) -> LogResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                resolver: Box::new(resolver),
            }),
        })
    }

    /// Number of rows in the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn event_count(&self) -> LogResult<u64> {
        let conn = self.inner.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Runs a query off the calling thread.
    ///
    /// Must be awaited inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Storage`] if the query fails and
    /// [`LogError::QueryTask`] if the blocking task is lost.
    pub async fn query_changes(&self, query: ResolvedQuery) -> LogResult<Vec<Change>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.query_blocking(&query))
            .await
            .map_err(|e| LogError::QueryTask(e.to_string()))?
    }

    /// Runs a query and wraps the result as a change set.
    ///
    /// # Errors
    ///
    /// See [`SqliteChangeStore::query_changes`].
    pub async fn lookup(&self, query: ResolvedQuery) -> LogResult<Changes> {
        let changes = self.query_changes(query.clone()).await?;
        Ok(Changes::from_query(&query, changes))
    }

    /// Runs a query on the calling thread.
    ///
    /// Rows whose columns cannot be converted, or whose values do not form
    /// a valid change, are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Storage`] if the query fails.
    pub fn query_blocking(&self, query: &ResolvedQuery) -> LogResult<Vec<Change>> {
        let sql = select_sql(query);
        let args = select_args(query);

        let conn = self.inner.conn.lock();
        let mut statement = conn.prepare_cached(&sql)?;
        let rows = statement.query_map(params_from_iter(args), EventRow::read)?;

        let mut changes = Vec::new();
        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(
                    e @ (rusqlite::Error::FromSqlConversionFailure(..)
                    | rusqlite::Error::IntegralValueOutOfRange(..)
                    | rusqlite::Error::InvalidColumnType(..)),
                ) => {
                    tracing::warn!("Skipping unreadable change row: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match self.decode(row) {
                Ok(change) => changes.push(change),
                Err(reason) => tracing::warn!("Skipping change row: {}", reason),
            }
        }
        tracing::debug!(
            "Query in {} returned {} changes (distinct={})",
            query.world,
            changes.len(),
            query.distinct
        );
        Ok(changes)
    }

    fn decode(&self, row: EventRow) -> Result<Change, String> {
        let source = self
            .inner
            .resolver
            .resolve(&row.source)
            .ok_or_else(|| format!("invalid source {:?}", row.source))?;
        let subject = ChangeSubject::reconstruct(
            &row.kind,
            &row.from,
            &row.to,
            &row.old_state,
            &row.new_state,
        )
        .map_err(|e| format!("invalid subject: {e}"))?;
        let reason = row
            .reason
            .parse::<ChangeReason>()
            .map_err(|e| e.to_string())?;
        Change::builder()
            .source(source)
            .location(Location::new(row.world, row.x, row.y, row.z))
            .subject(subject)
            .reason(reason)
            .timestamp(row.timestamp)
            .build()
            .map_err(|e| e.to_string())
    }
}

/// Parameters: ?1 world, ?2..?7 bounds, ?8 limit, ?9 source (optional).
fn filter_sql(alias: &str, query: &ResolvedQuery) -> String {
    let mut sql = format!(
        "{alias}.world = ?1 \
         AND {alias}.x BETWEEN ?2 AND ?3 \
         AND {alias}.y BETWEEN ?4 AND ?5 \
         AND {alias}.z BETWEEN ?6 AND ?7"
    );
    if !query.reasons.is_empty() {
        let names: Vec<String> = query
            .reasons
            .iter()
            .map(|reason| format!("'{}'", reason.name()))
            .collect();
        let _ = write!(sql, " AND {alias}.reason IN ({})", names.join(", "));
    }
    if query.source.is_some() {
        let _ = write!(sql, " AND {alias}.source = ?9");
    }
    sql
}

fn select_sql(query: &ResolvedQuery) -> String {
    let mut sql = format!(
        "SELECT {} FROM events e WHERE {}",
        COLUMNS
            .split(", ")
            .map(|column| format!("e.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", "),
        filter_sql("e", query)
    );
    if query.distinct {
        let _ = write!(
            sql,
            " AND e.event_id = (SELECT MIN(i.event_id) FROM events i \
             WHERE i.x = e.x AND i.y = e.y AND i.z = e.z AND {})",
            filter_sql("i", query)
        );
    }
    sql.push_str(" ORDER BY e.event_id DESC LIMIT ?8");
    sql
}

fn select_args(query: &ResolvedQuery) -> Vec<Value> {
    let min = query.region.min();
    let max = query.region.max();
    let mut args = vec![
        Value::Text(query.world.clone()),
        Value::Integer(i64::from(min.x)),
        Value::Integer(i64::from(max.x)),
        Value::Integer(i64::from(min.y)),
        Value::Integer(i64::from(max.y)),
        Value::Integer(i64::from(min.z)),
        Value::Integer(i64::from(max.z)),
        Value::Integer(i64::from(query.limit)),
    ];
    if let Some(source) = &query.source {
        args.push(Value::Text(source.name().to_owned()));
    }
    args
}

/// Open transaction on the store's connection.
///
/// Holds the connection lock until finished or dropped.
pub struct SqliteBatch<'a> {
    conn: MutexGuard<'a, Connection>,
    persisted: usize,
    finished: bool,
}

impl ChangeBatch for SqliteBatch<'_> {
    fn persist(&mut self, change: &Change) -> LogResult<()> {
        let location = change.location();
        let subject = change.subject();
        let mut statement = self.conn.prepare_cached(INSERT)?;
        statement.execute(params![
            location.world,
            location.pos.x,
            location.pos.y,
            location.pos.z,
            change.timestamp(),
            change.source().name(),
            subject.change_type().name(),
            subject.serialize_from(),
            subject.serialize_to(),
            subject.serialize_old_state(),
            subject.serialize_new_state(),
            change.reason().name(),
        ])?;
        self.persisted += 1;
        Ok(())
    }

    fn finish(mut self) -> LogResult<usize> {
        self.conn.execute("COMMIT", [])?;
        self.finished = true;
        Ok(self.persisted)
    }
}

impl Drop for SqliteBatch<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute("ROLLBACK", []) {
                tracing::error!("Failed to roll back change batch: {}", e);
            }
        }
    }
}

impl ChangeBackend for SqliteChangeStore {
    type Batch<'a> = SqliteBatch<'a>;

    fn begin_batch(&self) -> LogResult<SqliteBatch<'_>> {
        let conn = self.inner.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        Ok(SqliteBatch {
            conn,
            persisted: 0,
            finished: false,
        })
    }
}

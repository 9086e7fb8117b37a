//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by store behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have the migrations of their schema fully applied.

use super::migrations::apply_migrations;
use super::{DbResult, Schema};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens an incident store file and applies pending store migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with(Schema::Store, "file", || Connection::open(path))
}

/// Opens an in-memory incident store.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(Schema::Store, "memory", Connection::open_in_memory)
}

/// Opens an alert index file and applies pending index migrations.
pub fn open_index_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with(Schema::AlertIndex, "file", || Connection::open(path))
}

/// Opens an in-memory alert index.
pub fn open_index_db_in_memory() -> DbResult<Connection> {
    open_with(Schema::AlertIndex, "memory", Connection::open_in_memory)
}

fn open_with(
    schema: Schema,
    mode: &'static str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let schema_name = schema.as_str();
    info!("event=db_open module=db status=start schema={schema_name} mode={mode}");

    let mut conn = open().map_err(|err| {
        error!(
            "event=db_open module=db status=error schema={schema_name} mode={mode} duration_ms={} error_code=db_open_failed error={err}",
            started_at.elapsed().as_millis()
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn, schema) {
        error!(
            "event=db_open module=db status=error schema={schema_name} mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok schema={schema_name} mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, schema: Schema) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn, schema)?;
    Ok(())
}

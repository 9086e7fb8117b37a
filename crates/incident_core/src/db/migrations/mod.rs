//! Embedded schema migrations, one ordered set per database kind.
//!
//! # Invariants
//! - Versions within a set start at 1 and increase by one.
//! - The applied version is mirrored to `PRAGMA user_version`.
//! - A database never receives tables from another set.

use crate::db::{DbError, DbResult, Schema};
use log::debug;
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STORE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "incidents",
        sql: include_str!("store/0001_incidents.sql"),
    },
    Migration {
        version: 2,
        name: "alerts",
        sql: include_str!("store/0002_alerts.sql"),
    },
];

const INDEX_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "alert_search",
    sql: include_str!("index/0001_alert_search.sql"),
}];

fn migrations_for(schema: Schema) -> &'static [Migration] {
    match schema {
        Schema::Store => STORE_MIGRATIONS,
        Schema::AlertIndex => INDEX_MIGRATIONS,
    }
}

/// Newest version of `schema` this binary can produce.
pub fn latest_version(schema: Schema) -> u32 {
    migrations_for(schema)
        .last()
        .map_or(0, |migration| migration.version)
}

/// Brings `conn` up to the newest version of `schema` in one transaction.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the database is newer than
///   this binary.
/// - `DbError::Sqlite` when a migration statement fails; nothing is applied.
pub fn apply_migrations(conn: &mut Connection, schema: Schema) -> DbResult<()> {
    let applied: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version(schema);
    if applied > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            schema,
            db_version: applied,
            latest_supported: latest,
        });
    }

    let pending = migrations_for(schema)
        .iter()
        .filter(|migration| migration.version > applied)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in pending {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        debug!(
            "event=db_migrate module=db status=ok schema={} version={} name={}",
            schema.as_str(),
            migration.version,
            migration.name
        );
    }
    tx.commit()?;
    Ok(())
}

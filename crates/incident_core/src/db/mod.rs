//! SQLite databases behind the coordinator.
//!
//! Two independent databases are used: the authoritative incident store and
//! the alert search index. Each carries only its own tables and tracks its
//! own migration version.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_index_db, open_index_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Database kind, selecting its migration set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Incidents, alerts and their links.
    Store,
    /// Full-text projection of alerts.
    AlertIndex,
}

impl Schema {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::AlertIndex => "alert_index",
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Database was written by a newer binary.
    UnsupportedSchemaVersion {
        schema: Schema,
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::UnsupportedSchemaVersion {
                schema,
                db_version,
                latest_supported,
            } => write!(
                f,
                "{} schema version {db_version} is newer than supported {latest_supported}",
                schema.as_str()
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

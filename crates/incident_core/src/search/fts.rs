//! SQLite FTS5-backed alert index.
//!
//! # Responsibility
//! - Accept enriched alert batches and upsert them by `(tenant_id, alert_id)`.
//! - Provide keyword search over alert name, fingerprint and source.
//!
//! # Invariants
//! - Searches never cross tenants.
//! - A disabled index rejects writes with `SearchError::Disabled`.
//! - Result ordering is deterministic by rank, then recency.

use crate::db::{open_index_db, open_index_db_in_memory, DbError};
use crate::model::alert::{AlertId, IndexedAlert};
use crate::model::incident::IncidentId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for writes, query parsing and result decoding.
#[derive(Debug)]
pub enum SearchError {
    /// Index is switched off for this deployment.
    Disabled,
    /// User-provided query cannot be parsed by FTS5 syntax.
    InvalidQuery {
        query: String,
        message: String,
    },
    Db(DbError),
    InvalidData(String),
    /// Index handle cannot be used (poisoned lock, closed backend).
    Unavailable(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "alert index is disabled"),
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
            Self::Unavailable(message) => write!(f, "alert index unavailable: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Search-index client consumed by secondary index sync.
pub trait AlertIndexClient: Send + Sync {
    /// Whether indexing is switched on. Sync is a no-op otherwise.
    fn enabled(&self) -> bool;
    /// Upserts one batch of enriched alerts.
    fn index_alerts(&self, batch: &[IndexedAlert]) -> SearchResult<()>;
}

/// Search options for alert queries.
#[derive(Debug, Clone)]
pub struct AlertSearchQuery {
    pub tenant_id: String,
    pub text: String,
    /// Maximum number of hits to return.
    pub limit: u32,
    /// Whether to pass text directly as raw FTS5 expression.
    ///
    /// Default is `false` so free-form input never trips FTS5 syntax errors.
    pub raw_fts_syntax: bool,
}

impl AlertSearchQuery {
    /// Creates a tenant-scoped query with default pagination.
    pub fn new(tenant_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            text: text.into(),
            limit: 20,
            raw_fts_syntax: false,
        }
    }
}

/// Single hit returned by [`SqliteAlertIndex::search_alerts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSearchHit {
    pub alert_id: AlertId,
    pub fingerprint: String,
    pub incident_ids: Vec<IncidentId>,
    pub snippet: String,
}

/// Alert index stored in its own SQLite database.
pub struct SqliteAlertIndex {
    conn: Mutex<Connection>,
    enabled: bool,
}

impl SqliteAlertIndex {
    /// Opens an index stored in a database file.
    pub fn open(path: impl AsRef<Path>, enabled: bool) -> SearchResult<Self> {
        Ok(Self::from_connection(open_index_db(path)?, enabled))
    }

    /// Opens a process-local in-memory index.
    pub fn open_in_memory(enabled: bool) -> SearchResult<Self> {
        Ok(Self::from_connection(open_index_db_in_memory()?, enabled))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection, enabled: bool) -> Self {
        Self {
            conn: Mutex::new(conn),
            enabled,
        }
    }

    /// Searches indexed alerts of one tenant and returns ranked hits.
    ///
    /// Returns an empty list for blank queries.
    pub fn search_alerts(&self, query: &AlertSearchQuery) -> SearchResult<Vec<AlertSearchHit>> {
        let Some(match_expr) = build_match_expression(query) else {
            return Ok(Vec::new());
        };

        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT
                alert_id,
                fingerprint,
                incident_ids,
                snippet(alert_search, 0, '[', ']', ' ... ', 10) AS snippet
             FROM alert_search
             WHERE alert_search MATCH ?
               AND tenant_id = ?
             ORDER BY bm25(alert_search), received_at DESC, alert_id ASC
             LIMIT ?",
        )?;
        let bind_values = vec![
            Value::Text(match_expr.clone()),
            Value::Text(query.tenant_id.clone()),
            Value::Integer(i64::from(query.limit)),
        ];
        let mut rows = stmt
            .query(params_from_iter(bind_values))
            .map_err(|err| map_query_error(err, &match_expr))?;
        let mut hits = Vec::new();

        while let Some(row) = rows
            .next()
            .map_err(|err| map_query_error(err, &match_expr))?
        {
            hits.push(parse_search_hit(row)?);
        }

        Ok(hits)
    }

    /// Number of indexed documents for one tenant.
    pub fn indexed_count(&self, tenant_id: &str) -> SearchResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alert_search WHERE tenant_id = ?1;",
            [tenant_id],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| SearchError::InvalidData(format!("negative count {count}")))
    }

    fn lock(&self) -> SearchResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SearchError::Unavailable("index connection lock poisoned".to_string()))
    }
}

impl AlertIndexClient for SqliteAlertIndex {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn index_alerts(&self, batch: &[IndexedAlert]) -> SearchResult<()> {
        if !self.enabled {
            return Err(SearchError::Disabled);
        }

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut remove = tx.prepare(
                "DELETE FROM alert_search WHERE tenant_id = ?1 AND alert_id = ?2;",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO alert_search (
                    name, fingerprint, source, alert_id, tenant_id, incident_ids, received_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            )?;
            for entry in batch {
                let alert = &entry.alert;
                let alert_id = alert.id.to_string();
                remove.execute(params![alert.tenant_id.as_str(), alert_id.as_str()])?;
                insert.execute(params![
                    alert.name.as_str(),
                    alert.fingerprint.as_str(),
                    alert.source.as_deref().unwrap_or_default(),
                    alert_id.as_str(),
                    alert.tenant_id.as_str(),
                    join_incident_ids(&entry.incident_ids),
                    alert.received_at_ms,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn join_incident_ids(ids: &[IncidentId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_search_hit(row: &Row<'_>) -> SearchResult<AlertSearchHit> {
    let alert_text: String = row.get("alert_id")?;
    let alert_id = Uuid::parse_str(&alert_text)
        .map_err(|_| SearchError::InvalidData(format!("invalid alert uuid `{alert_text}`")))?;

    let incidents_text: String = row.get("incident_ids")?;
    let incident_ids = incidents_text
        .split(',')
        .filter(|value| !value.is_empty())
        .map(|value| {
            Uuid::parse_str(value)
                .map_err(|_| SearchError::InvalidData(format!("invalid incident uuid `{value}`")))
        })
        .collect::<SearchResult<Vec<_>>>()?;

    Ok(AlertSearchHit {
        alert_id,
        fingerprint: row.get("fingerprint")?,
        incident_ids,
        snippet: row.get("snippet")?,
    })
}

fn build_match_expression(query: &AlertSearchQuery) -> Option<String> {
    let text = query.text.trim();
    if text.is_empty() {
        return None;
    }

    if query.raw_fts_syntax {
        return Some(text.to_string());
    }

    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();

    if terms.is_empty() {
        return None;
    }

    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: &str) -> SearchError {
    if is_match_syntax_error(&err) {
        return SearchError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}

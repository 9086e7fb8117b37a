//! Incident store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own every authoritative read/write of incidents and alert membership.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every query is constrained by `tenant_id`; an incident of another
//!   tenant is reported exactly like a missing one.
//! - Write paths call `Incident::validate()` before SQL mutations.
//! - Multi-table writes run in a single transaction.
//! - `alerts_count` is recomputed from `alert_to_incident` after each
//!   membership change.

use crate::db::migrations::latest_version;
use crate::db::{DbError, Schema};
use crate::model::alert::{Alert, AlertId};
use crate::model::incident::{
    Incident, IncidentDraft, IncidentId, IncidentSeverity, IncidentValidationError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const INCIDENT_SELECT_SQL: &str = "SELECT
    id,
    tenant_id,
    user_generated_name,
    ai_generated_name,
    user_summary,
    generated_summary,
    assignee,
    severity,
    alerts_count,
    is_confirmed,
    generated_by_ai,
    created_at,
    updated_at
FROM incidents";

const ALERT_COLUMNS_SQL: &str = "alerts.id AS id,
    alerts.tenant_id AS tenant_id,
    alerts.fingerprint AS fingerprint,
    alerts.name AS name,
    alerts.source AS source,
    alerts.received_at AS received_at";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store error for incident persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(IncidentValidationError),
    Db(DbError),
    /// Incident does not exist for the requesting tenant.
    NotFound(IncidentId),
    InvalidData(String),
    /// Connection was not migrated to the schema this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "incident not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted incident data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IncidentValidationError> for RepoError {
    fn from(value: IncidentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Authoritative store interface consumed by the mutation coordinator.
pub trait IncidentRepository {
    /// Gets one incident; `None` when it does not exist for the tenant.
    fn get_incident(&self, tenant_id: &str, id: IncidentId) -> RepoResult<Option<Incident>>;
    /// Creates an incident from a draft and returns the stored record.
    fn create_incident(
        &self,
        tenant_id: &str,
        draft: &IncidentDraft,
        generated_by_ai: bool,
    ) -> RepoResult<Incident>;
    /// Applies a draft onto an existing incident and returns the stored record.
    fn update_incident(
        &self,
        tenant_id: &str,
        id: IncidentId,
        draft: &IncidentDraft,
        generated_by_ai: bool,
    ) -> RepoResult<Incident>;
    /// Deletes an incident with its alert links. Returns whether a row was removed.
    fn delete_incident(&self, tenant_id: &str, id: IncidentId) -> RepoResult<bool>;
    /// Links alerts to an incident. Existing links and unknown alerts are ignored.
    fn add_alerts(
        &self,
        tenant_id: &str,
        id: IncidentId,
        alert_ids: &[AlertId],
        is_created_by_ai: bool,
    ) -> RepoResult<()>;
    /// Unlinks alerts from an incident.
    fn remove_alerts(&self, tenant_id: &str, id: IncidentId, alert_ids: &[AlertId])
        -> RepoResult<()>;
    /// Counts distinct fingerprints across the incident's alerts.
    fn count_unique_fingerprints(&self, tenant_id: &str, id: IncidentId) -> RepoResult<u64>;
    /// Lists the incident's alerts, most recently received first.
    fn list_incident_alerts(
        &self,
        tenant_id: &str,
        id: IncidentId,
        limit: u32,
    ) -> RepoResult<Vec<Alert>>;
    /// Maps every given alert to the incidents it currently belongs to.
    fn alert_incident_ids(
        &self,
        tenant_id: &str,
        alert_ids: &[AlertId],
    ) -> RepoResult<BTreeMap<AlertId, Vec<IncidentId>>>;
}

/// SQLite-backed incident store.
pub struct SqliteIncidentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIncidentRepository<'conn> {
    /// Wraps a connection after checking it is fully migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = latest_version(Schema::Store);
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    /// Stores one alert so it can be linked to incidents.
    pub fn insert_alert(&self, alert: &Alert) -> RepoResult<AlertId> {
        if alert.fingerprint.trim().is_empty() {
            return Err(RepoError::InvalidData(format!(
                "alert {} has a blank fingerprint",
                alert.id
            )));
        }

        self.conn.execute(
            "INSERT INTO alerts (id, tenant_id, fingerprint, name, source, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                alert.id.to_string(),
                alert.tenant_id.as_str(),
                alert.fingerprint.as_str(),
                alert.name.as_str(),
                alert.source.as_deref(),
                alert.received_at_ms,
            ],
        )?;
        Ok(alert.id)
    }

    /// Gets one alert by id within a tenant.
    pub fn get_alert(&self, tenant_id: &str, id: AlertId) -> RepoResult<Option<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS_SQL} FROM alerts WHERE alerts.id = ?1 AND alerts.tenant_id = ?2;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string(), tenant_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_alert_row(row)?)),
            None => Ok(None),
        }
    }

    fn read_back(&self, tenant_id: &str, id: IncidentId, context: &str) -> RepoResult<Incident> {
        self.get_incident(tenant_id, id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("{context} incident {id} missing in read-back"))
        })
    }
}

impl IncidentRepository for SqliteIncidentRepository<'_> {
    fn get_incident(&self, tenant_id: &str, id: IncidentId) -> RepoResult<Option<Incident>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INCIDENT_SELECT_SQL}
             WHERE id = ?1
               AND tenant_id = ?2;"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), tenant_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_incident_row(row)?));
        }

        Ok(None)
    }

    fn create_incident(
        &self,
        tenant_id: &str,
        draft: &IncidentDraft,
        generated_by_ai: bool,
    ) -> RepoResult<Incident> {
        let mut incident = Incident {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            user_generated_name: None,
            ai_generated_name: None,
            user_summary: None,
            generated_summary: None,
            assignee: None,
            severity: draft.severity,
            alerts_count: 0,
            is_confirmed: !generated_by_ai,
            generated_by_ai,
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        draft.apply_to(&mut incident, generated_by_ai);
        incident.validate()?;

        self.conn.execute(
            "INSERT INTO incidents (
                id,
                tenant_id,
                user_generated_name,
                ai_generated_name,
                user_summary,
                generated_summary,
                assignee,
                severity,
                is_confirmed,
                generated_by_ai
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                incident.id.to_string(),
                incident.tenant_id.as_str(),
                incident.user_generated_name.as_deref(),
                incident.ai_generated_name.as_deref(),
                incident.user_summary.as_deref(),
                incident.generated_summary.as_deref(),
                incident.assignee.as_deref(),
                incident.severity.as_str(),
                bool_to_int(incident.is_confirmed),
                bool_to_int(incident.generated_by_ai),
            ],
        )?;

        self.read_back(tenant_id, incident.id, "created")
    }

    fn update_incident(
        &self,
        tenant_id: &str,
        id: IncidentId,
        draft: &IncidentDraft,
        generated_by_ai: bool,
    ) -> RepoResult<Incident> {
        let mut incident = self
            .get_incident(tenant_id, id)?
            .ok_or(RepoError::NotFound(id))?;
        draft.apply_to(&mut incident, generated_by_ai);
        incident.validate()?;

        let changed = self.conn.execute(
            "UPDATE incidents
             SET
                user_generated_name = ?1,
                ai_generated_name = ?2,
                user_summary = ?3,
                generated_summary = ?4,
                assignee = ?5,
                severity = ?6,
                updated_at = MAX(created_at, strftime('%s', 'now') * 1000)
             WHERE id = ?7
               AND tenant_id = ?8;",
            params![
                incident.user_generated_name.as_deref(),
                incident.ai_generated_name.as_deref(),
                incident.user_summary.as_deref(),
                incident.generated_summary.as_deref(),
                incident.assignee.as_deref(),
                incident.severity.as_str(),
                id.to_string(),
                tenant_id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        self.read_back(tenant_id, id, "updated")
    }

    fn delete_incident(&self, tenant_id: &str, id: IncidentId) -> RepoResult<bool> {
        let id_text = id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM alert_to_incident WHERE incident_id = ?1 AND tenant_id = ?2;",
            params![id_text.as_str(), tenant_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM incidents WHERE id = ?1 AND tenant_id = ?2;",
            params![id_text.as_str(), tenant_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn add_alerts(
        &self,
        tenant_id: &str,
        id: IncidentId,
        alert_ids: &[AlertId],
        is_created_by_ai: bool,
    ) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        require_incident(&tx, tenant_id, id)?;

        {
            let mut link = tx.prepare(
                "INSERT OR IGNORE INTO alert_to_incident (tenant_id, incident_id, alert_id, is_created_by_ai)
                 SELECT ?1, ?2, alerts.id, ?4
                 FROM alerts
                 WHERE alerts.id = ?3
                   AND alerts.tenant_id = ?1;",
            )?;
            for alert_id in alert_ids {
                link.execute(params![
                    tenant_id,
                    id_text.as_str(),
                    alert_id.to_string(),
                    bool_to_int(is_created_by_ai),
                ])?;
            }
        }

        refresh_alerts_count(&tx, tenant_id, id_text.as_str())?;
        tx.commit()?;
        Ok(())
    }

    fn remove_alerts(
        &self,
        tenant_id: &str,
        id: IncidentId,
        alert_ids: &[AlertId],
    ) -> RepoResult<()> {
        let id_text = id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        require_incident(&tx, tenant_id, id)?;

        {
            let mut unlink = tx.prepare(
                "DELETE FROM alert_to_incident
                 WHERE tenant_id = ?1
                   AND incident_id = ?2
                   AND alert_id = ?3;",
            )?;
            for alert_id in alert_ids {
                unlink.execute(params![tenant_id, id_text.as_str(), alert_id.to_string()])?;
            }
        }

        refresh_alerts_count(&tx, tenant_id, id_text.as_str())?;
        tx.commit()?;
        Ok(())
    }

    fn count_unique_fingerprints(&self, tenant_id: &str, id: IncidentId) -> RepoResult<u64> {
        require_incident(self.conn, tenant_id, id)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT alerts.fingerprint)
             FROM alert_to_incident
             JOIN alerts ON alerts.id = alert_to_incident.alert_id
             WHERE alert_to_incident.incident_id = ?1
               AND alert_to_incident.tenant_id = ?2;",
            params![id.to_string(), tenant_id],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative fingerprint count {count}")))
    }

    fn list_incident_alerts(
        &self,
        tenant_id: &str,
        id: IncidentId,
        limit: u32,
    ) -> RepoResult<Vec<Alert>> {
        require_incident(self.conn, tenant_id, id)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS_SQL}
             FROM alert_to_incident
             JOIN alerts ON alerts.id = alert_to_incident.alert_id
             WHERE alert_to_incident.incident_id = ?1
               AND alert_to_incident.tenant_id = ?2
             ORDER BY alerts.received_at DESC, alerts.id ASC
             LIMIT ?3;"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), tenant_id, limit])?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next()? {
            alerts.push(parse_alert_row(row)?);
        }
        Ok(alerts)
    }

    fn alert_incident_ids(
        &self,
        tenant_id: &str,
        alert_ids: &[AlertId],
    ) -> RepoResult<BTreeMap<AlertId, Vec<IncidentId>>> {
        let mut stmt = self.conn.prepare(
            "SELECT incident_id
             FROM alert_to_incident
             WHERE tenant_id = ?1
               AND alert_id = ?2
             ORDER BY incident_id ASC;",
        )?;

        let mut mapping = BTreeMap::new();
        for alert_id in alert_ids {
            let mut rows = stmt.query(params![tenant_id, alert_id.to_string()])?;
            let mut incident_ids = Vec::new();
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                incident_ids.push(parse_uuid(&text, "alert_to_incident.incident_id")?);
            }
            mapping.insert(*alert_id, incident_ids);
        }
        Ok(mapping)
    }
}

fn require_incident(conn: &Connection, tenant_id: &str, id: IncidentId) -> RepoResult<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM incidents WHERE id = ?1 AND tenant_id = ?2;",
            params![id.to_string(), tenant_id],
            |_| Ok(()),
        )
        .optional()?;
    match exists {
        Some(()) => Ok(()),
        None => Err(RepoError::NotFound(id)),
    }
}

fn refresh_alerts_count(conn: &Connection, tenant_id: &str, incident_id: &str) -> RepoResult<()> {
    conn.execute(
        "UPDATE incidents
         SET
            alerts_count = (
                SELECT COUNT(*)
                FROM alert_to_incident
                WHERE alert_to_incident.incident_id = incidents.id
            ),
            updated_at = MAX(created_at, strftime('%s', 'now') * 1000)
         WHERE id = ?1
           AND tenant_id = ?2;",
        params![incident_id, tenant_id],
    )?;
    Ok(())
}

fn parse_incident_row(row: &Row<'_>) -> RepoResult<Incident> {
    let id_text: String = row.get("id")?;
    let severity_text: String = row.get("severity")?;
    let severity = IncidentSeverity::parse(&severity_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid severity `{severity_text}` in incidents.severity"
        ))
    })?;

    let incident = Incident {
        id: parse_uuid(&id_text, "incidents.id")?,
        tenant_id: row.get("tenant_id")?,
        user_generated_name: row.get("user_generated_name")?,
        ai_generated_name: row.get("ai_generated_name")?,
        user_summary: row.get("user_summary")?,
        generated_summary: row.get("generated_summary")?,
        assignee: row.get("assignee")?,
        severity,
        alerts_count: row.get("alerts_count")?,
        is_confirmed: parse_flag(row.get("is_confirmed")?, "incidents.is_confirmed")?,
        generated_by_ai: parse_flag(row.get("generated_by_ai")?, "incidents.generated_by_ai")?,
        created_at_ms: row.get("created_at")?,
        updated_at_ms: row.get("updated_at")?,
    };
    incident.validate()?;
    Ok(incident)
}

fn parse_alert_row(row: &Row<'_>) -> RepoResult<Alert> {
    let id_text: String = row.get("id")?;
    Ok(Alert {
        id: parse_uuid(&id_text, "alerts.id")?,
        tenant_id: row.get("tenant_id")?,
        fingerprint: row.get("fingerprint")?,
        name: row.get("name")?,
        source: row.get("source")?,
        received_at_ms: row.get("received_at")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_flag(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

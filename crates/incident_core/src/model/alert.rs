//! Alert records referenced by incidents.

use crate::model::incident::{IncidentId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for alerts.
pub type AlertId = Uuid;

/// Alert as stored next to incidents.
///
/// Alerts sharing a `fingerprint` describe the same underlying problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub tenant_id: TenantId,
    pub fingerprint: String,
    pub name: String,
    pub source: Option<String>,
    /// Unix epoch milliseconds.
    pub received_at_ms: i64,
}

impl Alert {
    /// Creates an alert with a generated id.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        fingerprint: impl Into<String>,
        name: impl Into<String>,
        received_at_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            fingerprint: fingerprint.into(),
            name: name.into(),
            source: None,
            received_at_ms,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Alert enriched with every incident it currently belongs to.
///
/// Unit of work submitted to the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedAlert {
    #[serde(flatten)]
    pub alert: Alert,
    pub incident_ids: Vec<IncidentId>,
}

//! Ephemeral values emitted after an authoritative mutation.
//!
//! # Invariants
//! - Values are only built after the mutation they describe succeeded.
//! - `ChangeEvent` owns its incident snapshot; later writes do not leak in.

use crate::model::incident::{Incident, IncidentId, TenantId};
use serde::{Deserialize, Serialize};

/// Kind of change delivered to the automation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// Snapshot of an incident change, consumed by automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub tenant_id: TenantId,
    pub incident: Incident,
    pub action: ChangeAction,
}

impl ChangeEvent {
    pub fn new(tenant_id: impl Into<TenantId>, incident: Incident, action: ChangeAction) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            incident,
            action,
        }
    }
}

/// Change pointer pushed to connected clients. Never carries content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSignal {
    pub tenant_id: TenantId,
    pub incident_id: Option<IncidentId>,
}

/// Request for asynchronous summary generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryJobRequest {
    pub tenant_id: TenantId,
    pub incident_id: IncidentId,
}

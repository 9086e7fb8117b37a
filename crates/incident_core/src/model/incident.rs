//! Incident record and mutation intent.
//!
//! # Responsibility
//! - Define the canonical incident record returned by the store.
//! - Define the draft used by create/update flows.
//!
//! # Invariants
//! - `id` is stable and never reused for another incident.
//! - A human-provenance incident carries a non-blank `user_generated_name`.
//! - An AI-provenance incident carries a non-blank `ai_generated_name`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for incidents.
pub type IncidentId = Uuid;

/// Tenant isolation scope. Every read and write is partitioned by it.
pub type TenantId = String;

/// Severity ladder shared with the alert pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Info,
    Warning,
    High,
    Critical,
}

impl IncidentSeverity {
    /// Stable string id used by storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parses the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Incident record as owned by the authoritative store.
///
/// This is also the external representation handed back to callers and
/// embedded in automation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub tenant_id: TenantId,
    pub user_generated_name: Option<String>,
    pub ai_generated_name: Option<String>,
    /// Summary authored by a human. Presence blocks summary generation.
    pub user_summary: Option<String>,
    pub generated_summary: Option<String>,
    pub assignee: Option<String>,
    pub severity: IncidentSeverity,
    /// Number of alerts currently associated, recomputed by the store.
    pub alerts_count: u32,
    /// `false` for AI suggestions awaiting human confirmation.
    pub is_confirmed: bool,
    /// Creation provenance.
    pub generated_by_ai: bool,
    /// Unix epoch milliseconds.
    pub created_at_ms: i64,
    /// Unix epoch milliseconds.
    pub updated_at_ms: i64,
}

impl Incident {
    /// Display name, preferring the human-authored one.
    pub fn name(&self) -> Option<&str> {
        self.user_generated_name
            .as_deref()
            .or(self.ai_generated_name.as_deref())
    }

    /// Whether a human already wrote a summary for this incident.
    pub fn has_user_summary(&self) -> bool {
        self.user_summary
            .as_deref()
            .is_some_and(|summary| !summary.trim().is_empty())
    }

    /// Checks provenance-dependent naming rules.
    pub fn validate(&self) -> Result<(), IncidentValidationError> {
        let name = if self.generated_by_ai {
            self.ai_generated_name.as_deref()
        } else {
            self.user_generated_name.as_deref()
        };
        if name.map_or(true, |value| value.trim().is_empty()) {
            return Err(IncidentValidationError::MissingName {
                generated_by_ai: self.generated_by_ai,
            });
        }
        if self.updated_at_ms < self.created_at_ms {
            return Err(IncidentValidationError::InvalidTimestamps {
                created_at_ms: self.created_at_ms,
                updated_at_ms: self.updated_at_ms,
            });
        }
        Ok(())
    }
}

/// Mutation intent accepted by create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentDraft {
    pub name: String,
    pub summary: Option<String>,
    pub assignee: Option<String>,
    pub severity: IncidentSeverity,
}

impl IncidentDraft {
    /// Creates a draft with `critical` severity and no summary.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: None,
            assignee: None,
            severity: IncidentSeverity::Critical,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_severity(mut self, severity: IncidentSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Applies this draft onto an incident record.
    ///
    /// AI-authored drafts write the generated name/summary fields and leave
    /// human-authored fields untouched.
    pub fn apply_to(&self, incident: &mut Incident, generated_by_ai: bool) {
        let name = Some(self.name.trim().to_string());
        if generated_by_ai {
            incident.ai_generated_name = name;
            incident.generated_summary = self.summary.clone();
        } else {
            incident.user_generated_name = name;
            incident.user_summary = self.summary.clone();
        }
        incident.assignee = self.assignee.clone();
        incident.severity = self.severity;
    }
}

/// Validation errors for incident records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentValidationError {
    MissingName {
        generated_by_ai: bool,
    },
    InvalidTimestamps {
        created_at_ms: i64,
        updated_at_ms: i64,
    },
}

impl Display for IncidentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName { generated_by_ai } => {
                let field = if *generated_by_ai {
                    "ai_generated_name"
                } else {
                    "user_generated_name"
                };
                write!(f, "incident requires a non-blank `{field}`")
            }
            Self::InvalidTimestamps {
                created_at_ms,
                updated_at_ms,
            } => write!(
                f,
                "updated_at_ms ({updated_at_ms}) must not be earlier than created_at_ms ({created_at_ms})"
            ),
        }
    }
}

impl Error for IncidentValidationError {}

//! Summary job gating and submission.
//!
//! # Responsibility
//! - Decide whether an incident warrants an AI summary job.
//! - Submit the job through an acquired queue and return its handle.
//!
//! # Invariants
//! - Conditions are evaluated in a fixed order; the first failing one is
//!   reported.
//! - An incident with a user-authored summary is never scheduled.
//! - The fingerprint count is only queried when both capability flags hold.

use crate::config::CoordinatorConfig;
use crate::jobs::{summary_job_params, JobHandle, JobPool, SUMMARY_JOB_NAME};
use crate::model::event::SummaryJobRequest;
use crate::model::incident::Incident;
use crate::repo::incident_repo::IncidentRepository;
use crate::service::isolate::StepError;
use std::sync::Arc;

/// Gate decision for one incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryGate {
    Schedule,
    ExtendedDisabled,
    JobBackendUnavailable,
    BelowThreshold { fingerprint_count: u64, threshold: u64 },
    SummaryExists,
}

impl SummaryGate {
    pub fn should_schedule(self) -> bool {
        matches!(self, Self::Schedule)
    }

    /// Short label used in log lines.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::ExtendedDisabled => "extended_disabled",
            Self::JobBackendUnavailable => "job_backend_unavailable",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::SummaryExists => "summary_exists",
        }
    }
}

/// Evaluates the four scheduling conditions.
///
/// `fingerprint_count` is ignored when a capability flag is off.
pub fn evaluate_summary_gate(
    config: &CoordinatorConfig,
    fingerprint_count: u64,
    has_user_summary: bool,
) -> SummaryGate {
    if !config.extended_enabled {
        return SummaryGate::ExtendedDisabled;
    }
    if !config.job_backend_available {
        return SummaryGate::JobBackendUnavailable;
    }
    if fingerprint_count <= config.summary_threshold {
        return SummaryGate::BelowThreshold {
            fingerprint_count,
            threshold: config.summary_threshold,
        };
    }
    if has_user_summary {
        return SummaryGate::SummaryExists;
    }
    SummaryGate::Schedule
}

/// What the scheduler did for one incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryScheduling {
    Scheduled(JobHandle),
    Suppressed(SummaryGate),
}

/// Gated submitter of summary generation jobs.
pub struct SummaryJobScheduler {
    pool: Arc<dyn JobPool>,
    config: CoordinatorConfig,
}

impl SummaryJobScheduler {
    pub fn new(pool: Arc<dyn JobPool>, config: CoordinatorConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Evaluates the gate for `incident` and submits a job when it opens.
    ///
    /// # Errors
    /// - Store errors while counting fingerprints.
    /// - Pool acquisition or enqueue failures.
    pub async fn schedule_if_needed<R: IncidentRepository>(
        &self,
        repo: &R,
        incident: &Incident,
    ) -> Result<SummaryScheduling, StepError> {
        let capable = self.config.extended_enabled && self.config.job_backend_available;
        let fingerprint_count = if capable {
            repo.count_unique_fingerprints(&incident.tenant_id, incident.id)?
        } else {
            0
        };

        let gate =
            evaluate_summary_gate(&self.config, fingerprint_count, incident.has_user_summary());
        if !gate.should_schedule() {
            return Ok(SummaryScheduling::Suppressed(gate));
        }

        let request = SummaryJobRequest {
            tenant_id: incident.tenant_id.clone(),
            incident_id: incident.id,
        };
        let queue = self.pool.acquire().await?;
        let handle = queue
            .enqueue(SUMMARY_JOB_NAME, summary_job_params(&request))
            .await?;
        Ok(SummaryScheduling::Scheduled(handle))
    }
}

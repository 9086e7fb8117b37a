//! Incident mutation coordinator.
//!
//! # Responsibility
//! - Perform exactly one authoritative store mutation per call.
//! - Fan the change out to index, notifier, automation and summary jobs in a
//!   fixed per-operation order, each step inside its own failure boundary.
//!
//! # Invariants
//! - Store errors (including not-found) abort the call before any fan-out.
//! - Fan-out errors are logged and never reach the caller.
//! - No change signal is built before the mutation it describes succeeded.
//! - Fan-out sets differ per operation:
//!
//! | operation      | index | notify | automation | summary job |
//! |----------------|-------|--------|------------|-------------|
//! | create         |       | x      | created    |             |
//! | add alerts     | x     | x      | updated    | gated       |
//! | delete alerts  |       |        |            |             |
//! | delete         |       | x      | deleted    |             |
//! | update         |       |        | updated    |             |

use crate::automation::AutomationEngine;
use crate::config::CoordinatorConfig;
use crate::jobs::JobPool;
use crate::model::alert::{AlertId, IndexedAlert};
use crate::model::event::{ChangeAction, ChangeEvent, NotificationSignal};
use crate::model::incident::{Incident, IncidentDraft, IncidentId};
use crate::notify::{send_change_signal, NotificationClient};
use crate::repo::incident_repo::{IncidentRepository, RepoError, RepoResult};
use crate::search::fts::AlertIndexClient;
use crate::service::isolate::{
    isolate, isolate_async, skip, FanOutStep, StepContext, StepError, StepOutcome,
};
use crate::service::summary::{SummaryJobScheduler, SummaryScheduling};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors visible to coordinator callers. Only the store tier surfaces here.
#[derive(Debug)]
pub enum CoordinatorError {
    /// Target incident does not exist for the tenant.
    NotFound(IncidentId),
    /// Authoritative store failure.
    Store(RepoError),
}

impl CoordinatorError {
    /// Whether the calling layer should answer with a not-found status.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for CoordinatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "incident not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for CoordinatorError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Lifecycle of one coordinator call, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Pending,
    Mutated,
    FannedOut,
    Done,
    Aborted,
}

impl MutationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Mutated => "mutated",
            Self::FannedOut => "fanned_out",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

/// Downstream systems the coordinator fans out to.
pub struct Collaborators {
    pub index: Arc<dyn AlertIndexClient>,
    /// `None` when no push channel is configured for this context.
    pub notifier: Option<Arc<dyn NotificationClient>>,
    pub automation: Arc<dyn AutomationEngine>,
    pub jobs: Arc<dyn JobPool>,
}

/// Orchestrates incident mutations and their side effects.
pub struct IncidentCoordinator<R: IncidentRepository> {
    repo: R,
    index: Arc<dyn AlertIndexClient>,
    notifier: Option<Arc<dyn NotificationClient>>,
    automation: Arc<dyn AutomationEngine>,
    summaries: SummaryJobScheduler,
}

impl<R: IncidentRepository> IncidentCoordinator<R> {
    /// Creates a coordinator over `repo` with injected collaborators.
    pub fn new(repo: R, collaborators: Collaborators, config: CoordinatorConfig) -> Self {
        Self {
            repo,
            index: collaborators.index,
            notifier: collaborators.notifier,
            automation: collaborators.automation,
            summaries: SummaryJobScheduler::new(collaborators.jobs, config),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        self.summaries.config()
    }

    /// Read access to the authoritative store.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Creates an incident, then notifies and triggers `created` automation.
    pub fn create_incident(
        &self,
        tenant_id: &str,
        draft: &IncidentDraft,
        generated_from_ai: bool,
    ) -> CoordinatorResult<Incident> {
        const OP: &str = "create";
        transition(OP, MutationPhase::Pending, tenant_id, None);

        let incident = abort_on_err(
            OP,
            tenant_id,
            None,
            self.repo.create_incident(tenant_id, draft, generated_from_ai),
        )?;
        transition(OP, MutationPhase::Mutated, tenant_id, Some(incident.id));

        let ctx = StepContext {
            operation: OP,
            tenant_id,
            incident_id: Some(incident.id),
        };
        self.notify(&ctx, None);
        self.trigger_automation(&ctx, incident.clone(), ChangeAction::Created);
        transition(OP, MutationPhase::FannedOut, tenant_id, Some(incident.id));

        transition(OP, MutationPhase::Done, tenant_id, Some(incident.id));
        Ok(incident)
    }

    /// Links alerts to an incident and runs the full fan-out.
    ///
    /// Order: index sync, notify, `updated` automation, gated summary job.
    pub async fn add_alerts_to_incident(
        &self,
        tenant_id: &str,
        incident_id: IncidentId,
        alert_ids: &[AlertId],
        is_created_by_ai: bool,
    ) -> CoordinatorResult<()> {
        const OP: &str = "add_alerts";
        transition(OP, MutationPhase::Pending, tenant_id, Some(incident_id));

        let incident = abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.require_incident(tenant_id, incident_id),
        )?;
        abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.repo.add_alerts(tenant_id, incident_id, alert_ids, is_created_by_ai),
        )?;
        info!(
            "event=alerts_linked module=coordinator status=ok tenant_id={tenant_id} incident_id={incident_id} alert_count={}",
            alert_ids.len()
        );
        transition(OP, MutationPhase::Mutated, tenant_id, Some(incident_id));

        let ctx = StepContext {
            operation: OP,
            tenant_id,
            incident_id: Some(incident_id),
        };
        self.sync_index(&ctx, incident_id, alert_ids.len());
        self.notify(&ctx, Some(incident_id));
        self.trigger_automation(&ctx, incident.clone(), ChangeAction::Updated);
        self.schedule_summary(&ctx, &incident).await;
        transition(OP, MutationPhase::FannedOut, tenant_id, Some(incident_id));

        transition(OP, MutationPhase::Done, tenant_id, Some(incident_id));
        Ok(())
    }

    /// Unlinks alerts from an incident. No fan-out.
    pub fn delete_alerts_from_incident(
        &self,
        tenant_id: &str,
        incident_id: IncidentId,
        alert_ids: &[AlertId],
    ) -> CoordinatorResult<()> {
        const OP: &str = "delete_alerts";
        transition(OP, MutationPhase::Pending, tenant_id, Some(incident_id));

        abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.require_incident(tenant_id, incident_id),
        )?;
        abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.repo.remove_alerts(tenant_id, incident_id, alert_ids),
        )?;
        transition(OP, MutationPhase::Mutated, tenant_id, Some(incident_id));

        transition(OP, MutationPhase::Done, tenant_id, Some(incident_id));
        Ok(())
    }

    /// Deletes an incident, then notifies and triggers `deleted` automation
    /// carrying the pre-deletion snapshot.
    pub fn delete_incident(
        &self,
        tenant_id: &str,
        incident_id: IncidentId,
    ) -> CoordinatorResult<()> {
        const OP: &str = "delete";
        transition(OP, MutationPhase::Pending, tenant_id, Some(incident_id));

        let snapshot = abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.require_incident(tenant_id, incident_id),
        )?;
        let deleted = abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.repo.delete_incident(tenant_id, incident_id),
        )?;
        if !deleted {
            return abort_on_err(
                OP,
                tenant_id,
                Some(incident_id),
                Err(RepoError::NotFound(incident_id)),
            );
        }
        transition(OP, MutationPhase::Mutated, tenant_id, Some(incident_id));

        let ctx = StepContext {
            operation: OP,
            tenant_id,
            incident_id: Some(incident_id),
        };
        self.notify(&ctx, None);
        self.trigger_automation(&ctx, snapshot, ChangeAction::Deleted);
        transition(OP, MutationPhase::FannedOut, tenant_id, Some(incident_id));

        transition(OP, MutationPhase::Done, tenant_id, Some(incident_id));
        Ok(())
    }

    /// Applies a draft and triggers `updated` automation. No notification
    /// and no index sync.
    pub fn update_incident(
        &self,
        tenant_id: &str,
        incident_id: IncidentId,
        draft: &IncidentDraft,
        generated_by_ai: bool,
    ) -> CoordinatorResult<Incident> {
        const OP: &str = "update";
        transition(OP, MutationPhase::Pending, tenant_id, Some(incident_id));

        let incident = abort_on_err(
            OP,
            tenant_id,
            Some(incident_id),
            self.repo.update_incident(tenant_id, incident_id, draft, generated_by_ai),
        )?;
        transition(OP, MutationPhase::Mutated, tenant_id, Some(incident_id));

        let ctx = StepContext {
            operation: OP,
            tenant_id,
            incident_id: Some(incident_id),
        };
        self.trigger_automation(&ctx, incident.clone(), ChangeAction::Updated);
        transition(OP, MutationPhase::FannedOut, tenant_id, Some(incident_id));

        transition(OP, MutationPhase::Done, tenant_id, Some(incident_id));
        Ok(incident)
    }

    fn require_incident(&self, tenant_id: &str, incident_id: IncidentId) -> RepoResult<Incident> {
        self.repo
            .get_incident(tenant_id, incident_id)?
            .ok_or(RepoError::NotFound(incident_id))
    }

    /// Re-fetches the newest `limit` alerts of the incident, enriches them
    /// with their incident links and pushes them to the index.
    fn sync_index(
        &self,
        ctx: &StepContext<'_>,
        incident_id: IncidentId,
        limit: usize,
    ) -> StepOutcome<usize> {
        if !self.index.enabled() {
            return skip(FanOutStep::IndexSync, ctx, "index_disabled");
        }

        isolate(FanOutStep::IndexSync, ctx, || -> Result<usize, StepError> {
            let limit = u32::try_from(limit).unwrap_or(u32::MAX);
            let alerts = self
                .repo
                .list_incident_alerts(ctx.tenant_id, incident_id, limit)?;
            if alerts.is_empty() {
                return Ok(0);
            }

            let alert_ids = alerts.iter().map(|alert| alert.id).collect::<Vec<_>>();
            let mut links = self.repo.alert_incident_ids(ctx.tenant_id, &alert_ids)?;
            let batch = alerts
                .into_iter()
                .map(|alert| IndexedAlert {
                    incident_ids: links.remove(&alert.id).unwrap_or_default(),
                    alert,
                })
                .collect::<Vec<_>>();

            self.index.index_alerts(&batch)?;
            Ok(batch.len())
        })
    }

    fn notify(&self, ctx: &StepContext<'_>, incident_id: Option<IncidentId>) -> StepOutcome<()> {
        let Some(notifier) = self.notifier.as_deref() else {
            return skip(FanOutStep::Notify, ctx, "no_notification_client");
        };

        let signal = NotificationSignal {
            tenant_id: ctx.tenant_id.to_string(),
            incident_id,
        };
        isolate(FanOutStep::Notify, ctx, || send_change_signal(notifier, &signal))
    }

    fn trigger_automation(
        &self,
        ctx: &StepContext<'_>,
        incident: Incident,
        action: ChangeAction,
    ) -> StepOutcome<()> {
        let event = ChangeEvent::new(ctx.tenant_id, incident, action);
        isolate(FanOutStep::Automation, ctx, || {
            self.automation.dispatch(ctx.tenant_id, event)
        })
    }

    async fn schedule_summary(
        &self,
        ctx: &StepContext<'_>,
        incident: &Incident,
    ) -> StepOutcome<SummaryScheduling> {
        let outcome = isolate_async(
            FanOutStep::SummaryJob,
            ctx,
            self.summaries.schedule_if_needed(&self.repo, incident),
        )
        .await;

        match &outcome {
            StepOutcome::Completed(SummaryScheduling::Scheduled(handle)) => info!(
                "event=summary_scheduled module=coordinator status=ok tenant_id={} incident_id={} job={}",
                ctx.tenant_id, incident.id, handle
            ),
            StepOutcome::Completed(SummaryScheduling::Suppressed(gate)) => debug!(
                "event=summary_scheduled module=coordinator status=skipped tenant_id={} incident_id={} reason={}",
                ctx.tenant_id,
                incident.id,
                gate.reason()
            ),
            _ => {}
        }
        outcome
    }
}

fn transition(
    operation: &'static str,
    phase: MutationPhase,
    tenant_id: &str,
    incident_id: Option<IncidentId>,
) {
    let incident = incident_id.map_or_else(|| "none".to_string(), |id| id.to_string());
    match phase {
        MutationPhase::Done => info!(
            "event=incident_mutation module=coordinator status=ok operation={operation} phase={} tenant_id={tenant_id} incident_id={incident}",
            phase.as_str()
        ),
        _ => debug!(
            "event=incident_mutation module=coordinator status=start operation={operation} phase={} tenant_id={tenant_id} incident_id={incident}",
            phase.as_str()
        ),
    }
}

fn abort_on_err<T>(
    operation: &'static str,
    tenant_id: &str,
    incident_id: Option<IncidentId>,
    result: RepoResult<T>,
) -> CoordinatorResult<T> {
    result.map_err(|err| {
        let err = CoordinatorError::from(err);
        let incident = incident_id.map_or_else(|| "none".to_string(), |id| id.to_string());
        let error_code = if err.is_not_found() {
            "not_found"
        } else {
            "store_failed"
        };
        warn!(
            "event=incident_mutation module=coordinator status=error operation={operation} phase={} tenant_id={tenant_id} incident_id={incident} error_code={error_code} error={err}",
            MutationPhase::Aborted.as_str()
        );
        err
    })
}

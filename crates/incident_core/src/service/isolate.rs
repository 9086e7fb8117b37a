//! Failure boundary for best-effort fan-out steps.
//!
//! # Responsibility
//! - Run one downstream step and turn any error into a logged outcome.
//! - Give every fan-out step the same diagnostic context.
//!
//! # Invariants
//! - Errors never escape `isolate`/`isolate_async`; control always returns.
//! - Every outcome is logged with operation, step, tenant and incident id.

use crate::model::incident::IncidentId;
use log::{error, info};
use std::error::Error;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

/// Boxed error for steps that touch more than one collaborator.
pub type StepError = Box<dyn Error + Send + Sync>;

/// Downstream step names, in fan-out order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanOutStep {
    IndexSync,
    Notify,
    Automation,
    SummaryJob,
}

impl FanOutStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IndexSync => "index_sync",
            Self::Notify => "notify",
            Self::Automation => "automation",
            Self::SummaryJob => "summary_job",
        }
    }
}

/// Result of one isolated step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Completed(T),
    /// Step decided not to act (disabled, not configured).
    Skipped(&'static str),
    /// Step failed; the message is already logged.
    Failed(String),
}

impl<T> StepOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Diagnostic context shared by the steps of one coordinator call.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub operation: &'static str,
    pub tenant_id: &'a str,
    pub incident_id: Option<IncidentId>,
}

impl StepContext<'_> {
    fn incident_label(&self) -> String {
        self.incident_id
            .map_or_else(|| "none".to_string(), |id| id.to_string())
    }
}

/// Runs a synchronous step inside the failure boundary.
pub fn isolate<T, E: Display>(
    step: FanOutStep,
    ctx: &StepContext<'_>,
    run: impl FnOnce() -> Result<T, E>,
) -> StepOutcome<T> {
    let started_at = Instant::now();
    let result = run();
    record(step, ctx, started_at, result)
}

/// Runs an awaited step inside the failure boundary.
pub async fn isolate_async<T, E, F>(
    step: FanOutStep,
    ctx: &StepContext<'_>,
    run: F,
) -> StepOutcome<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    let started_at = Instant::now();
    let result = run.await;
    record(step, ctx, started_at, result)
}

/// Records a step that chose not to run.
pub fn skip<T>(step: FanOutStep, ctx: &StepContext<'_>, reason: &'static str) -> StepOutcome<T> {
    info!(
        "event=fanout_step module=coordinator status=skipped operation={} step={} tenant_id={} incident_id={} reason={}",
        ctx.operation,
        step.as_str(),
        ctx.tenant_id,
        ctx.incident_label(),
        reason
    );
    StepOutcome::Skipped(reason)
}

fn record<T, E: Display>(
    step: FanOutStep,
    ctx: &StepContext<'_>,
    started_at: Instant,
    result: Result<T, E>,
) -> StepOutcome<T> {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(value) => {
            info!(
                "event=fanout_step module=coordinator status=ok operation={} step={} tenant_id={} incident_id={} duration_ms={}",
                ctx.operation,
                step.as_str(),
                ctx.tenant_id,
                ctx.incident_label(),
                duration_ms
            );
            StepOutcome::Completed(value)
        }
        Err(err) => {
            let message = err.to_string();
            error!(
                "event=fanout_step module=coordinator status=error operation={} step={} tenant_id={} incident_id={} duration_ms={} error={}",
                ctx.operation,
                step.as_str(),
                ctx.tenant_id,
                ctx.incident_label(),
                duration_ms,
                message
            );
            StepOutcome::Failed(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{isolate, isolate_async, skip, FanOutStep, StepContext, StepOutcome};
    use uuid::Uuid;

    fn ctx() -> StepContext<'static> {
        StepContext {
            operation: "add_alerts",
            tenant_id: "t1",
            incident_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn success_is_passed_through() {
        let outcome = isolate(FanOutStep::Notify, &ctx(), || Ok::<_, String>(7));
        assert_eq!(outcome, StepOutcome::Completed(7));
    }

    #[test]
    fn error_is_absorbed_with_message() {
        let outcome: StepOutcome<()> = isolate(FanOutStep::IndexSync, &ctx(), || {
            Err("index unreachable".to_string())
        });
        assert_eq!(outcome, StepOutcome::Failed("index unreachable".to_string()));
        assert!(outcome.is_failed());
    }

    #[test]
    fn skip_reports_reason() {
        let outcome: StepOutcome<()> = skip(FanOutStep::Notify, &ctx(), "no notification client");
        assert_eq!(outcome, StepOutcome::Skipped("no notification client"));
        assert_eq!(outcome.completed(), None);
    }

    #[tokio::test]
    async fn async_error_is_absorbed() {
        let outcome: StepOutcome<u32> =
            isolate_async(FanOutStep::SummaryJob, &ctx(), async { Err("pool down") }).await;
        assert_eq!(outcome, StepOutcome::Failed("pool down".to_string()));
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(FanOutStep::IndexSync.as_str(), "index_sync");
        assert_eq!(FanOutStep::SummaryJob.as_str(), "summary_job");
    }
}

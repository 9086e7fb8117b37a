//! Automation engine dispatch.
//!
//! # Responsibility
//! - Define the one-method engine contract the coordinator depends on.
//! - Provide a bounded in-process queue feeding a workflow runner.
//!
//! # Invariants
//! - The engine is injected; there is no process-wide instance lookup.
//! - A dispatched event always belongs to the tenant it is dispatched for.

use crate::model::event::ChangeEvent;
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type AutomationResult<T> = Result<T, AutomationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    /// Workflow queue is at capacity.
    QueueFull { capacity: usize },
    /// Workflow runner went away.
    EngineStopped,
    TenantMismatch {
        expected: String,
        actual: String,
    },
}

impl Display for AutomationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull { capacity } => {
                write!(f, "automation queue is full (capacity {capacity})")
            }
            Self::EngineStopped => write!(f, "automation engine is stopped"),
            Self::TenantMismatch { expected, actual } => write!(
                f,
                "event for tenant `{actual}` dispatched under tenant `{expected}`"
            ),
        }
    }
}

impl Error for AutomationError {}

/// Automation engine consumed by the coordinator.
pub trait AutomationEngine: Send + Sync {
    fn dispatch(&self, tenant_id: &str, event: ChangeEvent) -> AutomationResult<()>;
}

/// Engine front that queues events for an asynchronous workflow runner.
pub struct QueuedAutomationEngine {
    sender: mpsc::Sender<ChangeEvent>,
    capacity: usize,
}

impl QueuedAutomationEngine {
    /// Creates the engine front and the receiving end for the runner.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, capacity }, receiver)
    }
}

impl AutomationEngine for QueuedAutomationEngine {
    fn dispatch(&self, tenant_id: &str, event: ChangeEvent) -> AutomationResult<()> {
        if event.tenant_id != tenant_id {
            return Err(AutomationError::TenantMismatch {
                expected: tenant_id.to_string(),
                actual: event.tenant_id,
            });
        }

        let action = event.action;
        let incident_id = event.incident.id;
        self.sender.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => AutomationError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(_) => AutomationError::EngineStopped,
        })?;
        debug!(
            "event=automation_enqueue module=automation status=ok tenant_id={tenant_id} incident_id={incident_id} action={}",
            action.as_str()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AutomationEngine, AutomationError, QueuedAutomationEngine};
    use crate::model::event::{ChangeAction, ChangeEvent};
    use crate::model::incident::{Incident, IncidentSeverity};
    use uuid::Uuid;

    fn event(tenant_id: &str, action: ChangeAction) -> ChangeEvent {
        ChangeEvent::new(
            tenant_id,
            Incident {
                id: Uuid::new_v4(),
                tenant_id: tenant_id.to_string(),
                user_generated_name: Some("api latency".to_string()),
                ai_generated_name: None,
                user_summary: None,
                generated_summary: None,
                assignee: None,
                severity: IncidentSeverity::High,
                alerts_count: 0,
                is_confirmed: true,
                generated_by_ai: false,
                created_at_ms: 1,
                updated_at_ms: 1,
            },
            action,
        )
    }

    #[test]
    fn queues_events_in_dispatch_order() {
        let (engine, mut receiver) = QueuedAutomationEngine::new(4);
        engine
            .dispatch("t1", event("t1", ChangeAction::Created))
            .expect("first dispatch");
        engine
            .dispatch("t1", event("t1", ChangeAction::Deleted))
            .expect("second dispatch");

        assert_eq!(
            receiver.try_recv().expect("first event").action,
            ChangeAction::Created
        );
        assert_eq!(
            receiver.try_recv().expect("second event").action,
            ChangeAction::Deleted
        );
    }

    #[test]
    fn full_queue_is_reported() {
        let (engine, _receiver) = QueuedAutomationEngine::new(1);
        engine
            .dispatch("t1", event("t1", ChangeAction::Updated))
            .expect("fits capacity");
        let err = engine
            .dispatch("t1", event("t1", ChangeAction::Updated))
            .expect_err("second event overflows");
        assert_eq!(err, AutomationError::QueueFull { capacity: 1 });
    }

    #[test]
    fn dropped_runner_stops_engine() {
        let (engine, receiver) = QueuedAutomationEngine::new(2);
        drop(receiver);
        let err = engine
            .dispatch("t1", event("t1", ChangeAction::Updated))
            .expect_err("closed queue must fail");
        assert_eq!(err, AutomationError::EngineStopped);
    }

    #[test]
    fn rejects_cross_tenant_dispatch() {
        let (engine, _receiver) = QueuedAutomationEngine::new(2);
        let err = engine
            .dispatch("t1", event("t2", ChangeAction::Created))
            .expect_err("tenant mismatch must fail");
        assert!(matches!(err, AutomationError::TenantMismatch { .. }));
    }
}

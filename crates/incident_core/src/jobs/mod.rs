//! Background job submission.
//!
//! # Responsibility
//! - Define the asynchronous queue/pool contracts used for summary jobs.
//! - Provide an in-memory backend for embedding and tests.
//!
//! # Invariants
//! - A queue handle is acquired from the pool for every submission.
//! - `enqueue` resolves only after the backend acknowledged the job.

use crate::model::event::SummaryJobRequest;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Job name understood by the summary worker.
pub const SUMMARY_JOB_NAME: &str = "process_summary_generation";

/// Keyword parameters passed to a job.
pub type JobParams = Map<String, Value>;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// No connection to the job backend could be acquired.
    PoolUnavailable(String),
    /// Backend refused or failed to store the job.
    Enqueue(String),
}

impl Display for JobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoolUnavailable(message) => write!(f, "job pool unavailable: {message}"),
            Self::Enqueue(message) => write!(f, "failed to enqueue job: {message}"),
        }
    }
}

impl Error for JobError {}

/// Acknowledgement returned by the backend for one queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub job_name: String,
}

impl Display for JobHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.job_name, self.job_id)
    }
}

/// One connection to the job backend.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_name: &str, params: JobParams) -> JobResult<JobHandle>;
}

/// Asynchronous connection pool for the job backend.
#[async_trait]
pub trait JobPool: Send + Sync {
    async fn acquire(&self) -> JobResult<Arc<dyn JobQueue>>;
}

/// Builds keyword parameters for a summary job.
pub fn summary_job_params(request: &SummaryJobRequest) -> JobParams {
    let mut params = JobParams::new();
    params.insert(
        "tenant_id".to_string(),
        Value::String(request.tenant_id.clone()),
    );
    params.insert(
        "incident_id".to_string(),
        Value::String(request.incident_id.to_string()),
    );
    params
}

/// Job recorded by [`InMemoryJobQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub handle: JobHandle,
    pub params: JobParams,
}

/// Job queue keeping submissions in memory.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<QueuedJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job queued so far, in submission order.
    pub async fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job_name: &str, params: JobParams) -> JobResult<JobHandle> {
        if job_name.trim().is_empty() {
            return Err(JobError::Enqueue("job name is empty".to_string()));
        }

        let handle = JobHandle {
            job_id: Uuid::new_v4(),
            job_name: job_name.to_string(),
        };
        self.jobs.lock().await.push(QueuedJob {
            handle: handle.clone(),
            params,
        });
        Ok(handle)
    }
}

/// Pool handing out one shared in-memory queue.
///
/// Availability can be toggled to simulate a backend outage.
pub struct InMemoryJobPool {
    queue: Arc<InMemoryJobQueue>,
    available: AtomicBool,
}

impl InMemoryJobPool {
    pub fn new() -> Self {
        Self::with_queue(Arc::new(InMemoryJobQueue::new()))
    }

    pub fn with_queue(queue: Arc<InMemoryJobQueue>) -> Self {
        Self {
            queue,
            available: AtomicBool::new(true),
        }
    }

    pub fn queue(&self) -> Arc<InMemoryJobQueue> {
        Arc::clone(&self.queue)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemoryJobPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobPool for InMemoryJobPool {
    async fn acquire(&self) -> JobResult<Arc<dyn JobQueue>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(JobError::PoolUnavailable(
                "in-memory backend marked unavailable".to_string(),
            ));
        }
        let queue: Arc<dyn JobQueue> = self.queue.clone();
        Ok(queue)
    }
}

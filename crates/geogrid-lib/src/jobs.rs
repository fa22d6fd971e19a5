//! Job orchestration: tracking analysis jobs running on a remote endpoint.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::remote::{AnalysisEndpoint, RemoteJobId, RemoteState};

/// Locally assigned job identifier.
pub type JobId = u64;

/// Active (non-terminal) jobs tracked at once.
pub const DEFAULT_JOB_LIMIT: usize = 8;

/// Local lifecycle of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Discarded,
}

impl JobStatus {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Discarded)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

impl From<RemoteState> for JobStatus {
    fn from(state: RemoteState) -> Self {
        match state {
            RemoteState::Waiting => Self::Queued,
            RemoteState::Running => Self::Running,
            RemoteState::Success => Self::Completed,
            RemoteState::Failed => Self::Failed,
            RemoteState::Aborted => Self::Discarded,
        }
    }
}

/// Analysis the remote service should run on the submitted graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AnalysisKind {
    ShortestPath { start: usize, end: usize },
    MinimumSpanningTree,
    Spanner { stretch: f64 },
}

/// A named analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub name: String,
    #[serde(flatten)]
    pub kind: AnalysisKind,
}

impl AnalysisRequest {
    pub fn new(name: impl Into<String>, kind: AnalysisKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// What a layer holds, as far as job submission cares.
#[derive(Debug, Clone)]
pub enum LayerKind {
    Graph(Graph),
    Vector,
    Raster,
}

/// A named data layer selected for analysis.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
}

/// The graph handed to `submit`, directly or through a layer.
#[derive(Debug, Clone)]
pub enum GraphInput {
    Graph(Graph),
    Layer(Layer),
    None,
}

impl GraphInput {
    fn into_graph(self) -> Result<Graph> {
        match self {
            Self::Graph(graph) => Ok(graph),
            Self::Layer(layer) => match layer.kind {
                LayerKind::Graph(graph) => Ok(graph),
                LayerKind::Vector | LayerKind::Raster => Err(Error::InvalidLayer),
            },
            Self::None => Err(Error::NoGraphSelected),
        }
    }
}

/// One tracked job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request: AnalysisRequest,
    pub remote_id: RemoteJobId,
    pub status: JobStatus,
    /// Completion percentage in `[0, 100]`.
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub graph: Graph,
}

/// Tracks analysis jobs against a remote endpoint.
///
/// The job table mutex only guards record reads and writes. Endpoint calls
/// happen outside the lock, so polls for independent jobs run concurrently
/// and a discard can overtake an in-flight poll.
pub struct JobOrchestrator {
    endpoint: Box<dyn AnalysisEndpoint>,
    jobs: Mutex<HashMap<JobId, Job>>,
    next_id: AtomicU64,
    limit: usize,
}

impl JobOrchestrator {
    pub fn new(endpoint: Box<dyn AnalysisEndpoint>) -> Self {
        Self::with_limit(endpoint, DEFAULT_JOB_LIMIT)
    }

    pub fn with_limit(endpoint: Box<dyn AnalysisEndpoint>, limit: usize) -> Self {
        Self {
            endpoint,
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            limit,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_count(table: &HashMap<JobId, Job>) -> usize {
        table.values().filter(|j| !j.status.is_terminal()).count()
    }

    /// Submit a new analysis job. The graph is cloned into the job record,
    /// so later edits to the caller's graph do not affect the submission.
    pub fn submit(&self, input: GraphInput, request: AnalysisRequest) -> Result<JobId> {
        let graph = input.into_graph()?;

        if Self::active_count(&self.table()) >= self.limit {
            return Err(Error::JobLimitExceeded { limit: self.limit });
        }

        let remote_id = self.endpoint.submit(&request, &graph)?;

        let mut table = self.table();
        // concurrent submits may have filled the table while we were on the
        // wire; give the slot back rather than exceed the bound
        if Self::active_count(&table) >= self.limit {
            drop(table);
            if let Err(err) = self.endpoint.abort(&remote_id) {
                warn!(remote_id = %remote_id, error = %err, "failed to abort overflow submission");
            }
            return Err(Error::JobLimitExceeded { limit: self.limit });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        table.insert(
            id,
            Job {
                id,
                request,
                remote_id: remote_id.clone(),
                status: JobStatus::Queued,
                progress: 0,
                message: None,
                created_at: Utc::now(),
                graph,
            },
        );
        debug!(job = id, remote_id = %remote_id, "submitted job");
        Ok(id)
    }

    /// Refresh and return the status of a job.
    ///
    /// Terminal jobs are answered locally. A transport failure leaves the
    /// record untouched and surfaces as [`Error::Poll`] for the caller to
    /// retry.
    pub fn poll(&self, job: JobId) -> Result<JobStatus> {
        let (remote_id, status) = {
            let table = self.table();
            let record = table.get(&job).ok_or(Error::UnknownJob { job })?;
            (record.remote_id.clone(), record.status)
        };
        if status.is_terminal() {
            return Ok(status);
        }

        let remote = self.endpoint.status(&remote_id).map_err(|err| Error::Poll {
            job,
            message: err.to_string(),
        })?;

        let mut table = self.table();
        let record = table.get_mut(&job).ok_or(Error::UnknownJob { job })?;
        // a discard that landed while we were polling wins
        if record.status.is_terminal() {
            return Ok(record.status);
        }
        record.status = JobStatus::from(remote.state);
        if let Some(progress) = remote.progress {
            record.progress = progress.min(100);
        }
        if record.status == JobStatus::Completed {
            record.progress = 100;
        }
        record.message = remote.message;
        Ok(record.status)
    }

    /// Discard a job: mark it locally, then abort it remotely best-effort.
    /// Discarding an already terminal job is a no-op.
    pub fn discard(&self, job: JobId) -> Result<()> {
        let remote_id = {
            let mut table = self.table();
            let record = table.get_mut(&job).ok_or(Error::UnknownJob { job })?;
            if record.status.is_terminal() {
                return Ok(());
            }
            record.status = JobStatus::Discarded;
            record.remote_id.clone()
        };

        if let Err(err) = self.endpoint.abort(&remote_id) {
            debug!(job, error = %err, "remote abort failed after discard");
        }
        Ok(())
    }

    /// Fetch the result document of a completed job.
    pub fn result(&self, job: JobId) -> Result<serde_json::Value> {
        let remote_id = {
            let table = self.table();
            let record = table.get(&job).ok_or(Error::UnknownJob { job })?;
            if record.status != JobStatus::Completed {
                return Err(Error::NotReady { job });
            }
            record.remote_id.clone()
        };
        self.endpoint.result(&remote_id)
    }

    /// Locally known status, without touching the endpoint.
    pub fn status(&self, job: JobId) -> Result<JobStatus> {
        self.table()
            .get(&job)
            .map(|record| record.status)
            .ok_or(Error::UnknownJob { job })
    }

    /// Snapshot of all tracked jobs, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.table().values().cloned().collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        jobs
    }
}

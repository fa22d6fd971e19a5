use thiserror::Error;

use crate::jobs::JobId;

/// Convenient result alias for the geogrid library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised when a cost expression fails to parse.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    /// Raised when evaluating a parsed cost expression fails.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// Raised when the geodesic metric is requested under a projected CRS.
    #[error("geodesic distance requires a geographic CRS, got {authid}")]
    InvalidCrs { authid: String },

    /// Raised when a computed distance falls outside the valid domain.
    #[error("computed distance {value} is out of domain")]
    Domain { value: f64 },

    /// Raised when graph construction fails.
    #[error("graph build failed: {0}")]
    Build(String),

    /// Raised when a build is requested while the task limit is saturated.
    #[error("can not build graph due to task limit of {limit}")]
    TaskLimitExceeded { limit: usize },

    /// Raised when the analysis server host or port is not configured.
    #[error("analysis server host or port not configured")]
    EndpointUnreachable,

    /// Raised when the selected layer does not contain a graph.
    #[error("the selected layer is not a graph layer")]
    InvalidLayer,

    /// Raised when an analysis is submitted without a graph.
    #[error("no graph selected for analysis")]
    NoGraphSelected,

    /// Raised when a submission exceeds the tracked-job bound.
    #[error("job limit of {limit} tracked jobs reached")]
    JobLimitExceeded { limit: usize },

    /// Transient status-poll failure; the job record is left unchanged.
    #[error("status poll for job {job} failed: {message}")]
    Poll { job: JobId, message: String },

    /// Raised when the remote service rejects or cannot find a job.
    #[error("remote job {job}: {message}")]
    Remote { job: String, message: String },

    /// Raised when a result is requested before the job completed.
    #[error("job {job} has no result yet")]
    NotReady { job: JobId },

    /// Raised when a job id is not present in the job table.
    #[error("found no job with id {job}")]
    UnknownJob { job: JobId },

    /// Raised when the raster sampler has no data for a raster input.
    #[error("no raster data available for raster {raster}")]
    NoRasterData { raster: usize },

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

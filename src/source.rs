use async_trait::async_trait;
use thiserror::Error;

use crate::job::{BuildInfo, JobHandle};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found")]
    NotFound,
    #[error("unexpected http status {code} from {url}")]
    Status { code: u16, url: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
}

/// Remote side of the engine: everything the CI server exposes about jobs.
///
/// `NotFound` is reserved for "no such job" and "job has never built"; every
/// other error is treated as fatal by the callers.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Names of all jobs, in the server's listing order.
    async fn list_jobs(&self) -> Result<Vec<String>, SourceError>;

    /// Canonical name of the job called `name`.
    async fn get_job_by_name(&self, name: &str) -> Result<String, SourceError>;

    async fn get_last_build(&self, job: &JobHandle) -> Result<BuildInfo, SourceError>;

    /// Triggers a build with default parameters and returns the identifier
    /// the server handed back. 0 means no new build was queued: the job was
    /// already waiting in the queue, or the server gave no identifier.
    async fn invoke(&self, job: &JobHandle) -> Result<i64, SourceError>;

    async fn stop(&self, job: &JobHandle, build: &BuildInfo) -> Result<(), SourceError>;

    async fn get_config(&self, job: &JobHandle) -> Result<String, SourceError>;

    async fn update_config(&self, job: &JobHandle, xml: &str) -> Result<(), SourceError>;
}

use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing configuration: {}", .0.join(", "))]
    ConfigMissing(Vec<&'static str>),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("cannot list jobs: {0}")]
    Remote(#[source] SourceError),
    #[error("cannot {action} job {job}: {source}")]
    RemoteCall {
        action: &'static str,
        job: String,
        #[source]
        source: SourceError,
    },
    #[error("invalid config document for job {job}: {message}")]
    Document { job: String, message: String },
    #[error("no job matches your rules")]
    NoJobsMatched,
    #[error("user canceled")]
    UserCancelled,
    #[error("unrecognized answer: {0}")]
    UnrecognizedAnswer(String),
    #[error("{0} is not accepted status")]
    InvalidStatus(String),
    #[error("fetch worker terminated abnormally: {0}")]
    Worker(String),
}

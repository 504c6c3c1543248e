use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::Connection;
use crate::error::Error;
use crate::filter::FilterSpec;
use crate::job::{Job, JobHandle};
use crate::pool;
use crate::schedule::set_timer_trigger;
use crate::source::{JobSource, SourceError};

/// What a bulk operation did to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    AlreadyRunning,
    Started { build_id: i64 },
    // the server accepted the request but handed back no build id
    NoObservableEffect,
    NotRunning,
    StopRequested,
    AlreadyScheduled { schedule: String },
    Scheduled { schedule: String },
}

pub struct Report<'a> {
    pub job: &'a str,
    pub outcome: &'a Outcome,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let job = self.job;
        match self.outcome {
            Outcome::AlreadyRunning => write!(f, "job {} is already in started state", job),
            Outcome::Started { build_id } => write!(
                f,
                "job {} is now in started state, build id: {}",
                job, build_id
            ),
            Outcome::NoObservableEffect => Ok(()),
            Outcome::NotRunning => write!(f, "job {} is already in stopped state", job),
            Outcome::StopRequested => write!(f, "job {} is now in stopped state", job),
            Outcome::AlreadyScheduled { schedule } => write!(
                f,
                "{} schedule is already defined on {} job",
                schedule, job
            ),
            Outcome::Scheduled { schedule } => {
                write!(f, "job {} is now scheduled ({})", job, schedule)
            }
        }
    }
}

impl Outcome {
    /// Console line for this outcome on `job`, `None` when there is nothing
    /// worth telling.
    pub fn report<'a>(&'a self, job: &'a str) -> Option<Report<'a>> {
        match self {
            Outcome::NoObservableEffect => None,
            outcome => Some(Report { job, outcome }),
        }
    }
}

/// Fetches, filters and acts on the jobs of one CI server.
///
/// Bulk operations stop at the first remote failure. Jobs handled before
/// that point keep their new state: nothing is rolled back.
pub struct JobEngine<S: ?Sized> {
    source: Arc<S>,
    concurrency: usize,
}

impl<S> JobEngine<S>
where
    S: JobSource + ?Sized + 'static,
{
    pub fn new(source: Arc<S>, connection: &Connection) -> Self {
        JobEngine {
            source,
            concurrency: connection.max_concurrent,
        }
    }

    #[cfg(test)]
    pub fn with_concurrency(source: Arc<S>, concurrency: usize) -> Self {
        JobEngine {
            source,
            concurrency,
        }
    }

    /// Jobs selected by `filter`, in listing order.
    ///
    /// A name in the filter bypasses the bulk fetch and every other rule:
    /// the result is exactly that job or `JobNotFound`.
    pub async fn filtered(&self, filter: &FilterSpec) -> Result<Vec<Job>, Error> {
        if let Some(name) = filter.by_name() {
            let job = self.by_name(name).await?;
            return Ok(vec![job]);
        }

        let jobs = pool::fetch_all(Arc::clone(&self.source), self.concurrency).await?;
        let fetched = jobs.len();
        let selected = filter.select(jobs, Utc::now());
        debug!(
            fetched,
            selected = selected.len(),
            status = %filter.status,
            "filtered jobs"
        );
        Ok(selected)
    }

    async fn by_name(&self, name: &str) -> Result<Job, Error> {
        let name = match self.source.get_job_by_name(name).await {
            Ok(name) => name,
            Err(SourceError::NotFound) => return Err(Error::JobNotFound(name.to_string())),
            Err(source) => {
                return Err(Error::RemoteCall {
                    action: "look up",
                    job: name.to_string(),
                    source,
                })
            }
        };
        pool::build_job(self.source.as_ref(), JobHandle { id: 0, name }).await
    }

    pub async fn start<F>(&self, jobs: &[Job], mut on_outcome: F) -> Result<Vec<Outcome>, Error>
    where
        F: FnMut(&Job, &Outcome),
    {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let outcome = if job.running {
                Outcome::AlreadyRunning
            } else {
                let build_id = self
                    .source
                    .invoke(&job.handle)
                    .await
                    .map_err(|source| remote("start", job, source))?;
                info!(job = %job.name, build_id, "build invoked");
                if build_id > 0 {
                    Outcome::Started { build_id }
                } else {
                    Outcome::NoObservableEffect
                }
            };
            on_outcome(job, &outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub async fn stop<F>(&self, jobs: &[Job], mut on_outcome: F) -> Result<Vec<Outcome>, Error>
    where
        F: FnMut(&Job, &Outcome),
    {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let outcome = match &job.last_build {
                Some(build) if job.running => {
                    self.source
                        .stop(&job.handle, build)
                        .await
                        .map_err(|source| remote("stop", job, source))?;
                    info!(job = %job.name, build = build.number, "stop requested");
                    Outcome::StopRequested
                }
                _ => Outcome::NotRunning,
            };
            on_outcome(job, &outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Puts every job on the cron `schedule`, writing configurations only
    /// when the schedule actually changes.
    pub async fn schedule<F>(
        &self,
        jobs: &[Job],
        schedule: &str,
        mut on_outcome: F,
    ) -> Result<Vec<Outcome>, Error>
    where
        F: FnMut(&Job, &Outcome),
    {
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let raw = self
                .source
                .get_config(&job.handle)
                .await
                .map_err(|source| remote("read configuration of", job, source))?;

            let updated = set_timer_trigger(&raw, schedule).map_err(|e| {
                Error::Document {
                    job: job.name.clone(),
                    message: e.to_string(),
                }
            })?;

            let outcome = match updated {
                None => Outcome::AlreadyScheduled {
                    schedule: schedule.to_string(),
                },
                Some(xml) => {
                    self.source
                        .update_config(&job.handle, &xml)
                        .await
                        .map_err(|source| remote("update configuration of", job, source))?;
                    info!(job = %job.name, schedule, "schedule updated");
                    Outcome::Scheduled {
                        schedule: schedule.to_string(),
                    }
                }
            };
            on_outcome(job, &outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

fn remote(action: &'static str, job: &Job, source: SourceError) -> Error {
    Error::RemoteCall {
        action,
        job: job.name.clone(),
        source,
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::Error;
use crate::job::{Job, JobHandle};
use crate::source::{JobSource, SourceError};

/// Builds the job record of `handle` from its latest build.
///
/// A job without build history is a valid record, not an error.
pub async fn build_job<S>(source: &S, handle: JobHandle) -> Result<Job, Error>
where
    S: JobSource + ?Sized,
{
    match source.get_last_build(&handle).await {
        Ok(build) => Ok(Job::from_build(handle, build)),
        Err(SourceError::NotFound) => Ok(Job::never_built(handle)),
        Err(source) => Err(Error::RemoteCall {
            action: "fetch last build of",
            job: handle.name,
            source,
        }),
    }
}

// State shared by the workers of one fetch.
struct Shared {
    queue: Mutex<VecDeque<JobHandle>>,
    aborted: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl Shared {
    fn next(&self) -> Option<JobHandle> {
        if self.aborted.load(Ordering::Acquire) {
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn fail(&self, err: Error) {
        self.aborted.store(true, Ordering::Release);
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(err);
    }
}

/// Lists every job and resolves their last builds with at most `concurrency`
/// requests in flight.
///
/// The returned jobs are in listing order. Any failure aborts the whole fetch:
/// either every job comes back or none does.
pub async fn fetch_all<S>(source: Arc<S>, concurrency: usize) -> Result<Vec<Job>, Error>
where
    S: JobSource + ?Sized + 'static,
{
    let handles: VecDeque<JobHandle> = source
        .list_jobs()
        .await
        .map_err(Error::Remote)?
        .into_iter()
        .enumerate()
        .map(|(id, name)| JobHandle { id, name })
        .collect();

    let total = handles.len();
    let workers = concurrency.max(1).min(total.max(1));
    debug!(jobs = total, workers, "fetching last builds");

    let shared = Arc::new(Shared {
        queue: Mutex::new(handles),
        aborted: AtomicBool::new(false),
        first_error: Mutex::new(None),
    });

    let tasks = (0..workers).map(|worker| {
        let source = Arc::clone(&source);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move { run_worker(worker, source, shared).await })
    });
    let finished = join_all(tasks).await;

    if let Some(err) = shared
        .first_error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        return Err(err);
    }

    // Every job lands in the slot of its listing index.
    let mut slots: Vec<Option<Job>> = (0..total).map(|_| None).collect();
    for outcome in finished {
        let built = outcome.map_err(|e| Error::Worker(e.to_string()))?;
        for job in built {
            if let Some(slot) = slots.get_mut(job.id) {
                *slot = Some(job);
            }
        }
    }

    let jobs = slots
        .into_iter()
        .collect::<Option<Vec<Job>>>()
        .ok_or_else(|| Error::Worker("some jobs were never fetched".to_string()))?;
    debug!(jobs = jobs.len(), "fetch complete");
    Ok(jobs)
}

async fn run_worker<S>(worker: usize, source: Arc<S>, shared: Arc<Shared>) -> Vec<Job>
where
    S: JobSource + ?Sized,
{
    let mut built = Vec::new();
    while let Some(handle) = shared.next() {
        let name = handle.name.clone();
        match build_job(source.as_ref(), handle).await {
            Ok(job) => built.push(job),
            Err(err) => {
                warn!(worker, job = %name, error = %err, "aborting fetch");
                shared.fail(err);
                break;
            }
        }
    }
    built
}

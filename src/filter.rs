use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::job::{BuildResult, Job};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusClass {
    #[default]
    All,
    Running,
    Success,
    Failure,
    Aborted,
}

impl StatusClass {
    pub const VARIANTS: [&'static str; 5] = ["all", "running", "success", "failure", "aborted"];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::All => "all",
            StatusClass::Running => "running",
            StatusClass::Success => "success",
            StatusClass::Failure => "failure",
            StatusClass::Aborted => "aborted",
        }
    }
}

impl FromStr for StatusClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(StatusClass::All),
            "running" => Ok(StatusClass::Running),
            "success" => Ok(StatusClass::Success),
            "failure" => Ok(StatusClass::Failure),
            "aborted" => Ok(StatusClass::Aborted),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection rules for a bulk job operation.
///
/// A non-empty `name` switches to single-job lookup and the remaining fields
/// are ignored. Age bounds are in minutes, 0 meaning unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub name: String,
    pub status: StatusClass,
    pub age_min_minutes: u32,
    pub age_max_minutes: u32,
}

impl FilterSpec {
    pub fn by_name(&self) -> Option<&str> {
        if self.name.is_empty() {
            None
        } else {
            Some(&self.name)
        }
    }

    pub fn matches_at(&self, job: &Job, now: DateTime<Utc>) -> bool {
        status_matches(job, self.status)
            && min_age_matches(job, self.age_min_minutes, now)
            && max_age_matches(job, self.age_max_minutes, now)
    }

    /// Keeps the matching jobs, preserving their order.
    pub fn select(&self, jobs: Vec<Job>, now: DateTime<Utc>) -> Vec<Job> {
        jobs.into_iter()
            .filter(|job| self.matches_at(job, now))
            .collect()
    }
}

fn status_matches(job: &Job, status: StatusClass) -> bool {
    match status {
        StatusClass::All => true,
        StatusClass::Running => job.running,
        StatusClass::Success => !job.running && job.success,
        StatusClass::Failure => {
            !job.running && !job.success && job.result != BuildResult::Aborted.as_str()
        }
        StatusClass::Aborted => job.result == BuildResult::Aborted.as_str(),
    }
}

fn age_minutes(job: &Job, now: DateTime<Utc>) -> f64 {
    (now - job.last_build_created_at).num_milliseconds() as f64 / 60_000.0
}

fn min_age_matches(job: &Job, age_min: u32, now: DateTime<Utc>) -> bool {
    age_min == 0 || age_minutes(job, now) >= f64::from(age_min)
}

fn max_age_matches(job: &Job, age_max: u32, now: DateTime<Utc>) -> bool {
    age_max == 0 || age_minutes(job, now) < f64::from(age_max)
}

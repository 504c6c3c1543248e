use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Result string of a job that has never been built.
pub const NO_BUILD: &str = "NO_BUILD";

/// Reference to a remote job together with its position in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: usize,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Failure,
    Aborted,
    Unstable,
    NotBuilt,
    #[serde(other)]
    Unknown,
}

impl BuildResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Failure => "FAILURE",
            BuildResult::Aborted => "ABORTED",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildInfo {
    pub number: i64,
    pub duration_seconds: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub running: bool,
    // None while the build is still running
    pub result: Option<BuildResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: usize,
    pub name: String,
    pub last_build_duration: f64,
    pub last_build_created_at: DateTime<Utc>,
    pub running: bool,
    pub success: bool,
    pub result: String,
    pub handle: JobHandle,
    pub last_build: Option<BuildInfo>,
}

impl Job {
    /// Normalizes the latest build of `handle` into a job record.
    pub fn from_build(handle: JobHandle, build: BuildInfo) -> Job {
        let result = build
            .result
            .map(|r| r.as_str().to_string())
            .unwrap_or_default();
        let success = !build.running && result == BuildResult::Success.as_str();

        Job {
            id: handle.id,
            name: handle.name.clone(),
            last_build_duration: build.duration_seconds,
            last_build_created_at: build.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            running: build.running,
            success,
            result,
            handle,
            last_build: Some(build),
        }
    }

    /// Record for a job without any build history.
    pub fn never_built(handle: JobHandle) -> Job {
        Job {
            id: handle.id,
            name: handle.name.clone(),
            last_build_duration: 0.0,
            last_build_created_at: DateTime::<Utc>::UNIX_EPOCH,
            running: false,
            success: false,
            result: NO_BUILD.to_string(),
            handle,
            last_build: None,
        }
    }

    pub fn has_build(&self) -> bool {
        self.last_build.is_some()
    }
}

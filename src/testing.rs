//! In-memory `JobSource` used by the engine and pool tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::job::{BuildInfo, BuildResult, JobHandle};
use crate::source::{JobSource, SourceError};

#[derive(Default)]
pub struct FakeSource {
    names: Vec<String>,
    builds: HashMap<String, BuildInfo>,
    latency: HashMap<String, Duration>,
    failing: HashSet<String>,
    configs: Mutex<HashMap<String, String>>,
    next_build_id: i64,
    pub last_build_calls: AtomicUsize,
    pub invoked: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<(String, i64)>>,
    pub config_writes: Mutex<Vec<String>>,
}

pub fn finished(result: BuildResult) -> BuildInfo {
    BuildInfo {
        number: 7,
        duration_seconds: 12.0,
        created_at: Some(Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap()),
        running: false,
        result: Some(result),
    }
}

pub fn running() -> BuildInfo {
    BuildInfo {
        number: 8,
        duration_seconds: 0.0,
        created_at: Some(Utc::now()),
        running: true,
        result: None,
    }
}

pub fn pipeline_config(schedule: Option<&str>) -> String {
    let properties = match schedule {
        Some(spec) => format!(
            "<properties><org.jenkinsci.plugins.workflow.job.properties.PipelineTriggersJobProperty>\
             <triggers><hudson.triggers.TimerTrigger><spec>{}</spec></hudson.triggers.TimerTrigger>\
             </triggers></org.jenkinsci.plugins.workflow.job.properties.PipelineTriggersJobProperty>\
             </properties>",
            spec
        ),
        None => "<properties/>".to_string(),
    };
    format!(
        "<?xml version='1.1' encoding='UTF-8'?>\n<flow-definition plugin=\"workflow-job\">\
         <description>demo</description>{}<disabled>false</disabled></flow-definition>",
        properties
    )
}

impl FakeSource {
    pub fn new() -> Self {
        FakeSource {
            next_build_id: 100,
            ..FakeSource::default()
        }
    }

    /// Adds a job; `None` means it has never been built.
    pub fn with_job(mut self, name: &str, build: Option<BuildInfo>) -> Self {
        self.names.push(name.to_string());
        if let Some(build) = build {
            self.builds.insert(name.to_string(), build);
        }
        self.configs
            .get_mut()
            .unwrap()
            .insert(name.to_string(), pipeline_config(None));
        self
    }

    pub fn with_latency(mut self, name: &str, latency: Duration) -> Self {
        self.latency.insert(name.to_string(), latency);
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_config(self, name: &str, xml: String) -> Self {
        self.configs.lock().unwrap().insert(name.to_string(), xml);
        self
    }

    /// Build ids returned by `invoke`; 0 simulates a job already waiting in the queue.
    pub fn with_next_build_id(mut self, id: i64) -> Self {
        self.next_build_id = id;
        self
    }

    pub fn config(&self, name: &str) -> String {
        self.configs.lock().unwrap()[name].clone()
    }

    fn check(&self, name: &str) -> Result<(), SourceError> {
        if self.failing.contains(name) {
            return Err(SourceError::Status {
                code: 500,
                url: format!("fake://{}", name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobSource for FakeSource {
    async fn list_jobs(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.names.clone())
    }

    async fn get_job_by_name(&self, name: &str) -> Result<String, SourceError> {
        self.names
            .iter()
            .find(|n| n.as_str() == name)
            .cloned()
            .ok_or(SourceError::NotFound)
    }

    async fn get_last_build(&self, job: &JobHandle) -> Result<BuildInfo, SourceError> {
        self.last_build_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency.get(&job.name) {
            tokio::time::sleep(*latency).await;
        }
        self.check(&job.name)?;
        self.builds
            .get(&job.name)
            .cloned()
            .ok_or(SourceError::NotFound)
    }

    async fn invoke(&self, job: &JobHandle) -> Result<i64, SourceError> {
        self.check(&job.name)?;
        let mut invoked = self.invoked.lock().unwrap();
        invoked.push(job.name.clone());
        if self.next_build_id <= 0 {
            return Ok(self.next_build_id);
        }
        Ok(self.next_build_id + invoked.len() as i64 - 1)
    }

    async fn stop(&self, job: &JobHandle, build: &BuildInfo) -> Result<(), SourceError> {
        self.check(&job.name)?;
        self.stopped
            .lock()
            .unwrap()
            .push((job.name.clone(), build.number));
        Ok(())
    }

    async fn get_config(&self, job: &JobHandle) -> Result<String, SourceError> {
        self.check(&job.name)?;
        self.configs
            .lock()
            .unwrap()
            .get(&job.name)
            .cloned()
            .ok_or(SourceError::NotFound)
    }

    async fn update_config(&self, job: &JobHandle, xml: &str) -> Result<(), SourceError> {
        self.check(&job.name)?;
        self.config_writes.lock().unwrap().push(job.name.clone());
        self.configs
            .lock()
            .unwrap()
            .insert(job.name.clone(), xml.to_string());
        Ok(())
    }
}

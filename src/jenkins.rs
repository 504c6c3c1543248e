use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::debug;

use crate::config::Connection;
use crate::job::{BuildInfo, BuildResult, JobHandle};
use crate::source::{JobSource, SourceError};

#[derive(Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

#[derive(Deserialize)]
struct JobEntry {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildTarget {
    #[serde(default)]
    in_queue: bool,
    #[serde(default)]
    property: Vec<JobProperty>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobProperty {
    #[serde(default)]
    parameter_definitions: Option<Vec<IgnoredAny>>,
}

impl BuildTarget {
    fn parameterized(&self) -> bool {
        self.property.iter().any(|property| {
            property
                .parameter_definitions
                .as_ref()
                .map_or(false, |definitions| !definitions.is_empty())
        })
    }

    /// Parameterized jobs only accept `buildWithParameters`.
    fn endpoint(&self) -> &'static str {
        if self.parameterized() {
            "buildWithParameters"
        } else {
            "build"
        }
    }
}

#[derive(Deserialize)]
struct LastBuild {
    number: i64,
    // milliseconds
    #[serde(default)]
    duration: f64,
    timestamp: Option<i64>,
    #[serde(default)]
    building: bool,
    result: Option<BuildResult>,
}

impl From<LastBuild> for BuildInfo {
    fn from(build: LastBuild) -> Self {
        BuildInfo {
            number: build.number,
            duration_seconds: build.duration / 1000.0,
            created_at: build
                .timestamp
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            running: build.building,
            result: build.result,
        }
    }
}

/// Jenkins REST API client authenticated with a user API token.
pub struct Client {
    http: reqwest::Client,
    base: Url,
    username: String,
    token: String,
}

impl Client {
    pub fn connect(connection: &Connection) -> Result<Client, SourceError> {
        let address = format!("{}/", connection.address.trim_end_matches('/'));
        let base = Url::parse(&address)
            .map_err(|e| SourceError::InvalidAddress(format!("{}: {}", connection.address, e)))?;
        if base.cannot_be_a_base() {
            return Err(SourceError::InvalidAddress(connection.address.clone()));
        }

        let http = reqwest::Client::builder()
            .timeout(connection.timeout)
            .build()?;

        Ok(Client {
            http,
            base,
            username: connection.username.clone(),
            token: connection.token.clone(),
        })
    }

    fn job_url(&self, name: &str) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidAddress(self.base.to_string()))?
            .pop_if_empty()
            .extend(["job", name, ""]);
        Ok(url)
    }

    fn job_endpoint(&self, name: &str, path: &str) -> Result<Url, SourceError> {
        self.job_url(name)?
            .join(path)
            .map_err(|e| SourceError::InvalidAddress(e.to_string()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SourceError> {
        let response = request
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await?;

        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "jenkins response");
        match status {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound),
            _ => Err(SourceError::Status {
                code: status.as_u16(),
                url: response.url().to_string(),
            }),
        }
    }
}

/// Queue item id from the `Location` header Jenkins returns on a build
/// request (`.../queue/item/<id>/`); 0 when missing.
pub fn queue_id(location: Option<&str>) -> i64 {
    location
        .and_then(|l| l.trim_end_matches('/').rsplit('/').next())
        .and_then(|id| id.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl JobSource for Client {
    async fn list_jobs(&self) -> Result<Vec<String>, SourceError> {
        let url = self
            .base
            .join("api/json")
            .map_err(|e| SourceError::InvalidAddress(e.to_string()))?;
        let list: JobList = self
            .send(self.http.get(url).query(&[("tree", "jobs[name]")]))
            .await?
            .json()
            .await?;
        Ok(list.jobs.into_iter().map(|job| job.name).collect())
    }

    async fn get_job_by_name(&self, name: &str) -> Result<String, SourceError> {
        let url = self.job_endpoint(name, "api/json")?;
        let job: JobEntry = self
            .send(self.http.get(url).query(&[("tree", "name")]))
            .await?
            .json()
            .await?;
        Ok(job.name)
    }

    async fn get_last_build(&self, job: &JobHandle) -> Result<BuildInfo, SourceError> {
        let url = self.job_endpoint(&job.name, "lastBuild/api/json")?;
        let build: LastBuild = self.send(self.http.get(url)).await?.json().await?;
        Ok(build.into())
    }

    async fn invoke(&self, job: &JobHandle) -> Result<i64, SourceError> {
        let url = self.job_endpoint(&job.name, "api/json")?;
        let target: BuildTarget = self
            .send(
                self.http
                    .get(url)
                    .query(&[("tree", "property[parameterDefinitions[name]],inQueue")]),
            )
            .await?
            .json()
            .await?;
        if target.in_queue {
            debug!(job = %job.name, "build already queued");
            return Ok(0);
        }

        let url = self.job_endpoint(&job.name, target.endpoint())?;
        let response = self.send(self.http.post(url)).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok());
        Ok(queue_id(location))
    }

    async fn stop(&self, job: &JobHandle, build: &BuildInfo) -> Result<(), SourceError> {
        let url = self.job_endpoint(&job.name, &format!("{}/stop", build.number))?;
        self.send(self.http.post(url)).await?;
        Ok(())
    }

    async fn get_config(&self, job: &JobHandle) -> Result<String, SourceError> {
        let url = self.job_endpoint(&job.name, "config.xml")?;
        Ok(self.send(self.http.get(url)).await?.text().await?)
    }

    async fn update_config(&self, job: &JobHandle, xml: &str) -> Result<(), SourceError> {
        let url = self.job_endpoint(&job.name, "config.xml")?;
        self.send(
            self.http
                .post(url)
                .header(CONTENT_TYPE, "application/xml")
                .body(xml.to_string()),
        )
        .await?;
        Ok(())
    }
}

//! Client for the cron-job.org REST API, which fires reminder callbacks.

use serde::{Deserialize, Serialize};
use shared::ScheduleDescriptor;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::config::CronConfig;

/// cron-job.org request method code for POST
const REQUEST_METHOD_POST: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cron service error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// A job to register: POST `url` with `headers` on `schedule`
#[derive(Debug, Clone, PartialEq)]
pub struct CronJob {
    pub title: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub schedule: ScheduleDescriptor,
}

#[derive(Serialize)]
struct CreateJobBody<'a> {
    job: JobPayload<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobPayload<'a> {
    url: &'a str,
    title: &'a str,
    enabled: bool,
    save_responses: bool,
    request_method: u8,
    extended_data: ExtendedData<'a>,
    schedule: &'a ScheduleDescriptor,
}

#[derive(Serialize)]
struct ExtendedData<'a> {
    headers: &'a BTreeMap<String, String>,
    body: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobResponse {
    job_id: i64,
}

#[derive(Clone)]
pub struct CronJobClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CronJobClient {
    pub fn new(config: &CronConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// Register a job and return the id the cron service assigned to it
    #[instrument(skip(self, job), fields(url = %job.url))]
    pub async fn create_job(&self, job: &CronJob) -> Result<i64, SchedulerError> {
        let body = CreateJobBody {
            job: JobPayload {
                url: &job.url,
                title: &job.title,
                enabled: true,
                save_responses: true,
                request_method: REQUEST_METHOD_POST,
                extended_data: ExtendedData {
                    headers: &job.headers,
                    body: "",
                },
                schedule: &job.schedule,
            },
        };

        debug!("Registering cron job");

        let response = self
            .http
            .put(format!("{}/jobs", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let created: CreateJobResponse = response.json().await?;
        debug!(job_id = created.job_id, "Cron job registered");
        Ok(created.job_id)
    }

    #[instrument(skip(self))]
    pub async fn delete_job(&self, job_id: i64) -> Result<(), SchedulerError> {
        let response = self
            .http
            .delete(format!("{}/jobs/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::{env, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info};

use common::{JobDescription, JobInfo, JobStatus};

use super::ExecutionEngine;

/// Engine remoto: manda el job al master por HTTP y hace polling del estado.
///
/// - `POST {base}/api/v1/jobs` con el `JobDescription`
/// - `GET  {base}/api/v1/jobs/{id}` hasta `SUCCEEDED` o `FAILED`
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// - En Docker: MASTER_URL=http://master:8080
    /// - Local: default http://localhost:8080
    pub fn from_env() -> Self {
        Self::new(env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_job(&self, job: &JobDescription) -> Result<JobInfo> {
        let url = format!("{}/api/v1/jobs", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(job)
            .send()
            .await
            .with_context(|| format!("no se pudo contactar al master en {}", url))?;

        if !resp.status().is_success() {
            bail!("el master rechazó el job {}: HTTP {}", job.name, resp.status());
        }
        Ok(resp.json().await?)
    }

    async fn get_job(&self, id: &str) -> Result<JobInfo> {
        let url = format!("{}/api/v1/jobs/{id}", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            bail!("No se encontró el job con id {id} (HTTP {})", resp.status());
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    async fn submit(&self, job: &JobDescription) -> Result<()> {
        let accepted = self.post_job(job).await?;
        info!(
            "job {} aceptado por el master como {} ({:?})",
            job.name, accepted.id, accepted.status
        );

        let mut current = accepted;
        while !current.status.is_terminal() {
            sleep(self.poll_interval).await;
            current = self.get_job(&current.id).await?;
            debug!("job {} estado {:?}", current.id, current.status);
        }

        match current.status {
            JobStatus::Succeeded => Ok(()),
            _ => Err(anyhow!(
                "job {} terminó en FAILED: {}",
                current.id,
                current.error.as_deref().unwrap_or("sin detalle")
            )),
        }
    }
}

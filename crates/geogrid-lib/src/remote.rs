//! Remote analysis endpoint: the HTTP service that runs submitted jobs.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::jobs::AnalysisRequest;

/// Identifier assigned by the remote service.
pub type RemoteJobId = String;

/// Lifecycle state reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteState {
    Waiting,
    Running,
    Success,
    Failed,
    Aborted,
}

/// One status poll of a remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub state: RemoteState,
    /// Completion percentage in `[0, 100]`, when the service reports one.
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Operations the job orchestrator needs from the analysis service.
///
/// The service is a black box: submit hands over a request plus its graph,
/// and the rest is polling, aborting and fetching an opaque result document.
pub trait AnalysisEndpoint: Send + Sync {
    fn submit(&self, request: &AnalysisRequest, graph: &Graph) -> Result<RemoteJobId>;
    fn status(&self, job: &RemoteJobId) -> Result<RemoteStatus>;
    fn abort(&self, job: &RemoteJobId) -> Result<()>;
    fn result(&self, job: &RemoteJobId) -> Result<serde_json::Value>;
}

/// [`AnalysisEndpoint`] over plain HTTP with optional basic auth.
#[derive(Debug)]
pub struct HttpEndpoint {
    client: Client,
    config: EndpointConfig,
    base_url: String,
}

impl HttpEndpoint {
    /// Build a client for `config`. Fails up front when no host is set.
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let base_url = config.base_url().ok_or(Error::EndpointUnreachable)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn request(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response> {
        let builder = match (&self.config.username, &self.config.password) {
            (Some(user), password) => builder.basic_auth(user, password.as_deref()),
            _ => builder,
        };
        builder.send().map_err(connection_error)
    }
}

fn connection_error(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::EndpointUnreachable
    } else {
        Error::Http(err)
    }
}

fn user_agent() -> String {
    format!("geogrid-lib/{version}", version = env!("CARGO_PKG_VERSION"))
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    request: &'a AnalysisRequest,
    graph: &'a Graph,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: RemoteJobId,
}

impl AnalysisEndpoint for HttpEndpoint {
    fn submit(&self, request: &AnalysisRequest, graph: &Graph) -> Result<RemoteJobId> {
        let url = format!("{}/jobs", self.base_url);
        let body = SubmitBody { request, graph };
        let response = self
            .request(self.client.post(&url).json(&body))?
            .error_for_status()?;
        let submitted: SubmitResponse = response.json()?;
        debug!(remote_id = %submitted.id, "submitted analysis job");
        Ok(submitted.id)
    }

    fn status(&self, job: &RemoteJobId) -> Result<RemoteStatus> {
        let url = format!("{}/jobs/{job}", self.base_url);
        let response = self.request(self.client.get(&url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::Remote {
                job: job.clone(),
                message: "remote job not found".to_string(),
            });
        }
        Ok(response.error_for_status()?.json()?)
    }

    fn abort(&self, job: &RemoteJobId) -> Result<()> {
        let url = format!("{}/jobs/{job}/abort", self.base_url);
        self.request(self.client.post(&url))?.error_for_status()?;
        Ok(())
    }

    fn result(&self, job: &RemoteJobId) -> Result<serde_json::Value> {
        let url = format!("{}/jobs/{job}/result", self.base_url);
        let response = self.request(self.client.get(&url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::Remote {
                job: job.clone(),
                message: "remote result not available".to_string(),
            });
        }
        Ok(response.error_for_status()?.json()?)
    }
}

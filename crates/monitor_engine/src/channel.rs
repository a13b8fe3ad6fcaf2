use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use monitor_core::{JobConfig, JobStatus, LatestResult, LiveMatch};
use monitor_logging::monitor_debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ChannelError, FailureKind};

/// Backend paths, relative to [`ChannelSettings::base_url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub start: String,
    pub status: String,
    pub live_matches: String,
    pub latest_result: String,
    pub download_result: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            start: "api/allocation/start".to_string(),
            status: "api/allocation/status".to_string(),
            live_matches: "api/allocation/live-matches".to_string(),
            latest_result: "api/allocation/latest".to_string(),
            download_result: "api/allocation/download".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub base_url: String,
    pub connect_timeout_ms: u64,
    /// Submission must fail fast.
    pub submit_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub download_timeout_ms: u64,
    pub max_download_bytes: u64,
    pub endpoints: Endpoints,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/".to_string(),
            connect_timeout_ms: 5_000,
            submit_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
            download_timeout_ms: 60_000,
            max_download_bytes: 64 * 1024 * 1024,
            endpoints: Endpoints::default(),
        }
    }
}

/// Read and submit operations against the backend job.
#[async_trait::async_trait]
pub trait StatusChannel: Send + Sync {
    async fn submit(&self, config: &JobConfig) -> Result<(), ChannelError>;

    async fn fetch_status(&self) -> Result<JobStatus, ChannelError>;

    /// Timeouts yield an empty list rather than an error.
    async fn fetch_live_matches(&self) -> Result<Vec<LiveMatch>, ChannelError>;

    async fn fetch_latest_result(&self) -> Result<LatestResult, ChannelError>;

    async fn download_result(&self) -> Result<Bytes, ChannelError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    accepted: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiveMatchesResponse {
    #[serde(default, alias = "currentMatches")]
    current_matches: Vec<LiveMatch>,
}

#[derive(Debug, Clone)]
pub struct HttpStatusChannel {
    client: reqwest::Client,
    base: Url,
    settings: ChannelSettings,
}

impl HttpStatusChannel {
    pub fn new(settings: ChannelSettings) -> Result<Self, ChannelError> {
        let mut base = Url::parse(&settings.base_url)
            .map_err(|err| ChannelError::new(FailureKind::InvalidUrl, err.to_string()))?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .build()
            .map_err(|err| ChannelError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            client,
            base,
            settings,
        })
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChannelError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| ChannelError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .get(self.endpoint(path)?)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;
        response.json::<T>().await.map_err(map_reqwest_error)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.request_timeout_ms)
    }
}

#[async_trait::async_trait]
impl StatusChannel for HttpStatusChannel {
    async fn submit(&self, config: &JobConfig) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(self.endpoint(&self.settings.endpoints.start)?)
            .timeout(Duration::from_millis(self.settings.submit_timeout_ms))
            .json(config)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;
        let body: SubmitResponse = response.json().await.map_err(map_reqwest_error)?;

        if body.accepted {
            Ok(())
        } else {
            Err(ChannelError::new(
                FailureKind::Rejected,
                body.message
                    .unwrap_or_else(|| "job was not accepted".to_string()),
            ))
        }
    }

    async fn fetch_status(&self) -> Result<JobStatus, ChannelError> {
        self.get_json(&self.settings.endpoints.status, self.request_timeout())
            .await
    }

    async fn fetch_live_matches(&self) -> Result<Vec<LiveMatch>, ChannelError> {
        match self
            .get_json::<LiveMatchesResponse>(
                &self.settings.endpoints.live_matches,
                self.request_timeout(),
            )
            .await
        {
            Ok(body) => Ok(body.current_matches),
            Err(err) if err.is_timeout() => {
                monitor_debug!("Live matches timed out, treating as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_latest_result(&self) -> Result<LatestResult, ChannelError> {
        self.get_json(&self.settings.endpoints.latest_result, self.request_timeout())
            .await
    }

    async fn download_result(&self) -> Result<Bytes, ChannelError> {
        let response = self
            .client
            .get(self.endpoint(&self.settings.endpoints.download_result)?)
            .timeout(Duration::from_millis(self.settings.download_timeout_ms))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response)?;

        let max_bytes = self.settings.max_download_bytes;
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ChannelError::new(
                    FailureKind::Decode,
                    format!("result larger than {max_bytes} bytes"),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }
}

fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ChannelError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ChannelError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        return ChannelError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ChannelError::new(FailureKind::Decode, err.to_string());
    }
    ChannelError::new(FailureKind::Network, err.to_string())
}

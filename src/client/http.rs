//! reqwest implementation of [`VideoApi`].

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{ArtifactStream, VideoApi};
use crate::config::ApiConfig;
use crate::error::{DownloadError, Result, SubmitError};
use crate::types::{
    JobHandle, JobRequest, JobStatusSnapshot, PollFailure, Resolution, Seconds, VideoModel,
};

/// Body of `POST /videos`
#[derive(Serialize)]
struct CreateVideoBody<'a> {
    model: VideoModel,
    prompt: &'a str,
    seconds: Seconds,
    size: Resolution,
}

/// HTTP client for the video service
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct HttpVideoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for HttpVideoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVideoClient")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpVideoClient {
    /// Create a client from API settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        // No client-wide timeout: it would also cut off long artifact downloads.
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn videos_url(&self) -> String {
        format!("{}/videos", self.base_url)
    }

    fn video_url(&self, handle: &JobHandle) -> String {
        format!(
            "{}/videos/{}",
            self.base_url,
            urlencoding::encode(handle.id.as_str())
        )
    }
}

#[async_trait]
impl VideoApi for HttpVideoClient {
    async fn submit(&self, request: &JobRequest) -> std::result::Result<JobHandle, SubmitError> {
        let body = CreateVideoBody {
            model: request.model,
            prompt: &request.prompt,
            seconds: request.seconds,
            size: request.resolution,
        };

        let response = self
            .http
            .post(self.videos_url())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SubmitError::Unauthorized);
        }
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(SubmitError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }

        let id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SubmitError::MalformedResponse(text.clone()))?;

        debug!(job_id = %id, "job created");
        Ok(JobHandle::new(id))
    }

    async fn poll(&self, handle: &JobHandle) -> JobStatusSnapshot {
        let response = match self
            .http
            .get(self.video_url(handle))
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return JobStatusSnapshot::transport_failure(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(job_id = %handle.id, status = status.as_u16(), "status request failed");
            return JobStatusSnapshot::failed(
                classify_status(status),
                format!("HTTP {}: {}", status.as_u16(), body),
            );
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return JobStatusSnapshot::transport_failure(e.to_string()),
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(body) if body.is_object() => parse_status_body(&body),
            _ => JobStatusSnapshot::failed(
                PollFailure::MalformedResponse,
                format!("unreadable status body: {}", truncate(&text, 200)),
            ),
        }
    }

    async fn fetch_artifact(
        &self,
        handle: &JobHandle,
    ) -> std::result::Result<ArtifactStream, DownloadError> {
        let url = format!("{}/content", self.video_url(handle));
        let failed = |reason: String| DownloadError::Failed {
            id: handle.id.clone(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let total_size = response.content_length().filter(|len| *len > 0);
        let chunks = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(ArtifactStream { total_size, chunks })
    }
}

/// Which failed status responses are worth polling again
///
/// Timeouts, rate limiting and server errors are transient. A rejected credential
/// or any other client error will not fix itself.
fn classify_status(status: StatusCode) -> PollFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PollFailure::Unauthorized,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => PollFailure::Transport,
        s if s.is_server_error() => PollFailure::Transport,
        _ => PollFailure::Rejected,
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Tolerant parse of a status body: every field is optional
///
/// Missing `status` becomes "unknown", missing or non-numeric `progress` becomes 0,
/// and `error` is accepted as a string or as an object carrying `message`.
fn parse_status_body(body: &Value) -> JobStatusSnapshot {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let progress = match body.get("progress") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };

    let snapshot = JobStatusSnapshot::remote(status, progress);
    match body.get("error").and_then(error_text) {
        Some(error) => snapshot.with_error(error),
        None => snapshot,
    }
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        _ => None,
    }
}

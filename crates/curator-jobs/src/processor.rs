//! HTTP client for the remote job processor.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{JobError, Result};
use crate::types::RemoteStatus;
use curator_core::config::ProcessorConfig;
use curator_core::RunToken;

/// Snapshot of a run as reported by the processor's progress endpoint.
#[derive(Debug, Clone)]
pub struct Progress {
    pub status: RemoteStatus,
    /// Free-text progress note, when the processor supplies one.
    pub verbose: Option<String>,
    /// Full progress body; stored as the run report on terminal transitions.
    pub body: Value,
}

/// Remote execution backend. `HttpProcessor` is the production
/// implementation; tests substitute scripted stand-ins.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Submits a processing request. Returns the token identifying the run.
    async fn submit(&self, request: &Value) -> Result<RunToken>;

    /// Queries current status for a run.
    async fn status(&self, token: &RunToken) -> Result<Progress>;

    /// Asks the processor to cancel a run. Success means the request was
    /// acknowledged, not that the run is already gone.
    async fn cancel(&self, token: &RunToken) -> Result<()>;
}

pub struct HttpProcessor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl JobProcessor for HttpProcessor {
    async fn submit(&self, request: &Value) -> Result<RunToken> {
        let url = format!("{}/process", self.base_url);
        debug!(%url, "submitting job to processor");

        let resp = self.client.post(&url).json(request).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "processor rejected submission");
            return Err(JobError::Remote {
                status,
                message: text,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| JobError::Parse(e.to_string()))?;
        parse_token(&body)
    }

    async fn status(&self, token: &RunToken) -> Result<Progress> {
        let url = format!("{}/progress", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("token", token.as_str())])
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, %token, body = %text, "processor progress query failed");
            return Err(JobError::Remote {
                status,
                message: text,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| JobError::Parse(e.to_string()))?;
        parse_progress(body)
    }

    async fn cancel(&self, token: &RunToken) -> Result<()> {
        let url = format!("{}/process", self.base_url);
        debug!(%token, "requesting abort from processor");

        let resp = self
            .client
            .delete(&url)
            .query(&[("token", token.as_str())])
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, %token, body = %text, "processor refused abort");
            return Err(JobError::Remote {
                status,
                message: text,
            });
        }
        Ok(())
    }
}

/// Extracts the run token from a submission response (`{"value": "<token>"}`).
fn parse_token(body: &Value) -> Result<RunToken> {
    body.get("value")
        .and_then(Value::as_str)
        .map(RunToken::from)
        .ok_or_else(|| JobError::Parse(format!("submission response without token: {body}")))
}

/// Builds a `Progress` from a progress body (`{"status": ..., "verbose": ...}`).
fn parse_progress(body: Value) -> Result<Progress> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(RemoteStatus::from)
        .ok_or_else(|| JobError::Parse(format!("progress response without status: {body}")))?;
    let verbose = body
        .get("verbose")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Progress {
        status,
        verbose,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_token_from_submission_response() {
        let body = json!({"value": "eb7948a585", "expires": true});
        assert_eq!(parse_token(&body).unwrap(), RunToken::from("eb7948a585"));
    }

    #[test]
    fn submission_response_without_token_is_a_parse_error() {
        let body = json!({"expires": true});
        assert!(matches!(parse_token(&body), Err(JobError::Parse(_))));
    }

    #[test]
    fn parses_progress_body() {
        let body = json!({"status": "running", "verbose": "stage 2 of 3", "numeric": 66});
        let progress = parse_progress(body).unwrap();
        assert_eq!(progress.status, RemoteStatus::Running);
        assert_eq!(progress.verbose.as_deref(), Some("stage 2 of 3"));
        assert_eq!(progress.body["numeric"], 66);
    }

    #[test]
    fn progress_without_status_is_a_parse_error() {
        assert!(matches!(
            parse_progress(json!({"numeric": 10})),
            Err(JobError::Parse(_))
        ));
    }

    #[test]
    fn unknown_progress_status_is_kept_verbatim() {
        let progress = parse_progress(json!({"status": "paused"})).unwrap();
        assert_eq!(progress.status, RemoteStatus::Other("paused".to_string()));
    }
}

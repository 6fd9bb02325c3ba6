//! REST deposit backend, wire contract v0.
//!
//! The configured `url` points at the API root (for example
//! `https://archive.example.org/rest/v0`); this module appends `/deposits`.
//! Authentication is HTTP Basic, either from a credentials file holding a
//! literal `Authorization: Basic <pass>` header line or from inline
//! username/password. Credentials are resolved once, at construction.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{ArchiveBackend, Deposit, DepositState};
use crate::error::{ArchiveError, Result};
use curator_core::config::ArchiveConfig;

pub struct RestArchive {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
    producer: String,
    material_flow: String,
}

impl RestArchive {
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let auth_header = resolve_auth(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_header,
            producer: config.producer.clone(),
            material_flow: config.material_flow.clone(),
        })
    }
}

#[async_trait]
impl ArchiveBackend for RestArchive {
    async fn start_deposit(&self, subdirectory: &str) -> Result<String> {
        let url = format!("{}/deposits", self.base_url);
        let body = json!({
            "subdirectory": subdirectory,
            "producer": {"value": self.producer},
            "material_flow": {"value": self.material_flow},
        });
        debug!(%subdirectory, "triggering deposit");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, %subdirectory, body = %text, "archive rejected deposit request");
            return Err(ArchiveError::Api {
                status,
                message: text,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ArchiveError::Parse(e.to_string()))?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ArchiveError::Parse(format!("deposit response without id: {body}")))
    }

    async fn get_deposit(&self, id: &str) -> Result<Deposit> {
        if id.is_empty() {
            return Err(ArchiveError::InvalidId("empty deposit id".to_string()));
        }
        let url = format!("{}/deposits/{}", self.base_url, id);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("accept", "application/json")
            .send()
            .await?;
        let status = resp.status().as_u16();
        // No content means the archive has not picked the deposit up yet.
        if status == 204 {
            return Ok(Deposit::pending(id));
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, deposit_id = %id, body = %text, "deposit status query failed");
            return Err(ArchiveError::Api {
                status,
                message: text,
            });
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Deposit::pending(id));
        }
        let body: Value =
            serde_json::from_str(&text).map_err(|e| ArchiveError::Parse(e.to_string()))?;
        parse_deposit(id, &body)
    }
}

/// Resolves the `Authorization` header value, preferring the credentials file
/// over inline username/password.
fn resolve_auth(config: &ArchiveConfig) -> Result<String> {
    if let Some(path) = &config.auth_file {
        let text = std::fs::read_to_string(path)?;
        return parse_auth_header(&text);
    }
    match (&config.username, &config.password) {
        (Some(user), Some(pass)) => {
            Ok(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
        }
        _ => Err(ArchiveError::Credentials(
            "no auth_file and no username/password configured".to_string(),
        )),
    }
}

/// Parses a stored header line of the form `Authorization: Basic <pass>`.
fn parse_auth_header(text: &str) -> Result<String> {
    let (name, value) = text.trim().split_once(": ").ok_or_else(|| {
        ArchiveError::Credentials("expected format 'Authorization: Basic <pass>'".to_string())
    })?;
    if name != "Authorization" {
        return Err(ArchiveError::Credentials(format!(
            "expected 'Authorization' header, found '{name}'"
        )));
    }
    Ok(value.to_string())
}

/// Parses a deposit body and normalizes the archive's status string.
fn parse_deposit(id: &str, body: &Value) -> Result<Deposit> {
    let reported = body.get("id").and_then(Value::as_str).unwrap_or_default();
    if reported != id {
        warn!(expected = %id, got = %reported, "deposit response carries a different id");
    }
    let raw_status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ArchiveError::Parse(format!("deposit response without status: {body}")))?;
    Ok(Deposit {
        id: id.to_string(),
        state: normalize_status(raw_status),
        raw_status: raw_status.to_string(),
        sip_reason: body
            .get("sip_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Maps the wire status vocabulary onto the normalized lifecycle.
/// Unrecognized values count as in progress.
fn normalize_status(raw: &str) -> DepositState {
    match raw.to_ascii_uppercase().as_str() {
        "PENDING" | "TRIGGERED" | "DRAFT" => DepositState::Pending,
        "INPROCESS" | "IN_PROGRESS" | "APPROVED" => DepositState::InProgress,
        "FINISHED" | "COMPLETED" => DepositState::Completed,
        "REJECTED" | "DECLINED" | "ERROR" => DepositState::Error,
        _ => DepositState::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_core::config::ArchiveKind;
    use std::io::Write;

    fn config() -> ArchiveConfig {
        ArchiveConfig {
            kind: ArchiveKind::RestV0,
            url: "http://localhost:8080/rest/v0".to_string(),
            producer: "12345678".to_string(),
            material_flow: "12345678".to_string(),
            auth_file: None,
            username: None,
            password: None,
            request_timeout_secs: 10,
        }
    }

    #[test]
    fn auth_header_parses_the_stored_line() {
        let value = parse_auth_header("Authorization: Basic abc123\n").unwrap();
        assert_eq!(value, "Basic abc123");
    }

    #[test]
    fn auth_header_rejects_other_header_names() {
        assert!(matches!(
            parse_auth_header("Cookie: session=1"),
            Err(ArchiveError::Credentials(_))
        ));
        assert!(matches!(
            parse_auth_header("garbage"),
            Err(ArchiveError::Credentials(_))
        ));
    }

    #[test]
    fn inline_credentials_are_base64_encoded() {
        let mut config = config();
        config.username = Some("user".to_string());
        config.password = Some("pass".to_string());
        assert_eq!(resolve_auth(&config).unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn auth_file_takes_precedence_over_inline_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Authorization: Basic from-file").unwrap();

        let mut config = config();
        config.auth_file = Some(file.path().to_string_lossy().into_owned());
        config.username = Some("user".to_string());
        config.password = Some("pass".to_string());
        assert_eq!(resolve_auth(&config).unwrap(), "Basic from-file");
    }

    #[test]
    fn missing_credentials_fail_at_construction() {
        assert!(matches!(
            RestArchive::new(&config()),
            Err(ArchiveError::Credentials(_))
        ));
    }

    #[test]
    fn status_vocabulary_normalizes() {
        assert_eq!(normalize_status("PENDING"), DepositState::Pending);
        assert_eq!(normalize_status("inprocess"), DepositState::InProgress);
        assert_eq!(normalize_status("FINISHED"), DepositState::Completed);
        assert_eq!(normalize_status("DECLINED"), DepositState::Error);
        assert_eq!(normalize_status("SOMETHING_NEW"), DepositState::InProgress);
    }

    #[test]
    fn deposit_body_parses_with_nullable_reason() {
        let body = serde_json::json!({
            "id": "dep-1",
            "status": "REJECTED",
            "sip_reason": "checksum mismatch",
        });
        let deposit = parse_deposit("dep-1", &body).unwrap();
        assert_eq!(deposit.state, DepositState::Error);
        assert_eq!(deposit.raw_status, "REJECTED");
        assert_eq!(deposit.sip_reason.as_deref(), Some("checksum mismatch"));

        let body = serde_json::json!({"id": "dep-1", "status": "INPROCESS", "sip_reason": null});
        assert!(parse_deposit("dep-1", &body).unwrap().sip_reason.is_none());
    }

    #[test]
    fn deposit_body_without_status_is_a_parse_error() {
        let body = serde_json::json!({"id": "dep-1"});
        assert!(matches!(
            parse_deposit("dep-1", &body),
            Err(ArchiveError::Parse(_))
        ));
    }
}

//! Sandboxed remote backend.
//!
//! Talks to a hosted virtual desktop session over HTTP:
//!
//! - `POST {base}/computers` creates a session (`{"id": ...}`) when none is configured.
//! - `GET {base}/computers/{id}/screenshot` returns `{"image": "<base64>"}`.
//! - `POST {base}/computers/{id}/exec` with `{"code": ...}` returns
//!   `{"success": bool, "output": string?, "error": string?}`.

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{BackendKind, Platform};
use crate::io::backend::Backend;
use crate::io::config::RemoteConfig;
use crate::io::screen::normalize_png;

/// Message used when the session reports failure without an error text.
pub const EXEC_FALLBACK_ERROR: &str = "Execution failed";

/// Result envelope returned by the remote session for `exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl ExecResult {
    /// Map the envelope to a fault or to the optional non-empty output.
    pub fn into_result(self) -> Result<Option<String>> {
        if !self.success {
            let message = self
                .error
                .filter(|err| !err.trim().is_empty())
                .unwrap_or_else(|| EXEC_FALLBACK_ERROR.to_string());
            return Err(anyhow!(message));
        }
        Ok(self.output.filter(|out| !out.trim().is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct ScreenshotPayload {
    image: String,
}

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: String,
}

pub struct RemoteBackend {
    client: Client,
    base_url: String,
    session_id: String,
    api_key: Option<String>,
    platform: Platform,
}

impl RemoteBackend {
    /// Attach to the configured session, creating one when no id is set.
    #[instrument(skip_all, fields(base_url = %config.base_url))]
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .context("build http client")?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let session_id = match &config.session_id {
            Some(id) => {
                debug!(session_id = %id, "attaching to existing session");
                id.clone()
            }
            None => {
                let created = create_session(&client, &base_url, config.api_key.as_deref())?;
                info!(session_id = %created, "created remote session");
                created
            }
        };
        Ok(Self {
            client,
            base_url,
            session_id,
            api_key: config.api_key.clone(),
            platform: config.platform,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/computers/{}/{}", self.base_url, self.session_id, action)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        with_api_key(request, self.api_key.as_deref())
    }
}

impl Backend for RemoteBackend {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn screenshot(&self) -> Result<Vec<u8>> {
        let payload: ScreenshotPayload = self
            .authorize(self.client.get(self.endpoint("screenshot")))
            .send()
            .context("request remote screenshot")?
            .error_for_status()
            .context("remote screenshot returned an error status")?
            .json()
            .context("parse remote screenshot response")?;
        let bytes = decode_image_payload(&payload.image)?;
        debug!(bytes = bytes.len(), "received remote screenshot");
        normalize_png(bytes)
    }

    #[instrument(skip_all, fields(session_id = %self.session_id, script_len = script.len()))]
    fn exec(&self, script: &str) -> Result<()> {
        let result: ExecResult = self
            .authorize(self.client.post(self.endpoint("exec")))
            .json(&json!({ "code": script }))
            .send()
            .context("send script to remote session")?
            .error_for_status()
            .context("remote exec returned an error status")?
            .json()
            .context("parse remote exec response")?;
        match result.into_result() {
            Ok(Some(output)) => {
                info!(output = %output, "remote script output");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                warn!(error = %err, "remote script failed");
                Err(err)
            }
        }
    }
}

fn with_api_key(request: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}

fn create_session(client: &Client, base_url: &str, api_key: Option<&str>) -> Result<String> {
    let created: CreatedSession = with_api_key(
        client.post(format!("{base_url}/computers")).json(&json!({})),
        api_key,
    )
    .send()
    .context("create remote session")?
    .error_for_status()
    .context("remote session creation returned an error status")?
    .json()
    .context("parse remote session response")?;
    Ok(created.id)
}

/// Decode a base64 image, accepting an optional `data:` URL prefix.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    let encoded = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    STANDARD
        .decode(encoded.trim())
        .context("decode base64 screenshot")
}

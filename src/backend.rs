//! Client for the rendering/conversion backend
//!
//! The backend owns everything the editor does not model itself: MEI to MSM
//! conversion and MPM to MIDI rendering. Calls are plain request/response
//! with no retry; a failure is reported to the caller and changes nothing.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{EditorError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Body of `POST /perform`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformRequest {
    pub mpm: String,
    pub mei: String,
    /// Restrict rendering to these instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpm_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exaggerate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemplify: Option<bool>,
    /// Seconds of surrounding music to include
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolate: Option<bool>,
}

impl PerformRequest {
    pub fn new(mpm: impl Into<String>, mei: impl Into<String>) -> Self {
        Self {
            mpm: mpm.into(),
            mei: mei.into(),
            ..Self::default()
        }
    }
}

/// Operations the editor needs from a rendering backend.
pub trait RenderBackend {
    /// MEI to MSM text.
    fn convert_mei(&self, mei: &str) -> Result<String>;

    /// MPM to raw MIDI bytes (legacy desks).
    fn render_midi(&self, mpm: &str) -> Result<Vec<u8>>;

    /// Render a performance to MIDI bytes.
    fn perform(&self, request: &PerformRequest) -> Result<Vec<u8>>;
}

/// Blocking HTTP implementation of [`RenderBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.backend_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "backend request");
        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            error!(url = %url, status = status.as_u16(), "backend request failed");
            return Err(EditorError::Backend {
                status: status.as_u16(),
                text,
            });
        }
        Ok(response)
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let text = self.post(path, body)?.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl RenderBackend for HttpBackend {
    fn convert_mei(&self, mei: &str) -> Result<String> {
        let reply = self.post_json("/convert", &json!({ "mei": mei }))?;
        reply
            .get("msm")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EditorError::missing("msm", "/convert response"))
    }

    fn render_midi(&self, mpm: &str) -> Result<Vec<u8>> {
        let bytes = self.post("/convert", &json!({ "mpm": mpm }))?.bytes()?;
        Ok(bytes.to_vec())
    }

    fn perform(&self, request: &PerformRequest) -> Result<Vec<u8>> {
        let reply = self.post_json("/perform", &serde_json::to_value(request)?)?;
        let encoded = reply
            .get("midi_b64")
            .and_then(Value::as_str)
            .ok_or_else(|| EditorError::missing("midi_b64", "/perform response"))?;
        Ok(STANDARD.decode(encoded)?)
    }
}

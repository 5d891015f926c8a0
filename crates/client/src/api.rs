//! REST API client for the hub's HTTP endpoints.
//!
//! Wraps the five-endpoint wire contract (`/upload`, `/run`, `/status`,
//! `/outputs`, `/cancel`) using [`reqwest`]. All responses except
//! `/outputs` use the service envelope `{code, msg, data}` where
//! `code != 0` is a service-level failure even on a 2xx response.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use taskbridge_core::template::{ResolvedWorkflow, WireFormat};
use taskbridge_core::types::{AssetReference, JobStatus};

/// Errors from the HTTP API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The hub returned a non-2xx status code.
    #[error("hub API error ({status}): {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose envelope carried a non-zero service code.
    #[error("hub service error (code {code}): {message}")]
    Service { code: i64, message: String },

    /// A 2xx response whose body could not be decoded.
    #[error("Failed to decode hub response: {0}")]
    Decode(String),
}

/// A binary asset to upload, with the hints the service expects as
/// multipart fields.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// One `/status` response, parsed leniently.
///
/// Missing or malformed fields degrade to `code = 0` and
/// [`JobStatus::Unknown`] instead of failing the poll: a transient
/// response glitch must not abort a multi-minute job.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub code: i64,
    pub message: Option<String>,
    pub status: JobStatus,
}

/// Service envelope wrapping every JSON response except `/outputs`.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunData {
    task_id: String,
}

/// HTTP client for one hub endpoint + credential pair.
pub struct HubApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HubApi {
    /// Create a new API client.
    ///
    /// * `base_url` - endpoint root, e.g. `https://hub.example.com`,
    ///   without a trailing slash.
    /// * `api_key`  - credential sent with every request.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across clients).
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Upload a binary asset via `POST /upload` (multipart form).
    ///
    /// Returns the opaque server-side file name. Not retried here:
    /// uploads may not be idempotent server-side, so retry policy
    /// belongs to the caller.
    pub async fn upload_asset(&self, upload: AssetUpload) -> Result<AssetReference, ApiError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("apiKey", self.api_key.clone());

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let data: UploadData = Self::parse_envelope(response).await?;
        Ok(AssetReference(data.file_name))
    }

    /// Submit a resolved workflow via `POST /run`.
    ///
    /// The body uses exactly one of the two documented wire shapes,
    /// decided by the template at load time (never a hybrid). Returns
    /// the server-assigned task id.
    pub async fn submit(&self, workflow: &ResolvedWorkflow) -> Result<String, ApiError> {
        let body = submit_body(workflow, &self.api_key);

        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .json(&body)
            .send()
            .await?;

        let data: RunData = Self::parse_envelope(response).await?;
        Ok(data.task_id)
    }

    /// Query job status via `POST /status`.
    ///
    /// Only transport-level failures (network, non-2xx) are errors;
    /// malformed bodies degrade to a lenient [`StatusSnapshot`].
    pub async fn status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError> {
        let body = serde_json::json!({
            "apiKey": self.api_key,
            "taskId": task_id,
        });

        let response = self
            .client
            .post(format!("{}/status", self.base_url))
            .json(&body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        Ok(parse_status_body(&text))
    }

    /// Retrieve the full output payload via `POST /outputs`.
    ///
    /// The payload is passed through verbatim; downstream shaping is the
    /// caller's concern.
    pub async fn outputs(&self, task_id: &str) -> Result<serde_json::Value, ApiError> {
        let body = serde_json::json!({
            "apiKey": self.api_key,
            "taskId": task_id,
        });

        let response = self
            .client
            .post(format!("{}/outputs", self.base_url))
            .json(&body)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Ask the hub to cancel a queued or running task via `POST /cancel`.
    pub async fn cancel(&self, task_id: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "apiKey": self.api_key,
            "taskId": task_id,
        });

        let response = self
            .client
            .post(format!("{}/cancel", self.base_url))
            .json(&body)
            .send()
            .await?;

        let _: Envelope<serde_json::Value> = Self::parse_strict(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Http`] containing
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode a success-status response into an envelope and unwrap its
    /// `data`, treating `code != 0` and missing `data` as errors.
    async fn parse_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let envelope: Envelope<T> = Self::parse_strict(response).await?;
        envelope
            .data
            .ok_or_else(|| ApiError::Decode("envelope has no data field".to_string()))
    }

    /// Decode a success-status response into an envelope, treating
    /// `code != 0` as a service error.
    async fn parse_strict<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<T>, ApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        if envelope.code != 0 {
            return Err(ApiError::Service {
                code: envelope.code,
                message: envelope
                    .msg
                    .clone()
                    .unwrap_or_else(|| "service reported failure".to_string()),
            });
        }
        Ok(envelope)
    }
}

/// Build the `/run` request body for a resolved workflow.
///
/// Modern: `{apiKey, webappId, inputs}`. Legacy: `{webappId, apiKey,
/// nodeInfoList}`. The two key sets never mix.
pub fn submit_body(workflow: &ResolvedWorkflow, api_key: &str) -> serde_json::Value {
    match workflow.format {
        WireFormat::Modern => serde_json::json!({
            "apiKey": api_key,
            "webappId": workflow.webapp_id,
            "inputs": workflow.inputs,
        }),
        WireFormat::Legacy => serde_json::json!({
            "webappId": workflow.webapp_id,
            "apiKey": api_key,
            "nodeInfoList": workflow.inputs,
        }),
    }
}

/// Parse a `/status` body leniently.
///
/// The status string is looked up at `data.taskStatus`, then `taskStatus`
/// at the top level, then a bare string `data` (all shapes observed in
/// the wild). Anything missing degrades to [`JobStatus::Unknown`] with
/// `code = 0` so the poll loop continues instead of aborting.
pub fn parse_status_body(body: &str) -> StatusSnapshot {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed status body, treating as unknown");
            return StatusSnapshot {
                code: 0,
                message: None,
                status: JobStatus::Unknown(String::new()),
            };
        }
    };

    let code = value.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
    let message = value
        .get("msg")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string);
    let raw_status = value
        .get("data")
        .and_then(|d| d.get("taskStatus"))
        .or_else(|| value.get("taskStatus"))
        .or_else(|| {
            value
                .get("data")
                .filter(|d| d.is_string())
        })
        .and_then(|s| s.as_str());

    let status = match raw_status {
        Some(raw) => JobStatus::parse(raw),
        None => {
            tracing::warn!("Status body carries no taskStatus field");
            JobStatus::Unknown(String::new())
        }
    };

    StatusSnapshot {
        code,
        message,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskbridge_core::template::NodeInput;

    fn workflow(format: WireFormat) -> ResolvedWorkflow {
        ResolvedWorkflow {
            webapp_id: "wa-9".to_string(),
            format,
            inputs: vec![NodeInput {
                node_id: "1".to_string(),
                field_name: "text".to_string(),
                field_value: "hello".to_string(),
            }],
        }
    }

    #[test]
    fn modern_body_uses_inputs_key_only() {
        let body = submit_body(&workflow(WireFormat::Modern), "k");
        assert!(body.get("inputs").is_some());
        assert!(body.get("nodeInfoList").is_none());
        assert_eq!(body["webappId"], "wa-9");
        assert_eq!(body["inputs"][0]["nodeId"], "1");
        assert_eq!(body["inputs"][0]["fieldName"], "text");
        assert_eq!(body["inputs"][0]["fieldValue"], "hello");
    }

    #[test]
    fn legacy_body_uses_node_info_list_key_only() {
        let body = submit_body(&workflow(WireFormat::Legacy), "k");
        assert!(body.get("nodeInfoList").is_some());
        assert!(body.get("inputs").is_none());
        assert_eq!(body["nodeInfoList"][0]["fieldValue"], "hello");
    }

    #[test]
    fn status_parses_nested_task_status() {
        let snapshot = parse_status_body(r#"{"code":0,"msg":"ok","data":{"taskStatus":"RUNNING"}}"#);
        assert_eq!(snapshot.code, 0);
        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.message.as_deref(), Some("ok"));
    }

    #[test]
    fn status_parses_top_level_task_status() {
        let snapshot = parse_status_body(r#"{"code":0,"taskStatus":"QUEUED"}"#);
        assert_eq!(snapshot.status, JobStatus::Queued);
    }

    #[test]
    fn status_parses_bare_string_data() {
        let snapshot = parse_status_body(r#"{"code":0,"data":"SUCCESS"}"#);
        assert_eq!(snapshot.status, JobStatus::Success);
    }

    #[test]
    fn malformed_status_body_degrades_to_unknown() {
        let snapshot = parse_status_body("not json at all");
        assert_eq!(snapshot.code, 0);
        assert_eq!(snapshot.status, JobStatus::Unknown(String::new()));
    }

    #[test]
    fn empty_object_status_degrades_to_unknown() {
        let snapshot = parse_status_body("{}");
        assert_eq!(snapshot.code, 0);
        assert_eq!(snapshot.status, JobStatus::Unknown(String::new()));
    }

    #[test]
    fn nonzero_code_is_preserved() {
        let snapshot =
            parse_status_body(r#"{"code":433,"msg":"quota exceeded","data":{"taskStatus":"RUNNING"}}"#);
        assert_eq!(snapshot.code, 433);
        assert_eq!(snapshot.message.as_deref(), Some("quota exceeded"));
        assert_eq!(snapshot.status, JobStatus::Running);
    }
}

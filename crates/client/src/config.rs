//! Client configuration: endpoint, credentials, templates, and polling
//! policy.
//!
//! Templates load from a JSON document matching the historical config
//! layout: a legacy `defaultWorkflow` entry (pre-built `nodeInfoList`)
//! plus named modern entries under `webapps`. Template shapes are
//! validated and resolved here, once, at load time.

use std::collections::HashMap;

use serde::Deserialize;
use taskbridge_core::template::{JobTemplate, RawTemplate};
use taskbridge_core::CoreError;

use crate::poller::PollConfig;

/// Name the legacy `defaultWorkflow` entry registers under.
pub const DEFAULT_WORKFLOW: &str = "defaultWorkflow";

/// Template config document as it appears on disk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    default_workflow: Option<RawTemplate>,
    #[serde(default)]
    webapps: HashMap<String, RawTemplate>,
    #[serde(default)]
    polling: Option<RawPolling>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPolling {
    #[serde(default)]
    interval_ms: Option<u64>,
    #[serde(default)]
    max_wait_ms: Option<u64>,
}

/// Everything the [`JobClient`](crate::client::JobClient) needs to talk
/// to one hub: endpoint root, credential, loaded templates, and polling
/// policy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub poll: PollConfig,
    templates: HashMap<String, JobTemplate>,
}

impl ClientConfig {
    /// Config with no templates and default polling policy.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            poll: PollConfig::default(),
            templates: HashMap::new(),
        }
    }

    /// Register a template directly (mostly for tests and embedders).
    pub fn with_template(mut self, template: JobTemplate) -> Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    /// Override the polling policy.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Load templates (and optional polling overrides) from a JSON
    /// config document. May be called more than once; later documents
    /// overwrite same-named templates.
    pub fn load_templates_json(&mut self, json: &str) -> Result<(), CoreError> {
        let raw: RawConfig = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("invalid template config: {e}")))?;

        if let Some(default) = raw.default_workflow {
            let template = JobTemplate::from_raw(DEFAULT_WORKFLOW, default)?;
            self.templates.insert(template.name.clone(), template);
        }
        for (name, entry) in raw.webapps {
            let template = JobTemplate::from_raw(name, entry)?;
            self.templates.insert(template.name.clone(), template);
        }

        if let Some(polling) = raw.polling {
            if let Some(interval_ms) = polling.interval_ms {
                self.poll.interval = std::time::Duration::from_millis(interval_ms);
            }
            if let Some(max_wait_ms) = polling.max_wait_ms {
                self.poll.deadline = std::time::Duration::from_millis(max_wait_ms);
            }
        }

        tracing::info!(
            templates = self.templates.len(),
            interval_ms = self.poll.interval.as_millis() as u64,
            deadline_ms = self.poll.deadline.as_millis() as u64,
            "Template config loaded",
        );
        Ok(())
    }

    /// Load templates from a JSON file on disk.
    pub fn load_templates_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("cannot read template config {}: {e}", path.display()))
        })?;
        self.load_templates_json(&json)
    }

    /// Look up a loaded template by name.
    pub fn template(&self, name: &str) -> Option<&JobTemplate> {
        self.templates.get(name)
    }

    /// Names of all loaded templates.
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use taskbridge_core::template::WireFormat;

    use super::*;

    const SAMPLE: &str = r#"{
        "defaultWorkflow": {
            "webappId": "wa-legacy",
            "nodeInfoList": [
                { "nodeId": "10", "fieldName": "text", "fieldValue": "{PROMPT}" }
            ]
        },
        "webapps": {
            "upscale": {
                "webappId": "wa-upscale",
                "nodeMapping": { "promptNode": "2", "imageNode": "7" }
            }
        },
        "polling": { "intervalMs": 1000, "maxWaitMs": 5000 }
    }"#;

    #[test]
    fn loads_both_template_shapes() {
        let mut config = ClientConfig::new("https://hub.test", "key");
        config.load_templates_json(SAMPLE).unwrap();

        let legacy = config.template(DEFAULT_WORKFLOW).unwrap();
        assert_eq!(legacy.wire_format(), WireFormat::Legacy);
        assert_eq!(legacy.webapp_id, "wa-legacy");

        let modern = config.template("upscale").unwrap();
        assert_eq!(modern.wire_format(), WireFormat::Modern);
        assert_eq!(modern.webapp_id, "wa-upscale");
    }

    #[test]
    fn polling_overrides_apply() {
        let mut config = ClientConfig::new("https://hub.test", "key");
        config.load_templates_json(SAMPLE).unwrap();
        assert_eq!(config.poll.interval, std::time::Duration::from_millis(1000));
        assert_eq!(config.poll.deadline, std::time::Duration::from_millis(5000));
    }

    #[test]
    fn polling_defaults_when_absent() {
        let mut config = ClientConfig::new("https://hub.test", "key");
        config
            .load_templates_json(r#"{ "webapps": {} }"#)
            .unwrap();
        assert_eq!(config.poll, PollConfig::default());
    }

    #[test]
    fn unknown_template_is_none() {
        let config = ClientConfig::new("https://hub.test", "key");
        assert!(config.template("missing").is_none());
    }

    #[test]
    fn invalid_json_is_a_configuration_error() {
        let mut config = ClientConfig::new("https://hub.test", "key");
        let err = config.load_templates_json("{ nope").unwrap_err();
        assert_matches!(err, CoreError::Configuration(_));
    }

    #[test]
    fn hybrid_template_is_rejected_at_load() {
        let mut config = ClientConfig::new("https://hub.test", "key");
        let err = config
            .load_templates_json(
                r#"{
                    "webapps": {
                        "bad": {
                            "webappId": "wa-x",
                            "nodeMapping": { "promptNode": "1" },
                            "nodeInfoList": []
                        }
                    }
                }"#,
            )
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("both"));
    }
}

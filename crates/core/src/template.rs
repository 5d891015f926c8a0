//! Workflow template model and slot-binding resolution.
//!
//! A [`JobTemplate`] names one remote workflow variant and carries a
//! [`TemplateFormat`] resolved once at load time: either a modern
//! named-slot mapping or the legacy pre-built node list with
//! `"{PROMPT}"` / `"{IMAGE_FILE}"` placeholders. Both resolve to the
//! same [`ResolvedWorkflow`] shape; the wire body differs only in which
//! key the submitter serializes (`inputs` vs `nodeInfoList`), tagged by
//! [`WireFormat`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::AssetReference;

/// Well-known slot name for the text prompt.
pub const SLOT_PROMPT: &str = "prompt";
/// Well-known slot name for the uploaded image reference.
pub const SLOT_IMAGE: &str = "image";

/// Node id used when a modern mapping omits the prompt node.
const DEFAULT_PROMPT_NODE: &str = "1";

/// One `(nodeId, fieldName, fieldValue)` triple as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub node_id: String,
    pub field_name: String,
    pub field_value: String,
}

/// A value bound to a named template slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Text(String),
    Asset(AssetReference),
}

impl SlotValue {
    /// The string that ends up in the wire `fieldValue`.
    pub fn as_field_value(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Asset(reference) => reference.as_str(),
        }
    }
}

/// Caller-supplied slot bindings, keyed by slot name.
///
/// A `BTreeMap` so that iteration order (and therefore the input
/// fingerprint, see [`crate::hashing`]) is deterministic.
pub type Bindings = BTreeMap<String, SlotValue>;

/// One named slot of a modern template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    /// Slot name the caller binds against, e.g. `"prompt"`.
    pub name: String,
    /// Workflow node the value is injected into.
    pub node_id: String,
    /// Field on that node, e.g. `"text"` or `"image"`.
    pub field_name: String,
    /// Missing required bindings are a fatal configuration error;
    /// optional slots are silently skipped when unbound.
    pub required: bool,
}

/// Which of the two supported wire shapes a template produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `{apiKey, webappId, inputs: [...]}`
    Modern,
    /// `{webappId, apiKey, nodeInfoList: [...]}`
    Legacy,
}

/// The two template shapes, decided once when the template is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateFormat {
    /// Named slots mapped to workflow nodes.
    Modern { slots: Vec<SlotSpec> },
    /// Pre-built node list; `fieldValue`s may carry `{PLACEHOLDER}`
    /// tokens substituted from the bindings at resolution time.
    Legacy { node_info_list: Vec<NodeInput> },
}

/// A named, immutable workflow template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub name: String,
    pub webapp_id: String,
    pub format: TemplateFormat,
}

/// A template with all slots bound, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkflow {
    pub webapp_id: String,
    pub format: WireFormat,
    pub inputs: Vec<NodeInput>,
}

// ---------------------------------------------------------------------------
// Raw config shapes
// ---------------------------------------------------------------------------

/// Template definition as it appears in the JSON config document,
/// before the format is decided.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTemplate {
    pub webapp_id: String,
    #[serde(default)]
    pub node_mapping: Option<NodeMapping>,
    #[serde(default)]
    pub node_info_list: Option<Vec<NodeInput>>,
}

/// Modern config mapping of well-known slots to workflow nodes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMapping {
    #[serde(default)]
    pub prompt_node: Option<String>,
    #[serde(default)]
    pub image_node: Option<String>,
}

impl JobTemplate {
    /// Decide the template format from a raw config entry.
    ///
    /// Exactly one of `nodeMapping` / `nodeInfoList` must be present; a
    /// template defining both (or neither) fails [`CoreError::Validation`]
    /// here, at load time, so the submitter never has to re-detect the
    /// shape per call.
    pub fn from_raw(name: impl Into<String>, raw: RawTemplate) -> Result<Self, CoreError> {
        let name = name.into();
        let format = match (raw.node_mapping, raw.node_info_list) {
            (Some(_), Some(_)) => {
                return Err(CoreError::Validation(format!(
                    "template '{name}' defines both nodeMapping and nodeInfoList; exactly one wire shape is allowed"
                )));
            }
            (None, None) => {
                return Err(CoreError::Validation(format!(
                    "template '{name}' defines neither nodeMapping nor nodeInfoList"
                )));
            }
            (Some(mapping), None) => {
                let mut slots = vec![SlotSpec {
                    name: SLOT_PROMPT.to_string(),
                    node_id: mapping
                        .prompt_node
                        .unwrap_or_else(|| DEFAULT_PROMPT_NODE.to_string()),
                    field_name: "text".to_string(),
                    required: true,
                }];
                if let Some(image_node) = mapping.image_node {
                    slots.push(SlotSpec {
                        name: SLOT_IMAGE.to_string(),
                        node_id: image_node,
                        field_name: "image".to_string(),
                        required: false,
                    });
                }
                TemplateFormat::Modern { slots }
            }
            (None, Some(node_info_list)) => TemplateFormat::Legacy { node_info_list },
        };

        Ok(Self {
            name,
            webapp_id: raw.webapp_id,
            format,
        })
    }

    /// Which wire shape this template produces.
    pub fn wire_format(&self) -> WireFormat {
        match self.format {
            TemplateFormat::Modern { .. } => WireFormat::Modern,
            TemplateFormat::Legacy { .. } => WireFormat::Legacy,
        }
    }

    /// Bind the caller's values to this template's slots.
    ///
    /// Modern: every required slot must have a binding; optional slots
    /// without one are skipped; bindings with no matching slot are
    /// ignored. Legacy: every `{PLACEHOLDER}` in the node list must
    /// resolve to a binding; non-placeholder values pass through
    /// unchanged. Either violation is a [`CoreError::Configuration`].
    pub fn resolve(&self, bindings: &Bindings) -> Result<ResolvedWorkflow, CoreError> {
        let inputs = match &self.format {
            TemplateFormat::Modern { slots } => {
                let mut inputs = Vec::with_capacity(slots.len());
                for slot in slots {
                    match bindings.get(&slot.name) {
                        Some(value) => inputs.push(NodeInput {
                            node_id: slot.node_id.clone(),
                            field_name: slot.field_name.clone(),
                            field_value: value.as_field_value().to_string(),
                        }),
                        None if slot.required => {
                            return Err(CoreError::Configuration(format!(
                                "template '{}' requires a binding for slot '{}'",
                                self.name, slot.name
                            )));
                        }
                        None => {}
                    }
                }
                inputs
            }
            TemplateFormat::Legacy { node_info_list } => {
                let mut inputs = Vec::with_capacity(node_info_list.len());
                for node in node_info_list {
                    let field_value = match placeholder_slot(&node.field_value) {
                        Some(slot) => lookup_placeholder(bindings, &slot)
                            .ok_or_else(|| {
                                CoreError::Configuration(format!(
                                    "template '{}' placeholder '{}' has no binding for slot '{slot}'",
                                    self.name, node.field_value
                                ))
                            })?
                            .as_field_value()
                            .to_string(),
                        None => node.field_value.clone(),
                    };
                    inputs.push(NodeInput {
                        node_id: node.node_id.clone(),
                        field_name: node.field_name.clone(),
                        field_value,
                    });
                }
                inputs
            }
        };

        Ok(ResolvedWorkflow {
            webapp_id: self.webapp_id.clone(),
            format: self.wire_format(),
            inputs,
        })
    }
}

/// Extract the slot name from a `{PLACEHOLDER}` field value.
///
/// `"{PROMPT}"` -> `Some("prompt")`. Anything that is not a single
/// brace-wrapped token is treated as a literal value.
fn placeholder_slot(field_value: &str) -> Option<String> {
    let inner = field_value.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains(|c| c == '{' || c == '}') {
        return None;
    }
    Some(inner.to_ascii_lowercase())
}

/// Look up a placeholder's binding, honoring the historical
/// `{IMAGE_FILE}` spelling for the `image` slot.
fn lookup_placeholder<'a>(bindings: &'a Bindings, slot: &str) -> Option<&'a SlotValue> {
    bindings.get(slot).or_else(|| match slot {
        "image_file" => bindings.get(SLOT_IMAGE),
        _ => None,
    })
}

//! Message Channel vocabulary between the host and the rendering surface.
//!
//! Every envelope is a JSON object `{"v": 1, "type": "<kebab-case>", ...payload}`.
//! Incoming envelopes are checked for version and type before their payload is
//! decoded, so an unknown `type` is reported as such instead of as a generic
//! parse failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::job::InsertionMode;

pub const PROTOCOL_VERSION: u64 = 1;

/// Host → surface commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostCommand {
    SetDocument {
        html: String,
    },
    #[serde(rename_all = "camelCase")]
    InsertFragment {
        html: String,
        mode: InsertionMode,
        /// When set, the surface replaces this element instead of inserting.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder_id: Option<String>,
    },
    DeleteElement {
        id: String,
    },
    UpdateStyle {
        id: String,
        styles: BTreeMap<String, String>,
    },
    FormatCommand {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    WrapLink {
        text: String,
        href: String,
    },
    QuerySelection,
    RestoreSelection,
}

impl HostCommand {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostCommand::SetDocument { .. } => "set-document",
            HostCommand::InsertFragment { .. } => "insert-fragment",
            HostCommand::DeleteElement { .. } => "delete-element",
            HostCommand::UpdateStyle { .. } => "update-style",
            HostCommand::FormatCommand { .. } => "format-command",
            HostCommand::WrapLink { .. } => "wrap-link",
            HostCommand::QuerySelection => "query-selection",
            HostCommand::RestoreSelection => "restore-selection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Image,
    Video,
    Audio,
    Infographic,
    #[serde(other)]
    Other,
}

/// Surface → host events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SurfaceEvent {
    Ready,
    DocumentChanged {
        html: String,
    },
    #[serde(rename_all = "camelCase")]
    ElementSelected {
        id: String,
        kind: ElementKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width_percent: Option<f32>,
    },
    ElementDeselected {
        id: String,
    },
    Interaction {
        text: String,
        x: f64,
        y: f64,
    },
    #[serde(rename_all = "camelCase")]
    SelectionCaptured {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element_id: Option<String>,
    },
}

impl SurfaceEvent {
    pub const TYPES: [&'static str; 6] = [
        "ready",
        "document-changed",
        "element-selected",
        "element-deselected",
        "interaction",
        "selection-captured",
    ];
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(Option<u64>),
    #[error("unknown envelope type {0:?}")]
    UnknownType(String),
    #[error("invalid payload for {kind}: {message}")]
    InvalidPayload { kind: String, message: String },
}

/// Serializes a command into a versioned envelope.
pub fn encode_command(command: &HostCommand) -> Result<String, ProtocolError> {
    let mut value =
        serde_json::to_value(command).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert("v".to_string(), Value::from(PROTOCOL_VERSION));
        }
        None => return Err(ProtocolError::Malformed("command is not an object".into())),
    }
    serde_json::to_string(&value).map_err(|err| ProtocolError::Malformed(err.to_string()))
}

/// Splits a raw envelope into its `type` and the remaining object after the version check.
pub fn open_envelope(raw: &str) -> Result<(String, Value), ProtocolError> {
    let mut value: Value =
        serde_json::from_str(raw.trim()).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| ProtocolError::Malformed("envelope is not an object".into()))?;

    let version = object.remove("v").and_then(|v| v.as_u64());
    if version != Some(PROTOCOL_VERSION) {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing type".into()))?
        .to_string();
    Ok((kind, value))
}

/// Validates and decodes one incoming envelope from the surface.
pub fn decode_event(raw: &str) -> Result<SurfaceEvent, ProtocolError> {
    let (kind, value) = open_envelope(raw)?;
    if !SurfaceEvent::TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|err| ProtocolError::InvalidPayload {
        kind,
        message: err.to_string(),
    })
}

/// Decodes a command envelope; used by surface-side tooling and tests.
pub fn decode_command(raw: &str) -> Result<HostCommand, ProtocolError> {
    let (kind, value) = open_envelope(raw)?;
    serde_json::from_value(value).map_err(|err| {
        if err.to_string().contains("unknown variant") {
            ProtocolError::UnknownType(kind)
        } else {
            ProtocolError::InvalidPayload {
                kind,
                message: err.to_string(),
            }
        }
    })
}

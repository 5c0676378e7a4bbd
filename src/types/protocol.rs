//! Message vocabulary shared by the coordinator and content process units.
//!
//! Commands flow coordinator → unit, events flow unit → coordinator. Both
//! travel as one flat JSON object tagged by `type`, e.g.
//! `{"type":"navigate","tabId":"1","url":"https://example.com"}`.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::types::errors::ProtocolError;

/// Title shown for a tab before any page has loaded, and for unparsable URLs.
pub const NEW_TAB_TITLE: &str = "New Tab";

const COMMAND_TYPES: [&str; 6] = [
    "initialize",
    "navigate",
    "back",
    "forward",
    "refresh",
    "shutdown",
];

/// Decodes one tagged message. `known` tells a bad payload of a known type
/// apart from a type outside the closed set.
fn decode<T: DeserializeOwned>(text: &str, known: impl Fn(&str) -> bool) -> Result<T, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing `type`".to_string()))?
        .to_string();
    if !known(&kind) {
        return Err(ProtocolError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Invalid {
        kind,
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

// === Commands ===

/// Coordinator → unit commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProcessCommand {
    Initialize { tab_id: String },
    Navigate { tab_id: String, url: String },
    Back { tab_id: String },
    Forward { tab_id: String },
    Refresh { tab_id: String },
    Shutdown { tab_id: String },
}

impl ProcessCommand {
    /// The tab this command is addressed to.
    pub fn tab_id(&self) -> &str {
        match self {
            ProcessCommand::Initialize { tab_id }
            | ProcessCommand::Navigate { tab_id, .. }
            | ProcessCommand::Back { tab_id }
            | ProcessCommand::Forward { tab_id }
            | ProcessCommand::Refresh { tab_id }
            | ProcessCommand::Shutdown { tab_id } => tab_id,
        }
    }

    /// The wire `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessCommand::Initialize { .. } => "initialize",
            ProcessCommand::Navigate { .. } => "navigate",
            ProcessCommand::Back { .. } => "back",
            ProcessCommand::Forward { .. } => "forward",
            ProcessCommand::Refresh { .. } => "refresh",
            ProcessCommand::Shutdown { .. } => "shutdown",
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        decode(text, |kind| COMMAND_TYPES.contains(&kind))
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        encode(self)
    }
}

// === Events ===

/// Unit → coordinator events.
///
/// `ProcessCrash` is synthesized by the coordinator; units never send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProcessEvent {
    Ready {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        process_id: Option<String>,
    },
    LoadStart { tab_id: String, url: String },
    TitleChange { tab_id: String, title: String },
    UrlChange { tab_id: String, url: String },
    LoadComplete { tab_id: String, url: String },
    ProcessCrash { tab_id: String, process_id: String },
}

impl ProcessEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ProcessEvent::Ready { .. } => EventType::Ready,
            ProcessEvent::LoadStart { .. } => EventType::LoadStart,
            ProcessEvent::TitleChange { .. } => EventType::TitleChange,
            ProcessEvent::UrlChange { .. } => EventType::UrlChange,
            ProcessEvent::LoadComplete { .. } => EventType::LoadComplete,
            ProcessEvent::ProcessCrash { .. } => EventType::ProcessCrash,
        }
    }

    /// The tab the event concerns. Only a connection-level `ready` has none.
    pub fn tab_id(&self) -> Option<&str> {
        match self {
            ProcessEvent::Ready { tab_id, .. } => tab_id.as_deref(),
            ProcessEvent::LoadStart { tab_id, .. }
            | ProcessEvent::TitleChange { tab_id, .. }
            | ProcessEvent::UrlChange { tab_id, .. }
            | ProcessEvent::LoadComplete { tab_id, .. }
            | ProcessEvent::ProcessCrash { tab_id, .. } => Some(tab_id),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        decode(text, |kind| kind.parse::<EventType>().is_ok())
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        encode(self)
    }
}

// === Event types ===

/// Closed set of event discriminators, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Ready,
    LoadStart,
    TitleChange,
    UrlChange,
    LoadComplete,
    ProcessCrash,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Ready,
        EventType::LoadStart,
        EventType::TitleChange,
        EventType::UrlChange,
        EventType::LoadComplete,
        EventType::ProcessCrash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Ready => "ready",
            EventType::LoadStart => "loadStart",
            EventType::TitleChange => "titleChange",
            EventType::UrlChange => "urlChange",
            EventType::LoadComplete => "loadComplete",
            EventType::ProcessCrash => "processCrash",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

// === Navigation commands ===

/// History/reload intents accepted by `send_navigation_command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationCommand {
    Back,
    Forward,
    Refresh,
}

impl NavigationCommand {
    /// Builds the unit command addressed to `tab_id`.
    pub fn to_command(self, tab_id: &str) -> ProcessCommand {
        let tab_id = tab_id.to_string();
        match self {
            NavigationCommand::Back => ProcessCommand::Back { tab_id },
            NavigationCommand::Forward => ProcessCommand::Forward { tab_id },
            NavigationCommand::Refresh => ProcessCommand::Refresh { tab_id },
        }
    }
}

impl FromStr for NavigationCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "back" => Ok(NavigationCommand::Back),
            "forward" => Ok(NavigationCommand::Forward),
            "refresh" => Ok(NavigationCommand::Refresh),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Derives a page title from a URL: its host, or `NEW_TAB_TITLE` when the
/// URL does not parse or has no host.
pub fn derive_title(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| NEW_TAB_TITLE.to_string())
}

use serde::{Deserialize, Serialize};

use super::protocol::NEW_TAB_TITLE;

/// Represents a browser tab as tracked by the process coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tab {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Content process currently serving this tab.
    pub process_id: Option<String>,
    pub crashed: bool,
    /// How many times the coordinator has replaced a crashed unit.
    pub restarts: u32,
}

impl Tab {
    /// A freshly opened tab: sentinel title, given URL, no process yet.
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            title: NEW_TAB_TITLE.to_string(),
            url: url.to_string(),
            process_id: None,
            crashed: false,
            restarts: 0,
        }
    }
}

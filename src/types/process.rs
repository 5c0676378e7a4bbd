use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a content process unit. Linear, no cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Initializing,
    Ready,
    Crashed,
    Terminated,
}

impl ProcessStatus {
    /// Whether the unit may still receive commands.
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessStatus::Initializing | ProcessStatus::Ready)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Initializing => "initializing",
            ProcessStatus::Ready => "ready",
            ProcessStatus::Crashed => "crashed",
            ProcessStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Snapshot of a process registry entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInfo {
    pub process_id: String,
    pub tab_id: String,
    pub status: ProcessStatus,
}

/// Why a unit's execution context ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The unit returned normally.
    Clean,
    /// The unit returned an error.
    Failed(String),
    /// The unit panicked.
    Panicked(String),
    /// The unit was aborted by the coordinator.
    Aborted,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Clean => write!(f, "exited without shutdown"),
            ExitReason::Failed(msg) => write!(f, "failed: {}", msg),
            ExitReason::Panicked(msg) => write!(f, "panicked: {}", msg),
            ExitReason::Aborted => write!(f, "aborted"),
        }
    }
}

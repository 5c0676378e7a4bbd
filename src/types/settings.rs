use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level settings container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServalSettings {
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
    #[serde(default)]
    pub timing: LoadTimingSettings,
    #[serde(default)]
    pub launcher: LauncherSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
}

/// Coordinator supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Deadline for a unit to answer `initialize` or start a navigation.
    /// `None` disables the watchdog.
    pub command_timeout_ms: Option<u64>,
    pub restart_policy: RestartPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: Some(10_000),
            restart_policy: RestartPolicy::Never,
        }
    }
}

impl CoordinatorSettings {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }
}

/// What the coordinator does with a tab whose unit crashed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Report the crash and leave the tab in crashed state.
    Never,
    /// Spawn a replacement unit, at most `max_restarts` times per tab.
    Restart { max_restarts: u32 },
}

/// Delays of the simulated page load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoadTimingSettings {
    /// From `loadStart` to `titleChange`/`urlChange`.
    pub title_delay_ms: u64,
    /// From `urlChange` to `loadComplete`.
    pub complete_delay_ms: u64,
}

impl Default for LoadTimingSettings {
    fn default() -> Self {
        Self {
            title_delay_ms: 100,
            complete_delay_ms: 50,
        }
    }
}

impl LoadTimingSettings {
    pub fn title_delay(&self) -> Duration {
        Duration::from_millis(self.title_delay_ms)
    }

    pub fn complete_delay(&self) -> Duration {
        Duration::from_millis(self.complete_delay_ms)
    }
}

/// How content process units are hosted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LauncherSettings {
    /// One tokio task per unit inside this process.
    #[default]
    InProcess,
    /// One `serval-content` OS process per unit.
    /// An empty `program` means `serval-content` next to the current executable.
    Subprocess {
        #[serde(default)]
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Relay every unit through the WebSocket bridge.
    Bridge,
}

/// External rendering-engine bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeSettings {
    pub endpoint: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080".to_string(),
            max_reconnect_attempts: 5,
            reconnect_interval_ms: 1000,
        }
    }
}

impl BridgeSettings {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RpcSettings {
    pub max_requests_per_second: u32,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_requests_per_second: 200,
        }
    }
}

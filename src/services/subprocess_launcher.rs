//! Hosts each content process unit in its own OS process.
//!
//! The child is the `serval-content` binary. Commands go to its stdin and
//! events come back on its stdout, one JSON message per line.

use std::env;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::services::process_launcher::{EventEmitter, LaunchContext, ProcessLauncher, UnitTask};
use crate::types::errors::ContentProcessError;
use crate::types::protocol::ProcessEvent;
use crate::types::settings::LoadTimingSettings;

pub const PROCESS_ID_ENV: &str = "SERVAL_PROCESS_ID";
pub const TITLE_DELAY_ENV: &str = "SERVAL_TITLE_DELAY_MS";
pub const COMPLETE_DELAY_ENV: &str = "SERVAL_COMPLETE_DELAY_MS";

/// Name of the unit host binary.
pub const CONTENT_HOST_BINARY: &str = "serval-content";

/// Launches `serval-content` (or any compatible program) per unit.
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    program: PathBuf,
    args: Vec<String>,
    timing: LoadTimingSettings,
}

impl SubprocessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timing: LoadTimingSettings) -> Self {
        Self {
            program: program.into(),
            args,
            timing,
        }
    }

    /// `serval-content` next to the running executable, falling back to `$PATH`.
    pub fn default_program() -> PathBuf {
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(CONTENT_HOST_BINARY)))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(CONTENT_HOST_BINARY))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command(&self, process_id: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(PROCESS_ID_ENV, process_id)
            .env(TITLE_DELAY_ENV, self.timing.title_delay_ms.to_string())
            .env(COMPLETE_DELAY_ENV, self.timing.complete_delay_ms.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

impl ProcessLauncher for SubprocessLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        let command = self.command(&context.process_id);
        tokio::spawn(relay(command, context))
    }
}

/// Reads load timing forwarded by `SubprocessLauncher`, defaulting per field.
pub fn timing_from_env() -> LoadTimingSettings {
    let defaults = LoadTimingSettings::default();
    let read = |key: &str, fallback: u64| {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback)
    };
    LoadTimingSettings {
        title_delay_ms: read(TITLE_DELAY_ENV, defaults.title_delay_ms),
        complete_delay_ms: read(COMPLETE_DELAY_ENV, defaults.complete_delay_ms),
    }
}

/// Pumps commands into the child and events out of it until its stdout closes.
async fn relay(mut command: Command, context: LaunchContext) -> Result<(), ContentProcessError> {
    let LaunchContext {
        process_id,
        mut commands,
        events,
    } = context;

    let mut child = command
        .spawn()
        .map_err(|e| ContentProcessError::Spawn(e.to_string()))?;
    let mut stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ContentProcessError::Io("child stdout unavailable".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();
    debug!(process_id = %process_id, pid = ?child.id(), "content host spawned");

    loop {
        tokio::select! {
            command = commands.recv(), if stdin.is_some() => match (command, stdin.as_mut()) {
                (Some(command), Some(pipe)) => {
                    let mut line = command.to_json()?;
                    line.push('\n');
                    pipe.write_all(line.as_bytes())
                        .await
                        .map_err(|e| ContentProcessError::Io(e.to_string()))?;
                    pipe.flush()
                        .await
                        .map_err(|e| ContentProcessError::Io(e.to_string()))?;
                }
                // Closing stdin asks the host to exit.
                _ => stdin = None,
            },
            line = lines.next_line() => {
                let Some(line) = line.map_err(|e| ContentProcessError::Io(e.to_string()))? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ProcessEvent::from_json(&line) {
                    Ok(event) => {
                        if !events.emit(event) {
                            return Err(ContentProcessError::EventChannelClosed(process_id));
                        }
                    }
                    Err(e) => warn!(process_id = %process_id, error = %e, "discarding undecodable line from content host"),
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| ContentProcessError::Io(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(ContentProcessError::Exited(status.to_string()))
    }
}

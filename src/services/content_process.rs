//! Content process unit: one per tab, owns navigation history and simulates
//! page loads as timed event sequences.
//!
//! A unit shares nothing with the coordinator. It reads commands from its own
//! channel and writes events through an `EventEmitter`; a fault inside it only
//! ends its own task.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::services::process_launcher::EventEmitter;
use crate::types::errors::ContentProcessError;
use crate::types::history::NavigationHistory;
use crate::types::protocol::{derive_title, ProcessCommand, ProcessEvent};
use crate::types::settings::LoadTimingSettings;

/// Whether the run loop keeps going after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// A simulated page-rendering worker.
pub struct ContentProcess<E: EventEmitter> {
    process_id: String,
    tab_id: Option<String>,
    history: NavigationHistory,
    current_url: Option<String>,
    timing: LoadTimingSettings,
    events: E,
}

impl<E: EventEmitter> ContentProcess<E> {
    pub fn new(process_id: &str, events: E, timing: LoadTimingSettings) -> Self {
        Self {
            process_id: process_id.to_string(),
            tab_id: None,
            history: NavigationHistory::new(),
            current_url: None,
            timing,
            events,
        }
    }

    /// Consumes commands in order until `shutdown` or until the channel closes.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ProcessCommand>,
    ) -> Result<(), ContentProcessError> {
        while let Some(command) = commands.recv().await {
            if self.handle(command).await? == Flow::Stop {
                break;
            }
        }
        debug!(process_id = %self.process_id, "content process stopped");
        Ok(())
    }

    async fn handle(&mut self, command: ProcessCommand) -> Result<Flow, ContentProcessError> {
        if let ProcessCommand::Initialize { tab_id } = &command {
            self.initialize(tab_id)?;
            return Ok(Flow::Continue);
        }

        let owned = self.tab_id.as_deref() == Some(command.tab_id());
        if !owned {
            debug!(
                process_id = %self.process_id,
                tab_id = command.tab_id(),
                command = command.kind(),
                "ignoring command for a tab this process does not own"
            );
            return Ok(Flow::Continue);
        }

        match command {
            ProcessCommand::Initialize { .. } => {}
            ProcessCommand::Navigate { url, .. } => self.navigate(&url).await?,
            ProcessCommand::Back { .. } => self.go_back().await?,
            ProcessCommand::Forward { .. } => self.go_forward().await?,
            ProcessCommand::Refresh { .. } => self.refresh().await?,
            ProcessCommand::Shutdown { .. } => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    fn initialize(&mut self, tab_id: &str) -> Result<(), ContentProcessError> {
        match self.tab_id.as_deref() {
            Some(owner) if owner != tab_id => {
                warn!(
                    process_id = %self.process_id,
                    owner,
                    tab_id,
                    "ignoring initialize for a second tab"
                );
                return Ok(());
            }
            Some(_) => {}
            None => {
                self.tab_id = Some(tab_id.to_string());
                info!(process_id = %self.process_id, tab_id, "content process initialized");
            }
        }
        self.emit(ProcessEvent::Ready {
            tab_id: Some(tab_id.to_string()),
            process_id: Some(self.process_id.clone()),
        })
    }

    async fn navigate(&mut self, url: &str) -> Result<(), ContentProcessError> {
        if url.trim().is_empty() {
            return Ok(());
        }
        self.history.push(url);
        self.simulate_load(url).await
    }

    async fn go_back(&mut self) -> Result<(), ContentProcessError> {
        let Some(url) = self.history.back().map(str::to_string) else {
            return Ok(());
        };
        self.emit_url_change(&url)?;
        self.simulate_load(&url).await
    }

    async fn go_forward(&mut self) -> Result<(), ContentProcessError> {
        let Some(url) = self.history.forward().map(str::to_string) else {
            return Ok(());
        };
        self.emit_url_change(&url)?;
        self.simulate_load(&url).await
    }

    async fn refresh(&mut self) -> Result<(), ContentProcessError> {
        let Some(url) = self.current_url.clone() else {
            return Ok(());
        };
        self.simulate_load(&url).await
    }

    /// loadStart, then title + url, then loadComplete.
    async fn simulate_load(&mut self, url: &str) -> Result<(), ContentProcessError> {
        let tab_id = self.owned_tab();
        self.current_url = Some(url.to_string());

        self.emit(ProcessEvent::LoadStart {
            tab_id: tab_id.clone(),
            url: url.to_string(),
        })?;

        tokio::time::sleep(self.timing.title_delay()).await;
        self.emit(ProcessEvent::TitleChange {
            tab_id: tab_id.clone(),
            title: derive_title(url),
        })?;
        self.emit_url_change(url)?;

        tokio::time::sleep(self.timing.complete_delay()).await;
        self.emit(ProcessEvent::LoadComplete {
            tab_id,
            url: url.to_string(),
        })
    }

    fn emit_url_change(&self, url: &str) -> Result<(), ContentProcessError> {
        self.emit(ProcessEvent::UrlChange {
            tab_id: self.owned_tab(),
            url: url.to_string(),
        })
    }

    fn owned_tab(&self) -> String {
        self.tab_id.clone().unwrap_or_default()
    }

    fn emit(&self, event: ProcessEvent) -> Result<(), ContentProcessError> {
        if self.events.emit(event) {
            Ok(())
        } else {
            Err(ContentProcessError::EventChannelClosed(
                self.process_id.clone(),
            ))
        }
    }
}

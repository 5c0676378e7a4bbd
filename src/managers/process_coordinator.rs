//! Process Coordinator for Serval.
//!
//! Sole authority over tab and content-process lifecycle. A single control
//! task owns the `ProcessRegistry`; callers talk to it through a cloneable
//! `ProcessCoordinator` handle, and units talk to it only through their
//! event sinks. Crashes are detected by watching each unit's join handle.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::managers::process_registry::{ProcessEntry, ProcessRegistry, ProcessRegistryTrait};
use crate::managers::subscription_registry::{invoke_all, SubscriptionId, SubscriptionRegistry};
use crate::services::process_launcher::{EventSink, LaunchContext, ProcessLauncher, UnitSignal, UnitTask};
use crate::types::errors::CoordinatorError;
use crate::types::process::{ExitReason, ProcessInfo, ProcessStatus};
use crate::types::protocol::{EventType, NavigationCommand, ProcessCommand, ProcessEvent};
use crate::types::settings::{CoordinatorSettings, RestartPolicy};
use crate::types::tab::Tab;

/// The coordinator's route to one live unit.
#[derive(Debug)]
pub struct ProcessHandle {
    commands: mpsc::UnboundedSender<ProcessCommand>,
    task: AbortHandle,
}

enum Control {
    CreateTab {
        tab_id: String,
        url: String,
        reply: oneshot::Sender<Result<String, CoordinatorError>>,
    },
    NavigateTab {
        tab_id: String,
        url: String,
    },
    Navigation {
        tab_id: String,
        command: NavigationCommand,
    },
    CloseTab {
        tab_id: String,
        reply: oneshot::Sender<()>,
    },
    GetTab {
        tab_id: String,
        reply: oneshot::Sender<Option<Tab>>,
    },
    GetAllTabs {
        reply: oneshot::Sender<Vec<Tab>>,
    },
    GetProcess {
        tab_id: String,
        reply: oneshot::Sender<Option<ProcessInfo>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the coordinator's control loop.
#[derive(Clone)]
pub struct ProcessCoordinator {
    control: mpsc::UnboundedSender<Control>,
    subscriptions: Arc<RwLock<SubscriptionRegistry>>,
}

impl ProcessCoordinator {
    /// Spawns the control loop on the current tokio runtime.
    pub fn start(settings: CoordinatorSettings, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(RwLock::new(SubscriptionRegistry::new()));

        let control_loop = ControlLoop {
            registry: ProcessRegistry::new(),
            launcher,
            settings,
            signal_tx,
            signal_rx,
            control_rx,
            subscriptions: subscriptions.clone(),
        };
        tokio::spawn(control_loop.run());

        Self {
            control: control_tx,
            subscriptions,
        }
    }

    /// Registers a tab and spawns its content process. Returns the process ID.
    ///
    /// The tab is visible to `get_tab` as soon as this returns; the unit's
    /// `ready` arrives later.
    pub async fn create_tab(&self, tab_id: &str, url: &str) -> Result<String, CoordinatorError> {
        self.request(|reply| Control::CreateTab {
            tab_id: tab_id.to_string(),
            url: url.to_string(),
            reply,
        })
        .await?
    }

    /// Updates the tab URL eagerly and forwards `navigate`. Unknown tabs are a
    /// logged no-op.
    pub fn navigate_tab(&self, tab_id: &str, url: &str) -> Result<(), CoordinatorError> {
        self.send(Control::NavigateTab {
            tab_id: tab_id.to_string(),
            url: url.to_string(),
        })
    }

    pub fn send_navigation_command(
        &self,
        tab_id: &str,
        command: NavigationCommand,
    ) -> Result<(), CoordinatorError> {
        self.send(Control::Navigation {
            tab_id: tab_id.to_string(),
            command,
        })
    }

    /// Terminates the tab's unit and forgets the tab. Idempotent.
    pub async fn close_tab(&self, tab_id: &str) -> Result<(), CoordinatorError> {
        self.request(|reply| Control::CloseTab {
            tab_id: tab_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn get_tab(&self, tab_id: &str) -> Option<Tab> {
        self.request(|reply| Control::GetTab {
            tab_id: tab_id.to_string(),
            reply,
        })
        .await
        .ok()
        .flatten()
    }

    /// All tabs in creation order.
    pub async fn get_all_tabs(&self) -> Vec<Tab> {
        self.request(|reply| Control::GetAllTabs { reply })
            .await
            .unwrap_or_default()
    }

    /// Registry snapshot of the process currently serving `tab_id`.
    pub async fn get_process(&self, tab_id: &str) -> Option<ProcessInfo> {
        self.request(|reply| Control::GetProcess {
            tab_id: tab_id.to_string(),
            reply,
        })
        .await
        .ok()
        .flatten()
    }

    /// Adds a handler for one event type. Handlers run on the control task.
    pub fn on_content_process_message<F>(&self, event_type: EventType, handler: F) -> SubscriptionId
    where
        F: Fn(&ProcessEvent) + Send + Sync + 'static,
    {
        self.subscriptions
            .write()
            .subscribe(event_type, Arc::new(handler))
    }

    /// Removes every handler for `event_type`.
    pub fn off_content_process_message(&self, event_type: EventType) -> usize {
        self.subscriptions.write().clear(event_type)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.write().unsubscribe(id)
    }

    /// Closes every tab and stops the control loop. Safe to call twice.
    pub async fn shutdown(&self) {
        if self
            .request(|reply| Control::Shutdown { reply })
            .await
            .is_err()
        {
            debug!("process coordinator already stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.control.is_closed()
    }

    fn send(&self, control: Control) -> Result<(), CoordinatorError> {
        self.control
            .send(control)
            .map_err(|_| CoordinatorError::Stopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, CoordinatorError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| CoordinatorError::Stopped)
    }
}

/// State owned exclusively by the control task.
struct ControlLoop {
    registry: ProcessRegistry<ProcessHandle>,
    launcher: Arc<dyn ProcessLauncher>,
    settings: CoordinatorSettings,
    signal_tx: mpsc::UnboundedSender<UnitSignal>,
    signal_rx: mpsc::UnboundedReceiver<UnitSignal>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    subscriptions: Arc<RwLock<SubscriptionRegistry>>,
}

impl ControlLoop {
    async fn run(mut self) {
        info!("process coordinator started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                control = self.control_rx.recv() => match control {
                    Some(control) => {
                        if !self.handle_control(control) {
                            break;
                        }
                    }
                    None => {
                        self.close_all();
                        break;
                    }
                },
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),
                _ = wait_until(deadline) => self.expire_deadlines(),
            }
        }
        info!("process coordinator stopped");
    }

    /// Returns `false` once the loop should stop.
    fn handle_control(&mut self, control: Control) -> bool {
        match control {
            Control::CreateTab { tab_id, url, reply } => {
                let _ = reply.send(self.create_tab(&tab_id, &url));
            }
            Control::NavigateTab { tab_id, url } => self.navigate_tab(&tab_id, &url),
            Control::Navigation { tab_id, command } => self.navigation(&tab_id, command),
            Control::CloseTab { tab_id, reply } => {
                self.close_tab(&tab_id);
                let _ = reply.send(());
            }
            Control::GetTab { tab_id, reply } => {
                let _ = reply.send(self.registry.get_tab(&tab_id).cloned());
            }
            Control::GetAllTabs { reply } => {
                let tabs = self.registry.get_all_tabs().into_iter().cloned().collect();
                let _ = reply.send(tabs);
            }
            Control::GetProcess { tab_id, reply } => {
                let info = self
                    .registry
                    .process_for_tab(&tab_id)
                    .map(|entry| entry.info.clone());
                let _ = reply.send(info);
            }
            Control::Shutdown { reply } => {
                self.close_all();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_signal(&mut self, signal: UnitSignal) {
        match signal {
            UnitSignal::Event { process_id, event } => self.ingest(&process_id, event),
            UnitSignal::Exited { process_id, reason } => self.process_exited(&process_id, reason),
        }
    }

    // ─── Tab lifecycle ───

    fn create_tab(&mut self, tab_id: &str, url: &str) -> Result<String, CoordinatorError> {
        self.registry.insert_tab(Tab::new(tab_id, url))?;
        let process_id = self.spawn_process(tab_id);
        info!(tab_id, process_id = %process_id, "tab created");
        Ok(process_id)
    }

    fn navigate_tab(&mut self, tab_id: &str, url: &str) {
        let Some(tab) = self.registry.get_tab_mut(tab_id) else {
            warn!(tab_id, "navigate requested for unknown tab");
            return;
        };
        tab.url = url.to_string();
        self.route_to_tab(
            tab_id,
            ProcessCommand::Navigate {
                tab_id: tab_id.to_string(),
                url: url.to_string(),
            },
        );
    }

    fn navigation(&mut self, tab_id: &str, command: NavigationCommand) {
        if self.registry.get_tab(tab_id).is_none() {
            warn!(tab_id, ?command, "navigation command for unknown tab");
            return;
        }
        self.route_to_tab(tab_id, command.to_command(tab_id));
    }

    fn close_tab(&mut self, tab_id: &str) {
        let Some((_, entry)) = self.registry.remove_tab(tab_id) else {
            debug!(tab_id, "close requested for unknown tab");
            return;
        };
        if let Some(entry) = entry {
            terminate(entry);
        }
        info!(tab_id, "tab closed");
    }

    fn close_all(&mut self) {
        let tab_ids = self.registry.tab_ids().to_vec();
        for tab_id in tab_ids {
            self.close_tab(&tab_id);
        }
    }

    // ─── Units ───

    fn spawn_process(&mut self, tab_id: &str) -> String {
        let process_id = Uuid::new_v4().to_string();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let events = EventSink::new(&process_id, self.signal_tx.clone());

        let task = self.launcher.launch(LaunchContext {
            process_id: process_id.clone(),
            commands: commands_rx,
            events,
        });
        let handle = ProcessHandle {
            commands: commands_tx,
            task: task.abort_handle(),
        };
        self.watch(&process_id, task);

        if !self.registry.attach_process(tab_id, &process_id, handle) {
            error!(tab_id, process_id = %process_id, "failed to register content process");
        }
        self.send_to_process(
            &process_id,
            ProcessCommand::Initialize {
                tab_id: tab_id.to_string(),
            },
        );
        process_id
    }

    /// Reports the unit's exit back to the control loop.
    fn watch(&self, process_id: &str, task: UnitTask) {
        let signals = self.signal_tx.clone();
        let process_id = process_id.to_string();
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(Ok(())) => ExitReason::Clean,
                Ok(Err(e)) => ExitReason::Failed(e.to_string()),
                Err(e) if e.is_panic() => ExitReason::Panicked(panic_message(e.into_panic())),
                Err(_) => ExitReason::Aborted,
            };
            let _ = signals.send(UnitSignal::Exited { process_id, reason });
        });
    }

    fn route_to_tab(&mut self, tab_id: &str, command: ProcessCommand) {
        let Some(entry) = self.registry.process_for_tab(tab_id) else {
            warn!(tab_id, command = command.kind(), "no content process for tab");
            return;
        };
        if !entry.info.status.is_live() {
            warn!(
                tab_id,
                status = %entry.info.status,
                command = command.kind(),
                "content process is not live; dropping command"
            );
            return;
        }
        let process_id = entry.info.process_id.clone();
        self.send_to_process(&process_id, command);
    }

    /// Sends a command. Commands that owe a reply start the watchdog once the
    /// unit is free to take them: now if it is idle, else at its `loadComplete`.
    fn send_to_process(&mut self, process_id: &str, command: ProcessCommand) {
        let timeout = self.settings.command_timeout();
        let Some(entry) = self.registry.process_mut(process_id) else {
            return;
        };
        let expects_reply = match &command {
            ProcessCommand::Initialize { .. } => true,
            ProcessCommand::Navigate { url, .. } => !url.trim().is_empty(),
            _ => false,
        };
        let kind = command.kind();
        if entry.handle.commands.send(command).is_err() {
            warn!(process_id, command = kind, "content process is not accepting commands");
            return;
        }
        if expects_reply {
            entry.awaiting += 1;
            if !entry.loading {
                arm(entry, timeout);
            }
        }
    }

    // ─── Events ───

    fn ingest(&mut self, process_id: &str, event: ProcessEvent) {
        let Some(entry) = self.registry.process_mut(process_id) else {
            debug!(process_id, event_type = %event.event_type(), "discarding event from unregistered process");
            return;
        };
        if !entry.info.status.is_live() {
            debug!(process_id, event_type = %event.event_type(), "discarding event from stopped process");
            return;
        }
        if matches!(event, ProcessEvent::ProcessCrash { .. }) {
            warn!(process_id, "discarding processCrash sent by a content process");
            return;
        }
        let tab_id = entry.info.tab_id.clone();
        if let Some(addressed) = event.tab_id() {
            if addressed != tab_id {
                warn!(process_id, tab_id = %tab_id, addressed, "discarding event addressed to another tab");
                return;
            }
        }

        entry.deadline = None;
        match &event {
            ProcessEvent::Ready { .. } => entry.awaiting = entry.awaiting.saturating_sub(1),
            ProcessEvent::LoadStart { .. } => {
                entry.awaiting = entry.awaiting.saturating_sub(1);
                entry.loading = true;
            }
            ProcessEvent::LoadComplete { .. } => {
                entry.loading = false;
                if entry.awaiting > 0 {
                    arm(entry, self.settings.command_timeout());
                }
            }
            _ => {}
        }
        let event = match event {
            // Subscribers always see the registry's process ID, whatever the host reported.
            ProcessEvent::Ready { .. } => {
                if entry.info.status == ProcessStatus::Initializing {
                    entry.info.status = ProcessStatus::Ready;
                }
                info!(tab_id = %tab_id, process_id, "content process ready");
                ProcessEvent::Ready {
                    tab_id: Some(tab_id.clone()),
                    process_id: Some(process_id.to_string()),
                }
            }
            other => other,
        };

        match &event {
            ProcessEvent::TitleChange { title, .. } => {
                if let Some(tab) = self.registry.get_tab_mut(&tab_id) {
                    tab.title = title.clone();
                }
            }
            ProcessEvent::UrlChange { url, .. } => {
                if let Some(tab) = self.registry.get_tab_mut(&tab_id) {
                    tab.url = url.clone();
                }
            }
            ProcessEvent::LoadStart { url, .. } => debug!(tab_id = %tab_id, url, "load started"),
            ProcessEvent::LoadComplete { url, .. } => debug!(tab_id = %tab_id, url, "load complete"),
            _ => {}
        }

        self.publish(&event);
    }

    fn publish(&self, event: &ProcessEvent) {
        let handlers = self.subscriptions.read().handlers_for(event.event_type());
        invoke_all(&handlers, event);
    }

    // ─── Failures ───

    fn process_exited(&mut self, process_id: &str, reason: ExitReason) {
        let Some(entry) = self.registry.process(process_id) else {
            debug!(process_id, %reason, "unregistered content process exited");
            return;
        };
        if !entry.info.status.is_live() {
            return;
        }
        self.crash(process_id, &reason.to_string());
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.registry.deadlines().map(|(_, deadline)| deadline).min()
    }

    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .registry
            .deadlines()
            .filter(|(_, deadline)| *deadline <= now)
            .map(|(process_id, _)| process_id.to_string())
            .collect();
        for process_id in expired {
            self.crash(&process_id, "no reply before command timeout");
        }
    }

    /// Marks a live unit crashed, reports it once, then applies the restart policy.
    fn crash(&mut self, process_id: &str, reason: &str) {
        let Some(entry) = self.registry.process_mut(process_id) else {
            return;
        };
        if !entry.info.status.is_live() {
            return;
        }
        entry.info.status = ProcessStatus::Crashed;
        entry.deadline = None;
        entry.handle.task.abort();
        let tab_id = entry.info.tab_id.clone();

        error!(tab_id = %tab_id, process_id, reason, "content process crashed");
        if let Some(tab) = self.registry.get_tab_mut(&tab_id) {
            tab.crashed = true;
        }
        self.publish(&ProcessEvent::ProcessCrash {
            tab_id: tab_id.clone(),
            process_id: process_id.to_string(),
        });
        self.maybe_restart(&tab_id, process_id);
    }

    fn maybe_restart(&mut self, tab_id: &str, crashed_process_id: &str) {
        let RestartPolicy::Restart { max_restarts } = self.settings.restart_policy else {
            return;
        };
        let Some(tab) = self.registry.get_tab(tab_id) else {
            return;
        };
        if tab.restarts >= max_restarts {
            warn!(tab_id, restarts = tab.restarts, "restart limit reached; tab stays crashed");
            return;
        }
        let url = tab.url.clone();

        self.registry.detach_process(crashed_process_id);
        let process_id = self.spawn_process(tab_id);
        if let Some(tab) = self.registry.get_tab_mut(tab_id) {
            tab.restarts += 1;
            tab.crashed = false;
        }
        info!(tab_id, process_id = %process_id, "content process restarted");

        if !url.trim().is_empty() {
            self.route_to_tab(
                tab_id,
                ProcessCommand::Navigate {
                    tab_id: tab_id.to_string(),
                    url,
                },
            );
        }
    }
}

fn arm(entry: &mut ProcessEntry<ProcessHandle>, timeout: Option<Duration>) {
    if let (Some(timeout), None) = (timeout, entry.deadline) {
        entry.deadline = Some(Instant::now() + timeout);
    }
}

/// Sends the optional shutdown notice, then stops the unit outright.
fn terminate(entry: ProcessEntry<ProcessHandle>) {
    let _ = entry.handle.commands.send(ProcessCommand::Shutdown {
        tab_id: entry.info.tab_id.clone(),
    });
    entry.handle.task.abort();
    debug!(process_id = %entry.info.process_id, "content process terminated");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

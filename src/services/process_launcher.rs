//! Process launchers: how content process units get an execution context.
//!
//! A launcher receives the unit's command receiver and event sink and returns
//! the join handle of whatever runs the unit. The coordinator watches that
//! handle to detect crashes; it never reaches into the unit any other way.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::services::content_process::ContentProcess;
use crate::types::errors::ContentProcessError;
use crate::types::process::ExitReason;
use crate::types::protocol::{ProcessCommand, ProcessEvent};
use crate::types::settings::LoadTimingSettings;

/// Anything a unit can publish its events into.
pub trait EventEmitter: Send + 'static {
    /// Publishes one event. Returns `false` once the receiver is gone.
    fn emit(&self, event: ProcessEvent) -> bool;
}

impl EventEmitter for mpsc::UnboundedSender<ProcessEvent> {
    fn emit(&self, event: ProcessEvent) -> bool {
        self.send(event).is_ok()
    }
}

/// Out-of-band signal from a unit to the coordinator's control loop.
#[derive(Debug)]
pub enum UnitSignal {
    Event {
        process_id: String,
        event: ProcessEvent,
    },
    Exited {
        process_id: String,
        reason: ExitReason,
    },
}

/// Event channel handed to a unit; stamps every event with its process ID.
#[derive(Debug, Clone)]
pub struct EventSink {
    process_id: Arc<str>,
    signals: mpsc::UnboundedSender<UnitSignal>,
}

impl EventSink {
    pub(crate) fn new(process_id: &str, signals: mpsc::UnboundedSender<UnitSignal>) -> Self {
        Self {
            process_id: Arc::from(process_id),
            signals,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }
}

impl EventEmitter for EventSink {
    fn emit(&self, event: ProcessEvent) -> bool {
        self.signals
            .send(UnitSignal::Event {
                process_id: self.process_id.to_string(),
                event,
            })
            .is_ok()
    }
}

/// Everything a launcher needs to start one unit.
pub struct LaunchContext {
    pub process_id: String,
    pub commands: mpsc::UnboundedReceiver<ProcessCommand>,
    pub events: EventSink,
}

/// Join handle of a running unit.
pub type UnitTask = JoinHandle<Result<(), ContentProcessError>>;

/// Trait defining how units are started.
pub trait ProcessLauncher: Send + Sync {
    /// Starts a unit. Must be called from within a tokio runtime.
    fn launch(&self, context: LaunchContext) -> UnitTask;
}

impl<L: ProcessLauncher + ?Sized> ProcessLauncher for Arc<L> {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        (**self).launch(context)
    }
}

/// Runs each unit as an isolated tokio task in this process.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLauncher {
    timing: LoadTimingSettings,
}

impl SimulatedLauncher {
    pub fn new(timing: LoadTimingSettings) -> Self {
        Self { timing }
    }
}

impl ProcessLauncher for SimulatedLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        let unit = ContentProcess::new(&context.process_id, context.events, self.timing);
        tokio::spawn(unit.run(context.commands))
    }
}

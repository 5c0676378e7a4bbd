use std::collections::HashMap;

use tokio::time::Instant;

use crate::types::errors::CoordinatorError;
use crate::types::process::{ProcessInfo, ProcessStatus};
use crate::types::tab::Tab;

/// One registered content process and whatever the coordinator uses to reach it.
#[derive(Debug)]
pub struct ProcessEntry<H> {
    pub info: ProcessInfo,
    pub handle: H,
    /// Set while the coordinator waits for the unit to answer a command.
    pub deadline: Option<Instant>,
    /// Commands sent that still owe a `ready` or `loadStart`.
    pub awaiting: u32,
    /// Between `loadStart` and `loadComplete`; queued commands wait behind it.
    pub loading: bool,
}

/// Trait defining the process registry interface.
pub trait ProcessRegistryTrait<H> {
    fn insert_tab(&mut self, tab: Tab) -> Result<(), CoordinatorError>;
    fn remove_tab(&mut self, tab_id: &str) -> Option<(Tab, Option<ProcessEntry<H>>)>;
    fn attach_process(&mut self, tab_id: &str, process_id: &str, handle: H) -> bool;
    fn detach_process(&mut self, process_id: &str) -> Option<ProcessEntry<H>>;
    fn get_tab(&self, tab_id: &str) -> Option<&Tab>;
    fn get_tab_mut(&mut self, tab_id: &str) -> Option<&mut Tab>;
    fn get_all_tabs(&self) -> Vec<&Tab>;
    fn process(&self, process_id: &str) -> Option<&ProcessEntry<H>>;
    fn process_mut(&mut self, process_id: &str) -> Option<&mut ProcessEntry<H>>;
    fn process_for_tab(&self, tab_id: &str) -> Option<&ProcessEntry<H>>;
    fn set_status(&mut self, process_id: &str, status: ProcessStatus) -> bool;
    fn tab_count(&self) -> usize;
    fn process_count(&self) -> usize;
    fn tab_ids(&self) -> &[String];
}

/// Tabs and their content processes, owned by the coordinator's control loop.
///
/// Generic over the process handle so the bookkeeping can be exercised
/// without a runtime.
pub struct ProcessRegistry<H> {
    tabs: HashMap<String, Tab>,
    tab_order: Vec<String>,
    processes: HashMap<String, ProcessEntry<H>>,
}

impl<H> ProcessRegistry<H> {
    pub fn new() -> Self {
        Self {
            tabs: HashMap::new(),
            tab_order: Vec::new(),
            processes: HashMap::new(),
        }
    }

    /// Entries with a pending deadline, as `(process_id, deadline)`.
    pub fn deadlines(&self) -> impl Iterator<Item = (&str, Instant)> {
        self.processes
            .iter()
            .filter_map(|(id, entry)| entry.deadline.map(|d| (id.as_str(), d)))
    }
}

impl<H> Default for ProcessRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ProcessRegistryTrait<H> for ProcessRegistry<H> {
    fn insert_tab(&mut self, tab: Tab) -> Result<(), CoordinatorError> {
        if self.tabs.contains_key(&tab.id) {
            return Err(CoordinatorError::TabAlreadyExists(tab.id));
        }
        self.tab_order.push(tab.id.clone());
        self.tabs.insert(tab.id.clone(), tab);
        Ok(())
    }

    /// Removes a tab together with its process entry.
    fn remove_tab(&mut self, tab_id: &str) -> Option<(Tab, Option<ProcessEntry<H>>)> {
        let tab = self.tabs.remove(tab_id)?;
        self.tab_order.retain(|id| id != tab_id);
        let entry = tab
            .process_id
            .as_deref()
            .and_then(|pid| self.processes.remove(pid));
        Some((tab, entry))
    }

    /// Registers a new process for an existing tab, in `Initializing` state.
    /// Returns `false` if the tab is unknown or the process ID is taken.
    fn attach_process(&mut self, tab_id: &str, process_id: &str, handle: H) -> bool {
        if self.processes.contains_key(process_id) {
            return false;
        }
        let Some(tab) = self.tabs.get_mut(tab_id) else {
            return false;
        };
        tab.process_id = Some(process_id.to_string());
        self.processes.insert(
            process_id.to_string(),
            ProcessEntry {
                info: ProcessInfo {
                    process_id: process_id.to_string(),
                    tab_id: tab_id.to_string(),
                    status: ProcessStatus::Initializing,
                },
                handle,
                deadline: None,
                awaiting: 0,
                loading: false,
            },
        );
        true
    }

    /// Drops a process entry and clears the owning tab's reference to it.
    fn detach_process(&mut self, process_id: &str) -> Option<ProcessEntry<H>> {
        let entry = self.processes.remove(process_id)?;
        if let Some(tab) = self.tabs.get_mut(&entry.info.tab_id) {
            if tab.process_id.as_deref() == Some(process_id) {
                tab.process_id = None;
            }
        }
        Some(entry)
    }

    fn get_tab(&self, tab_id: &str) -> Option<&Tab> {
        self.tabs.get(tab_id)
    }

    fn get_tab_mut(&mut self, tab_id: &str) -> Option<&mut Tab> {
        self.tabs.get_mut(tab_id)
    }

    fn get_all_tabs(&self) -> Vec<&Tab> {
        // Creation order
        self.tab_order
            .iter()
            .filter_map(|id| self.tabs.get(id))
            .collect()
    }

    fn process(&self, process_id: &str) -> Option<&ProcessEntry<H>> {
        self.processes.get(process_id)
    }

    fn process_mut(&mut self, process_id: &str) -> Option<&mut ProcessEntry<H>> {
        self.processes.get_mut(process_id)
    }

    fn process_for_tab(&self, tab_id: &str) -> Option<&ProcessEntry<H>> {
        let process_id = self.tabs.get(tab_id)?.process_id.as_deref()?;
        self.processes.get(process_id)
    }

    fn set_status(&mut self, process_id: &str, status: ProcessStatus) -> bool {
        match self.processes.get_mut(process_id) {
            Some(entry) => {
                entry.info.status = status;
                true
            }
            None => false,
        }
    }

    fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    fn process_count(&self) -> usize {
        self.processes.len()
    }

    fn tab_ids(&self) -> &[String] {
        &self.tab_order
    }
}

//! App Core for Serval.
//!
//! Composition root: loads settings, picks a launcher and starts the one
//! process coordinator every other component receives from here.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::logging;
use crate::managers::process_coordinator::ProcessCoordinator;
use crate::services::process_launcher::{ProcessLauncher, SimulatedLauncher};
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::subprocess_launcher::SubprocessLauncher;
use crate::types::errors::AppError;
use crate::types::settings::{LauncherSettings, ServalSettings};

#[cfg(feature = "bridge")]
use crate::services::bridge_client::{BridgeClient, BridgeLauncher};

/// Central application struct. Must be built inside a tokio runtime.
pub struct App {
    pub settings_engine: SettingsEngine,
    pub coordinator: ProcessCoordinator,
}

impl App {
    /// Loads settings from `config_path` (or the platform default) and starts the coordinator.
    pub fn new(config_path: Option<String>) -> Result<Self, AppError> {
        let mut settings_engine = SettingsEngine::new(config_path);
        settings_engine.load()?;
        Self::from_engine(settings_engine)
    }

    /// Starts the coordinator with in-memory settings; nothing is read from disk.
    pub fn with_settings(settings: ServalSettings) -> Result<Self, AppError> {
        Self::from_engine(SettingsEngine::with_settings(None, settings))
    }

    /// Installs logging first so startup is recorded; an earlier subscriber wins.
    fn from_engine(settings_engine: SettingsEngine) -> Result<Self, AppError> {
        let settings = settings_engine.get_settings();
        logging::init_subscriber(&settings.logging.level);
        let launcher = build_launcher(settings)?;
        let coordinator = ProcessCoordinator::start(settings.coordinator.clone(), launcher);
        info!(launcher = ?settings.launcher, "serval started");

        Ok(Self {
            settings_engine,
            coordinator,
        })
    }

    pub fn settings(&self) -> &ServalSettings {
        self.settings_engine.get_settings()
    }

    /// Closes every tab and stops the coordinator.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }
}

/// Picks the unit launcher named by the settings.
pub fn build_launcher(settings: &ServalSettings) -> Result<Arc<dyn ProcessLauncher>, AppError> {
    match &settings.launcher {
        LauncherSettings::InProcess => Ok(Arc::new(SimulatedLauncher::new(settings.timing))),
        LauncherSettings::Subprocess { program, args } => {
            let program = if program.is_empty() {
                SubprocessLauncher::default_program()
            } else {
                PathBuf::from(program)
            };
            Ok(Arc::new(SubprocessLauncher::new(
                program,
                args.clone(),
                settings.timing,
            )))
        }
        #[cfg(feature = "bridge")]
        LauncherSettings::Bridge => {
            let client = BridgeClient::connect(&settings.bridge);
            Ok(Arc::new(BridgeLauncher::new(client)))
        }
        #[cfg(not(feature = "bridge"))]
        LauncherSettings::Bridge => Err(AppError::UnsupportedLauncher("bridge".to_string())),
    }
}

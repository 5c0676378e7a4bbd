// Serval Settings Engine
// Loads, saves and edits the coordinator configuration.
// Settings are stored as a JSON file at the platform-specific config path.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::ServalSettings;

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<ServalSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &ServalSettings;
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine that persists `ServalSettings` as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: ServalSettings,
}

impl SettingsEngine {
    /// Uses `path_override` if given, else `settings.json` in the platform config dir.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = path_override.unwrap_or_else(|| {
            platform::get_config_dir()
                .join("settings.json")
                .to_string_lossy()
                .to_string()
        });

        Self {
            config_path,
            settings: ServalSettings::default(),
        }
    }

    /// An engine preloaded with `settings` instead of reading the file.
    pub fn with_settings(path_override: Option<String>, settings: ServalSettings) -> Self {
        Self {
            settings,
            ..Self::new(path_override)
        }
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// A missing file yields defaults; a malformed one is a serialization error.
    fn load(&mut self) -> Result<ServalSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            self.settings = ServalSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        self.settings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;
        Ok(self.settings.clone())
    }

    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))
    }

    fn get_settings(&self) -> &ServalSettings {
        &self.settings
    }

    /// Sets one value by dot path (`"coordinator.command_timeout_ms"`,
    /// `"timing.title_delay_ms"`), validates the result and saves it.
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }

        let mut root = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        let mut target = &mut root;
        for part in parents.into_iter().flat_map(|p| p.split('.')) {
            target = target
                .get_mut(part)
                .ok_or_else(|| SettingsError::InvalidKey(format!("Key '{}' not found in settings", key)))?;
        }
        match target {
            Value::Object(map) if map.contains_key(leaf) => {
                map.insert(leaf.to_string(), value);
            }
            Value::Object(_) => {
                return Err(SettingsError::InvalidKey(format!(
                    "Key '{}' not found in settings",
                    key
                )))
            }
            _ => {
                return Err(SettingsError::InvalidKey(format!(
                    "Cannot set '{}': parent is not an object",
                    key
                )))
            }
        }

        self.settings = serde_json::from_value(root).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;
        self.save()
    }

    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = ServalSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}

// Serval platform paths
// Only the configuration directory is platform-specific; Serval keeps no other state on disk.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Returns the platform-specific configuration directory for Serval.
///
/// - **Linux**: `~/.config/serval` (or `$XDG_CONFIG_HOME/serval`)
/// - **macOS**: `~/Library/Application Support/Serval`
/// - **Windows**: `%APPDATA%/Serval`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_config_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_config_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_config_dir()
    }
}

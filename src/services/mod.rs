// Serval services
// Content process units, the launchers that host them, the bridge transport and settings.

#[cfg(feature = "bridge")]
pub mod bridge_client;
#[cfg(feature = "bridge")]
pub mod bridge_server;
pub mod content_process;
pub mod process_launcher;
pub mod settings_engine;
pub mod subprocess_launcher;

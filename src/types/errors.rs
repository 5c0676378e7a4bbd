use thiserror::Error;

// === ProtocolError ===

/// Errors raised while decoding or encoding coordinator/unit messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The payload is not valid JSON or lacks a `type` discriminator.
    #[error("Malformed message: {0}")]
    Malformed(String),
    /// The `type` discriminator is outside the closed message set.
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    /// The `type` is known but the fields do not fit it.
    #[error("Invalid '{kind}' message: {reason}")]
    Invalid { kind: String, reason: String },
    /// Serializing a message to JSON failed.
    #[error("Message serialization failed: {0}")]
    Serialization(String),
}

// === CoordinatorError ===

/// Errors returned synchronously by the process coordinator.
///
/// Unit-side faults never show up here; they are reported through
/// `processCrash` events instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// A tab with the given ID is already registered.
    #[error("Tab already exists: {0}")]
    TabAlreadyExists(String),
    /// The coordinator control loop has shut down.
    #[error("Process coordinator is stopped")]
    Stopped,
}

// === ContentProcessError ===

/// Faults inside a content process unit or its host.
#[derive(Debug, Error)]
pub enum ContentProcessError {
    /// Nobody is listening for the unit's events anymore.
    #[error("Event channel closed for process {0}")]
    EventChannelClosed(String),
    /// The unit's host process could not be started.
    #[error("Failed to spawn content process: {0}")]
    Spawn(String),
    /// Reading from or writing to the unit's host process failed.
    #[error("Content process I/O error: {0}")]
    Io(String),
    /// The unit's host process exited unsuccessfully.
    #[error("Content process exited: {0}")]
    Exited(String),
    /// A command could not be encoded for the unit.
    #[error("Content process protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

// === BridgeError ===

/// Errors related to the external rendering-engine bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Binding the listening socket failed.
    #[error("Bridge bind failed: {0}")]
    Bind(String),
    /// The WebSocket handshake or a frame transfer failed.
    #[error("Bridge WebSocket error: {0}")]
    WebSocket(String),
    /// A socket-level I/O error occurred.
    #[error("Bridge I/O error: {0}")]
    Io(String),
    /// A frame could not be encoded.
    #[error("Bridge protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    #[error("Settings I/O error: {0}")]
    IoError(String),
    /// Failed to serialize or deserialize settings.
    #[error("Settings serialization error: {0}")]
    SerializationError(String),
    /// The provided settings key is invalid.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The provided settings value is invalid.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}

// === AppError ===

/// Errors raised while assembling the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The configured launcher is not available in this build.
    #[error("Unsupported launcher: {0}")]
    UnsupportedLauncher(String),
}

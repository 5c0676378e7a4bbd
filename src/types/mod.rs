// Serval shared type definitions
// Plain data used across the coordinator, units and transports.

pub mod errors;
pub mod history;
pub mod process;
pub mod protocol;
pub mod settings;
pub mod tab;

// Serval state managers
// The process coordinator and the registries it owns.

pub mod process_coordinator;
pub mod process_registry;
pub mod subscription_registry;

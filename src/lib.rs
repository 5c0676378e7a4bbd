//! Serval: a browser-chrome prototype that runs every tab's page work in an
//! isolated content process and supervises those processes from one coordinator.
//!
//! This library crate exposes all modules for use by the binaries and integration tests.

pub mod app;
pub mod logging;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;

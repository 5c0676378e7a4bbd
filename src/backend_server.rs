//! serval-backend: standalone WebSocket rendering backend for the bridge launcher.
//!
//! Binds `SERVAL_BACKEND_ADDR` (default 127.0.0.1:8080) and hosts simulated
//! content process units for every connected coordinator.

use tracing::error;

use serval::logging;
use serval::services::bridge_server::{BridgeServer, BACKEND_ADDR_ENV, DEFAULT_BACKEND_ADDR};
use serval::services::subprocess_launcher::timing_from_env;

#[tokio::main]
async fn main() {
    logging::init_subscriber("info");

    let addr = std::env::var(BACKEND_ADDR_ENV).unwrap_or_else(|_| DEFAULT_BACKEND_ADDR.to_string());
    let server = match BridgeServer::bind(&addr, timing_from_env()).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to start backend");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.serve().await {
        error!(error = %e, "backend stopped");
        std::process::exit(1);
    }
}

//! Serval RPC Server: JSON-RPC over stdin/stdout for a UI shell.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"tab.create", "params":{"url":"https://example.com"}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Event:    {"event":"titleChange", "data":{"type":"titleChange","tabId":"...","title":"..."}}

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use serval::app::App;
use serval::rpc_handler::{event_notification, handle_method};
use serval::types::protocol::EventType;

/// Overrides the settings file location.
const CONFIG_ENV: &str = "SERVAL_CONFIG";

/// Fixed one-second window request limiter.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            max_per_second,
        }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed() >= Duration::from_secs(1) {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

#[tokio::main]
async fn main() {
    let app = match App::new(std::env::var(CONFIG_ENV).ok()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize Serval: {}", e);
            std::process::exit(1);
        }
    };

    // Every stdout line goes through one writer so responses and events never interleave.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            let mut text = line.to_string();
            text.push('\n');
            if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));
    for event_type in EventType::ALL {
        let out = out_tx.clone();
        app.coordinator
            .on_content_process_message(event_type, move |event| {
                let _ = out.send(event_notification(event));
            });
    }

    let mut rate_limiter = RateLimiter::new(app.settings().rpc.max_requests_per_second);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read request");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out_tx.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                continue;
            }
        };
        let id = req.get("id").cloned().unwrap_or(Value::Null);

        if !rate_limiter.check() {
            let _ = out_tx.send(json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("");
        let params = req.get("params").cloned().unwrap_or(json!({}));

        let response = match handle_method(&app, method, &params).await {
            Ok(val) => json!({"id": id, "result": val}),
            Err(err) => json!({"id": id, "error": err}),
        };
        let _ = out_tx.send(response);
    }

    info!("stdin closed; shutting down");
    app.shutdown().await;
    for event_type in EventType::ALL {
        app.coordinator.off_content_process_message(event_type);
    }
    drop(out_tx);
    let _ = writer.await;
}

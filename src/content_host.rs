//! serval-content: hosts one content process unit in its own OS process.
//!
//! Commands arrive as JSON lines on stdin, events leave as JSON lines on
//! stdout. Logs go to stderr. Exits non-zero if the unit fails.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, warn};
use uuid::Uuid;

use serval::logging;
use serval::services::content_process::ContentProcess;
use serval::services::subprocess_launcher::{timing_from_env, PROCESS_ID_ENV};
use serval::types::protocol::{ProcessCommand, ProcessEvent};

#[tokio::main]
async fn main() {
    logging::init_subscriber("warn");

    let process_id =
        std::env::var(PROCESS_ID_ENV).unwrap_or_else(|_| Uuid::new_v4().to_string());
    let (command_tx, command_rx) = mpsc::unbounded_channel::<ProcessCommand>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProcessEvent>();

    let unit = ContentProcess::new(&process_id, event_tx, timing_from_env());
    let unit_task = tokio::spawn(unit.run(command_rx));

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = event_rx.recv().await {
            let mut line = match event.to_json() {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "failed to encode event");
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match ProcessCommand::from_json(&line) {
                Ok(command) => {
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "discarding undecodable command"),
            }
        }
    });

    let code = match unit_task.await {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!(error = %e, "content process failed");
            1
        }
        Err(e) => {
            error!(error = %e, "content process aborted");
            1
        }
    };
    let _ = writer.await;
    // The stdin reader cannot be cancelled; exit without waiting for it.
    std::process::exit(code);
}

//! RPC method handler for the Serval JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be unit-tested. `handle_method`
//! maps each method onto the process coordinator held by `App`.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::App;
use crate::types::protocol::{NavigationCommand, ProcessEvent};

fn str_param<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params.get(name).and_then(|v| v.as_str())
}

fn required<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    str_param(params, name).ok_or_else(|| format!("missing {}", name))
}

/// Dispatches one method call. Returns `Ok(Value)` on success or `Err(String)`
/// with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    let coordinator = &app.coordinator;
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Tabs ───
        "tab.create" => {
            let tab_id = str_param(params, "tabId")
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let url = str_param(params, "url").unwrap_or("");
            let process_id = coordinator
                .create_tab(&tab_id, url)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"tabId": tab_id, "processId": process_id}))
        }
        "tab.navigate" => {
            let tab_id = required(params, "tabId")?;
            let url = required(params, "url")?;
            coordinator
                .navigate_tab(tab_id, url)
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "tab.back" | "tab.forward" | "tab.refresh" => {
            let tab_id = required(params, "tabId")?;
            let command = method
                .trim_start_matches("tab.")
                .parse::<NavigationCommand>()
                .map_err(|e| e.to_string())?;
            coordinator
                .send_navigation_command(tab_id, command)
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "tab.close" => {
            let tab_id = required(params, "tabId")?;
            coordinator.close_tab(tab_id).await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "tab.get" => {
            let tab_id = required(params, "tabId")?;
            let tab = coordinator
                .get_tab(tab_id)
                .await
                .ok_or_else(|| format!("tab not found: {}", tab_id))?;
            serde_json::to_value(tab).map_err(|e| e.to_string())
        }
        "tab.list" => {
            let tabs = coordinator.get_all_tabs().await;
            serde_json::to_value(tabs).map_err(|e| e.to_string())
        }

        // ─── Processes ───
        "process.get" => {
            let tab_id = required(params, "tabId")?;
            let info = coordinator.get_process(tab_id).await;
            serde_json::to_value(info).map_err(|e| e.to_string())
        }

        // ─── Settings ───
        "settings.get" => serde_json::to_value(app.settings()).map_err(|e| e.to_string()),

        _ => Err(format!("unknown method: {}", method)),
    }
}

/// The line pushed to the UI for every coordinator event.
pub fn event_notification(event: &ProcessEvent) -> Value {
    json!({"event": event.event_type().as_str(), "data": event})
}

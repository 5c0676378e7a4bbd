//! Serval console demo.
//!
//! Starts the coordinator with in-process units, opens two tabs and walks
//! them through navigation, history and close, printing every event.

use std::time::Duration;

use serval::app::App;
use serval::logging;
use serval::types::protocol::{EventType, NavigationCommand};
use serval::types::settings::ServalSettings;

#[tokio::main]
async fn main() {
    let mut settings = ServalSettings::default();
    settings.timing.title_delay_ms = 20;
    settings.timing.complete_delay_ms = 10;
    logging::init_subscriber("warn");

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Serval v{} — Demo Mode                   ║", env!("CARGO_PKG_VERSION"));
    println!("║        One isolated content process per browser tab          ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let app = match App::with_settings(settings) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("  ❌ Failed to start: {}", e);
            std::process::exit(1);
        }
    };
    let coordinator = &app.coordinator;

    for event_type in EventType::ALL {
        coordinator.on_content_process_message(event_type, |event| {
            println!("  ⚡ {:?}", event);
        });
    }

    section("Create tabs");
    for (tab_id, url) in [("tab-1", "https://example.com"), ("tab-2", "")] {
        match coordinator.create_tab(tab_id, url).await {
            Ok(process_id) => println!("  ✓ {} → process {}", tab_id, process_id),
            Err(e) => println!("  ❌ {}: {}", tab_id, e),
        }
    }
    settle().await;

    section("Navigate");
    let _ = coordinator.navigate_tab("tab-1", "https://example.com");
    settle().await;
    let _ = coordinator.navigate_tab("tab-1", "https://rust-lang.org/learn");
    settle().await;

    section("History");
    let _ = coordinator.send_navigation_command("tab-1", NavigationCommand::Back);
    settle().await;
    let _ = coordinator.send_navigation_command("tab-1", NavigationCommand::Forward);
    settle().await;
    let _ = coordinator.send_navigation_command("tab-1", NavigationCommand::Refresh);
    settle().await;

    section("Tabs");
    for tab in coordinator.get_all_tabs().await {
        println!("  • {} │ {} │ {}", tab.id, tab.title, tab.url);
    }

    section("Close");
    let _ = coordinator.close_tab("tab-2").await;
    println!("  ✓ tab-2 closed, {} tab(s) left", coordinator.get_all_tabs().await.len());

    app.shutdown().await;
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  ✅ Demo finished");
    println!("═══════════════════════════════════════════════════════════════");
}

fn section(name: &str) {
    println!("───────────────────────────────────────────────────────────────");
    println!("  📦 {}", name);
    println!("───────────────────────────────────────────────────────────────");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

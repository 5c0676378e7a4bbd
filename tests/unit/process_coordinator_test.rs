use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use serval::managers::process_coordinator::ProcessCoordinator;
use serval::services::process_launcher::{
    EventEmitter, LaunchContext, ProcessLauncher, SimulatedLauncher, UnitTask,
};
use serval::types::errors::CoordinatorError;
use serval::types::process::ProcessStatus;
use serval::types::protocol::{EventType, NavigationCommand, ProcessCommand, ProcessEvent};
use serval::types::settings::{CoordinatorSettings, LoadTimingSettings, RestartPolicy};

// === Helpers ===

fn timing() -> LoadTimingSettings {
    LoadTimingSettings {
        title_delay_ms: 5,
        complete_delay_ms: 5,
    }
}

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        command_timeout_ms: Some(2_000),
        restart_policy: RestartPolicy::Never,
    }
}

fn start() -> ProcessCoordinator {
    ProcessCoordinator::start(settings(), Arc::new(SimulatedLauncher::new(timing())))
}

fn start_with(settings: CoordinatorSettings, launcher: impl ProcessLauncher + 'static) -> ProcessCoordinator {
    ProcessCoordinator::start(settings, Arc::new(launcher))
}

/// Mirrors every dispatched event into a channel.
fn record(coordinator: &ProcessCoordinator) -> mpsc::UnboundedReceiver<ProcessEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for event_type in EventType::ALL {
        let tx = tx.clone();
        coordinator.on_content_process_message(event_type, move |event| {
            let _ = tx.send(event.clone());
        });
    }
    rx
}

async fn expect_event(
    rx: &mut mpsc::UnboundedReceiver<ProcessEvent>,
    pred: impl Fn(&ProcessEvent) -> bool,
) -> ProcessEvent {
    timeout(Duration::from_secs(3), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Asserts no matching event shows up within `window`.
async fn expect_none(
    rx: &mut mpsc::UnboundedReceiver<ProcessEvent>,
    window: Duration,
    pred: impl Fn(&ProcessEvent) -> bool,
) {
    let seen = timeout(window, async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return event;
            }
        }
        std::future::pending().await
    })
    .await;
    assert!(seen.is_err(), "unexpected event: {:?}", seen);
}

fn is_type(event_type: EventType, tab: &'static str) -> impl Fn(&ProcessEvent) -> bool {
    move |e| e.event_type() == event_type && e.tab_id() == Some(tab)
}

/// Unit that panics on its first command.
struct PanickingLauncher;

impl ProcessLauncher for PanickingLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        tokio::spawn(async move {
            let mut commands = context.commands;
            if commands.recv().await.is_some() {
                panic!("renderer fault");
            }
            Ok(())
        })
    }
}

/// Unit that swallows every command and never answers.
struct HungLauncher;

impl ProcessLauncher for HungLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        tokio::spawn(async move {
            let _events = context.events;
            let mut commands = context.commands;
            while commands.recv().await.is_some() {}
            Ok(())
        })
    }
}

/// Panics on the first launch, behaves on the rest.
struct FlakyLauncher {
    launches: AtomicUsize,
    inner: SimulatedLauncher,
}

impl ProcessLauncher for FlakyLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        if self.launches.fetch_add(1, Ordering::SeqCst) == 0 {
            PanickingLauncher.launch(context)
        } else {
            self.inner.launch(context)
        }
    }
}

/// Answers `initialize`; unless it serves "victim", it then impersonates
/// that tab and forges a crash report for it.
struct RogueLauncher;

impl ProcessLauncher for RogueLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        tokio::spawn(async move {
            let events = context.events;
            let mut commands = context.commands;
            while let Some(command) = commands.recv().await {
                let tab_id = command.tab_id().to_string();
                events.emit(ProcessEvent::Ready {
                    tab_id: Some(tab_id.clone()),
                    process_id: None,
                });
                if tab_id == "victim" {
                    continue;
                }
                events.emit(ProcessEvent::TitleChange {
                    tab_id: "victim".to_string(),
                    title: "spoofed".to_string(),
                });
                events.emit(ProcessEvent::ProcessCrash {
                    tab_id: "victim".to_string(),
                    process_id: "fake".to_string(),
                });
            }
            Ok(())
        })
    }
}

// === Tab lifecycle ===

#[tokio::test]
async fn test_created_tab_is_immediately_queryable() {
    let coordinator = start();
    let process_id = coordinator.create_tab("t1", "https://example.com").await.unwrap();

    let tab = coordinator.get_tab("t1").await.unwrap();
    assert_eq!(tab.title, "New Tab");
    assert_eq!(tab.url, "https://example.com");
    assert_eq!(tab.process_id.as_deref(), Some(process_id.as_str()));
}

#[tokio::test]
async fn test_duplicate_tab_id_is_rejected() {
    let coordinator = start();
    coordinator.create_tab("t1", "").await.unwrap();
    let err = coordinator.create_tab("t1", "").await.unwrap_err();
    assert_eq!(err, CoordinatorError::TabAlreadyExists("t1".to_string()));
}

#[tokio::test]
async fn test_ready_carries_tab_and_process_id() {
    let coordinator = start();
    let mut events = record(&coordinator);
    let process_id = coordinator.create_tab("t1", "").await.unwrap();

    let ready = expect_event(&mut events, is_type(EventType::Ready, "t1")).await;
    assert_eq!(
        ready,
        ProcessEvent::Ready {
            tab_id: Some("t1".to_string()),
            process_id: Some(process_id)
        }
    );
    let info = coordinator.get_process("t1").await.unwrap();
    assert_eq!(info.status, ProcessStatus::Ready);
}

#[tokio::test]
async fn test_navigate_updates_url_at_once_and_title_after_load() {
    let coordinator = start();
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();

    coordinator.navigate_tab("t1", "https://example.com/docs").unwrap();
    let tab = coordinator.get_tab("t1").await.unwrap();
    assert_eq!(tab.url, "https://example.com/docs");
    assert_eq!(tab.title, "New Tab");

    expect_event(&mut events, is_type(EventType::LoadComplete, "t1")).await;
    let tab = coordinator.get_tab("t1").await.unwrap();
    assert_eq!(tab.title, "example.com");
}

#[tokio::test]
async fn test_load_events_arrive_in_order() {
    let coordinator = start();
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();
    expect_event(&mut events, is_type(EventType::Ready, "t1")).await;

    coordinator.navigate_tab("t1", "https://a.com").unwrap();
    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(expect_event(&mut events, |_| true).await.event_type());
    }
    assert_eq!(
        seen,
        vec![
            EventType::LoadStart,
            EventType::TitleChange,
            EventType::UrlChange,
            EventType::LoadComplete
        ]
    );
}

#[tokio::test]
async fn test_unknown_tab_operations_are_no_ops() {
    let coordinator = start();
    let mut events = record(&coordinator);

    coordinator.navigate_tab("ghost", "https://a.com").unwrap();
    coordinator
        .send_navigation_command("ghost", NavigationCommand::Back)
        .unwrap();
    coordinator.close_tab("ghost").await.unwrap();

    assert!(coordinator.get_tab("ghost").await.is_none());
    assert!(coordinator.get_all_tabs().await.is_empty());
    expect_none(&mut events, Duration::from_millis(100), |_| true).await;
}

#[tokio::test]
async fn test_close_tab_forgets_it_without_crash_report() {
    let coordinator = start();
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();
    expect_event(&mut events, is_type(EventType::Ready, "t1")).await;

    coordinator.close_tab("t1").await.unwrap();
    assert!(coordinator.get_tab("t1").await.is_none());
    assert!(coordinator.get_process("t1").await.is_none());

    coordinator.navigate_tab("t1", "https://a.com").unwrap();
    coordinator.close_tab("t1").await.unwrap();
    expect_none(&mut events, Duration::from_millis(150), |_| true).await;
}

#[tokio::test]
async fn test_close_tab_mid_load_drops_remaining_events() {
    let coordinator = ProcessCoordinator::start(
        settings(),
        Arc::new(SimulatedLauncher::new(LoadTimingSettings {
            title_delay_ms: 100,
            complete_delay_ms: 100,
        })),
    );
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();
    coordinator.navigate_tab("t1", "https://a.com").unwrap();
    expect_event(&mut events, is_type(EventType::LoadStart, "t1")).await;

    coordinator.close_tab("t1").await.unwrap();
    expect_none(&mut events, Duration::from_millis(300), |_| true).await;
}

#[tokio::test]
async fn test_tabs_listed_in_creation_order() {
    let coordinator = start();
    for id in ["c", "a", "b"] {
        coordinator.create_tab(id, "").await.unwrap();
    }
    let ids: Vec<String> = coordinator
        .get_all_tabs()
        .await
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn test_back_restores_previous_url() {
    let coordinator = start();
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();

    coordinator.navigate_tab("t1", "https://a.com").unwrap();
    expect_event(&mut events, is_type(EventType::LoadComplete, "t1")).await;
    coordinator.navigate_tab("t1", "https://b.org").unwrap();
    expect_event(&mut events, is_type(EventType::LoadComplete, "t1")).await;

    coordinator
        .send_navigation_command("t1", NavigationCommand::Back)
        .unwrap();
    expect_event(&mut events, is_type(EventType::LoadComplete, "t1")).await;

    let tab = coordinator.get_tab("t1").await.unwrap();
    assert_eq!(tab.url, "https://a.com");
    assert_eq!(tab.title, "a.com");
}

// === Subscriptions ===

#[tokio::test]
async fn test_every_handler_for_a_type_fires() {
    let coordinator = start();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    for counter in [&first, &second] {
        let counter = counter.clone();
        coordinator.on_content_process_message(EventType::Ready, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mut events = record(&coordinator);

    coordinator.create_tab("t1", "").await.unwrap();
    expect_event(&mut events, is_type(EventType::Ready, "t1")).await;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsubscribe_and_off_remove_handlers() {
    let coordinator = start();
    let counter = Arc::new(AtomicUsize::new(0));
    let subscribe = |c: &Arc<AtomicUsize>| {
        let c = c.clone();
        coordinator.on_content_process_message(EventType::Ready, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    };
    let id = subscribe(&counter);
    subscribe(&counter);
    subscribe(&counter);

    assert!(coordinator.unsubscribe(id));
    assert_eq!(coordinator.off_content_process_message(EventType::Ready), 2);

    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();
    expect_event(&mut events, is_type(EventType::Ready, "t1")).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

// === Crashes ===

#[tokio::test]
async fn test_panicking_unit_reports_exactly_one_crash() {
    let coordinator = start_with(settings(), PanickingLauncher);
    let mut events = record(&coordinator);
    let process_id = coordinator.create_tab("t1", "").await.unwrap();

    let crash = expect_event(&mut events, is_type(EventType::ProcessCrash, "t1")).await;
    assert_eq!(
        crash,
        ProcessEvent::ProcessCrash {
            tab_id: "t1".to_string(),
            process_id
        }
    );

    let tab = coordinator.get_tab("t1").await.unwrap();
    assert!(tab.crashed);
    assert_eq!(
        coordinator.get_process("t1").await.unwrap().status,
        ProcessStatus::Crashed
    );

    coordinator.navigate_tab("t1", "https://a.com").unwrap();
    expect_none(&mut events, Duration::from_millis(150), |_| true).await;
}

#[tokio::test]
async fn test_crash_in_one_tab_leaves_others_working() {
    let coordinator = start_with(
        settings(),
        FlakyLauncher {
            launches: AtomicUsize::new(0),
            inner: SimulatedLauncher::new(timing()),
        },
    );
    let mut events = record(&coordinator);
    coordinator.create_tab("doomed", "").await.unwrap();
    coordinator.create_tab("healthy", "").await.unwrap();
    expect_event(&mut events, is_type(EventType::ProcessCrash, "doomed")).await;

    coordinator.navigate_tab("healthy", "https://ok.net").unwrap();
    expect_event(&mut events, is_type(EventType::LoadComplete, "healthy")).await;
    assert_eq!(coordinator.get_tab("healthy").await.unwrap().title, "ok.net");
}

#[tokio::test]
async fn test_hung_unit_is_reported_after_timeout() {
    let coordinator = start_with(
        CoordinatorSettings {
            command_timeout_ms: Some(100),
            restart_policy: RestartPolicy::Never,
        },
        HungLauncher,
    );
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();

    expect_event(&mut events, is_type(EventType::ProcessCrash, "t1")).await;
    assert!(coordinator.get_tab("t1").await.unwrap().crashed);
    expect_none(&mut events, Duration::from_millis(300), |_| true).await;
}

/// Answers `initialize` and the first `navigate`, then ignores everything.
struct StallingLauncher;

impl ProcessLauncher for StallingLauncher {
    fn launch(&self, context: LaunchContext) -> UnitTask {
        tokio::spawn(async move {
            let LaunchContext {
                process_id,
                mut commands,
                events,
            } = context;
            let mut loaded = false;
            while let Some(command) = commands.recv().await {
                let tab_id = command.tab_id().to_string();
                match command {
                    ProcessCommand::Initialize { .. } => {
                        events.emit(ProcessEvent::Ready {
                            tab_id: Some(tab_id),
                            process_id: Some(process_id.clone()),
                        });
                    }
                    ProcessCommand::Navigate { url, .. } if !loaded => {
                        loaded = true;
                        events.emit(ProcessEvent::LoadStart {
                            tab_id: tab_id.clone(),
                            url: url.clone(),
                        });
                        events.emit(ProcessEvent::LoadComplete { tab_id, url });
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_command_queued_behind_slow_load_is_not_a_hang() {
    let coordinator = start_with(
        CoordinatorSettings {
            command_timeout_ms: Some(300),
            restart_policy: RestartPolicy::Never,
        },
        SimulatedLauncher::new(LoadTimingSettings {
            title_delay_ms: 400,
            complete_delay_ms: 10,
        }),
    );
    let mut events = record(&coordinator);
    coordinator.create_tab("1", "").await.unwrap();
    coordinator.navigate_tab("1", "https://a.example").unwrap();
    expect_event(&mut events, is_type(EventType::LoadStart, "1")).await;
    coordinator.navigate_tab("1", "https://b.example").unwrap();

    let done = expect_event(&mut events, |e| {
        matches!(e, ProcessEvent::LoadComplete { url, .. } if url == "https://b.example")
            || e.event_type() == EventType::ProcessCrash
    })
    .await;
    assert_eq!(done.event_type(), EventType::LoadComplete);

    let tab = coordinator.get_tab("1").await.unwrap();
    assert!(!tab.crashed);
    assert_eq!(tab.title, "b.example");
}

#[tokio::test]
async fn test_unit_stalling_on_queued_command_is_reported() {
    let coordinator = start_with(
        CoordinatorSettings {
            command_timeout_ms: Some(100),
            restart_policy: RestartPolicy::Never,
        },
        StallingLauncher,
    );
    let mut events = record(&coordinator);
    coordinator.create_tab("1", "").await.unwrap();
    coordinator.navigate_tab("1", "https://a.example").unwrap();
    coordinator.navigate_tab("1", "https://b.example").unwrap();

    expect_event(&mut events, is_type(EventType::LoadComplete, "1")).await;
    expect_event(&mut events, is_type(EventType::ProcessCrash, "1")).await;
    assert!(coordinator.get_tab("1").await.unwrap().crashed);
}

#[tokio::test]
async fn test_events_for_other_tabs_and_forged_crashes_are_discarded() {
    let coordinator = start_with(settings(), RogueLauncher);
    let mut events = record(&coordinator);
    coordinator.create_tab("victim", "").await.unwrap();
    coordinator.create_tab("rogue", "").await.unwrap();

    expect_event(&mut events, is_type(EventType::Ready, "rogue")).await;
    expect_none(&mut events, Duration::from_millis(150), |e| {
        matches!(
            e.event_type(),
            EventType::TitleChange | EventType::ProcessCrash
        )
    })
    .await;

    let victim = coordinator.get_tab("victim").await.unwrap();
    assert_eq!(victim.title, "New Tab");
    assert!(!victim.crashed);
}

// === Restart policy ===

#[tokio::test]
async fn test_restart_policy_replaces_crashed_unit_and_reloads() {
    let coordinator = start_with(
        CoordinatorSettings {
            command_timeout_ms: Some(2_000),
            restart_policy: RestartPolicy::Restart { max_restarts: 1 },
        },
        FlakyLauncher {
            launches: AtomicUsize::new(0),
            inner: SimulatedLauncher::new(timing()),
        },
    );
    let mut events = record(&coordinator);
    let first = coordinator.create_tab("t1", "https://example.com").await.unwrap();

    expect_event(&mut events, is_type(EventType::ProcessCrash, "t1")).await;
    let ready = expect_event(&mut events, is_type(EventType::Ready, "t1")).await;
    let ProcessEvent::Ready { process_id, .. } = ready else {
        unreachable!()
    };
    assert_ne!(process_id.as_deref(), Some(first.as_str()));

    expect_event(&mut events, is_type(EventType::LoadComplete, "t1")).await;
    let tab = coordinator.get_tab("t1").await.unwrap();
    assert_eq!(tab.restarts, 1);
    assert!(!tab.crashed);
    assert_eq!(tab.title, "example.com");
    assert_eq!(tab.process_id, process_id);
}

#[tokio::test]
async fn test_restart_limit_leaves_tab_crashed() {
    let coordinator = start_with(
        CoordinatorSettings {
            command_timeout_ms: Some(2_000),
            restart_policy: RestartPolicy::Restart { max_restarts: 2 },
        },
        PanickingLauncher,
    );
    let mut events = record(&coordinator);
    coordinator.create_tab("t1", "").await.unwrap();

    for _ in 0..3 {
        expect_event(&mut events, is_type(EventType::ProcessCrash, "t1")).await;
    }
    expect_none(&mut events, Duration::from_millis(200), |e| {
        e.event_type() == EventType::ProcessCrash
    })
    .await;

    let tab = coordinator.get_tab("t1").await.unwrap();
    assert!(tab.crashed);
    assert_eq!(tab.restarts, 2);
}

// === Shutdown ===

#[tokio::test]
async fn test_shutdown_closes_tabs_and_stops() {
    let coordinator = start();
    coordinator.create_tab("t1", "").await.unwrap();
    assert!(coordinator.is_running());
    coordinator.shutdown().await;

    let err = coordinator.create_tab("t2", "").await.unwrap_err();
    assert_eq!(err, CoordinatorError::Stopped);
    assert!(!coordinator.is_running());
    assert!(coordinator.get_tab("t1").await.is_none());
    // A second shutdown is harmless
    coordinator.shutdown().await;
}

//! End-to-end dispatch behaviour through the public manager API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use eventfire::{
    CancelFlag, Cancellable, DispatchConfig, DispatchManager, Event, EventFilter, EventId,
    EventView, FailureCause, InvocationPhase, Listener, ListenerBindings, Outcome, Priority,
    ValidationError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manager() -> DispatchManager {
    init_tracing();
    DispatchManager::new(DispatchConfig::default()).unwrap()
}

#[derive(Debug)]
struct TableDropped {
    id: EventId,
    table: String,
    cancel: CancelFlag,
    touched: AtomicUsize,
}

impl TableDropped {
    fn new(table: &str) -> Self {
        Self {
            id: EventId::new(),
            table: table.to_string(),
            cancel: CancelFlag::default(),
            touched: AtomicUsize::new(0),
        }
    }
}

impl Event for TableDropped {
    fn id(&self) -> &EventId {
        &self.id
    }

    fn cancellation(&self) -> Option<&dyn Cancellable> {
        Some(&self.cancel)
    }
}

#[derive(Debug)]
struct Heartbeat {
    id: EventId,
}

impl Event for Heartbeat {
    fn id(&self) -> &EventId {
        &self.id
    }
}

#[test]
fn no_handlers_yields_success() {
    let manager = manager();
    let future = manager.fire_event(TableDropped::new("teams")).unwrap();

    let event = future.get().unwrap();
    assert!(!event.is_cancelled());
    assert!(future.is_done());
    assert!(!future.is_cancelled());
    assert!(!future.has_error());
    assert!(future.exceptions().is_empty());
    assert_eq!(future.result(), Some(Outcome::Success));
}

#[test]
fn cancellation_persists_and_later_tiers_still_run() {
    let manager = manager();
    let later = Arc::new(AtomicUsize::new(0));
    let later_hits = Arc::clone(&later);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Low, |e: &TableDropped| {
                    if e.table == "teams" {
                        e.cancel.set_cancelled(true);
                    }
                    Ok(())
                })
                .handler(Priority::Highest, move |_: &TableDropped| {
                    later_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    let event = future.get().unwrap();
    assert!(event.is_cancelled());
    assert!(future.is_cancelled());
    assert_eq!(later.load(Ordering::SeqCst), 1);
    assert_eq!(future.result(), Some(Outcome::Cancelled));

    let other = manager.fire_event(TableDropped::new("users")).unwrap();
    assert_eq!(other.outcome().unwrap(), Outcome::Success);
}

#[test]
fn failing_handler_is_rolled_back_and_attributed() {
    let manager = manager();
    let failing = manager
        .register_events(
            ListenerBindings::builder()
                .name("veto-then-fail")
                .handler(Priority::Normal, |e: &TableDropped| {
                    e.cancel.set_cancelled(true);
                    Err("storage unavailable".into())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    let event = future.get().unwrap();
    assert!(!event.is_cancelled());
    assert!(future.has_error());

    let errors = future.exceptions();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].listener.id, failing);
    assert_eq!(errors[0].listener.name.as_deref(), Some("veto-then-fail"));
    assert_eq!(&errors[0].event_id, event.id());
    assert_eq!(errors[0].phase, InvocationPhase::Handler(Priority::Normal));
    assert!(matches!(errors[0].cause, FailureCause::Returned(_)));
    assert!(errors[0].to_string().contains("storage unavailable"));
    assert_eq!(future.result(), Some(Outcome::Error));
}

#[test]
fn cancelled_takes_precedence_over_error() {
    let manager = manager();
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Low, |e: &TableDropped| {
                    e.cancel.set_cancelled(true);
                    Ok(())
                })
                .handler(Priority::High, |_: &TableDropped| Err("late failure".into()))
                .build()
                .unwrap(),
        )
        .unwrap();

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    assert_eq!(future.outcome().unwrap(), Outcome::Cancelled);
    assert!(future.has_error());
}

#[test]
fn panicking_handler_does_not_stop_dispatch() {
    let manager = manager();
    let after = Arc::new(AtomicUsize::new(0));
    let after_hits = Arc::clone(&after);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Low, |_: &TableDropped| panic!("handler bug"))
                .handler(Priority::High, move |_: &TableDropped| {
                    after_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    assert_eq!(future.outcome().unwrap(), Outcome::Error);
    assert_eq!(after.load(Ordering::SeqCst), 1);

    let errors = future.exceptions();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].cause.is_panic());
    assert!(errors[0].cause.to_string().contains("handler bug"));

    let next = manager.fire_event(TableDropped::new("users")).unwrap();
    assert!(next.get_timeout(Duration::from_secs(1)).is_ok());
}

#[test]
fn tiers_run_lowest_to_highest_regardless_of_registration_order() {
    let manager = manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    for priority in [Priority::Highest, Priority::Normal, Priority::Lowest] {
        let log = Arc::clone(&log);
        manager
            .register_events(
                ListenerBindings::builder()
                    .handler(priority, move |_: &TableDropped| {
                        log.lock().unwrap().push(priority);
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    future.get().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![Priority::Lowest, Priority::Normal, Priority::Highest]
    );
}

#[test]
fn handlers_only_see_their_event_type() {
    let manager = manager();
    let typed = Arc::new(AtomicUsize::new(0));
    let wildcard = Arc::new(AtomicUsize::new(0));
    let typed_hits = Arc::clone(&typed);
    let wildcard_hits = Arc::clone(&wildcard);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Normal, move |_: &Heartbeat| {
                    typed_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .handler_any(Priority::Normal, move |_: EventView<'_>| {
                    wildcard_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    manager.fire_event(TableDropped::new("teams")).unwrap().get().unwrap();
    manager.fire_event(Heartbeat { id: EventId::new() }).unwrap().get().unwrap();

    assert_eq!(typed.load(Ordering::SeqCst), 1);
    assert_eq!(wildcard.load(Ordering::SeqCst), 2);
}

#[derive(Debug)]
struct TableRenamed {
    id: EventId,
    from: String,
    cancel: CancelFlag,
}

impl Event for TableRenamed {
    fn id(&self) -> &EventId {
        &self.id
    }

    fn cancellation(&self) -> Option<&dyn Cancellable> {
        Some(&self.cancel)
    }
}

#[test]
fn one_handler_covers_an_event_family() {
    let manager = manager();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler_matching(
                    Priority::High,
                    EventFilter::of::<TableDropped>().or::<TableRenamed>(),
                    move |event| {
                        let table = if let Some(dropped) = event.downcast_ref::<TableDropped>() {
                            dropped.table.clone()
                        } else if let Some(renamed) = event.downcast_ref::<TableRenamed>() {
                            renamed.from.clone()
                        } else {
                            return Err(format!("unexpected {}", event.type_name()).into());
                        };
                        if let Some(flag) = event.cancellation() {
                            flag.set_cancelled(table == "teams");
                        }
                        log.lock().unwrap().push(table);
                        Ok(())
                    },
                )
                .build()
                .unwrap(),
        )
        .unwrap();

    let dropped = manager.fire_event(TableDropped::new("teams")).unwrap();
    let renamed = manager
        .fire_event(TableRenamed {
            id: EventId::new(),
            from: "users".to_string(),
            cancel: CancelFlag::default(),
        })
        .unwrap();
    let heartbeat = manager.fire_event(Heartbeat { id: EventId::new() }).unwrap();

    assert_eq!(dropped.outcome().unwrap(), Outcome::Cancelled);
    assert_eq!(renamed.outcome().unwrap(), Outcome::Success);
    assert_eq!(heartbeat.outcome().unwrap(), Outcome::Success);
    let mut tables = seen.lock().unwrap().clone();
    tables.sort();
    assert_eq!(tables, vec!["teams".to_string(), "users".to_string()]);
}

#[test]
fn fire_never_fails_under_a_burst_with_default_queue() {
    let manager = DispatchManager::new(DispatchConfig {
        max_dispatch_workers: Some(2),
        ..DispatchConfig::default()
    })
    .unwrap();
    let (release_tx, release_rx) = bounded::<()>(0);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Normal, move |_: &TableDropped| {
                    let _ = release_rx.recv();
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let fired: Vec<_> = (0..1100).map(|_| manager.fire_event(TableDropped::new("bulk"))).collect();
    let rejected = fired.iter().filter(|f| f.is_err()).count();
    assert_eq!(rejected, 0);

    drop(release_tx);
    for future in fired {
        assert_eq!(future.unwrap().outcome().unwrap(), Outcome::Success);
    }
}

#[derive(Debug)]
struct ColumnAdded {
    id: EventId,
}

impl Event for ColumnAdded {
    fn id(&self) -> &EventId {
        &self.id
    }
}

#[test]
fn cascading_events_complete_with_default_workers() {
    let manager = Arc::new(manager());
    let weak = Arc::downgrade(&manager);
    let timeouts = Arc::new(AtomicUsize::new(0));
    let inner_timeouts = Arc::clone(&timeouts);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Normal, move |_: &TableDropped| {
                    let Some(manager) = weak.upgrade() else {
                        return Ok(());
                    };
                    let cascade = manager.fire_event(ColumnAdded { id: EventId::new() })?;
                    if cascade.get_timeout(Duration::from_secs(5)).is_err() {
                        inner_timeouts.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let outer: Vec<_> = (0..8)
        .map(|i| manager.fire_event(TableDropped::new(&format!("t{i}"))).unwrap())
        .collect();
    for future in &outer {
        assert_eq!(future.outcome().unwrap(), Outcome::Success);
    }
    assert_eq!(timeouts.load(Ordering::SeqCst), 0);
}

#[test]
fn top_level_cancel_forces_cancelled_result() {
    let manager = manager();
    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    assert!(future.cancel_with(true));
    assert!(future.is_cancelled());

    let event = future.get().unwrap();
    assert!(event.is_cancelled());
    assert_eq!(future.result(), Some(Outcome::Cancelled));
}

#[test]
fn top_level_cancel_on_plain_event_reports_cancelled() {
    let manager = manager();
    let future = manager.fire_event(Heartbeat { id: EventId::new() }).unwrap();
    future.cancel();

    let event = future.get().unwrap();
    assert!(!event.is_cancelled());
    assert!(future.is_cancelled());
    assert_eq!(future.result(), Some(Outcome::Cancelled));
}

#[test]
fn get_timeout_expires_without_stopping_dispatch() {
    let manager = manager();
    let (release_tx, release_rx) = bounded::<()>(0);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Normal, move |_: &TableDropped| {
                    let _ = release_rx.recv();
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    let err = future.get_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(err.is_timeout());
    assert!(err.is_retryable());
    assert!(!future.is_done());
    assert!(!future.is_cancelled());
    assert_eq!(future.result(), None);

    drop(release_tx);
    future.get_timeout(Duration::from_secs(5)).unwrap();
    assert!(future.is_done());
    assert_eq!(future.result(), Some(Outcome::Success));
}

#[test]
fn registration_after_fire_does_not_affect_in_flight_dispatch() {
    let manager = manager();
    let (release_tx, release_rx) = bounded::<()>(0);
    let late = Arc::new(AtomicUsize::new(0));
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Lowest, move |_: &TableDropped| {
                    let _ = release_rx.recv();
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();

    let late_hits = Arc::clone(&late);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Highest, move |_: &TableDropped| {
                    late_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    drop(release_tx);
    future.get().unwrap();
    assert_eq!(late.load(Ordering::SeqCst), 0);
}

#[test]
fn ignore_cancelled_handlers_skip_vetoed_events() {
    let manager = manager();
    let audited = Arc::new(AtomicUsize::new(0));
    let audited_hits = Arc::clone(&audited);
    manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Lowest, |e: &TableDropped| {
                    e.cancel.set_cancelled(e.table == "teams");
                    Ok(())
                })
                .handler_ignoring_cancelled(Priority::Normal, move |_: &TableDropped| {
                    audited_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    manager.fire_event(TableDropped::new("teams")).unwrap().get().unwrap();
    manager.fire_event(TableDropped::new("users")).unwrap().get().unwrap();
    assert_eq!(audited.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistered_listener_receives_nothing() {
    let manager = manager();
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = Arc::clone(&hits);
    let monitor_hits = Arc::clone(&hits);
    let id = manager
        .register_events(
            ListenerBindings::builder()
                .handler(Priority::Normal, move |_: &TableDropped| {
                    handler_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .monitor(move |_: &TableDropped, _| {
                    monitor_hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    assert!(manager.unregister_listener(id));
    assert!(!manager.unregister_listener(id));

    let future = manager.fire_event(TableDropped::new("teams")).unwrap();
    let (outcome, monitors) = future.complete().unwrap();
    monitors.get().unwrap();
    assert_eq!(outcome, Outcome::Success);
    assert!(monitors.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn monitor_priority_is_rejected_for_handlers() {
    let err = ListenerBindings::builder()
        .handler(Priority::Monitor, |_: &TableDropped| Ok(()))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::MonitorPriorityForHandler {
            priority: Priority::Monitor
        }
    ));
}

struct DropGuard {
    protected: Vec<String>,
}

impl Listener for DropGuard {
    fn bindings(self: Arc<Self>) -> Result<ListenerBindings, ValidationError> {
        ListenerBindings::builder()
            .name("drop-guard")
            .handler(Priority::High, move |e: &TableDropped| {
                if self.protected.contains(&e.table) {
                    e.cancel.set_cancelled(true);
                }
                Ok(())
            })
            .build()
    }
}

#[test]
fn listener_trait_registers_bindings() {
    let manager = manager();
    manager
        .register_listener(Arc::new(DropGuard {
            protected: vec!["teams".to_string()],
        }))
        .unwrap();

    let vetoed = manager.fire_event(TableDropped::new("teams")).unwrap();
    let allowed = manager.fire_event(TableDropped::new("scratch")).unwrap();
    assert_eq!(vetoed.outcome().unwrap(), Outcome::Cancelled);
    assert_eq!(allowed.outcome().unwrap(), Outcome::Success);
}

#[test]
fn concurrent_events_each_reach_every_handler() {
    let manager = Arc::new(manager());
    for priority in Priority::HANDLER_TIERS {
        manager
            .register_events(
                ListenerBindings::builder()
                    .handler(priority, |e: &TableDropped| {
                        e.touched.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }

    let futures: Vec<_> = thread::scope(|scope| {
        let firers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                scope.spawn(move || {
                    (0..25)
                        .map(|i| manager.fire_event(TableDropped::new(&format!("t{i}"))).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        firers.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(futures.len(), 100);
    for future in &futures {
        let event = future.get_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(event.touched.load(Ordering::SeqCst), 5);
        assert_eq!(future.result(), Some(Outcome::Success));
    }
}

//! Hot Reload Tests
//!
//! These tests run the background watcher against real files and real time,
//! so they use the multi-threaded runtime and generous timeouts.

use integration_tests::ConfigFixture;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_config::{ChangeKind, ConfigurationEngine, EngineOptions};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{sleep, timeout};

const RELOAD_TIMEOUT: Duration = Duration::from_secs(10);

fn watched_options(fixture: &ConfigFixture, debounce_ms: u64) -> EngineOptions {
    let mut options = fixture.options().with_auto_reload(true).with_debounce_ms(debounce_ms);
    options.reload_interval_secs = 0.5;
    options
}

/// An external edit is picked up and published once
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_external_edit_reloads() {
    let fixture = ConfigFixture::new().with_standard_documents();
    let engine = ConfigurationEngine::initialize(watched_options(&fixture, 100)).unwrap();
    assert!(engine.is_auto_reload_enabled());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine
        .register_change_callback("", move |event| {
            sink.lock().unwrap().push(event.kind);
            Ok(())
        })
        .unwrap();
    let mut reloads = engine.subscribe_reloads();

    fixture.write_user(json!({"version": "1.0", "display": {"width": 1920}}));

    let notice = timeout(RELOAD_TIMEOUT, reloads.recv())
        .await
        .expect("reload within timeout")
        .unwrap();
    assert_eq!(notice.sequence, 1);
    assert_eq!(engine.get_i64("display.width"), Some(1920));
    assert_eq!(*events.lock().unwrap(), vec![ChangeKind::Reload]);

    engine.shutdown().await;
}

/// A burst of writes settles into a single reload of the final content
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_is_debounced() {
    let fixture = ConfigFixture::new().with_standard_documents();
    let engine = ConfigurationEngine::initialize(watched_options(&fixture, 1500)).unwrap();
    let mut reloads = engine.subscribe_reloads();

    for width in [1000, 1100, 1200, 1300, 1400] {
        fixture.write_user(json!({"version": "1.0", "display": {"width": width}}));
        sleep(Duration::from_millis(100)).await;
    }

    timeout(RELOAD_TIMEOUT, reloads.recv())
        .await
        .expect("reload within timeout")
        .unwrap();
    assert_eq!(engine.get_i64("display.width"), Some(1400));

    // nothing else is pending
    sleep(Duration::from_secs(2)).await;
    assert!(matches!(reloads.try_recv(), Err(TryRecvError::Empty)));

    engine.shutdown().await;
}

/// Writes made through the engine are not reloaded as external edits
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_own_writes_are_ignored() {
    let fixture = ConfigFixture::new().with_standard_documents();
    let engine = ConfigurationEngine::initialize(watched_options(&fixture, 100)).unwrap();
    let mut reloads = engine.subscribe_reloads();

    engine
        .set("display.width", json!(1280), Default::default())
        .unwrap();
    sleep(Duration::from_secs(2)).await;

    assert!(matches!(reloads.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(engine.get_i64("display.width"), Some(1280));

    engine.shutdown().await;
}

/// Disabling hot reload stops the watcher before returning
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_stops_reloads() {
    let fixture = ConfigFixture::new().with_standard_documents();
    let engine = ConfigurationEngine::initialize(watched_options(&fixture, 100)).unwrap();
    let mut reloads = engine.subscribe_reloads();

    engine.set_auto_reload(false, None).await.unwrap();
    assert!(!engine.is_auto_reload_enabled());

    fixture.write_user(json!({"version": "1.0", "display": {"width": 2560}}));
    sleep(Duration::from_secs(2)).await;

    assert!(matches!(reloads.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(engine.get_i64("display.width"), Some(800));

    // re-enabling picks the edit up
    engine
        .set_auto_reload(true, Some(Duration::from_millis(500)))
        .await
        .unwrap();
    timeout(RELOAD_TIMEOUT, reloads.recv())
        .await
        .expect("reload within timeout")
        .unwrap();
    assert_eq!(engine.get_i64("display.width"), Some(2560));

    engine.shutdown().await;
}

/// Dropping every handle ends the watcher without a shutdown call
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_ends_watcher() {
    let fixture = ConfigFixture::new().with_standard_documents();
    let engine = ConfigurationEngine::initialize(watched_options(&fixture, 100)).unwrap();
    let mut reloads = engine.subscribe_reloads();
    drop(engine);

    fixture.write_user(json!({"version": "1.0", "display": {"width": 1024}}));
    let result = timeout(Duration::from_secs(2), reloads.recv()).await;
    assert!(matches!(result, Ok(Err(_))), "sender closed with the engine");
}

/// Reloads run off the runtime's worker, so a slow subscriber on a
/// single-threaded runtime does not stall other tasks
#[tokio::test]
async fn test_reload_does_not_block_the_runtime() {
    let fixture = ConfigFixture::new().with_standard_documents();
    let engine = ConfigurationEngine::initialize(watched_options(&fixture, 100)).unwrap();

    let (entered_tx, mut entered_rx) = tokio::sync::mpsc::unbounded_channel();
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    engine
        .register_change_callback("", move |event| {
            if event.kind == ChangeKind::Reload {
                let _ = entered_tx.send(());
                let released = release_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .is_ok();
                let _ = done_tx.send(released);
            }
            Ok(())
        })
        .unwrap();

    fixture.write_user(json!({"version": "1.0", "display": {"width": 1280}}));

    timeout(RELOAD_TIMEOUT, entered_rx.recv())
        .await
        .expect("reload within timeout")
        .unwrap();
    release_tx.send(()).unwrap();

    let released = timeout(RELOAD_TIMEOUT, done_rx.recv())
        .await
        .expect("callback finishes")
        .unwrap();
    assert!(released, "the callback blocked the only runtime thread");
    assert_eq!(engine.get_i64("display.width"), Some(1280));

    engine.shutdown().await;
}

//! Background hot-reload watcher.
//!
//! A spawned task polls the user file's modification stamp on an interval
//! governed by [`ResourceAdaptiveScheduler`]. A detected change is passed to
//! a [`Debouncer`], whose own timer task hands the reload to the blocking
//! pool once writes have gone quiet. Both tasks hold only weak references
//! to the engine.

use super::{ConfigurationEngine, EngineInner};
use crate::debounce::Debouncer;
use crate::scheduler::ResourceAdaptiveScheduler;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long stopping waits for the poll task before aborting it.
pub(crate) const STOP_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) struct WatcherHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
    debouncer: Arc<Debouncer>,
}

impl WatcherHandle {
    /// Signals the poll task, waits for it, and cancels any pending reload.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        self.debouncer.cancel();

        let mut task = self.task;
        if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
            warn!("Hot-reload watcher did not stop in time, aborting");
            task.abort();
        }

        // A poll may have scheduled a reload between the signal and the task exiting.
        self.debouncer.cancel();
        info!("Hot-reload watcher stopped");
    }

    /// Signals shutdown without waiting.
    pub(crate) fn signal(&self) {
        let _ = self.shutdown_tx.send(());
        self.debouncer.cancel();
    }
}

pub(crate) fn spawn_watcher(
    inner: &Arc<EngineInner>,
    handle: Handle,
    interval: Duration,
) -> WatcherHandle {
    let options = &inner.options;
    info!(
        path = %options.config_path.display(),
        interval_ms = interval.as_millis() as u64,
        "Starting hot-reload watcher"
    );

    let reload_target: Weak<EngineInner> = Arc::downgrade(inner);
    let reload_handle = handle.clone();
    let debouncer = Arc::new(Debouncer::with_handle(
        handle.clone(),
        options.debounce(),
        move || {
            // Reloading reads files and takes blocking locks.
            let target = reload_target.clone();
            reload_handle.spawn_blocking(move || {
                let Some(inner) = target.upgrade() else {
                    return;
                };
                let engine = ConfigurationEngine { inner };
                if let Err(e) = engine.reload() {
                    warn!(error = %e, "Hot reload failed");
                }
            });
        },
    ));

    let mut scheduler = ResourceAdaptiveScheduler::with_proc_stat(
        interval,
        options.max_cpu_percent,
        options.cpu_check_interval(),
    );

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let weak = Arc::downgrade(inner);
    let trigger = Arc::clone(&debouncer);

    let task = handle.spawn(async move {
        let mut delay = scheduler.interval();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if inner.poll_modified() {
                        debug!(path = %inner.options.config_path.display(), "User configuration changed on disk");
                        trigger.call();
                    }
                    drop(inner);
                    delay = scheduler.adjust();
                }
            }
        }
    });

    WatcherHandle {
        shutdown_tx,
        task,
        debouncer,
    }
}

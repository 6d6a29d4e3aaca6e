//! Supervised runner for named long-lived workers.
//!
//! The pool uses a runner to keep the transaction-log tailer alive: a
//! worker that fails with a non-fatal error is restarted after a fixed
//! delay; a worker that fails with the distinguished fatal error stops the
//! runner. The restart delay sleeps through an injected [`Clock`] so tests
//! advance time instead of waiting on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Produces a fresh worker future for each (re)start.
pub type WorkerFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Classifies worker errors; `true` stops the runner instead of restarting.
pub type FatalPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Construction parameters for [`Runner`].
pub struct RunnerParams {
    pub is_fatal: FatalPredicate,
    pub restart_delay: Duration,
    pub clock: Arc<dyn Clock>,
}

struct Shared {
    is_fatal: FatalPredicate,
    restart_delay: Duration,
    clock: Arc<dyn Clock>,
    shutdown_tx: watch::Sender<bool>,
    fatal: Mutex<Option<Error>>,
}

/// Keeps named workers running until stopped or fatally failed.
pub struct Runner {
    shared: Arc<Shared>,
    shutdown_rx: watch::Receiver<bool>,
    supervisors: Mutex<HashMap<&'static str, tokio::task::JoinHandle<()>>>,
}

impl Runner {
    pub fn new(params: RunnerParams) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                is_fatal: params.is_fatal,
                restart_delay: params.restart_delay,
                clock: params.clock,
                shutdown_tx,
                fatal: Mutex::new(None),
            }),
            shutdown_rx,
            supervisors: Mutex::new(HashMap::new()),
        }
    }

    /// Register and immediately start a named worker.
    ///
    /// At most one instance of each name runs at a time; starting a name
    /// that is still running is a logged no-op.
    pub fn start_worker(&self, name: &'static str, factory: WorkerFactory) {
        if *self.shutdown_rx.borrow() {
            warn!(worker = name, "Runner already stopped, not starting worker");
            return;
        }

        let mut supervisors = self.supervisors.lock();
        if let Some(existing) = supervisors.get(name) {
            if !existing.is_finished() {
                warn!(worker = name, "Worker already running, ignoring start");
                return;
            }
        }

        let shared = self.shared.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let work = (factory)();
                let outcome = tokio::select! {
                    res = work => res,
                    _ = shutdown.changed() => break,
                };
                match outcome {
                    Ok(()) => {
                        debug!(worker = name, "Worker completed");
                        break;
                    }
                    Err(e) if (shared.is_fatal)(&e) => {
                        error!(worker = name, error = %e, "Worker failed fatally, stopping runner");
                        shared.fatal.lock().get_or_insert(e);
                        let _ = shared.shutdown_tx.send(true);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            worker = name,
                            error = %e,
                            delay_ms = shared.restart_delay.as_millis() as u64,
                            "Worker failed, restarting after delay"
                        );
                        tokio::select! {
                            _ = shared.clock.sleep(shared.restart_delay) => {}
                            _ = shutdown.changed() => break,
                        }
                    }
                }
            }
        });
        supervisors.insert(name, handle);
    }

    /// Request every worker to exit and wait for them.
    ///
    /// Returns the fatal error if a worker stopped the runner, `Ok(())`
    /// otherwise. Safe to call more than once.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shared.shutdown_tx.send(true);
        let handles: Vec<_> = {
            let mut supervisors = self.supervisors.lock();
            supervisors.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        match self.shared.fatal.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether the runner has been told to stop (by [`stop`](Self::stop)
    /// or by a fatal worker error).
    pub fn is_stopping(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

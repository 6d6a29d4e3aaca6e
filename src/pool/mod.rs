//! Multi-tenant state pool.
//!
//! A process-wide cache of per-tenant [`TenantState`] handles backed by a
//! shared document database. The pool:
//!
//! - hands out reference-counted handles ([`acquire`](StatePool::acquire)),
//!   opening one lazily on first use;
//! - multiplexes a single transaction-log tailer across all handles
//!   through the [`EventHub`], supervised by a [`Runner`] that restarts it
//!   on non-fatal failure;
//! - retires tenants safely while concurrent users still hold handles:
//!   [`retire`](StatePool::retire) marks the entry and the last
//!   [`Releaser::release`] closes it;
//! - reports leaked references with the acquire-time backtrace of every
//!   outstanding holder ([`introspection_report`](StatePool::introspection_report)).
//!
//! The pool has a single lifecycle per process: construct once, pass it
//! explicitly to consumers, close once at shutdown.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::pool::PoolConfig;
use crate::domain::{ChangeRecord, TenantId, TenantRecord};
use crate::error::{Error, Result};
use crate::handle::TenantState;
use crate::hub::EventHub;
use crate::runner::{Runner, RunnerParams, WorkerFactory};
use crate::session::DatabaseSession;
use crate::tailer::{tail_txn_log, TailerContext};

mod entry;

pub use entry::Releaser;
use entry::PoolEntry;


/// Name of the supervised tailer worker.
const TXN_TAILER_WORKER: &str = "txn-log-tailer";

/// Opens a fresh tenant handle. Injected so tests can substitute fakes
/// for the session-backed default.
pub type HandleFactory = Arc<dyn Fn(&TenantId) -> Result<Arc<TenantState>> + Send + Sync>;

/// Optional collaborators for [`StatePool::new_with`].
pub struct PoolOptions {
    /// Replaces the default session-copying handle factory.
    pub handle_factory: Option<HandleFactory>,
    /// Clock driving the supervisor's restart delay and the tailer's
    /// poll interval.
    pub clock: Arc<dyn Clock>,
    /// When false, no tailer or supervisor is started. Handles still
    /// subscribe to the hub, but nothing feeds it; only suitable for
    /// exercising pool bookkeeping in isolation.
    pub start_tailer: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            handle_factory: None,
            clock: Arc::new(SystemClock),
            start_tailer: true,
        }
    }
}

struct PoolMap {
    entries: HashMap<TenantId, PoolEntry>,
    /// Source of reference keys; strictly increasing, never reused.
    source_key: u64,
    closed: bool,
}

pub(crate) struct PoolCore {
    controller_id: TenantId,
    controller: Arc<TenantState>,
    hub: Arc<EventHub<ChangeRecord>>,
    factory: HandleFactory,
    runner: Option<Runner>,
    map: Mutex<PoolMap>,
}

/// Cache of per-tenant state handles. Cheap to clone; all clones share
/// the same pool.
#[derive(Clone)]
pub struct StatePool {
    core: Arc<PoolCore>,
}

impl StatePool {
    /// Create a pool around the controller tenant's session.
    ///
    /// Opens the controller handle, wires the event hub, and starts the
    /// supervised transaction-log tailer. Must be called from within a
    /// tokio runtime.
    pub fn new(
        controller_id: TenantId,
        session: Box<dyn DatabaseSession>,
        config: &PoolConfig,
    ) -> Result<Self> {
        Self::new_with(controller_id, session, config, PoolOptions::default())
    }

    /// Create a pool without the tailer. Handles receive no change
    /// records; pool bookkeeping works normally.
    pub fn new_untailed(
        controller_id: TenantId,
        session: Box<dyn DatabaseSession>,
        config: &PoolConfig,
    ) -> Result<Self> {
        warn!("Creating pool with no txn tailer; change streams will be silent");
        Self::new_with(
            controller_id,
            session,
            config,
            PoolOptions {
                start_tailer: false,
                ..Default::default()
            },
        )
    }

    /// Create a pool with explicit collaborators.
    pub fn new_with(
        controller_id: TenantId,
        session: Box<dyn DatabaseSession>,
        config: &PoolConfig,
        options: PoolOptions,
    ) -> Result<Self> {
        config.validate()?;

        let hub = Arc::new(EventHub::new(config.subscription_queue_capacity));
        let txn_log = session.txn_log();
        let controller = TenantState::open(controller_id.clone(), session, hub.clone())?;

        // Default factory: every tenant handle runs on its own copy of
        // the controller's session.
        let factory = options.handle_factory.unwrap_or_else(|| {
            let hub = hub.clone();
            let controller = controller.clone();
            Arc::new(move |tenant: &TenantId| {
                TenantState::open(tenant.clone(), controller.session().copy(), hub.clone())
            }) as HandleFactory
        });

        let runner = options.start_tailer.then(|| {
            let runner = Runner::new(RunnerParams {
                is_fatal: Arc::new(Error::is_pool_closed),
                restart_delay: config.restart_delay(),
                clock: options.clock.clone(),
            });
            let ctx = TailerContext {
                log: txn_log,
                hub: hub.clone(),
                clock: options.clock.clone(),
                cursor: Arc::new(std::sync::atomic::AtomicU64::new(0)),
                poll_interval: config.poll_interval(),
            };
            let worker: WorkerFactory = Arc::new(move || Box::pin(tail_txn_log(ctx.clone())));
            runner.start_worker(TXN_TAILER_WORKER, worker);
            runner
        });

        Ok(Self {
            core: Arc::new(PoolCore {
                controller_id,
                controller,
                hub,
                factory,
                runner,
                map: Mutex::new(PoolMap {
                    entries: HashMap::new(),
                    source_key: 0,
                    closed: false,
                }),
            }),
        })
    }

    /// Get a handle for `tenant`, opening one if required.
    ///
    /// The returned [`Releaser`] must be called exactly once when the
    /// caller is done with the handle. Acquiring the controller tenant
    /// returns the shared controller handle with an inert releaser and
    /// no refcounting.
    ///
    /// # Errors
    ///
    /// [`Error::PoolClosed`] after [`close`](Self::close);
    /// [`Error::TenantRetired`] if the tenant was marked for removal;
    /// [`Error::HandleConstruction`] if opening a fresh handle failed.
    pub fn acquire(&self, tenant: &TenantId) -> Result<(Arc<TenantState>, Releaser)> {
        if *tenant == self.core.controller_id {
            return Ok((
                self.core.controller.clone(),
                Releaser::inert(tenant.clone()),
            ));
        }

        let mut map = self.core.map.lock();
        if map.closed {
            return Err(Error::PoolClosed);
        }

        let PoolMap {
            entries,
            source_key,
            ..
        } = &mut *map;

        if let Some(item) = entries.get_mut(tenant) {
            if item.marked_for_removal {
                // A retired tenant's refcount may never grow again.
                return Err(Error::TenantRetired {
                    tenant: tenant.clone(),
                });
            }
            *source_key += 1;
            let key = *source_key;
            item.references.insert(key, capture_source());
            let releaser = Releaser::live(Arc::downgrade(&self.core), tenant.clone(), key);
            return Ok((item.handle.clone(), releaser));
        }

        // Cold acquire: the handle is opened while holding the pool
        // mutex, serializing cold acquires across tenants but keeping
        // the map free of half-open entries.
        let handle = (self.core.factory)(tenant).map_err(|e| Error::HandleConstruction {
            tenant: tenant.clone(),
            source: Box::new(e),
        })?;
        *source_key += 1;
        let key = *source_key;
        let mut item = PoolEntry::new(handle.clone());
        item.references.insert(key, capture_source());
        entries.insert(tenant.clone(), item);

        debug!(tenant = %tenant, "Opened state for tenant");
        let releaser = Releaser::live(Arc::downgrade(&self.core), tenant.clone(), key);
        Ok((handle, releaser))
    }

    /// Convenience: acquire the tenant's handle and fetch its top-level
    /// record. On fetch failure the acquired reference is released before
    /// the error propagates, so no refcount leaks.
    pub async fn tenant_view(
        &self,
        tenant: &TenantId,
    ) -> Result<(TenantRecord, Arc<TenantState>, Releaser)> {
        let (handle, releaser) = self.acquire(tenant)?;
        match handle.tenant_record().await {
            Ok(record) => Ok((record, handle, releaser)),
            Err(e) => {
                releaser.release();
                Err(e)
            }
        }
    }

    /// Take the tenant out of the pool and close it, or mark it for
    /// removal if references are still outstanding. Returns whether the
    /// tenant was removed by this call. Unknown tenants and the
    /// controller are tolerated and report `false`.
    pub fn retire(&self, tenant: &TenantId) -> bool {
        if *tenant == self.core.controller_id {
            // The controller is not managed by the pool.
            return false;
        }

        let mut map = self.core.map.lock();
        let Some(item) = map.entries.get_mut(tenant) else {
            // Double-retires and never-seen tenants are fine.
            return false;
        };
        item.marked_for_removal = true;
        maybe_remove_locked(&mut map.entries, tenant)
    }

    /// The shared controller handle. Not refcounted.
    pub fn controller(&self) -> Arc<TenantState> {
        self.core.controller.clone()
    }

    /// Close every handle in the pool and stop the tailer.
    ///
    /// Entries still referenced (or already marked for removal) are
    /// warned about as leaks, with their holders' acquire backtraces
    /// available via [`introspection_report`](Self::introspection_report)
    /// until this call. A second close is a no-op returning `Ok(())`.
    ///
    /// # Errors
    ///
    /// [`Error::CloseAggregate`] wrapping the last handle close failure,
    /// if any; the shutdown sequence always completes.
    pub async fn close(&self) -> Result<()> {
        let mut last_err = {
            let mut map = self.core.map.lock();
            if map.closed {
                return Ok(());
            }
            map.closed = true;

            let mut last_err = None;
            for (tenant, item) in map.entries.drain() {
                if item.ref_count() != 0 || item.marked_for_removal {
                    warn!(
                        tenant = %tenant,
                        references = item.ref_count(),
                        marked_for_removal = item.marked_for_removal,
                        "State for tenant leaked from pool"
                    );
                }
                if let Err(e) = item.handle.close() {
                    last_err = Some(e);
                }
            }
            last_err
        };

        if let Some(runner) = &self.core.runner {
            if let Err(e) = runner.stop().await {
                debug!(error = %e, "Tailer runner stopped with error");
            }
        }
        if let Err(e) = self.core.controller.close() {
            last_err = Some(e);
        }
        self.core.hub.close();

        match last_err {
            Some(e) => Err(Error::CloseAggregate {
                source: Box::new(e),
            }),
            None => Ok(()),
        }
    }

    /// Number of tenants currently in the pool.
    pub fn tenant_count(&self) -> usize {
        self.core.map.lock().entries.len()
    }

    /// Number of pooled tenants marked for removal.
    pub fn marked_count(&self) -> usize {
        self.core
            .map
            .lock()
            .entries
            .values()
            .filter(|item| item.marked_for_removal)
            .count()
    }

    /// Human-readable report of every pooled tenant: removal flag,
    /// refcount, and the acquire-time source of each outstanding
    /// reference, indexed from 1. Intended for a debug endpoint.
    pub fn introspection_report(&self) -> String {
        let map = self.core.map.lock();

        let mut marked = 0;
        let mut body = String::new();
        let mut tenants: Vec<_> = map.entries.iter().collect();
        tenants.sort_by(|a, b| a.0.cmp(b.0));

        for (tenant, item) in tenants {
            if item.marked_for_removal {
                marked += 1;
            }
            let _ = writeln!(body, "\nTenant: {tenant}");
            let _ = writeln!(body, "  Marked for removal: {}", item.marked_for_removal);
            let _ = writeln!(body, "  Reference count: {}", item.ref_count());
            let mut references: Vec<_> = item.references.iter().collect();
            references.sort_by_key(|(key, _)| **key);
            for (index, (_, source)) in references.into_iter().enumerate() {
                let _ = writeln!(body, "    [{}]\n{source}", index + 1);
            }
        }

        format!(
            "Tenant count: {} tenants\nMarked for removal: {} tenants\n\n{body}",
            map.entries.len(),
            marked,
        )
    }
}

impl PoolCore {
    /// Releaser bookkeeping: drop the (tenant, key) reference and remove
    /// the entry if it was retired and this was the last reference.
    /// Invalid releases are programmer errors: logged, reported as
    /// "did not remove".
    pub(crate) fn release(&self, tenant: &TenantId, key: u64) -> bool {
        let mut map = self.map.lock();
        let Some(item) = map.entries.get_mut(tenant) else {
            error!(tenant = %tenant, "Releasing state for tenant unknown to the pool");
            return false;
        };
        if item.ref_count() == 0 {
            error!(tenant = %tenant, "Pool refcount for tenant is already 0");
            return false;
        }
        if item.references.remove(&key).is_none() {
            error!(tenant = %tenant, key, "Releasing unknown reference key");
            return false;
        }
        maybe_remove_locked(&mut map.entries, tenant)
    }
}

/// Remove and close the entry if it is marked and unreferenced. Close
/// errors are logged; removal still happens.
fn maybe_remove_locked(entries: &mut HashMap<TenantId, PoolEntry>, tenant: &TenantId) -> bool {
    let done = entries
        .get(tenant)
        .map(|item| item.marked_for_removal && item.ref_count() == 0)
        .unwrap_or(false);
    if !done {
        return false;
    }
    if let Some(item) = entries.remove(tenant) {
        if let Err(e) = item.handle.close() {
            error!(tenant = %tenant, error = %e, "Closing retired tenant state");
        }
        return true;
    }
    false
}

/// Diagnostic recorded per reference: the acquiring call site.
/// Symbolication is deferred to report rendering.
fn capture_source() -> Backtrace {
    Backtrace::force_capture()
}

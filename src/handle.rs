//! Per-tenant state handle.
//!
//! A [`TenantState`] bundles a database session with a live subscription
//! to the tenant's slice of the change stream. Incoming change records are
//! routed by collection to registered watchers.
//!
//! The hub subscription handler captures only the internal router, never
//! the handle itself; `close()` unsubscribes before tearing anything else
//! down, so the handle/hub reference cycle cannot keep either side alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{ChangeRecord, TenantId, TenantRecord, TopicFilter};
use crate::error::{Error, Result};
use crate::hub::{EventHub, SubscriptionToken};
use crate::session::DatabaseSession;

/// Routes change records to per-collection watchers.
struct ChangeRouter {
    watchers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ChangeRecord>>>>,
}

impl ChangeRouter {
    fn new() -> Self {
        Self {
            watchers: Mutex::new(HashMap::new()),
        }
    }

    fn route(&self, record: ChangeRecord) {
        let mut watchers = self.watchers.lock();
        if let Some(senders) = watchers.get_mut(&record.collection) {
            senders.retain(|tx| tx.send(record.clone()).is_ok());
            if senders.is_empty() {
                watchers.remove(&record.collection);
            }
        }
    }

    fn register(&self, collection: &str) -> mpsc::UnboundedReceiver<ChangeRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn shutdown(&self) {
        self.watchers.lock().clear();
    }
}

/// A live per-tenant facade over the database.
///
/// Obtained from the pool; callers must hand it back through the releaser
/// that accompanied it. The pool closes the handle when the tenant is
/// retired and the last reference is released.
pub struct TenantState {
    tenant: TenantId,
    session: Box<dyn DatabaseSession>,
    hub: Arc<EventHub<ChangeRecord>>,
    subscription: SubscriptionToken,
    router: Arc<ChangeRouter>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TenantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantState")
            .field("tenant", &self.tenant)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl TenantState {
    /// Open a handle for `tenant` over `session`, subscribed to the
    /// tenant's change stream on `hub`.
    pub fn open(
        tenant: TenantId,
        session: Box<dyn DatabaseSession>,
        hub: Arc<EventHub<ChangeRecord>>,
    ) -> Result<Arc<Self>> {
        let router = Arc::new(ChangeRouter::new());
        let handler_router = router.clone();
        let subscription = hub.subscribe(
            TopicFilter::Tenant(tenant.clone()),
            move |_, record: ChangeRecord| handler_router.route(record),
        );
        debug!(tenant = %tenant, "Opened tenant state");
        Ok(Arc::new(Self {
            tenant,
            session,
            hub,
            subscription,
            router,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant
    }

    /// The backing session; the pool's default handle factory copies the
    /// controller's session through this.
    pub(crate) fn session(&self) -> &dyn DatabaseSession {
        self.session.as_ref()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the hub subscription and the database session.
    ///
    /// Idempotent; only the first call does any work. Unsubscribes
    /// before releasing the session so no change record arrives at a
    /// half-closed handle.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.hub.unsubscribe(&self.subscription);
        self.router.shutdown();
        debug!(tenant = %self.tenant, "Closed tenant state");
        self.session.close()
    }

    /// Watch change records for one collection of this tenant.
    ///
    /// Records arrive in the order the tailer observed them. The watcher
    /// ends when the handle closes or the receiver is dropped.
    pub fn watch_collection(&self, collection: &str) -> mpsc::UnboundedReceiver<ChangeRecord> {
        self.router.register(collection)
    }

    /// Fetch this tenant's top-level record.
    pub async fn tenant_record(&self) -> Result<TenantRecord> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        self.session.tenant_record(&self.tenant).await
    }
}

//! Fake database session.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{TenantId, TenantRecord};
use crate::error::{Error, Result};
use crate::session::{DatabaseSession, TxnLog};
use crate::testkit::domain::tenant_record;
use crate::testkit::log::ScriptedLog;

struct Shared {
    log: Mutex<Arc<ScriptedLog>>,
    tenants: Mutex<HashMap<TenantId, TenantRecord>>,
    record_errors: Mutex<VecDeque<Error>>,
    fail_closes: AtomicBool,
    copies: AtomicU32,
    close_counts: Mutex<Vec<Arc<AtomicU32>>>,
}

/// A [`DatabaseSession`] fake.
///
/// Copies share the same backing state (log, tenant records, scripted
/// failures) but each copy counts its own closes, so tests can assert
/// that every derived session is closed exactly once. Cloning (as
/// opposed to [`copy`](DatabaseSession::copy)) yields a probe onto the
/// same session, useful for inspecting counters after the session moved
/// into a pool.
#[derive(Clone)]
pub struct FakeSession {
    shared: Arc<Shared>,
    close_count: Arc<AtomicU32>,
}

impl FakeSession {
    pub fn new() -> Self {
        let close_count = Arc::new(AtomicU32::new(0));
        Self {
            shared: Arc::new(Shared {
                log: Mutex::new(Arc::new(ScriptedLog::new())),
                tenants: Mutex::new(HashMap::new()),
                record_errors: Mutex::new(VecDeque::new()),
                fail_closes: AtomicBool::new(false),
                copies: AtomicU32::new(0),
                close_counts: Mutex::new(vec![close_count.clone()]),
            }),
            close_count,
        }
    }

    /// Use `log` as the backing transaction log.
    pub fn with_log(self, log: Arc<ScriptedLog>) -> Self {
        *self.shared.log.lock() = log;
        self
    }

    /// Seed an alive tenant record.
    pub fn with_tenant(self, id: &str, name: &str) -> Self {
        self.shared
            .tenants
            .lock()
            .insert(TenantId::from(id), tenant_record(id, name));
        self
    }

    /// Queue an error for one `tenant_record` call.
    pub fn with_record_error(self, error: Error) -> Self {
        self.shared.record_errors.lock().push_back(error);
        self
    }

    /// Make every close (of this session and all copies) fail.
    pub fn with_failing_closes(self) -> Self {
        self.shared.fail_closes.store(true, Ordering::SeqCst);
        self
    }

    /// This session's close counter.
    pub fn close_count(&self) -> Arc<AtomicU32> {
        self.close_count.clone()
    }

    /// Close counters of this session and every copy derived from it,
    /// in creation order.
    pub fn all_close_counts(&self) -> Vec<Arc<AtomicU32>> {
        self.shared.close_counts.lock().clone()
    }

    /// Number of copies derived so far.
    pub fn copy_count(&self) -> u32 {
        self.shared.copies.load(Ordering::SeqCst)
    }
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseSession for FakeSession {
    fn copy(&self) -> Box<dyn DatabaseSession> {
        self.shared.copies.fetch_add(1, Ordering::SeqCst);
        let close_count = Arc::new(AtomicU32::new(0));
        self.shared.close_counts.lock().push(close_count.clone());
        Box::new(FakeSession {
            shared: self.shared.clone(),
            close_count,
        })
    }

    fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_closes.load(Ordering::SeqCst) {
            return Err(Error::Session("scripted close failure".into()));
        }
        Ok(())
    }

    fn txn_log(&self) -> Arc<dyn TxnLog> {
        self.shared.log.lock().clone()
    }

    async fn tenant_record(&self, id: &TenantId) -> Result<TenantRecord> {
        if let Some(error) = self.shared.record_errors.lock().pop_front() {
            return Err(error);
        }
        self.shared
            .tenants
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Session(format!("tenant not found: {id}")))
    }
}

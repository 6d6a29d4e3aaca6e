//! Collaborator traits at the database seam.
//!
//! The pool never talks to a concrete driver; it consumes these traits and
//! the control plane wires in the real implementations. Tests substitute
//! the fakes from [`testkit`](crate::testkit).

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ChangeRecord, TenantId, TenantRecord};
use crate::error::Result;

/// A live session against the backing document database.
#[async_trait]
pub trait DatabaseSession: Send + Sync {
    /// Derive an independent session sharing the underlying connection
    /// pool. The copy's lifetime is decoupled from the original's.
    fn copy(&self) -> Box<dyn DatabaseSession>;

    /// Close the session. Idempotent.
    fn close(&self) -> Result<()>;

    /// The database's append-only transaction log.
    fn txn_log(&self) -> Arc<dyn TxnLog>;

    /// Fetch the tenant's top-level record.
    async fn tenant_record(&self, id: &TenantId) -> Result<TenantRecord>;
}

/// The append-only transaction log collection.
#[async_trait]
pub trait TxnLog: Send + Sync {
    /// Entries with revision strictly greater than `after`, in ascending
    /// revision order.
    ///
    /// Returns [`Error::PoolClosed`](crate::error::Error::PoolClosed) once
    /// the owning session has been shut down, which the tailer's
    /// supervisor classifies as fatal.
    async fn read_after(&self, after: u64) -> Result<Vec<ChangeRecord>>;
}

//! Pool bookkeeping types.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::error;

use crate::domain::TenantId;
use crate::handle::TenantState;

use super::PoolCore;

/// Bookkeeping record wrapping one live [`TenantState`].
///
/// The reference map is keyed by a pool-unique number; the value is the
/// backtrace captured at acquire time so leaks can be traced to their
/// call site. Capture is cheap; frames are only symbolicated when an
/// introspection report renders them.
pub(super) struct PoolEntry {
    pub(super) handle: Arc<TenantState>,
    pub(super) marked_for_removal: bool,
    pub(super) references: HashMap<u64, Backtrace>,
}

impl PoolEntry {
    pub(super) fn new(handle: Arc<TenantState>) -> Self {
        Self {
            handle,
            marked_for_removal: false,
            references: HashMap::new(),
        }
    }

    pub(super) fn ref_count(&self) -> usize {
        self.references.len()
    }
}

/// Hands a pooled reference back.
///
/// Returned by [`StatePool::acquire`](super::StatePool::acquire); bound to
/// exactly one (tenant, reference key) pair. Only the first
/// [`release`](Self::release) call touches the pool; every later call
/// reports "did not remove" without side effects.
#[derive(Debug)]
pub struct Releaser {
    pool: Weak<PoolCore>,
    tenant: TenantId,
    pub(super) key: u64,
    released: AtomicBool,
}

impl Releaser {
    pub(super) fn live(pool: Weak<PoolCore>, tenant: TenantId, key: u64) -> Self {
        Self {
            pool,
            tenant,
            key,
            released: AtomicBool::new(false),
        }
    }

    /// A releaser that was never backed by a reference. Used for the
    /// controller tenant, which is not refcounted.
    pub(super) fn inert(tenant: TenantId) -> Self {
        Self {
            pool: Weak::new(),
            tenant,
            key: 0,
            released: AtomicBool::new(true),
        }
    }

    /// Give the reference back to the pool.
    ///
    /// Returns whether this release removed the tenant from the pool
    /// (which happens when the tenant was retired and this was the last
    /// reference). Bookkeeping failures are logged, never returned.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Some(core) = self.pool.upgrade() else {
            error!(tenant = %self.tenant, "Releasing state after its pool was dropped");
            return false;
        };
        core.release(&self.tenant, self.key)
    }
}

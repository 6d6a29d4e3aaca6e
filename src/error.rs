//! Crate-wide error taxonomy.

use thiserror::Error;

use crate::domain::TenantId;

/// Errors surfaced by the pool and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// The pool has been closed; no further operations are accepted.
    ///
    /// Also the distinguished fatal error for the supervised tailer:
    /// a worker failing with this variant stops the runner instead of
    /// being restarted.
    #[error("pool closed")]
    PoolClosed,

    /// The tenant was marked for removal; its refcount may not grow.
    #[error("tenant {tenant} has been retired")]
    TenantRetired { tenant: TenantId },

    /// Opening a fresh tenant handle failed.
    #[error("opening state for tenant {tenant}: {source}")]
    HandleConstruction {
        tenant: TenantId,
        #[source]
        source: Box<Error>,
    },

    /// Close completed, but at least one handle failed to close.
    #[error("at least one error closing a state: {source}")]
    CloseAggregate {
        #[source]
        source: Box<Error>,
    },

    /// Database session or transaction-log failure.
    #[error("session error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error is the distinguished pool-closed variant.
    ///
    /// Used as the runner's is-fatal predicate for the txn-log tailer.
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, Error::PoolClosed)
    }
}

/// Validation errors for pool settings.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

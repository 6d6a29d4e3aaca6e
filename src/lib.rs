//! Statepool - Multi-tenant state pool with change-stream fan-out.
//!
//! A process-wide cache of live per-tenant state handles backed by a
//! shared document database, built for a control plane that manages many
//! tenants (models) in one process.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── domain/       # Pure domain types (ids, change records, topics)
//! ├── session.rs    # Database collaborator traits
//! ├── hub/          # Topic-addressed pub/sub bus
//! ├── tailer.rs     # Transaction-log tailer
//! ├── runner.rs     # Supervised restart of named workers
//! ├── handle.rs     # Per-tenant state handle
//! └── pool/         # Reference-counted handle cache
//! ```
//!
//! Change records flow database → tailer → hub → handles; callers reach
//! handles through [`StatePool::acquire`] and give them back through the
//! returned [`Releaser`]. Retiring a tenant marks it for removal; the
//! last release closes its handle.
//!
//! # Features
//!
//! - `testkit` - Expose the in-crate fakes to integration tests

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod handle;
pub mod hub;
pub mod pool;
pub mod runner;
pub mod session;
pub mod tailer;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use clock::{Clock, SystemClock};
pub use domain::{ChangeKind, ChangeRecord, TenantId, TenantLife, TenantRecord, Topic, TopicFilter};
pub use error::{Error, Result};
pub use handle::TenantState;
pub use hub::{EventHub, SubscriptionToken};
pub use pool::{HandleFactory, PoolOptions, Releaser, StatePool};
pub use session::{DatabaseSession, TxnLog};

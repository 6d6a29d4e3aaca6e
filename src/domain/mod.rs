//! Pure domain types.

pub mod change;
pub mod id;
pub mod tenant;

pub use change::{ChangeKind, ChangeRecord, Topic, TopicFilter};
pub use id::TenantId;
pub use tenant::{TenantLife, TenantRecord};

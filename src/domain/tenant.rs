//! The tenant's top-level record.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::TenantId;

/// Lifecycle of a tenant as recorded in its top-level document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantLife {
    Alive,
    Dying,
    Dead,
}

impl fmt::Display for TenantLife {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TenantLife::Alive => "alive",
            TenantLife::Dying => "dying",
            TenantLife::Dead => "dead",
        };
        write!(f, "{s}")
    }
}

/// The top-level document describing a tenant, as fetched through a
/// tenant's database session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    pub life: TenantLife,
}

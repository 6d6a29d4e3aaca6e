//! Builders for domain primitives.

use crate::domain::{ChangeKind, ChangeRecord, TenantId, TenantLife, TenantRecord};

/// An update record for tenant `t1`, collection `machines`.
pub fn change(revision: u64) -> ChangeRecord {
    change_for("t1", "machines", revision)
}

/// An update record with explicit tenant and collection.
pub fn change_for(tenant: &str, collection: &str, revision: u64) -> ChangeRecord {
    ChangeRecord {
        tenant: TenantId::from(tenant),
        collection: collection.to_string(),
        doc_id: revision.to_string(),
        revision,
        kind: ChangeKind::Update,
    }
}

/// An alive tenant record.
pub fn tenant_record(id: &str, name: &str) -> TenantRecord {
    TenantRecord {
        id: TenantId::from(id),
        name: name.to_string(),
        life: TenantLife::Alive,
    }
}

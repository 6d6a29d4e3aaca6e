//! Transaction-log change records and the topics they fan out on.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::TenantId;

/// The kind of operation a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// A single entry of the backing database's append-only transaction log.
///
/// Revisions are totally ordered within the log; the tailer emits records
/// in ascending revision order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub tenant: TenantId,
    pub collection: String,
    pub doc_id: String,
    pub revision: u64,
    pub kind: ChangeKind,
}

impl ChangeRecord {
    /// The hub topic this record is published on.
    pub fn topic(&self) -> Topic {
        Topic {
            tenant: self.tenant.clone(),
            collection: self.collection.clone(),
        }
    }
}

/// A hub address: one tenant, one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub tenant: TenantId,
    pub collection: String,
}

impl Topic {
    pub fn new(tenant: TenantId, collection: impl Into<String>) -> Self {
        Self {
            tenant,
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.collection)
    }
}

/// Subscription address space on the hub.
///
/// A tenant state handle subscribes to every topic of its tenant with a
/// single [`TopicFilter::Tenant`] filter and routes by collection itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Exactly one (tenant, collection) topic.
    Exact(Topic),
    /// Every topic belonging to the tenant.
    Tenant(TenantId),
}

impl TopicFilter {
    /// Whether a published topic matches this filter.
    pub fn matches(&self, topic: &Topic) -> bool {
        match self {
            TopicFilter::Exact(t) => t == topic,
            TopicFilter::Tenant(tenant) => *tenant == topic.tenant,
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicFilter::Exact(t) => write!(f, "{t}"),
            TopicFilter::Tenant(tenant) => write!(f, "{tenant}/*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_filter_matches_only_its_topic() {
        let topic = Topic::new(TenantId::from("t1"), "machines");
        let filter = TopicFilter::Exact(topic.clone());

        assert!(filter.matches(&topic));
        assert!(!filter.matches(&Topic::new(TenantId::from("t1"), "units")));
        assert!(!filter.matches(&Topic::new(TenantId::from("t2"), "machines")));
    }

    #[test]
    fn test_tenant_filter_matches_all_collections() {
        let filter = TopicFilter::Tenant(TenantId::from("t1"));

        assert!(filter.matches(&Topic::new(TenantId::from("t1"), "machines")));
        assert!(filter.matches(&Topic::new(TenantId::from("t1"), "units")));
        assert!(!filter.matches(&Topic::new(TenantId::from("t2"), "machines")));
    }

    #[test]
    fn test_record_topic_derivation() {
        let record = ChangeRecord {
            tenant: TenantId::from("t1"),
            collection: "machines".into(),
            doc_id: "0".into(),
            revision: 7,
            kind: ChangeKind::Update,
        };

        assert_eq!(record.topic(), Topic::new(TenantId::from("t1"), "machines"));
    }
}

//! Core types used throughout the coordinator.

use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Index of a partition within a topic.
pub type PartitionId = u32;

/// A group subscription snapshot: member id to the canonical (sorted,
/// duplicate-free) list of topics that member consumes.
///
/// Snapshots are emitted atomically on the subscriptions channel and are
/// owned by the receiver after delivery.
pub type Subscriptions = HashMap<String, Vec<String>>;

/// Identifies one member of one consumer group on one cluster.
///
/// Immutable for the lifetime of a coordinator; the coordination store
/// paths derive deterministically from the group and member fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupIdentity {
    /// Name of the cluster the group consumes from. Only used for log
    /// context; store paths are scoped by a chroot, not by cluster.
    pub cluster: String,

    /// Name of the consumer group.
    pub group: String,

    /// This member's id, unique within the group.
    pub member: String,
}

impl GroupIdentity {
    /// Create an identity with an explicit member id.
    pub fn new(
        cluster: impl Into<String>,
        group: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            group: group.into(),
            member: member.into(),
        }
    }

    /// Create an identity with a generated `member-<uuid>` id.
    pub fn with_random_member(cluster: impl Into<String>, group: impl Into<String>) -> Self {
        Self::new(cluster, group, format!("member-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for GroupIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.group, self.member)
    }
}

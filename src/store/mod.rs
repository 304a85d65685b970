//! Coordination store adapter.
//!
//! The coordinator talks to a strongly consistent hierarchical store
//! (ZooKeeper is the canonical instance) through the [`CoordinationStore`]
//! trait. Registrations and partition claims are ephemeral: they exist only
//! while the creating session is alive, and the store removes them when the
//! session ends.
//!
//! The crate ships one implementation, [`MemoryStore`], with the same
//! ephemerality observable through explicit session-expiry calls. It backs
//! the test suite and local development; a production ZooKeeper adapter
//! implements the same trait against the znode layout described by the path
//! helpers below.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::PartitionId;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// One-shot notification that the member set of a watched group changed.
///
/// A watch covers a single change; observers re-arm by calling
/// [`CoordinationStore::watch_members`] again, which also returns the
/// post-change member set so no transition is lost between watches.
pub type MembersWatch = oneshot::Receiver<()>;

/// Store operations the group coordinator depends on.
///
/// Implementations must be safe for concurrent use: the coordinator's event
/// loop and any number of partition claim calls share one instance.
///
/// Registered subscriptions are assumed to be exact topic lists. Peers that
/// register pattern-based subscriptions produce undefined snapshot contents.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Create the persistent group parent node if it does not exist yet.
    async fn ensure_group(&self, group: &str) -> Result<(), StoreError>;

    /// Write the member's ephemeral registration carrying its topic list.
    /// Registering an already registered member replaces its subscription.
    async fn register_member(
        &self,
        group: &str,
        member: &str,
        topics: &[String],
    ) -> Result<(), StoreError>;

    /// Remove the member's registration. Fails with
    /// [`StoreError::NotRegistered`] if there is none.
    async fn deregister_member(&self, group: &str, member: &str) -> Result<(), StoreError>;

    /// Return the current member ids of the group and install a watch that
    /// fires on the next membership change.
    async fn watch_members(&self, group: &str)
        -> Result<(Vec<String>, MembersWatch), StoreError>;

    /// Read the registered topic list of one member. A single attempt; the
    /// caller decides whether to retry.
    async fn fetch_subscription(&self, group: &str, member: &str)
        -> Result<Vec<String>, StoreError>;

    /// Claim exclusive ownership of a partition for the member. Fails with
    /// [`StoreError::PartitionClaimed`] while another member holds it.
    async fn claim_partition(
        &self,
        group: &str,
        member: &str,
        topic: &str,
        partition: PartitionId,
    ) -> Result<(), StoreError>;

    /// Release a partition previously claimed by the member. Fails with
    /// [`StoreError::NotClaimed`] if the member does not hold it.
    async fn release_partition(
        &self,
        group: &str,
        member: &str,
        topic: &str,
        partition: PartitionId,
    ) -> Result<(), StoreError>;
}

/// Path of the persistent group parent node.
pub fn group_path(group: &str) -> String {
    format!("/consumers/{group}")
}

/// Path of the node whose children are the group's member registrations.
pub fn members_path(group: &str) -> String {
    format!("/consumers/{group}/ids")
}

/// Path of one member's ephemeral registration node.
pub fn member_path(group: &str, member: &str) -> String {
    format!("/consumers/{group}/ids/{member}")
}

/// Path of the ephemeral ownership node for a partition.
pub fn owner_path(group: &str, topic: &str, partition: PartitionId) -> String {
    format!("/consumers/{group}/owners/{topic}/{partition}")
}

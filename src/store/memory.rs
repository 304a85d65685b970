//! In-memory coordination store.
//!
//! Implements [`CoordinationStore`] over plain maps guarded by a mutex.
//! Ephemerality is driven explicitly: [`MemoryStore::expire_member`] plays
//! the role of a session expiry, dropping the member's registration and
//! claims the way ZooKeeper drops ephemeral znodes. Transient store
//! failures are injected per operation with [`MemoryStore::fail_next`].

use crate::error::StoreError;
use crate::store::{CoordinationStore, MembersWatch};
use crate::types::PartitionId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// An in-memory [`CoordinationStore`] shared by every coordinator under
/// test through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    groups: HashMap<String, GroupEntry>,

    /// Remaining injected failures, keyed by trait method name.
    fail_next: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct GroupEntry {
    /// Member id to registered topic list.
    members: HashMap<String, Vec<String>>,

    /// `(topic, partition)` to the member id owning the pair.
    owners: HashMap<(String, PartitionId), String>,

    /// Armed membership watches, fired and drained on the next change.
    watches: Vec<oneshot::Sender<()>>,
}

impl GroupEntry {
    fn notify_watches(&mut self) {
        for watch in self.watches.drain(..) {
            let _ = watch.send(());
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls of the named trait method fail with a
    /// transient connection error.
    pub fn fail_next(&self, op: &str, count: u32) {
        self.state.lock().fail_next.insert(op.to_string(), count);
    }

    /// Simulate a session expiry for a member: its registration and every
    /// partition it owns disappear, and membership watches fire.
    pub fn expire_member(&self, group: &str, member: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.groups.get_mut(group) {
            let registered = entry.members.remove(member).is_some();
            entry.owners.retain(|_, owner| owner != member);
            if registered {
                entry.notify_watches();
            }
        }
    }

    /// Whether the member currently has a registration in the group.
    pub fn is_registered(&self, group: &str, member: &str) -> bool {
        self.state
            .lock()
            .groups
            .get(group)
            .is_some_and(|entry| entry.members.contains_key(member))
    }

    /// Member ids currently registered in the group, sorted.
    pub fn registered_members(&self, group: &str) -> Vec<String> {
        let state = self.state.lock();
        let mut members: Vec<String> = state
            .groups
            .get(group)
            .map(|entry| entry.members.keys().cloned().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// The member currently owning a partition, if any.
    pub fn partition_owner(
        &self,
        group: &str,
        topic: &str,
        partition: PartitionId,
    ) -> Option<String> {
        self.state
            .lock()
            .groups
            .get(group)
            .and_then(|entry| entry.owners.get(&(topic.to_string(), partition)).cloned())
    }

    fn take_injected_failure(&self, op: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.fail_next.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Connection(format!("injected {op} failure")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn ensure_group(&self, group: &str) -> Result<(), StoreError> {
        self.take_injected_failure("ensure_group")?;
        self.state.lock().groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn register_member(
        &self,
        group: &str,
        member: &str,
        topics: &[String],
    ) -> Result<(), StoreError> {
        self.take_injected_failure("register_member")?;
        let mut state = self.state.lock();
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::GroupNotFound(group.to_string()))?;
        entry.members.insert(member.to_string(), topics.to_vec());
        entry.notify_watches();
        Ok(())
    }

    async fn deregister_member(&self, group: &str, member: &str) -> Result<(), StoreError> {
        self.take_injected_failure("deregister_member")?;
        let mut state = self.state.lock();
        let entry = match state.groups.get_mut(group) {
            Some(entry) => entry,
            None => return Err(StoreError::NotRegistered),
        };
        if entry.members.remove(member).is_none() {
            return Err(StoreError::NotRegistered);
        }
        entry.notify_watches();
        Ok(())
    }

    async fn watch_members(
        &self,
        group: &str,
    ) -> Result<(Vec<String>, MembersWatch), StoreError> {
        self.take_injected_failure("watch_members")?;
        let mut state = self.state.lock();
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::GroupNotFound(group.to_string()))?;
        let mut members: Vec<String> = entry.members.keys().cloned().collect();
        members.sort_unstable();
        let (tx, rx) = oneshot::channel();
        entry.watches.push(tx);
        Ok((members, rx))
    }

    async fn fetch_subscription(
        &self,
        group: &str,
        member: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.take_injected_failure("fetch_subscription")?;
        let state = self.state.lock();
        let entry = state
            .groups
            .get(group)
            .ok_or_else(|| StoreError::GroupNotFound(group.to_string()))?;
        entry
            .members
            .get(member)
            .cloned()
            .ok_or(StoreError::NotRegistered)
    }

    async fn claim_partition(
        &self,
        group: &str,
        member: &str,
        topic: &str,
        partition: PartitionId,
    ) -> Result<(), StoreError> {
        self.take_injected_failure("claim_partition")?;
        let mut state = self.state.lock();
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::GroupNotFound(group.to_string()))?;
        let key = (topic.to_string(), partition);
        match entry.owners.get(&key) {
            None => {
                entry.owners.insert(key, member.to_string());
                Ok(())
            }
            Some(owner) if owner.as_str() == member => Ok(()),
            Some(owner) => Err(StoreError::PartitionClaimed {
                owner: owner.clone(),
            }),
        }
    }

    async fn release_partition(
        &self,
        group: &str,
        member: &str,
        topic: &str,
        partition: PartitionId,
    ) -> Result<(), StoreError> {
        self.take_injected_failure("release_partition")?;
        let mut state = self.state.lock();
        let entry = match state.groups.get_mut(group) {
            Some(entry) => entry,
            None => return Err(StoreError::NotClaimed),
        };
        let key = (topic.to_string(), partition);
        match entry.owners.get(&key) {
            Some(owner) if owner.as_str() == member => {
                entry.owners.remove(&key);
                Ok(())
            }
            _ => Err(StoreError::NotClaimed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_register_requires_group() {
        let store = MemoryStore::new();
        let err = store
            .register_member("g1", "m1", &topics(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::GroupNotFound(_)));

        store.ensure_group("g1").await.unwrap();
        store.register_member("g1", "m1", &topics(&["a"])).await.unwrap();
        assert!(store.is_registered("g1", "m1"));
    }

    #[tokio::test]
    async fn test_register_replaces_subscription() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();
        store.register_member("g1", "m1", &topics(&["a"])).await.unwrap();
        store.register_member("g1", "m1", &topics(&["b"])).await.unwrap();
        assert_eq!(
            store.fetch_subscription("g1", "m1").await.unwrap(),
            topics(&["b"])
        );
    }

    #[tokio::test]
    async fn test_deregister_is_not_idempotent() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();
        store.register_member("g1", "m1", &topics(&["a"])).await.unwrap();

        store.deregister_member("g1", "m1").await.unwrap();
        let err = store.deregister_member("g1", "m1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotRegistered));
    }

    #[tokio::test]
    async fn test_watch_fires_on_membership_change() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();
        store.register_member("g1", "m1", &topics(&["a"])).await.unwrap();

        let (members, mut watch) = store.watch_members("g1").await.unwrap();
        assert_eq!(members, vec!["m1".to_string()]);
        assert!(watch.try_recv().is_err());

        store.register_member("g1", "m2", &topics(&["b"])).await.unwrap();
        assert!(watch.await.is_ok());

        let (members, _watch) = store.watch_members("g1").await.unwrap();
        assert_eq!(members, vec!["m1".to_string(), "m2".to_string()]);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();

        store.claim_partition("g1", "m1", "t", 0).await.unwrap();
        // Re-claiming an owned partition is a no-op for the owner.
        store.claim_partition("g1", "m1", "t", 0).await.unwrap();

        let err = store.claim_partition("g1", "m2", "t", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::PartitionClaimed { owner } if owner == "m1"));

        // A different partition of the same topic is independent.
        store.claim_partition("g1", "m2", "t", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_requires_ownership() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();
        store.claim_partition("g1", "m1", "t", 0).await.unwrap();

        let err = store.release_partition("g1", "m2", "t", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::NotClaimed));
        assert_eq!(store.partition_owner("g1", "t", 0), Some("m1".to_string()));

        store.release_partition("g1", "m1", "t", 0).await.unwrap();
        assert_eq!(store.partition_owner("g1", "t", 0), None);

        let err = store.release_partition("g1", "m1", "t", 0).await.unwrap_err();
        assert!(matches!(err, StoreError::NotClaimed));
    }

    #[tokio::test]
    async fn test_expire_member_drops_registration_and_claims() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();
        store.register_member("g1", "m1", &topics(&["a"])).await.unwrap();
        store.claim_partition("g1", "m1", "t", 0).await.unwrap();

        let (_, watch) = store.watch_members("g1").await.unwrap();
        store.expire_member("g1", "m1");

        assert!(!store.is_registered("g1", "m1"));
        assert_eq!(store.partition_owner("g1", "t", 0), None);
        assert!(watch.await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.ensure_group("g1").await.unwrap();
        store.fail_next("register_member", 2);

        for _ in 0..2 {
            let err = store
                .register_member("g1", "m1", &topics(&["a"]))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Connection(_)));
        }
        store.register_member("g1", "m1", &topics(&["a"])).await.unwrap();
    }
}

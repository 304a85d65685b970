//! Consumer group membership coordination over a ZooKeeper-style store.
//!
//! This crate keeps a process registered as a member of a named consumer
//! group inside a coordination store, watches the group for members
//! joining, leaving and changing their subscriptions, and turns what it
//! sees into the inputs a rebalancer needs:
//!
//! - **Subscription snapshots**: a deduplicated `member id → topic list`
//!   view of the whole group, emitted whenever the group changes.
//! - **Partition claims**: exclusive, at-most-one-owner claims on
//!   `(topic, partition)` pairs, held through ephemeral store entries.
//!
//! # Example
//!
//! ```rust,no_run
//! use cohort::{CoordinatorConfig, GroupIdentity, GroupMember, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let id = GroupIdentity::with_random_member("main", "payments");
//!     let (member, mut subscriptions) =
//!         GroupMember::spawn(id, CoordinatorConfig::default(), store);
//!
//!     // Tell the group what this member wants to consume.
//!     member.submit(vec!["billing".into(), "refunds".into()]).await?;
//!
//!     // Each snapshot covers every member of the group; feed it to the
//!     // partition assignment logic of your choice.
//!     if let Some(snapshot) = subscriptions.recv().await {
//!         println!("group subscriptions: {snapshot:?}");
//!     }
//!
//!     member.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                Consumer layer                 │
//! │   submit(topics)      claim_partition(t, p)   │
//! └───────────────────────────────────────────────┘
//!           │                      │
//!           ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │   GroupMember    │   │ PartitionClaim   │
//! │   event loop     │   │ retry/release    │
//! └──────────────────┘   └──────────────────┘
//!           │                      │
//!           └──────────┬───────────┘
//!                      ▼
//!           ┌───────────────────┐
//!           │ CoordinationStore │  ephemeral registrations,
//!           │  (ZooKeeper, …)   │  claims, membership watches
//!           └───────────────────┘
//! ```
//!
//! One cooperative task owns all of a coordinator's mutable state; claims
//! run on caller tasks and share nothing with the event loop but the store
//! client. Snapshots are emitted on a capacity-one channel: a slow reader
//! delays only the latest snapshot, intermediate ones are dropped, and two
//! successive snapshots are never equal.

pub mod config;
pub mod error;
pub mod member;
pub mod store;
pub mod topics;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export the main types for convenience.
pub use config::CoordinatorConfig;
pub use error::{Error, Result, StoreError};
pub use member::{GroupMember, PartitionClaim};
pub use store::{CoordinationStore, MembersWatch, MemoryStore};
pub use types::{GroupIdentity, PartitionId, Subscriptions};

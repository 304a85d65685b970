//! Error types for the group coordinator.

use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the group coordinator.
#[derive(Error, Debug)]
pub enum Error {
    /// Coordination store errors.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The coordinator has been stopped.
    #[error("coordinator stopped")]
    Stopped,
}

/// Errors surfaced by a coordination store adapter.
///
/// Transient errors are retried by the coordinator with its configured
/// backoff. `NotRegistered` and `NotClaimed` are idempotent outcomes for
/// deregistration and release respectively.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The group parent node does not exist.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// The member has no registration in the group.
    #[error("member not registered")]
    NotRegistered,

    /// The partition is not claimed by this member.
    #[error("partition not claimed")]
    NotClaimed,

    /// The partition is currently claimed by another member.
    #[error("partition claimed by {owner}")]
    PartitionClaimed { owner: String },

    /// The store session was lost. Ephemeral nodes created through it are
    /// gone and must be re-created once a new session is established.
    #[error("session expired")]
    SessionExpired,

    /// Connectivity or protocol failure talking to the store.
    #[error("connection error: {0}")]
    Connection(String),
}

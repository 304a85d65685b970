//! Consumer group membership coordination.
//!
//! A [`GroupMember`] keeps one process registered as a member of a consumer
//! group inside the coordination store, watches the group for members
//! joining, leaving and updating their subscriptions, and emits a
//! subscription snapshot whenever the group view changes. Higher layers
//! feed their desired topic list in through [`GroupMember::submit`], drive
//! rebalance decisions off the snapshot channel, and take exclusive
//! ownership of partitions with [`GroupMember::claim_partition`].
//!
//! All mutable membership state lives on a single event-loop task; claims
//! run on the caller's task and share only the store client.

use crate::config::CoordinatorConfig;
use crate::error::{Error, Result, StoreError};
use crate::store::{CoordinationStore, MembersWatch};
use crate::topics::canonicalize;
use crate::types::{GroupIdentity, PartitionId, Subscriptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// It can take the current owner of a partition up to a session timeout to
// let go of it, so the first several failed claim attempts are routine and
// logged at info level only.
const SAFE_CLAIM_RETRIES: u32 = 10;

/// A consumer group member coordinator.
///
/// Created with [`GroupMember::spawn`], which also returns the receiving
/// end of the subscriptions channel. The channel yields a snapshot of the
/// whole group's subscriptions whenever a member joins, leaves or changes
/// its topic list; two successive snapshots are never equal. Readers should
/// drain it promptly. A slow reader only ever delays the latest snapshot,
/// intermediate ones are dropped. The channel closes once the coordinator
/// has fully stopped and left the group.
pub struct GroupMember {
    id: GroupIdentity,
    cfg: CoordinatorConfig,
    store: Arc<dyn CoordinationStore>,
    topics_tx: mpsc::Sender<Vec<String>>,
    shutdown_tx: mpsc::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GroupMember {
    /// Start a coordinator for the given identity and return it along with
    /// the subscriptions channel.
    pub fn spawn(
        id: GroupIdentity,
        cfg: CoordinatorConfig,
        store: Arc<dyn CoordinationStore>,
    ) -> (Arc<Self>, mpsc::Receiver<Subscriptions>) {
        let (topics_tx, topics_rx) = mpsc::channel(1);
        let (subscriptions_tx, subscriptions_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let actor = MemberActor {
            id: id.clone(),
            cfg: cfg.clone(),
            store: store.clone(),
            topics_rx,
            subscriptions_tx,
            shutdown_rx,
            current_topics: Vec::new(),
            emitted_subscriptions: Subscriptions::new(),
        };
        let task = tokio::spawn(actor.run());

        let member = Arc::new(Self {
            id,
            cfg,
            store,
            topics_tx,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        });
        (member, subscriptions_rx)
    }

    /// This coordinator's identity.
    pub fn identity(&self) -> &GroupIdentity {
        &self.id
    }

    /// Hand the coordinator the list of topics this member wants to
    /// consume. An empty list unsubscribes from everything while keeping
    /// the member alive in the group. Successive submits replace earlier
    /// ones.
    pub async fn submit(&self, topics: Vec<String>) -> Result<()> {
        self.topics_tx.send(topics).await.map_err(|_| Error::Stopped)
    }

    /// Claim a partition for exclusive consumption by this member.
    ///
    /// Blocks until the claim succeeds or `cancel` fires, whichever comes
    /// first, and returns the handle that releases the claim. After a
    /// cancellation the returned handle holds nothing and releasing it is a
    /// no-op. Claims for distinct partitions may run concurrently; claiming
    /// the same partition twice without releasing in between is a caller
    /// error with unspecified results.
    pub async fn claim_partition(
        &self,
        topic: &str,
        partition: PartitionId,
        cancel: &CancellationToken,
    ) -> PartitionClaim {
        let began = Instant::now();
        let mut retries = 0u32;
        loop {
            match self
                .store
                .claim_partition(&self.id.group, &self.id.member, topic, partition)
                .await
            {
                Ok(()) => {
                    info!(
                        group = %self.id.group,
                        member = %self.id.member,
                        topic,
                        partition,
                        retries,
                        took_ms = took_ms(began),
                        "partition claimed"
                    );
                    return PartitionClaim {
                        inner: Some(ClaimInner {
                            store: self.store.clone(),
                            id: self.id.clone(),
                            topic: topic.to_string(),
                            partition,
                            retry_backoff: self.cfg.retry_backoff,
                        }),
                    };
                }
                Err(err) => {
                    retries += 1;
                    if retries > SAFE_CLAIM_RETRIES {
                        error!(
                            group = %self.id.group,
                            member = %self.id.member,
                            topic,
                            partition,
                            retries,
                            took_ms = took_ms(began),
                            error = %err,
                            "failed to claim partition"
                        );
                    } else {
                        info!(
                            group = %self.id.group,
                            member = %self.id.member,
                            topic,
                            partition,
                            retries,
                            took_ms = took_ms(began),
                            error = %err,
                            "failed to claim partition"
                        );
                    }
                }
            }
            tokio::select! {
                _ = time::sleep(self.cfg.retry_backoff) => {}
                _ = cancel.cancelled() => {
                    info!(
                        group = %self.id.group,
                        member = %self.id.member,
                        topic,
                        partition,
                        took_ms = took_ms(began),
                        "partition claim canceled"
                    );
                    return PartitionClaim { inner: None };
                }
            }
        }
    }

    /// Stop the coordinator: leave the group and wait for the event loop to
    /// finish. The subscriptions channel closes once this completes.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!(
                    group = %self.id.group,
                    member = %self.id.member,
                    error = %err,
                    "coordinator task failed"
                );
            }
        }
    }
}

impl fmt::Debug for GroupMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupMember")
            .field("cluster", &self.id.cluster)
            .field("group", &self.id.group)
            .field("member", &self.id.member)
            .finish()
    }
}

/// Exclusive ownership of one partition, returned by
/// [`GroupMember::claim_partition`].
///
/// Release is explicit and not cancelable: it retries until the store
/// confirms the ownership record is gone, because another member may
/// already be waiting to claim the partition. Dropping the handle without
/// releasing leaves the record to expire with the store session.
#[must_use = "an unreleased claim blocks the partition until the session ends"]
pub struct PartitionClaim {
    inner: Option<ClaimInner>,
}

struct ClaimInner {
    store: Arc<dyn CoordinationStore>,
    id: GroupIdentity,
    topic: String,
    partition: PartitionId,
    retry_backoff: std::time::Duration,
}

impl PartitionClaim {
    /// Whether this handle holds an actual claim. `false` for handles
    /// returned after a canceled claim.
    pub fn is_held(&self) -> bool {
        self.inner.is_some()
    }

    /// Release the claim. Retries until the store confirms the partition is
    /// no longer held by this member; an already absent claim counts as
    /// released.
    pub async fn release(mut self) {
        let Some(claim) = self.inner.take() else {
            return;
        };
        let began = Instant::now();
        let mut retries = 0u32;
        loop {
            match claim
                .store
                .release_partition(&claim.id.group, &claim.id.member, &claim.topic, claim.partition)
                .await
            {
                Ok(()) | Err(StoreError::NotClaimed) => {
                    info!(
                        group = %claim.id.group,
                        member = %claim.id.member,
                        topic = %claim.topic,
                        partition = claim.partition,
                        retries,
                        took_ms = took_ms(began),
                        "partition released"
                    );
                    return;
                }
                Err(err) => {
                    retries += 1;
                    if retries > SAFE_CLAIM_RETRIES {
                        error!(
                            group = %claim.id.group,
                            member = %claim.id.member,
                            topic = %claim.topic,
                            partition = claim.partition,
                            retries,
                            took_ms = took_ms(began),
                            error = %err,
                            "failed to release partition"
                        );
                    } else {
                        info!(
                            group = %claim.id.group,
                            member = %claim.id.member,
                            topic = %claim.topic,
                            partition = claim.partition,
                            retries,
                            took_ms = took_ms(began),
                            error = %err,
                            "failed to release partition"
                        );
                    }
                    time::sleep(claim.retry_backoff).await;
                }
            }
        }
    }
}

impl fmt::Debug for PartitionClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(claim) => f
                .debug_struct("PartitionClaim")
                .field("topic", &claim.topic)
                .field("partition", &claim.partition)
                .finish(),
            None => f.write_str("PartitionClaim(released)"),
        }
    }
}

/// The event-loop half of a [`GroupMember`]. Sole owner of the membership
/// state, sole reader of the submit and shutdown channels and sole writer
/// of the subscriptions channel.
struct MemberActor {
    id: GroupIdentity,
    cfg: CoordinatorConfig,
    store: Arc<dyn CoordinationStore>,
    topics_rx: mpsc::Receiver<Vec<String>>,
    subscriptions_tx: mpsc::Sender<Subscriptions>,
    shutdown_rx: mpsc::Receiver<()>,

    /// The topic list currently registered in the store. Empty while
    /// unregistered or registered with no topics.
    current_topics: Vec<String>,

    /// The last snapshot handed to the subscriptions channel.
    emitted_subscriptions: Subscriptions,
}

impl MemberActor {
    async fn run(mut self) {
        // The group parent node must exist before members can register
        // under it.
        loop {
            match self.store.ensure_group(&self.id.group).await {
                Ok(()) => break,
                Err(err) => {
                    error!(
                        group = %self.id.group,
                        member = %self.id.member,
                        error = %err,
                        "failed to create group node"
                    );
                    tokio::select! {
                        _ = time::sleep(self.cfg.retry_backoff) => {}
                        _ = self.shutdown_rx.recv() => return,
                    }
                }
            }
        }

        self.event_loop().await;

        // Leave the group on the way out. Not cancelable: the retry runs
        // until the store confirms no registration remains.
        loop {
            match self
                .store
                .deregister_member(&self.id.group, &self.id.member)
                .await
            {
                Ok(()) | Err(StoreError::NotRegistered) => break,
                Err(err) => {
                    error!(
                        group = %self.id.group,
                        member = %self.id.member,
                        error = %err,
                        "failed to deregister"
                    );
                    time::sleep(self.cfg.retry_backoff).await;
                }
            }
        }
        // Dropping the actor drops the subscriptions sender, closing the
        // channel only after deregistration is done.
    }

    async fn event_loop(&mut self) {
        let mut pending_topics: Vec<String> = Vec::new();
        let mut pending_subscriptions: Option<Subscriptions> = None;
        let mut members: Vec<String> = Vec::new();
        let mut group_watch: Option<MembersWatch> = None;
        let mut deadline: Option<Instant> = None;
        let mut should_submit_topics = false;
        let mut should_fetch_members = false;
        let mut should_fetch_subscriptions = false;

        loop {
            // Service exactly one input, then advance whatever work became
            // due, in fixed order: submit, fetch members, fetch
            // subscriptions. A store failure arms the retry timer and
            // leaves the `should_*` flags as they are, so the work resumes
            // where it stopped.
            tokio::select! {
                maybe_topics = self.topics_rx.recv() => match maybe_topics {
                    Some(topics) => {
                        pending_topics = canonicalize(topics);
                        should_submit_topics = pending_topics != self.current_topics;
                    }
                    None => break,
                },
                reserved = self.subscriptions_tx.reserve(), if pending_subscriptions.is_some() => {
                    match reserved {
                        Ok(permit) => {
                            let snapshot = pending_subscriptions
                                .take()
                                .expect("send armed without a pending snapshot");
                            self.emitted_subscriptions = snapshot.clone();
                            permit.send(snapshot);
                        }
                        // The receiver is gone; nobody is left to drive
                        // rebalances with these snapshots.
                        Err(_) => break,
                    }
                },
                _ = watch_fired(group_watch.as_mut()), if group_watch.is_some() => {
                    group_watch = None;
                    should_fetch_members = true;
                },
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                },
                _ = self.shutdown_rx.recv() => break,
            }

            if should_submit_topics {
                let began = Instant::now();
                if let Err(err) = self.submit_topics(&pending_topics).await {
                    error!(
                        group = %self.id.group,
                        member = %self.id.member,
                        error = %err,
                        took_ms = took_ms(began),
                        "failed to submit topics"
                    );
                    deadline = Some(Instant::now() + self.cfg.retry_backoff);
                    continue;
                }
                info!(
                    group = %self.id.group,
                    member = %self.id.member,
                    topics = ?pending_topics,
                    took_ms = took_ms(began),
                    "topics submitted"
                );
                should_submit_topics = false;
                should_fetch_members = true;
            }

            if should_fetch_members {
                let began = Instant::now();
                match self.store.watch_members(&self.id.group).await {
                    Ok((fetched, watch)) => {
                        members = fetched;
                        group_watch = Some(watch);
                        should_fetch_members = false;
                        should_fetch_subscriptions = true;
                        debug!(
                            group = %self.id.group,
                            member = %self.id.member,
                            members = ?members,
                            took_ms = took_ms(began),
                            "group members fetched"
                        );
                        // Members deregister and promptly re-register when
                        // they change their subscription. Defer the
                        // subscription read so such a burst produces one
                        // rebalance, not several.
                        deadline = Some(Instant::now() + self.cfg.rebalance_delay);
                        continue;
                    }
                    Err(err) => {
                        error!(
                            group = %self.id.group,
                            member = %self.id.member,
                            error = %err,
                            took_ms = took_ms(began),
                            "failed to watch group members"
                        );
                        deadline = Some(Instant::now() + self.cfg.retry_backoff);
                        continue;
                    }
                }
            }

            if should_fetch_subscriptions {
                let began = Instant::now();
                let snapshot = match self.fetch_subscriptions(&members).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        error!(
                            group = %self.id.group,
                            member = %self.id.member,
                            error = %err,
                            took_ms = took_ms(began),
                            "failed to fetch subscriptions"
                        );
                        deadline = Some(Instant::now() + self.cfg.retry_backoff);
                        continue;
                    }
                };
                should_fetch_subscriptions = false;
                info!(
                    group = %self.id.group,
                    member = %self.id.member,
                    subscriptions = ?snapshot,
                    took_ms = took_ms(began),
                    "subscriptions fetched"
                );
                if snapshot == self.emitted_subscriptions {
                    pending_subscriptions = None;
                    info!(
                        group = %self.id.group,
                        member = %self.id.member,
                        "redundant group update ignored"
                    );
                    continue;
                }
                pending_subscriptions = Some(snapshot);
            }
        }
    }

    /// Replace this member's registration with the given topic list. The
    /// store has no update operation for the deregister/register pair other
    /// members watch for, so an existing registration is removed first.
    async fn submit_topics(&mut self, topics: &[String]) -> std::result::Result<(), StoreError> {
        if !self.current_topics.is_empty() {
            match self
                .store
                .deregister_member(&self.id.group, &self.id.member)
                .await
            {
                Ok(()) | Err(StoreError::NotRegistered) => {}
                Err(err) => return Err(err),
            }
        }
        self.current_topics.clear();
        self.store
            .register_member(&self.id.group, &self.id.member, topics)
            .await?;
        self.current_topics = topics.to_vec();
        Ok(())
    }

    /// Read every member's registered topic list and assemble a canonical
    /// snapshot. Any read failure aborts the whole snapshot; the event loop
    /// retries after its backoff.
    async fn fetch_subscriptions(
        &self,
        members: &[String],
    ) -> std::result::Result<Subscriptions, StoreError> {
        let mut subscriptions = HashMap::with_capacity(members.len());
        for member in members {
            let topics = self
                .store
                .fetch_subscription(&self.id.group, member)
                .await?;
            subscriptions.insert(member.clone(), canonicalize(topics));
        }
        Ok(subscriptions)
    }
}

/// Resolves when the watch fires. The store dropping its end of the watch
/// is treated the same way: the member set must be re-read either way.
async fn watch_fired(watch: Option<&mut MembersWatch>) {
    match watch {
        Some(watch) => {
            let _ = watch.await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn took_ms(began: Instant) -> u64 {
    began.elapsed().as_millis() as u64
}

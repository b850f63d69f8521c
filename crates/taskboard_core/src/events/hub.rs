//! Subscriber registries, broadcast and heartbeat.
//!
//! # Responsibility
//! - Track open connections per owner (board-list changes) and per board
//!   (column/task changes).
//! - Fan each emitted event out to every connection registered for its key.
//! - Ping every connection periodically so idle intermediaries keep the
//!   stream open and dead peers are detected.
//!
//! # Invariants
//! - Broadcast sends to a snapshot of the key's connections taken under the
//!   shard read lock; concurrent joins/leaves never make it fail, skip or
//!   duplicate a delivery to a connection that was registered throughout.
//! - Completion, timeout or send failure removes the connection from its
//!   registry immediately; empty keys are pruned under the shard write lock.
//! - Each connection's queue is bounded. A send into a full queue counts as
//!   a failure, so a peer that stops reading is dropped by the next emit or
//!   heartbeat instead of buffering without limit.
//! - Connections never expire on their own.

use crate::config::EventConfig;
use crate::events::event::{DirtyEvent, EventType, SseFrame};
use crate::model::board::{BoardId, OwnerToken};
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub type ConnectionId = u64;

type FrameSender = Sender<SseFrame>;

/// Registry a connection is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HubKey {
    /// Board-list changes for one owner.
    Owner(OwnerToken),
    /// Column and task changes on one board.
    Board(BoardId),
}

impl Display for HubKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner(owner) => write!(f, "owner:{owner}"),
            Self::Board(board) => write!(f, "board:{board}"),
        }
    }
}

/// Why a connection left its registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Peer or transport finished the stream normally.
    Completed,
    /// Transport-level timeout.
    TimedOut,
    /// Transport write failed; the connection is terminated, not retried.
    Failed(String),
}

impl ConnectionEnd {
    fn as_status(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timeout",
            Self::Failed(_) => "failed",
        }
    }
}

struct Registry<K> {
    name: &'static str,
    entries: DashMap<K, HashMap<ConnectionId, FrameSender>>,
}

impl<K> Registry<K>
where
    K: Eq + Hash + Clone + Display,
{
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    fn insert(&self, key: K, id: ConnectionId, sender: FrameSender) {
        self.entries.entry(key).or_default().insert(id, sender);
    }

    fn remove(&self, key: &K, id: ConnectionId) -> bool {
        let removed = {
            match self.entries.get_mut(key) {
                Some(mut connections) => connections.remove(&id).is_some(),
                None => false,
            }
        };
        self.entries
            .remove_if(key, |_, connections| connections.is_empty());
        removed
    }

    fn snapshot(&self, key: &K) -> Vec<(K, ConnectionId, FrameSender)> {
        self.entries
            .get(key)
            .map(|connections| {
                connections
                    .iter()
                    .map(|(id, sender)| (key.clone(), *id, sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn snapshot_all(&self) -> Vec<(K, ConnectionId, FrameSender)> {
        let mut all = Vec::new();
        for entry in self.entries.iter() {
            all.extend(
                entry
                    .value()
                    .iter()
                    .map(|(id, sender)| (entry.key().clone(), *id, sender.clone())),
            );
        }
        all
    }

    fn count_for(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, |connections| connections.len())
    }

    fn connection_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    /// Sends `frame` to every target without waiting.
    ///
    /// A target whose queue is full or whose peer is gone is deregistered;
    /// dropping its sender ends the stream once the peer drains what is
    /// already queued.
    fn deliver(&self, targets: Vec<(K, ConnectionId, FrameSender)>, frame: &SseFrame) -> usize {
        let mut delivered = 0;
        for (key, id, sender) in targets {
            let error_code = match sender.try_send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    continue;
                }
                Err(TrySendError::Full(_)) => "queue_full",
                Err(TrySendError::Closed(_)) => "peer_gone",
            };
            self.remove(&key, id);
            warn!(
                "event=sse_send module=events status=error registry={} key={key} connection={id} event_type={} error_code={error_code}",
                self.name,
                frame.name()
            );
        }
        delivered
    }
}

struct HubShared {
    owners: Registry<OwnerToken>,
    boards: Registry<BoardId>,
    next_connection_id: AtomicU64,
    retry: Duration,
    buffer: usize,
}

impl HubShared {
    fn frame(&self, event: DirtyEvent) -> SseFrame {
        SseFrame::new(event, self.retry)
    }

    fn deregister(&self, key: &HubKey, id: ConnectionId) -> bool {
        match key {
            HubKey::Owner(owner) => self.owners.remove(owner, id),
            HubKey::Board(board) => self.boards.remove(board, id),
        }
    }
}

/// Process-wide dirty-event hub. Cheap to clone; clones share registries.
#[derive(Clone)]
pub struct EventHub {
    shared: Arc<HubShared>,
}

impl Debug for EventHub {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("owner_keys", &self.shared.owners.entries.len())
            .field("board_keys", &self.shared.boards.entries.len())
            .field("connections", &self.connection_count())
            .field("retry", &self.shared.retry)
            .finish()
    }
}

impl EventHub {
    pub fn new(config: &EventConfig) -> Self {
        Self {
            shared: Arc::new(HubShared {
                owners: Registry::new("owner"),
                boards: Registry::new("board"),
                next_connection_id: AtomicU64::new(1),
                retry: config.reconnect_delay(),
                buffer: config.connection_buffer.max(1),
            }),
        }
    }

    /// Opens a long-lived connection for `key` and queues the handshake ping.
    pub fn subscribe(&self, key: HubKey) -> Subscription {
        let id = self
            .shared
            .next_connection_id
            .fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.shared.buffer);
        let handshake = self.shared.frame(DirtyEvent::ping());
        // Fresh queue with room for at least one frame; this send cannot fail.
        let _ = sender.try_send(handshake);

        match &key {
            HubKey::Owner(owner) => self.shared.owners.insert(owner.clone(), id, sender),
            HubKey::Board(board) => self.shared.boards.insert(*board, id, sender),
        }
        debug!("event=sse_subscribe module=events status=ok key={key} connection={id}");

        Subscription {
            id,
            key,
            receiver,
            hub: Arc::downgrade(&self.shared),
            closed: false,
        }
    }

    pub fn subscribe_owner(&self, owner: OwnerToken) -> Subscription {
        self.subscribe(HubKey::Owner(owner))
    }

    pub fn subscribe_board(&self, board: BoardId) -> Subscription {
        self.subscribe(HubKey::Board(board))
    }

    /// Sends `kind` to every connection under `key`.
    ///
    /// Board events carry the board id. Returns the number of connections
    /// the event was handed to; zero when nobody is listening.
    pub fn emit(&self, key: &HubKey, kind: EventType) -> usize {
        let delivered = match key {
            HubKey::Owner(owner) => {
                let targets = self.shared.owners.snapshot(owner);
                if targets.is_empty() {
                    return 0;
                }
                let frame = self.shared.frame(DirtyEvent::now(kind, None));
                self.shared.owners.deliver(targets, &frame)
            }
            HubKey::Board(board) => {
                let targets = self.shared.boards.snapshot(board);
                if targets.is_empty() {
                    return 0;
                }
                let frame = self.shared.frame(DirtyEvent::now(kind, Some(*board)));
                self.shared.boards.deliver(targets, &frame)
            }
        };
        debug!("event=sse_emit module=events status=ok key={key} event_type={kind} delivered={delivered}");
        delivered
    }

    pub fn emit_owner(&self, owner: &OwnerToken, kind: EventType) -> usize {
        self.emit(&HubKey::Owner(owner.clone()), kind)
    }

    pub fn emit_board(&self, board: BoardId, kind: EventType) -> usize {
        self.emit(&HubKey::Board(board), kind)
    }

    /// Pings every connection in both registries once.
    ///
    /// Connections whose peer is gone are deregistered.
    pub fn heartbeat(&self) -> usize {
        let frame = self.shared.frame(DirtyEvent::ping());
        let owners = self.shared.owners.snapshot_all();
        let boards = self.shared.boards.snapshot_all();
        let targeted = owners.len() + boards.len();
        let delivered = self.shared.owners.deliver(owners, &frame)
            + self.shared.boards.deliver(boards, &frame);
        debug!(
            "event=sse_heartbeat module=events status=ok targeted={targeted} delivered={delivered}"
        );
        delivered
    }

    /// Runs `heartbeat` every `period` on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once every clone of
    /// the hub has been dropped. Must be called from within a runtime.
    pub fn spawn_heartbeat(&self, period: Duration) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick resolves immediately; the handshake already pinged.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                EventHub { shared }.heartbeat();
            }
            debug!("event=sse_heartbeat module=events status=stopped");
        })
    }

    /// Open connections across both registries.
    pub fn connection_count(&self) -> usize {
        self.shared.owners.connection_count() + self.shared.boards.connection_count()
    }

    /// Open connections registered under `key`.
    pub fn subscriber_count(&self, key: &HubKey) -> usize {
        match key {
            HubKey::Owner(owner) => self.shared.owners.count_for(owner),
            HubKey::Board(board) => self.shared.boards.count_for(board),
        }
    }
}

/// Handle for one open connection; the transport streams its frames out.
///
/// Dropping the handle counts as completion and deregisters it.
pub struct Subscription {
    id: ConnectionId,
    key: HubKey,
    receiver: Receiver<SseFrame>,
    hub: Weak<HubShared>,
    closed: bool,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn key(&self) -> &HubKey {
        &self.key
    }

    /// Waits for the next frame. `None` once the hub dropped this connection
    /// or is gone itself.
    pub async fn recv(&mut self) -> Option<SseFrame> {
        self.receiver.recv().await
    }

    /// Returns a queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<SseFrame> {
        match self.receiver.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Ends the connection for `reason` and leaves the registry.
    pub fn close(mut self, reason: ConnectionEnd) {
        self.finish(&reason);
    }

    fn finish(&mut self, reason: &ConnectionEnd) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver.close();

        let removed = self
            .hub
            .upgrade()
            .is_some_and(|hub| hub.deregister(&self.key, self.id));
        match reason {
            ConnectionEnd::Failed(error) => warn!(
                "event=sse_close module=events status={} key={} connection={} removed={removed} error={error}",
                reason.as_status(),
                self.key,
                self.id
            ),
            _ => debug!(
                "event=sse_close module=events status={} key={} connection={} removed={removed}",
                reason.as_status(),
                self.key,
                self.id
            ),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish(&ConnectionEnd::Completed);
    }
}

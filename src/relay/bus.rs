//! The durable message bus the role-workers communicate over.
//!
//! The engine only needs: durable append, partitioning by thread on the
//! producer side, batched consume, and explicit offset commit. Kafka is
//! one implementation; [`InMemoryBus`] is the in-process one used by
//! tests and single-machine deployments. Wire framing belongs to the
//! concrete transport, not to this trait.

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// The two logical topics of the distributed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Orchestrator,
    Executor,
}

/// One consumed record and its offset within the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub offset: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum BusError {
    #[error("bus backend error: {message}")]
    #[diagnostic(code(lockstep::bus::backend))]
    Backend { message: String },
}

/// Durable, explicitly-committed message transport.
///
/// Consuming advances a per-group position without committing it; a
/// consumer that restarts before [`Bus::commit`] sees the uncommitted
/// records again. Delivery is therefore at-least-once, which the
/// workers pair with idempotent, task-id-keyed write application.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn produce(&self, topic: Topic, payload: Vec<u8>) -> Result<(), BusError>;

    /// Return up to `max_n` records past the group's position, waiting
    /// at most `max_wait` for the first one. An empty batch means the
    /// wait elapsed.
    async fn consume(
        &self,
        topic: Topic,
        group: &str,
        max_n: usize,
        max_wait: Duration,
    ) -> Result<Vec<BusRecord>, BusError>;

    /// Mark offsets up to and including `through` as processed.
    async fn commit(&self, topic: Topic, group: &str, through: u64) -> Result<(), BusError>;
}

#[derive(Default)]
struct GroupCursor {
    position: u64,
    committed: u64,
}

#[derive(Default)]
struct TopicLog {
    records: Vec<Vec<u8>>,
    groups: FxHashMap<String, GroupCursor>,
}

/// Process-local bus: per-topic append log with per-group cursors.
#[derive(Default)]
pub struct InMemoryBus {
    topics: Mutex<FxHashMap<Topic, TopicLog>>,
    notify: Notify,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind a group's position to its committed offset, as a restarted
    /// consumer would observe.
    pub fn reset_group(&self, topic: Topic, group: &str) {
        let mut topics = self.topics.lock();
        let log = topics.entry(topic).or_default();
        let cursor = log.groups.entry(group.to_string()).or_default();
        cursor.position = cursor.committed;
    }

    /// Number of records ever produced to a topic.
    pub fn len(&self, topic: Topic) -> usize {
        self.topics
            .lock()
            .get(&topic)
            .map_or(0, |log| log.records.len())
    }

    pub fn is_empty(&self, topic: Topic) -> bool {
        self.len(topic) == 0
    }

    fn try_take(&self, topic: Topic, group: &str, max_n: usize) -> Vec<BusRecord> {
        let mut topics = self.topics.lock();
        let log = topics.entry(topic).or_default();
        let TopicLog { records, groups } = log;
        let cursor = groups.entry(group.to_string()).or_default();
        let start = cursor.position as usize;
        if start >= records.len() {
            return Vec::new();
        }
        let end = records.len().min(start + max_n);
        let batch: Vec<BusRecord> = (start..end)
            .map(|i| BusRecord {
                offset: i as u64,
                payload: records[i].clone(),
            })
            .collect();
        cursor.position = end as u64;
        batch
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn produce(&self, topic: Topic, payload: Vec<u8>) -> Result<(), BusError> {
        {
            let mut topics = self.topics.lock();
            topics.entry(topic).or_default().records.push(payload);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(
        &self,
        topic: Topic,
        group: &str,
        max_n: usize,
        max_wait: Duration,
    ) -> Result<Vec<BusRecord>, BusError> {
        let deadline = Instant::now() + max_wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.try_take(topic, group, max_n);
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&self, topic: Topic, group: &str, through: u64) -> Result<(), BusError> {
        let mut topics = self.topics.lock();
        let log = topics.entry(topic).or_default();
        let cursor = log.groups.entry(group.to_string()).or_default();
        cursor.committed = cursor.committed.max(through + 1);
        Ok(())
    }
}

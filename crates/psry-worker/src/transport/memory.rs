//! In-process transport for tests and single-process runs.

use async_trait::async_trait;
use psry_core::PipelineError;
use psry_pipeline::{Delivery, HandOffPublisher, StageKind};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{HandOffTransport, ReceivedMessage};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// A delivery tagged with its publish order.
struct Queued {
    seq: u64,
    delivery: Delivery,
}

#[derive(Default)]
struct StageQueue {
    pending: VecDeque<Queued>,
    /// Receipt -> (visible again at, message).
    in_flight: HashMap<String, (Instant, Queued)>,
}

impl StageQueue {
    /// Return expired in-flight messages to the queue, which stays in publish order.
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, (visible_at, _))| *visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        if expired.is_empty() {
            return;
        }

        for receipt in expired {
            if let Some((_, queued)) = self.in_flight.remove(&receipt) {
                self.pending.push_back(queued);
            }
        }
        self.pending.make_contiguous().sort_by_key(|queued| queued.seq);
    }
}

/// Queues held in memory with SQS-like visibility semantics: a received message is hidden
/// for the visibility timeout and comes back unless acknowledged first.
pub struct InMemoryTransport {
    queues: Mutex<HashMap<StageKind, StageQueue>>,
    notify: HashMap<StageKind, Notify>,
    visibility_timeout: Duration,
    next_id: AtomicU64,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: StageKind::ALL
                .into_iter()
                .map(|stage| (stage, Notify::new()))
                .collect(),
            visibility_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Messages waiting on `stage`'s queue, not counting in-flight ones.
    pub async fn pending(&self, stage: StageKind) -> usize {
        self.queues
            .lock()
            .await
            .get(&stage)
            .map_or(0, |queue| queue.pending.len())
    }

    /// Messages received from `stage`'s queue but not yet acknowledged.
    pub async fn in_flight(&self, stage: StageKind) -> usize {
        self.queues
            .lock()
            .await
            .get(&stage)
            .map_or(0, |queue| queue.in_flight.len())
    }

    /// Bodies waiting on `stage`'s queue, oldest first.
    pub async fn pending_bodies(&self, stage: StageKind) -> Vec<String> {
        self.queues
            .lock()
            .await
            .get(&stage)
            .map(|queue| {
                queue
                    .pending
                    .iter()
                    .map(|queued| queued.delivery.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn wake(&self, stage: StageKind) {
        if let Some(notify) = self.notify.get(&stage) {
            notify.notify_one();
        }
    }

    async fn take(&self, stage: StageKind, max_messages: usize) -> Vec<ReceivedMessage> {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(stage).or_default();
        let now = Instant::now();
        queue.release_expired(now);

        let count = max_messages.max(1).min(queue.pending.len());
        let mut received = Vec::with_capacity(count);
        for queued in queue.pending.drain(..count).collect::<Vec<_>>() {
            let delivery = queued.delivery.clone();
            let receipt = format!(
                "{}#{}",
                delivery.message_id,
                self.next_id.fetch_add(1, Ordering::Relaxed)
            );
            queue
                .in_flight
                .insert(receipt.clone(), (now + self.visibility_timeout, queued));
            received.push(ReceivedMessage { delivery, receipt });
        }
        received
    }
}

#[async_trait]
impl HandOffPublisher for InMemoryTransport {
    async fn publish(&self, target: StageKind, body: String) -> Result<(), PipelineError> {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.queues
            .lock()
            .await
            .entry(target)
            .or_default()
            .pending
            .push_back(Queued {
                seq,
                delivery: Delivery::new(format!("mem-{}", seq), body),
            });
        self.wake(target);
        Ok(())
    }
}

#[async_trait]
impl HandOffTransport for InMemoryTransport {
    async fn receive(
        &self,
        stage: StageKind,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError> {
        let deadline = Instant::now() + wait;

        loop {
            let received = self.take(stage, max_messages).await;
            if !received.is_empty() {
                return Ok(received);
            }

            let Some(notify) = self.notify.get(&stage) else {
                return Ok(Vec::new());
            };
            if tokio::time::timeout_at(deadline, notify.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    async fn acknowledge(
        &self,
        stage: StageKind,
        receipts: Vec<String>,
    ) -> Result<(), PipelineError> {
        let mut queues = self.queues.lock().await;
        if let Some(queue) = queues.get_mut(&stage) {
            for receipt in receipts {
                if queue.in_flight.remove(&receipt).is_none() {
                    tracing::debug!(stage = %stage, receipt = %receipt, "Unknown receipt acknowledged");
                }
            }
        }
        Ok(())
    }
}

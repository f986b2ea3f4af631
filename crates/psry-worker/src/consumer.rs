//! Stage consumer: receive, handle, acknowledge.
//!
//! Shutdown: [`ConsumerHandle::shutdown`] stops the loop between batches. A batch already
//! received is handled and acknowledged before the task exits.

use psry_core::{Config, PipelineError};
use psry_pipeline::{BatchReport, StageHandler, StageKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::transport::{HandOffTransport, ReceivedMessage};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_messages: usize,
    /// Long-poll duration of one receive call.
    pub wait_time: Duration,
    /// Pause after a failed receive or acknowledge.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            error_backoff: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_messages: config.sqs_max_messages.max(1) as usize,
            wait_time: Duration::from_secs(config.sqs_wait_time_seconds.max(0) as u64),
            ..Self::default()
        }
    }
}

pub struct StageConsumer {
    handler: Arc<dyn StageHandler>,
    transport: Arc<dyn HandOffTransport>,
    config: ConsumerConfig,
}

impl StageConsumer {
    pub fn new(
        handler: Arc<dyn StageHandler>,
        transport: Arc<dyn HandOffTransport>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            handler,
            transport,
            config,
        }
    }

    pub fn stage(&self) -> StageKind {
        self.handler.stage()
    }

    /// Receive one batch and process it. Returns an empty report when the wait elapsed
    /// without messages.
    pub async fn poll_once(&self) -> Result<BatchReport, PipelineError> {
        let received = self.receive().await?;
        self.process(received).await
    }

    async fn receive(&self) -> Result<Vec<ReceivedMessage>, PipelineError> {
        self.transport
            .receive(self.stage(), self.config.max_messages, self.config.wait_time)
            .await
    }

    /// Run the handler over `received` and acknowledge succeeded and dropped messages.
    /// Messages to retry are left alone so the transport delivers them again.
    async fn process(&self, received: Vec<ReceivedMessage>) -> Result<BatchReport, PipelineError> {
        if received.is_empty() {
            return Ok(BatchReport::default());
        }

        let stage = self.stage();
        // At-least-once delivery may repeat a message inside one batch; each copy has its
        // own receipt.
        let mut receipts: HashMap<String, VecDeque<String>> = HashMap::new();
        let mut deliveries = Vec::with_capacity(received.len());
        for message in received {
            receipts
                .entry(message.delivery.message_id.clone())
                .or_default()
                .push_back(message.receipt);
            deliveries.push(message.delivery);
        }

        tracing::debug!(stage = %stage, messages = deliveries.len(), "Batch received");
        let report = self.handler.handle_batch(deliveries).await;

        let acknowledged: Vec<String> = report
            .acknowledged()
            .filter_map(|message_id| receipts.get_mut(message_id)?.pop_front())
            .collect();
        if !acknowledged.is_empty() {
            self.transport.acknowledge(stage, acknowledged).await?;
        }

        Ok(report)
    }

    /// Run the consumer loop on a new task until [`ConsumerHandle::shutdown`] is called.
    pub fn spawn(self) -> ConsumerHandle {
        let stage = self.stage();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            tracing::info!(
                stage = %stage,
                max_messages = self.config.max_messages,
                wait_secs = self.config.wait_time.as_secs(),
                "Stage consumer started"
            );

            loop {
                let received = tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!(stage = %stage, "Stage consumer shutting down");
                        break;
                    }
                    received = self.receive() => received,
                };

                let result = match received {
                    Ok(received) => self.process(received).await.map(|_| ()),
                    Err(err) => Err(err),
                };

                if let Err(err) = result {
                    tracing::error!(
                        stage = %stage,
                        error_kind = err.kind(),
                        error = %err,
                        backoff_secs = self.config.error_backoff.as_secs(),
                        "Stage consumer poll failed"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = sleep(self.config.error_backoff) => {}
                    }
                }
            }

            tracing::info!(stage = %stage, "Stage consumer stopped");
        });

        ConsumerHandle {
            stage,
            shutdown_tx,
            task,
        }
    }
}

/// A running consumer task.
pub struct ConsumerHandle {
    stage: StageKind,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn stage(&self) -> StageKind {
        self.stage
    }

    /// Signal the loop to stop and wait for the in-flight batch to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(err) = self.task.await {
            tracing::error!(stage = %self.stage, error = %err, "Stage consumer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use psry_pipeline::Delivery;
    use std::sync::Mutex;

    /// Hands out one fixed batch, then nothing, and records acknowledgements.
    struct FixedBatchTransport {
        batch: Mutex<Vec<ReceivedMessage>>,
        acknowledged: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HandOffTransport for FixedBatchTransport {
        async fn receive(
            &self,
            _stage: StageKind,
            _max_messages: usize,
            _wait: Duration,
        ) -> Result<Vec<ReceivedMessage>, PipelineError> {
            Ok(std::mem::take(&mut *self.batch.lock().unwrap()))
        }

        async fn acknowledge(
            &self,
            _stage: StageKind,
            receipts: Vec<String>,
        ) -> Result<(), PipelineError> {
            self.acknowledged.lock().unwrap().extend(receipts);
            Ok(())
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl StageHandler for AcceptAll {
        fn stage(&self) -> StageKind {
            StageKind::Translation
        }

        async fn handle_batch(&self, deliveries: Vec<Delivery>) -> BatchReport {
            BatchReport {
                succeeded: deliveries.into_iter().map(|d| d.message_id).collect(),
                ..BatchReport::default()
            }
        }
    }

    fn received(message_id: &str, receipt: &str) -> ReceivedMessage {
        ReceivedMessage {
            delivery: Delivery::new(message_id, r#"{"id":"a.png","text":"hi"}"#),
            receipt: receipt.to_string(),
        }
    }

    #[tokio::test]
    async fn repeated_message_in_one_batch_acknowledges_every_receipt() {
        let transport = Arc::new(FixedBatchTransport {
            batch: Mutex::new(vec![
                received("m1", "r-1"),
                received("m2", "r-2"),
                received("m1", "r-3"),
            ]),
            acknowledged: Mutex::new(Vec::new()),
        });
        let consumer = StageConsumer::new(
            Arc::new(AcceptAll),
            transport.clone(),
            ConsumerConfig::default(),
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.succeeded, vec!["m1", "m2", "m1"]);

        let mut acknowledged = transport.acknowledged.lock().unwrap().clone();
        acknowledged.sort();
        assert_eq!(acknowledged, vec!["r-1", "r-2", "r-3"]);
    }

    #[test]
    fn from_config_uses_sqs_settings() {
        let config = Config::from_lookup(|key| match key {
            "STORE_BACKEND" => Some("memory".into()),
            "SQS_MAX_MESSAGES" => Some("5".into()),
            "SQS_WAIT_TIME_SECONDS" => Some("2".into()),
            _ => None,
        })
        .unwrap();

        let consumer = ConsumerConfig::from_config(&config);
        assert_eq!(consumer.max_messages, 5);
        assert_eq!(consumer.wait_time, Duration::from_secs(2));
    }
}

//! Hand-off transports
//!
//! A transport carries JSON message bodies between stages with at-least-once delivery.
//! Received messages stay invisible until acknowledged; anything not acknowledged is
//! delivered again later.

mod memory;
mod sqs;

pub use memory::InMemoryTransport;
pub use sqs::SqsTransport;

use async_trait::async_trait;
use psry_core::{Config, PipelineError, TransportBackend};
use psry_pipeline::{Delivery, HandOffPublisher, StageKind};
use std::sync::Arc;
use std::time::Duration;

/// A message pulled from a stage queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub delivery: Delivery,
    /// Handle used to acknowledge this particular receipt.
    pub receipt: String,
}

/// Consuming side of the hand-off transport.
#[async_trait]
pub trait HandOffTransport: Send + Sync {
    /// Wait up to `wait` for messages on `stage`'s queue, returning at most `max_messages`.
    /// An empty result means the wait elapsed.
    async fn receive(
        &self,
        stage: StageKind,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError>;

    /// Remove acknowledged messages so they are not delivered again.
    async fn acknowledge(&self, stage: StageKind, receipts: Vec<String>)
        -> Result<(), PipelineError>;
}

/// Both halves of one configured transport.
#[derive(Clone)]
pub struct Transport {
    pub consumer: Arc<dyn HandOffTransport>,
    pub publisher: Arc<dyn HandOffPublisher>,
}

impl Transport {
    fn from_arc<T>(transport: Arc<T>) -> Self
    where
        T: HandOffTransport + HandOffPublisher + 'static,
    {
        Self {
            consumer: transport.clone(),
            publisher: transport,
        }
    }
}

/// Build the transport selected by `TRANSPORT_BACKEND`.
pub async fn create_transport(config: &Config) -> Transport {
    match config.transport_backend {
        TransportBackend::Sqs => {
            let transport = SqsTransport::from_config(config).await;
            Transport::from_arc(Arc::new(transport))
        }
        TransportBackend::Memory => {
            tracing::warn!(
                "Using in-memory transport; only publishers in this process can feed the queues"
            );
            Transport::from_arc(Arc::new(InMemoryTransport::new()))
        }
    }
}

//! Amazon SQS transport: one queue per consuming stage.

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::DeleteMessageBatchRequestEntry;
use aws_sdk_sqs::Client;
use psry_core::{Config, PipelineError};
use psry_pipeline::{Delivery, HandOffPublisher, StageKind};
use std::collections::HashMap;
use std::time::Duration;

use super::{HandOffTransport, ReceivedMessage};

/// Receive and delete-batch limit imposed by SQS.
const SQS_BATCH_LIMIT: usize = 10;
const SQS_MAX_WAIT_SECONDS: u64 = 20;

#[derive(Clone)]
pub struct SqsTransport {
    client: Client,
    queues: HashMap<StageKind, String>,
}

impl SqsTransport {
    pub fn new(client: Client, queues: HashMap<StageKind, String>) -> Self {
        Self { client, queues }
    }

    /// Client for `AWS_REGION` with the queue URLs from the environment. Stages without a
    /// configured queue fail on first use.
    pub async fn from_config(config: &Config) -> Self {
        let sdk_config = psry_detection::aws::load_config(&config.aws_region).await;

        let queues = [
            (StageKind::FaceDetection, &config.face_detection_queue_url),
            (StageKind::TextExtraction, &config.text_extraction_queue_url),
            (StageKind::Translation, &config.translation_queue_url),
        ]
        .into_iter()
        .filter_map(|(stage, url)| url.clone().map(|url| (stage, url)))
        .collect();

        Self::new(Client::new(&sdk_config), queues)
    }

    fn queue_url(&self, stage: StageKind) -> Result<&str, PipelineError> {
        self.queues
            .get(&stage)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::Transport(format!("no queue configured for {}", stage)))
    }
}

fn transport_error<E>(action: &str, stage: StageKind, err: E) -> PipelineError
where
    E: std::error::Error,
{
    PipelineError::Transport(format!(
        "{} on {} queue failed: {}",
        action,
        stage,
        DisplayErrorContext(err)
    ))
}

#[async_trait]
impl HandOffPublisher for SqsTransport {
    async fn publish(&self, target: StageKind, body: String) -> Result<(), PipelineError> {
        let queue_url = self.queue_url(target)?;

        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| transport_error("send", target, e))?;

        tracing::debug!(
            stage = %target,
            message_id = output.message_id().unwrap_or_default(),
            "Hand-off published"
        );
        Ok(())
    }
}

#[async_trait]
impl HandOffTransport for SqsTransport {
    async fn receive(
        &self,
        stage: StageKind,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError> {
        let queue_url = self.queue_url(stage)?;
        let max_messages = max_messages.clamp(1, SQS_BATCH_LIMIT) as i32;
        let wait_seconds = wait.as_secs().min(SQS_MAX_WAIT_SECONDS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(|e| transport_error("receive", stage, e))?;

        let mut received = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let Some(receipt) = message.receipt_handle else {
                tracing::warn!(stage = %stage, "SQS message without receipt handle skipped");
                continue;
            };
            let message_id = message.message_id.unwrap_or_else(|| receipt.clone());
            received.push(ReceivedMessage {
                delivery: Delivery::new(message_id, message.body.unwrap_or_default()),
                receipt,
            });
        }

        Ok(received)
    }

    async fn acknowledge(
        &self,
        stage: StageKind,
        receipts: Vec<String>,
    ) -> Result<(), PipelineError> {
        let queue_url = self.queue_url(stage)?;

        for chunk in receipts.chunks(SQS_BATCH_LIMIT) {
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(i, receipt)| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(i.to_string())
                        .receipt_handle(receipt)
                        .build()
                        .map_err(|e| PipelineError::Transport(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let output = self
                .client
                .delete_message_batch()
                .queue_url(queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| transport_error("delete", stage, e))?;

            for failed in output.failed() {
                tracing::warn!(
                    stage = %stage,
                    entry = failed.id(),
                    code = failed.code(),
                    message = failed.message().unwrap_or_default(),
                    "SQS delete failed; message will be redelivered"
                );
            }
        }

        Ok(())
    }
}

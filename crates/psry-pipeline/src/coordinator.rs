//! Batch coordination
//!
//! A batch is a list of deliveries from one hand-off queue. Items are processed
//! independently with bounded fan-out; one item's failure never affects its siblings.
//! The resulting [`BatchReport`] tells the transport which messages to acknowledge and
//! which to leave for redelivery.

use futures::stream::{self, StreamExt};
use psry_core::PipelineError;
use std::future::Future;
use std::time::Duration;

use crate::handoff::StageKind;

/// One message received from a hand-off queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Transport-assigned identifier, used to acknowledge the message.
    pub message_id: String,
    pub body: String,
}

impl Delivery {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

/// Result of processing one delivery.
#[derive(Debug)]
pub struct ItemOutcome {
    /// Position of the delivery in its batch.
    pub index: usize,
    pub message_id: String,
    pub result: Result<(), PipelineError>,
}

/// Per-batch summary, in delivery order within each list.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Processed successfully.
    pub succeeded: Vec<String>,
    /// Failed permanently; acknowledged so they are not redelivered.
    pub dropped: Vec<String>,
    /// Failed transiently; left on the transport.
    pub retry: Vec<String>,
}

impl BatchReport {
    pub fn from_outcomes(stage: StageKind, outcomes: Vec<ItemOutcome>) -> Self {
        let mut report = BatchReport::default();

        for outcome in outcomes {
            match outcome.result {
                Ok(()) => report.succeeded.push(outcome.message_id),
                Err(err) => {
                    let recoverable = err.is_recoverable();
                    tracing::warn!(
                        stage = %stage,
                        index = outcome.index,
                        message_id = %outcome.message_id,
                        error_kind = err.kind(),
                        error = %err,
                        recoverable,
                        "Hand-off item failed"
                    );
                    if recoverable {
                        report.retry.push(outcome.message_id);
                    } else {
                        report.dropped.push(outcome.message_id);
                    }
                }
            }
        }

        tracing::info!(
            stage = %stage,
            succeeded = report.succeeded.len(),
            dropped = report.dropped.len(),
            retry = report.retry.len(),
            "Batch processed"
        );

        report
    }

    /// Messages to delete from the transport.
    pub fn acknowledged(&self) -> impl Iterator<Item = &str> {
        self.succeeded
            .iter()
            .chain(self.dropped.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.dropped.len() + self.retry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `handler` over every delivery with at most `concurrency` in flight.
pub async fn process_batch<F, Fut>(
    stage: StageKind,
    deliveries: Vec<Delivery>,
    concurrency: usize,
    handler: F,
) -> BatchReport
where
    F: Fn(Delivery) -> Fut,
    Fut: Future<Output = Result<(), PipelineError>>,
{
    let outcomes: Vec<ItemOutcome> = stream::iter(deliveries.into_iter().enumerate())
        .map(|(index, delivery)| {
            let message_id = delivery.message_id.clone();
            let work = handler(delivery);
            async move {
                ItemOutcome {
                    index,
                    message_id,
                    result: work.await,
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    BatchReport::from_outcomes(stage, outcomes)
}

/// Await `work`, failing with `PipelineError::Timeout` once `timeout` elapses.
pub async fn with_timeout<T, E, F>(
    operation: &str,
    timeout: Duration,
    work: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<PipelineError>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(PipelineError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

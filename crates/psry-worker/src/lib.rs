//! psry worker
//!
//! Pulls hand-off messages from the transport, runs them through a [`StageHandler`] and
//! acknowledges what the handler's [`BatchReport`] says to acknowledge.
//!
//! [`StageHandler`]: psry_pipeline::StageHandler
//! [`BatchReport`]: psry_pipeline::BatchReport

pub mod consumer;
pub mod transport;

pub use consumer::{ConsumerConfig, ConsumerHandle, StageConsumer};
pub use transport::{
    create_transport, HandOffTransport, InMemoryTransport, ReceivedMessage, SqsTransport,
    Transport,
};

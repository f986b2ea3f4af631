//! psry worker binary: runs one consumer per selected stage until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use psry_core::telemetry::init_tracing;
use psry_core::{Config, TransportBackend};
use psry_db::{create_record_store, RecordStore};
use psry_detection::AwsServices;
use psry_pipeline::{
    FaceDetectionStage, HandOffPublisher, StageHandler, StageKind, TextExtractionStage,
    TranslationStage,
};
use psry_worker::{create_transport, ConsumerConfig, StageConsumer};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "psry-worker", about = "Consume psry hand-off queues", version)]
struct Args {
    /// Stage queue to consume
    #[arg(long, value_enum, default_value_t = StageArg::All)]
    stage: StageArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StageArg {
    FaceDetection,
    TextExtraction,
    Translation,
    All,
}

impl StageArg {
    fn stages(self) -> Vec<StageKind> {
        match self {
            StageArg::FaceDetection => vec![StageKind::FaceDetection],
            StageArg::TextExtraction => vec![StageKind::TextExtraction],
            StageArg::Translation => vec![StageKind::Translation],
            StageArg::All => StageKind::ALL.to_vec(),
        }
    }
}

/// Queues a stage reads from or publishes to.
fn queues_used_by(stage: StageKind) -> &'static [StageKind] {
    match stage {
        StageKind::FaceDetection => &[StageKind::FaceDetection, StageKind::TextExtraction],
        StageKind::TextExtraction => &[StageKind::TextExtraction, StageKind::Translation],
        StageKind::Translation => &[StageKind::Translation],
    }
}

fn queue_url(config: &Config, stage: StageKind) -> Option<&str> {
    match stage {
        StageKind::FaceDetection => config.face_detection_queue_url.as_deref(),
        StageKind::TextExtraction => config.text_extraction_queue_url.as_deref(),
        StageKind::Translation => config.translation_queue_url.as_deref(),
    }
}

fn check_queues(config: &Config, stages: &[StageKind]) -> Result<()> {
    if config.transport_backend != TransportBackend::Sqs {
        return Ok(());
    }
    for stage in stages {
        for queue in queues_used_by(*stage) {
            if queue_url(config, *queue).is_none() {
                anyhow::bail!(
                    "{} queue URL is required to run the {} stage",
                    queue,
                    stage
                );
            }
        }
    }
    Ok(())
}

fn build_handler(
    stage: StageKind,
    config: &Config,
    services: &AwsServices,
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn HandOffPublisher>,
) -> Arc<dyn StageHandler> {
    let timeout = config.pipeline.service_timeout;
    let concurrency = config.pipeline.stage_concurrency;

    match stage {
        StageKind::FaceDetection => Arc::new(FaceDetectionStage::new(
            Arc::new(services.detector.clone()),
            store,
            publisher,
            config.filter.clone(),
            timeout,
            concurrency,
        )),
        StageKind::TextExtraction => Arc::new(TextExtractionStage::new(
            Arc::new(services.detector.clone()),
            store,
            publisher,
            config.filter.clone(),
            timeout,
            concurrency,
        )),
        StageKind::Translation => Arc::new(TranslationStage::new(
            Arc::new(services.language.clone()),
            Arc::new(services.translator.clone()),
            store,
            &config.pipeline,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_format);
    config.validate().context("Invalid configuration")?;

    let stages = args.stage.stages();
    check_queues(&config, &stages)?;

    tracing::info!(
        stages = ?stages.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        region = %config.aws_region,
        "Starting psry worker"
    );

    let store = create_record_store(&config)
        .await
        .context("Failed to initialize record store")?;
    let transport = create_transport(&config).await;
    let services = AwsServices::from_region(&config.aws_region).await;
    let consumer_config = ConsumerConfig::from_config(&config);

    let handles: Vec<_> = stages
        .iter()
        .map(|stage| {
            let handler = build_handler(
                *stage,
                &config,
                &services,
                store.clone(),
                transport.publisher.clone(),
            );
            StageConsumer::new(handler, transport.consumer.clone(), consumer_config.clone())
                .spawn()
        })
        .collect();

    shutdown_signal().await;

    for handle in handles {
        handle.shutdown().await;
    }

    tracing::info!("psry worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }

    tracing::info!("Shutting down consumers...");
}

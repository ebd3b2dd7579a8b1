mod broker;
mod command;
mod config;
mod reply;
mod testsystem;

use anyhow::{Context, Result};
use broker::{
    delivery_channel, spawn_reporter, BrokerAdapter, DeliverySender, MessageSink, MessageSource,
    RunSummary, StdioSink, StdioSource,
};
use clap::Parser;
use command::Dispatcher;
use config::{AgentConfig, BrokerKind, Cli};
use std::sync::Arc;
use testsystem::{InMemoryCatalog, SimulatedTestSystem, TestCatalog};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries replies in stdio mode
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Cli::parse().into_config();

    info!("Test agent starting");
    info!("  Broker: {:?}", config.broker.kind);
    info!("  Requests: {}", config.request_topic);
    info!("  Replies: {}", config.reply_topic);
    info!("  Dispatch mode: {:?}", config.dispatch_mode);

    let catalog: Arc<dyn TestCatalog> = match &config.catalog {
        Some(path) => {
            let catalog = InMemoryCatalog::load(path)
                .with_context(|| format!("Failed to load test catalog {}", path.display()))?;
            info!("Test catalog loaded from {}", path.display());
            Arc::new(catalog)
        }
        None => Arc::new(InMemoryCatalog::new()),
    };
    let client = Arc::new(SimulatedTestSystem::new(
        config.simulation.clone(),
        catalog.clone(),
    ));
    let dispatcher = Dispatcher::new(&config, client, catalog);

    let (reports, report_rx) = delivery_channel();
    let reporter = spawn_reporter(report_rx);

    let summary = match config.broker.kind {
        BrokerKind::Stdio => {
            let source = StdioSource::new(config.request_topic.clone())?;
            let sink = StdioSink::new(reports);
            serve(&config, source, sink, dispatcher).await
        }
        BrokerKind::Kafka => run_kafka(&config, reports, dispatcher).await?,
    };

    info!(
        "Processed {} command(s): {} published, {} fallback, {} suppressed, {} malformed",
        summary.received,
        summary.published,
        summary.fallbacks,
        summary.suppressed,
        summary.malformed
    );
    if summary.transport_errors > 0 || summary.publish_errors > 0 {
        warn!(
            "{} transport error(s), {} publish error(s)",
            summary.transport_errors, summary.publish_errors
        );
    }

    match tokio::time::timeout(config.flush_timeout, reporter).await {
        Ok(Ok(stats)) => info!(
            "Delivery reports: {} delivered, {} failed",
            stats.delivered, stats.failed
        ),
        Ok(Err(e)) => error!("Delivery reporter failed: {}", e),
        Err(_) => warn!("Delivery reports still outstanding at exit"),
    }

    Ok(())
}

#[cfg(feature = "kafka")]
async fn run_kafka(
    config: &AgentConfig,
    reports: DeliverySender,
    dispatcher: Dispatcher,
) -> Result<RunSummary> {
    let source = broker::KafkaSource::subscribe(&config.broker, &config.request_topic)?;
    let sink = broker::KafkaSink::connect(&config.broker, reports)?;
    Ok(serve(config, source, sink, dispatcher).await)
}

#[cfg(not(feature = "kafka"))]
async fn run_kafka(
    _config: &AgentConfig,
    _reports: DeliverySender,
    _dispatcher: Dispatcher,
) -> Result<RunSummary> {
    anyhow::bail!("Kafka transport not available: rebuild with `--features kafka`")
}

/// Run the adapter until a shutdown signal or end of input
async fn serve<S, P>(config: &AgentConfig, source: S, sink: P, dispatcher: Dispatcher) -> RunSummary
where
    S: MessageSource,
    P: MessageSink,
{
    BrokerAdapter::new(config, source, sink, dispatcher)
        .run(shutdown_signal())
        .await
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

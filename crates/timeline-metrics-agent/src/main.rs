// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;
mod listener;

use std::env;
use std::sync::Arc;

use timeline_metrics::{MetricWriter, WriterConfig};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;
use crate::listener::{Listener, ListenerConfig};

pub fn main() {
    let log_level = env::var("TIMELINE_METRICS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let agent_config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid agent configuration: {e}");
            return;
        }
    };
    let writer_config = match WriterConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid metric writer configuration: {e}");
            return;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            return;
        }
    };

    // The sync writer's blocking client must be created and dropped outside the runtime.
    let writer = match MetricWriter::from_config(&writer_config, Some(runtime.handle().clone())) {
        Ok(writer) => Arc::new(writer),
        Err(e) => {
            error!("Failed to create metric writer: {e}");
            return;
        }
    };
    info!(
        "Reporting as {} on {} with the {} writer",
        writer_config.application_id, writer_config.host_name, writer_config.writer_type
    );

    runtime.block_on(run(agent_config, Arc::clone(&writer)));
    drop(runtime);
    drop(writer);
}

async fn run(config: AgentConfig, writer: Arc<MetricWriter>) {
    let cancel_token = CancellationToken::new();
    let listener_config = ListenerConfig {
        host: config.host.clone(),
        port: config.port,
    };
    let listener =
        match Listener::new(&listener_config, Arc::clone(&writer), cancel_token.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind listener to {}:{}: {e}",
                    config.host, config.port
                );
                return;
            }
        };
    if let Some(addr) = listener.local_addr() {
        info!("timeline-metrics-agent: listening on {addr}");
    }
    let listener_task = tokio::spawn(listener.spin());

    let mut flush_interval = interval(config.flush_interval);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            _ = flush_interval.tick() => flush(&writer).await,
            result = &mut shutdown_signal => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {e}");
                }
                info!("Shutting down, flushing remaining metrics");
                break;
            }
        }
    }

    cancel_token.cancel();
    if let Err(e) = listener_task.await {
        error!("Listener task failed: {e}");
    }
    shutdown(&writer).await;
}

/// Flushes what is still buffered, then closes the buffer and both pools.
async fn shutdown(writer: &Arc<MetricWriter>) {
    flush(writer).await;
    writer.buffer().close();
    writer.pool().close();
    debug!("Metric writer closed");
}

async fn flush(writer: &Arc<MetricWriter>) {
    debug!("Flushing timeline metrics");
    let writer = Arc::clone(writer);
    match tokio::task::spawn_blocking(move || writer.flush_now()).await {
        Ok(Some(dispatch)) => {
            if let Err(e) = dispatch.outcome().await {
                debug!("Flush completed with error: {e}");
            }
        }
        Ok(None) => debug!("No timeline metrics to flush"),
        Err(e) => error!("Flush task failed: {e}"),
    }
}

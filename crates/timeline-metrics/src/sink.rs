// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dispatch strategies for flushed batches.
//!
//! A [`Sink`] takes ownership of a [`PooledTimelineMetrics`] batch and is responsible for
//! releasing it once the transport is done with it. Dropping the handle is the release, so
//! each strategy only has to decide *when* the drop happens.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::collector::{AsyncMetricsTransport, MetricsTransport};
use crate::errors::{ConfigError, TransportError};
use crate::pool::PooledTimelineMetrics;

pub trait Sink: Send + Sync {
    fn dispatch(&self, metrics: PooledTimelineMetrics) -> Dispatch;
}

/// Completion of a [`Sink::dispatch`] call.
///
/// By the time the outcome is observable the batch has already been returned to its pool.
#[derive(Debug)]
pub enum Dispatch {
    /// The transport call finished before `dispatch` returned.
    Completed(Result<(), TransportError>),
    /// The transport call runs on a runtime task and reports here when done.
    Pending(oneshot::Receiver<Result<(), TransportError>>),
}

impl Dispatch {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Dispatch::Pending(_))
    }

    pub async fn outcome(self) -> Result<(), TransportError> {
        match self {
            Dispatch::Completed(result) => result,
            Dispatch::Pending(receiver) => {
                receiver.await.unwrap_or(Err(TransportError::Cancelled))
            }
        }
    }

    /// Blocks the current thread until the outcome is known.
    ///
    /// Must not be called from within an async execution context.
    pub fn wait(self) -> Result<(), TransportError> {
        match self {
            Dispatch::Completed(result) => result,
            Dispatch::Pending(receiver) => receiver
                .blocking_recv()
                .unwrap_or(Err(TransportError::Cancelled)),
        }
    }
}

/// Sends each batch on the calling thread.
pub struct SyncSink<T> {
    transport: T,
}

impl<T: MetricsTransport> SyncSink<T> {
    pub fn new(transport: T) -> Self {
        SyncSink { transport }
    }

    #[cfg(test)]
    fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: MetricsTransport> Sink for SyncSink<T> {
    fn dispatch(&self, metrics: PooledTimelineMetrics) -> Dispatch {
        let result = self.transport.put_metrics(&metrics);
        match &result {
            Ok(()) => debug!("Sent {} timeline metrics", metrics.len()),
            Err(e) => error!("Failed to send {} timeline metrics: {e}", metrics.len()),
        }
        drop(metrics);
        Dispatch::Completed(result)
    }
}

/// Sends each batch from a task spawned on a tokio runtime and returns immediately.
pub struct AsyncSink<T> {
    transport: Arc<T>,
    runtime: Handle,
}

impl<T: AsyncMetricsTransport + 'static> AsyncSink<T> {
    pub fn new(transport: T, runtime: Handle) -> Self {
        AsyncSink {
            transport: Arc::new(transport),
            runtime,
        }
    }

    /// Spawns onto the runtime the caller is running in.
    pub fn current(transport: T) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::new(transport, runtime))
    }
}

impl<T: AsyncMetricsTransport + 'static> Sink for AsyncSink<T> {
    fn dispatch(&self, metrics: PooledTimelineMetrics) -> Dispatch {
        let (tx, rx) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        self.runtime.spawn(async move {
            let result = transport.put_metrics(&metrics).await;
            match &result {
                Ok(()) => debug!("Sent {} timeline metrics", metrics.len()),
                Err(e) => error!("Failed to send {} timeline metrics: {e}", metrics.len()),
            }
            drop(metrics);
            // Nobody waiting on the outcome is fine.
            let _ = tx.send(result);
        });
        Dispatch::Pending(rx)
    }
}

/// Logs each batch as pretty-printed JSON instead of sending it. Used by the `dummy` writer.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

impl Sink for LoggingSink {
    fn dispatch(&self, metrics: PooledTimelineMetrics) -> Dispatch {
        let result = serde_json::to_string_pretty(&metrics)
            .map(|json| info!("Send new metrics:\n{json}"))
            .map_err(TransportError::from);
        if let Err(e) = &result {
            error!("Failed to serialize timeline metrics: {e}");
        }
        drop(metrics);
        Dispatch::Completed(result)
    }
}

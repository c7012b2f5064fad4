// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP listener feeding samples to a [`MetricWriter`].
//!
//! Each datagram holds one or more newline-separated samples in the `name:value[|T<millis>]`
//! form. Malformed lines are logged and skipped; the rest of the datagram is still processed.

use std::net::SocketAddr;
use std::sync::Arc;

use timeline_metrics::metric::{parse, Sample};
use timeline_metrics::MetricWriter;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

// Largest datagram read at once. Longer datagrams are truncated by the socket.
const BUFFER_SIZE: usize = 8192;

pub struct ListenerConfig {
    /// Host to bind the UDP socket to (e.g., "127.0.0.1")
    pub host: String,
    /// Port to bind the UDP socket to. 0 picks a free port
    pub port: u16,
}

enum BufferReader {
    UdpSocket(UdpSocket),
    /// Replays a fixed buffer
    #[cfg(test)]
    MirrorTest(Vec<u8>, SocketAddr),
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = [0; BUFFER_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                Ok((buf[..amt].to_owned(), src))
            }
            #[cfg(test)]
            BufferReader::MirrorTest(data, src) => Ok((data.clone(), *src)),
        }
    }
}

pub struct Listener {
    cancel_token: CancellationToken,
    writer: Arc<MetricWriter>,
    buffer_reader: BufferReader,
}

impl Listener {
    pub async fn new(
        config: &ListenerConfig,
        writer: Arc<MetricWriter>,
        cancel_token: CancellationToken,
    ) -> std::io::Result<Listener> {
        let socket = UdpSocket::bind((config.host.as_str(), config.port)).await?;
        Ok(Listener {
            cancel_token,
            writer,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.buffer_reader {
            BufferReader::UdpSocket(socket) => socket.local_addr().ok(),
            #[cfg(test)]
            BufferReader::MirrorTest(..) => None,
        }
    }

    /// Receives and buffers samples until the cancel token fires.
    pub async fn spin(self) {
        while !self.cancel_token.is_cancelled() {
            self.consume().await;
        }
        debug!("Listener stopped");
    }

    /// Receives one datagram and hands its samples to the writer.
    async fn consume(&self) {
        let read = tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => return,
            read = self.buffer_reader.read() => read,
        };
        let (buf, src) = match read {
            Ok(received) => received,
            Err(e) => {
                error!("Failed to receive metrics: {e}");
                return;
            }
        };

        let msgs = match std::str::from_utf8(&buf) {
            Ok(msgs) => msgs,
            Err(e) => {
                error!("Dropping datagram from {src}: {e}");
                return;
            }
        };
        trace!("Received message: {} from {}", msgs, src);

        let samples = parse_samples(msgs);
        if !samples.is_empty() {
            self.insert_samples(samples).await;
        }
    }

    // set() may flush and block on the collector, so it runs off the async workers
    async fn insert_samples(&self, samples: Vec<Sample>) {
        debug!("Inserting {} samples into metric buffer", samples.len());
        let writer = Arc::clone(&self.writer);
        let inserted = tokio::task::spawn_blocking(move || {
            for sample in samples {
                writer.set(sample);
            }
        })
        .await;
        if let Err(e) = inserted {
            error!("Failed to insert samples: {e}");
        }
    }
}

fn parse_samples(msgs: &str) -> Vec<Sample> {
    msgs.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match parse(line) {
            Ok(sample) => Some(sample),
            Err(e) => {
                error!("Failed to parse metric {}: {}", line, e);
                None
            }
        })
        .collect()
}

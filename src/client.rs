//! Client facade: one instance per delivery destination.
//!
//! A client owns its configuration, the per-client buffer sizing hint, the
//! bounded retry queue and the lazily created transport. Every call site
//! sees one operation: encode the given ops, try to send, and either drain
//! the queue opportunistically (success) or move the record into the queue
//! (failure). Nothing here ever terminates the process; every failure
//! degrades to "try again next cycle".
//!
//! All methods take `&mut self`: one client has at most one in-flight
//! operation, and concurrent destinations are separate clients.

use crate::config::{ClientConfig, ConfigError, Destination};
use crate::encode::{EncodeError, RecordOp, SizeHint, encode_ops};
use crate::queue::RetryQueue;
use crate::sender::{
    DRAIN_BATCH, InfluxTransport, PushTransport, TransportError, is_success, send_udp_line,
};
use bytes::Bytes;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    /// The record could not be encoded; nothing was sent or queued.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The send attempt failed; the record was handed to the retry queue.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered with a non-2xx status; the record was queued.
    #[error("write rejected with status {status}")]
    Rejected { status: u16 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

enum ActiveTransport {
    Influx(InfluxTransport),
    Push(PushTransport),
}

pub struct Client {
    config: ClientConfig,
    hint: SizeHint,
    queue: RetryQueue,
    transport: Option<ActiveTransport>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let queue = RetryQueue::new(config.queue_capacity);
        Ok(Self {
            config,
            hint: SizeHint::new(),
            queue,
            transport: None,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_file(path)?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Records currently waiting in the retry queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Records lost to a full retry queue.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Whether a push destination has fallen back to plain HTTP for good.
    pub fn is_downgraded(&self) -> bool {
        matches!(
            self.transport.as_ref(),
            Some(ActiveTransport::Push(t)) if t.is_downgraded()
        )
    }

    /// Encodes the ops into one payload and delivers it. An empty op list
    /// degenerates to [`Client::keepalive`].
    pub async fn post(&mut self, ops: &[RecordOp<'_>]) -> Result<(), ClientError> {
        let line = encode_ops(&mut self.hint, ops)?;
        if line.is_empty() {
            return self.keepalive().await;
        }
        self.send_line(line).await
    }

    /// Delivers one already-finalized payload. On success the queue is
    /// drained opportunistically; on failure the payload moves into the
    /// queue (or is dropped if the queue is full, which the queue logs
    /// and counts). The returned error is always the send failure itself.
    pub async fn send_line(&mut self, line: Bytes) -> Result<(), ClientError> {
        match self.try_send(&line).await {
            Ok(status) if is_success(status) => {
                self.drain().await;
                Ok(())
            }
            Ok(status) => {
                warn!(
                    status,
                    record = %String::from_utf8_lossy(&line),
                    "delivery rejected, queueing record"
                );
                let _ = self.queue.enqueue(line);
                Err(ClientError::Rejected { status })
            }
            Err(e) => {
                warn!(error = %e, "delivery failed, queueing record");
                let _ = self.queue.enqueue(line);
                Err(e.into())
            }
        }
    }

    /// Retries queued records from the head, in order, stopping at the
    /// first failure or after [`DRAIN_BATCH`] entries. A failed entry goes
    /// back to the head so order is preserved.
    pub async fn drain(&mut self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }
        info!(remaining = self.queue.len(), "draining queued records");
        let mut drained = 0;
        while drained < DRAIN_BATCH {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            match self.try_send(entry.line()).await {
                Ok(status) if is_success(status) => drained += 1,
                Ok(status) => {
                    warn!(status, "drain stopped, resend rejected");
                    self.queue.push_front(entry);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "drain stopped, resend failed");
                    self.queue.push_front(entry);
                    break;
                }
            }
        }
        if drained > 0 {
            info!(
                drained,
                remaining = self.queue.len(),
                "queued records delivered"
            );
        }
        drained
    }

    /// Drains until the queue is empty or a resend fails.
    pub async fn drain_all(&mut self) -> usize {
        let mut total = 0;
        loop {
            let drained = self.drain().await;
            total += drained;
            // A batch cut short means either an empty queue or a failure.
            if drained < DRAIN_BATCH {
                break;
            }
        }
        total
    }

    /// Zero-payload call: services the push channel's keep-alive (and may
    /// establish it). A no-op for per-call HTTP destinations.
    pub async fn keepalive(&mut self) -> Result<(), ClientError> {
        match &self.config.destination {
            Destination::Push(_) => {
                let status = self.try_send(&[]).await?;
                if is_success(status) {
                    Ok(())
                } else {
                    Err(ClientError::Rejected { status })
                }
            }
            Destination::Influx(_) => Ok(()),
        }
    }

    /// Encodes the ops and fires them as one UDP datagram. No response,
    /// no queueing; only valid for an InfluxDB destination.
    pub async fn send_udp(&mut self, ops: &[RecordOp<'_>]) -> Result<(), ClientError> {
        let line = encode_ops(&mut self.hint, ops)?;
        if line.is_empty() {
            return Ok(());
        }
        let Destination::Influx(influx) = &self.config.destination else {
            return Err(ClientError::Config(ConfigError::InvalidConfig(
                "UDP delivery requires an InfluxDB destination".into(),
            )));
        };
        send_udp_line(&influx.host, influx.port(), &line).await?;
        Ok(())
    }

    /// Best-effort final drain, then a clean transport teardown. Records
    /// still queued afterwards are lost and logged as such.
    pub async fn shutdown(&mut self) {
        self.drain_all().await;
        if !self.queue.is_empty() {
            warn!(
                remaining = self.queue.len(),
                "shutting down with undelivered records"
            );
        }
        if let Some(ActiveTransport::Push(t)) = self.transport.as_mut() {
            t.close().await;
        }
    }

    async fn try_send(&mut self, line: &[u8]) -> Result<u16, TransportError> {
        let config = &self.config;
        let transport = self.transport.get_or_insert_with(|| match &config.destination {
            Destination::Influx(c) => ActiveTransport::Influx(InfluxTransport::new(c.clone())),
            Destination::Push(c) => ActiveTransport::Push(PushTransport::new(c.clone())),
        });
        match transport {
            ActiveTransport::Influx(t) => t.send(line).await,
            ActiveTransport::Push(t) => t.send(line).await,
        }
    }
}

//! Client side of an interoperability channel.
//!
//! One persistent socket, one request in flight. A call writes its request
//! frame and then waits for the very next frame on the same socket; there is
//! no request id, so the socket is held under a lock for the whole round trip
//! and later callers queue behind it.
//!
//! When a call times out or the peer disconnects the socket is discarded and
//! every caller that was already queued fails with
//! [`ProtocolError::ChannelReset`]. The next call made after that reconnects.

use crate::config::{RpcConfig, MAX_FRAME_SIZE};
use crate::core::codec::FrameCodec;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::interop::message::{InteropRequest, Interoperation};
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::with_timeout_error;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

type Connection = Framed<TcpStream, FrameCodec>;

pub struct RpcChannel {
    address: String,
    call_timeout: Duration,
    connect_timeout: Duration,
    max_frame_size: usize,
    connection: Mutex<Option<Connection>>,
    /// Bumped every time the socket is discarded
    resets: AtomicU64,
    metrics: Option<Arc<Metrics>>,
}

impl RpcChannel {
    pub fn new(address: impl Into<String>, config: &RpcConfig) -> Self {
        Self {
            address: address.into(),
            call_timeout: config.call_timeout,
            connect_timeout: config.connect_timeout,
            max_frame_size: MAX_FRAME_SIZE,
            connection: Mutex::new(None),
            resets: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of times the socket has been discarded
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Acquire)
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Drop the socket; queued callers fail and the next call reconnects.
    pub async fn disconnect(&self) {
        let mut guard = self.connection.lock().await;
        if guard.take().is_some() {
            self.resets.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Send a typed request and decode its reply.
    pub async fn request<R: InteropRequest>(&self, request: &R) -> Result<R::Response> {
        let mut reply = self.send(request.to_packet()).await?;
        R::decode_response(&mut reply)
    }

    /// Send `payload` tagged with `kind`; returns the untagged reply payload.
    pub async fn call(&self, kind: Interoperation, payload: &Packet) -> Result<Packet> {
        let mut body = Packet::with_capacity(payload.len() + 1);
        body.write(kind as u8).write_bytes(payload.as_bytes());
        self.send(body).await
    }

    /// Send a full request body (kind tag included) and wait for the reply.
    #[instrument(skip(self, body), fields(address = %self.address, len = body.len()), level = "debug")]
    pub async fn send(&self, body: Packet) -> Result<Packet> {
        let generation = self.resets.load(Ordering::Acquire);
        let mut guard = self.connection.lock().await;

        // The socket we queued for died while we waited
        if self.resets.load(Ordering::Acquire) != generation {
            self.record_failure();
            return Err(ProtocolError::ChannelReset);
        }

        if let Some(metrics) = &self.metrics {
            metrics.rpc_call();
        }
        let _timer = Timer::start("interop_call");

        if guard.is_none() {
            match self.connect().await {
                Ok(connection) => *guard = Some(connection),
                Err(e) => {
                    self.resets.fetch_add(1, Ordering::AcqRel);
                    self.record_failure();
                    warn!(address = %self.address, error = %e, "Interoperability connect failed");
                    return Err(e);
                }
            }
        }

        let Some(connection) = guard.as_mut() else {
            return Err(ProtocolError::ConnectionClosed);
        };

        let outcome = with_timeout_error(
            async {
                connection.send(body).await?;
                connection
                    .next()
                    .await
                    .ok_or(ProtocolError::ConnectionClosed)?
            },
            self.call_timeout,
        )
        .await;

        match outcome {
            Ok(reply) => Ok(reply),
            Err(e) => {
                // Never read a late reply as the answer to the next request
                *guard = None;
                self.resets.fetch_add(1, Ordering::AcqRel);
                self.record_failure();
                warn!(address = %self.address, error = %e, "Interoperability call failed, channel reset");
                Err(e)
            }
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = with_timeout_error(
            async { Ok(TcpStream::connect(&self.address).await?) },
            self.connect_timeout,
        )
        .await?;
        stream.set_nodelay(true)?;
        debug!(address = %self.address, "Interoperability channel connected");
        Ok(Framed::new(stream, FrameCodec::new(self.max_frame_size)))
    }

    fn record_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.rpc_failure();
        }
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("address", &self.address)
            .field("call_timeout", &self.call_timeout)
            .field("resets", &self.resets())
            .finish()
    }
}

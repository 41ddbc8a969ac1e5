//! Serving side of interoperability channels.
//!
//! Every accepted socket is served sequentially: read one request frame, route
//! it by its kind tag, write exactly one reply frame, repeat. An unknown kind
//! or a failing handler closes the socket, which the caller observes as a
//! disconnect.

use crate::core::codec::FrameCodec;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::interop::message::{InteropRequest, Interoperation};
use crate::transport::server::{accept_loop, ServerOptions};
use crate::utils::metrics::Metrics;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, trace, warn};

#[async_trait]
pub trait InteropHandler: Send + Sync {
    /// Handle one request; `request` is positioned after the kind tag.
    async fn handle(&self, request: &mut Packet) -> Result<Packet>;
}

/// Adapts an async function over a typed request into an [`InteropHandler`].
pub struct TypedHandler<R, F> {
    handler: F,
    _request: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R, F, Fut> InteropHandler for TypedHandler<R, F>
where
    R: InteropRequest + Send + 'static,
    R::Response: Send,
    F: Fn(R) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R::Response>> + Send,
{
    async fn handle(&self, request: &mut Packet) -> Result<Packet> {
        let request = R::decode(request)?;
        let response = (self.handler)(request).await?;
        Ok(R::response_packet(&response))
    }
}

pub fn typed<R, F, Fut>(handler: F) -> Arc<dyn InteropHandler>
where
    R: InteropRequest + Send + 'static,
    R::Response: Send,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Response>> + Send + 'static,
{
    Arc::new(TypedHandler {
        handler,
        _request: PhantomData,
    })
}

/// Kind → handler table for one listening process.
#[derive(Default)]
pub struct InteropRouter {
    handlers: HashMap<Interoperation, Arc<dyn InteropHandler>>,
    metrics: Option<Arc<Metrics>>,
}

impl InteropRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register(mut self, kind: Interoperation, handler: Arc<dyn InteropHandler>) -> Result<Self> {
        if self.handlers.insert(kind, handler).is_some() {
            return Err(ProtocolError::ConfigError(format!(
                "Interoperation {kind} registered twice"
            )));
        }
        Ok(self)
    }

    pub fn handles(&self, kind: Interoperation) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Route one request body (kind tag included) to its handler.
    pub async fn route(&self, mut request: Packet) -> Result<Packet> {
        let tag = request
            .read::<u8>()
            .map_err(|_| ProtocolError::InvalidHeader(constants::ERR_MISSING_INTEROP_KIND))?;
        let kind = Interoperation::try_from(tag)?;
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(ProtocolError::UnknownInteroperation(tag))?;

        trace!(%kind, len = request.remaining(), "Routing interoperation");
        let reply = handler.handle(&mut request).await?;
        if let Some(metrics) = &self.metrics {
            metrics.rpc_served();
        }
        Ok(reply)
    }
}

/// Serve interoperability requests on `listener` until shutdown.
pub async fn serve(
    listener: TcpListener,
    router: Arc<InteropRouter>,
    shutdown_rx: mpsc::Receiver<()>,
    options: ServerOptions,
) -> Result<()> {
    accept_loop(listener, shutdown_rx, options, move |stream, peer| {
        serve_connection(stream, peer, router.clone(), options.max_frame_size)
    })
    .await
}

#[instrument(skip(stream, router), fields(peer = %peer))]
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<InteropRouter>,
    max_frame_size: usize,
) {
    debug!("Interoperability peer connected");
    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_size));

    while let Some(frame) = framed.next().await {
        let request = match frame {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed interoperability frame");
                break;
            }
        };

        let reply = match router.route(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Interoperation failed, closing channel");
                break;
            }
        };

        if let Err(e) = framed.send(reply).await {
            warn!(error = %e, "Failed to write interoperation reply");
            break;
        }
    }

    debug!("Interoperability peer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::message::{ChannelUserLimit, MigrateClient};

    fn router() -> InteropRouter {
        InteropRouter::new()
            .register(
                Interoperation::ChannelUserLimitRequest,
                typed(|req: ChannelUserLimit| async move { Ok::<_, ProtocolError>(Some(u32::from(req.channel_id) * 10)) }),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn routes_by_kind() {
        let request = ChannelUserLimit {
            world_id: 0,
            channel_id: 3,
        }
        .to_packet();
        let mut reply = router().route(request).await.unwrap();
        assert_eq!(ChannelUserLimit::decode_response(&mut reply).unwrap(), Some(30));
    }

    #[tokio::test]
    async fn unregistered_kind_is_rejected() {
        let request = MigrateClient {
            world_id: 0,
            channel_id: 0,
        }
        .to_packet();
        let err = router().route(request).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownInteroperation(1)));
    }

    #[tokio::test]
    async fn empty_request_has_no_kind() {
        let err = router().route(Packet::new()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidHeader(_)));
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = router().register(
            Interoperation::ChannelUserLimitRequest,
            typed(|_: ChannelUserLimit| async move { Ok::<_, ProtocolError>(None) }),
        );
        assert!(result.is_err());
    }
}

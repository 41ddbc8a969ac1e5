//! TCP accept loop shared by client listeners and interoperability listeners.

use crate::config::TransportConfig;
use crate::error::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Limits applied by [`accept_loop`]
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub max_frame_size: usize,
    pub max_connections: usize,
    pub shutdown_timeout: Duration,
}

impl From<&TransportConfig> for ServerOptions {
    fn from(config: &TransportConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
            max_connections: config.max_connections,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

/// Decrements the live connection count when the connection task ends,
/// including by panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Accept connections until `shutdown_rx` fires, spawning `handler` for each.
///
/// On shutdown the loop stops accepting and waits up to
/// `options.shutdown_timeout` for live connections to finish. A dropped
/// shutdown sender counts as a shutdown signal.
#[instrument(skip_all, fields(local = ?listener.local_addr().ok()))]
pub async fn accept_loop<H, Fut>(
    listener: TcpListener,
    mut shutdown_rx: mpsc::Receiver<()>,
    options: ServerOptions,
    handler: H,
) -> Result<()>
where
    H: Fn(TcpStream, SocketAddr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down listener. Waiting for connections to close...");
                drain(&active, options.shutdown_timeout).await;
                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        if active.load(Ordering::Acquire) >= options.max_connections {
                            warn!(%peer, limit = options.max_connections, "Connection limit reached, refusing");
                            drop(stream);
                            continue;
                        }
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                        }

                        active.fetch_add(1, Ordering::AcqRel);
                        let guard = ActiveGuard(active.clone());
                        let connection = handler(stream, peer);
                        tokio::spawn(async move {
                            let _guard = guard;
                            connection.await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                    }
                }
            }
        }
    }
}

async fn drain(active: &AtomicUsize, limit: Duration) {
    let timeout = tokio::time::sleep(limit);
    tokio::pin!(timeout);

    loop {
        let connections = active.load(Ordering::Acquire);
        if connections == 0 {
            info!("All connections closed, shutting down");
            return;
        }

        tokio::select! {
            _ = &mut timeout => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                debug!(connections, "Waiting for connections to close");
            }
        }
    }
}

/// Turn ctrl-c into a shutdown signal for the returned receiver.
pub fn ctrl_c_shutdown() -> mpsc::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });
    shutdown_rx
}

//! Process wiring.
//!
//! A [`ProcessContext`] carries everything a packet event or interoperation
//! handler may touch: configuration, storage, topology, the session registry
//! and the channel to central. One instance is built per process and shared by
//! every connection task.
//!
//! The `serve_*` functions run a role on listeners the caller has already
//! bound; the `run_*` functions bind from configuration and stop on ctrl-c.

use crate::central::{self, WorldLinks};
use crate::config::NetworkConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::interop::channel::RpcChannel;
use crate::interop::message::ClientAuth;
use crate::interop::server as interop_server;
use crate::login;
use crate::protocol::dispatcher::Dispatcher;
use crate::registry::{LoginDirectory, SessionRegistry, Topology};
use crate::storage::Storage;
use crate::transport::connection::handle_client;
use crate::transport::server::{accept_loop, ctrl_c_shutdown, ServerOptions};
use crate::utils::logging::init_logging;
use crate::utils::metrics::Metrics;
use crate::world;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct ProcessContext {
    pub config: NetworkConfig,
    pub storage: Arc<dyn Storage>,
    pub topology: Topology,
    pub sessions: SessionRegistry,
    /// Only populated in the central process
    pub directory: LoginDirectory,
    pub central: Option<Arc<RpcChannel>>,
    pub metrics: Arc<Metrics>,
}

impl ProcessContext {
    pub fn new(config: NetworkConfig, storage: Arc<dyn Storage>) -> Self {
        let topology = Topology::from_config(&config.topology);
        let directory = LoginDirectory::with_migration_window(config.central.migration_window);
        Self {
            config,
            storage,
            topology,
            sessions: SessionRegistry::new(),
            directory,
            central: None,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Open (lazily) the interoperability channel to the configured central.
    pub fn connect_central(self) -> Self {
        let channel = RpcChannel::new(self.config.central.address(), &self.config.rpc)
            .with_max_frame_size(self.config.transport.max_frame_size)
            .with_metrics(self.metrics.clone());
        self.with_central(channel)
    }

    pub fn with_central(mut self, channel: RpcChannel) -> Self {
        self.central = Some(Arc::new(channel));
        self
    }

    pub fn central(&self) -> Result<&RpcChannel> {
        self.central
            .as_deref()
            .ok_or_else(|| ProtocolError::Unavailable(constants::ERR_CENTRAL_UNCONFIGURED.to_string()))
    }

    /// Tell central about a client's login state. Failures are logged and
    /// otherwise ignored.
    pub async fn report_client(&self, update: ClientAuth) {
        let Some(central) = &self.central else {
            return;
        };
        match central.request(&update).await {
            Ok(true) => {}
            Ok(false) => debug!(username = %update.username, "Central rejected client state"),
            Err(e) => debug!(username = %update.username, error = %e, "Failed to report client state"),
        }
    }

    fn server_options(&self) -> ServerOptions {
        ServerOptions::from(&self.config.transport)
    }
}

/// Accept game clients on `listener` and dispatch their frames.
pub async fn serve_clients(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    process: Arc<ProcessContext>,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let options = process.server_options();
    let metrics = process.metrics.clone();
    let result = accept_loop(listener, shutdown_rx, options, move |stream, remote| {
        handle_client(stream, remote, dispatcher.clone(), process.clone())
    })
    .await;
    metrics.log_metrics();
    result
}

pub async fn serve_login(
    listener: TcpListener,
    process: Arc<ProcessContext>,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let dispatcher = Arc::new(login::dispatcher()?);
    info!(address = ?listener.local_addr().ok(), "Login front-end listening");
    serve_clients(listener, dispatcher, process, shutdown_rx).await
}

/// Serve a channel: game clients on `client_listener`, interoperability
/// requests from central on `interop_listener`.
pub async fn serve_world(
    client_listener: TcpListener,
    interop_listener: TcpListener,
    process: Arc<ProcessContext>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let dispatcher = Arc::new(world::dispatcher()?);
    let router = Arc::new(world::interop_router(process.clone())?);
    let options = process.server_options();

    info!(
        world = process.config.world.world_id,
        channel = process.config.world.channel_id,
        clients = ?client_listener.local_addr().ok(),
        interop = ?interop_listener.local_addr().ok(),
        "Channel listening"
    );

    let (client_tx, client_rx) = mpsc::channel(1);
    let (interop_tx, interop_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let _ = shutdown_rx.recv().await;
        let _ = client_tx.send(()).await;
        let _ = interop_tx.send(()).await;
    });

    let interop = tokio::spawn(interop_server::serve(interop_listener, router, interop_rx, options));
    let clients = tokio::spawn(serve_clients(client_listener, dispatcher, process, client_rx));

    let (clients, interop) = tokio::join!(clients, interop);
    joined(clients)?;
    joined(interop)
}

pub async fn serve_central(
    listener: TcpListener,
    process: Arc<ProcessContext>,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let links = Arc::new(WorldLinks::new(&process));
    let router = Arc::new(central::interop_router(process.clone(), links)?);
    info!(address = ?listener.local_addr().ok(), "Central listening");
    let result = interop_server::serve(listener, router, shutdown_rx, process.server_options()).await;
    process.metrics.log_metrics();
    result
}

pub async fn run_login(config: NetworkConfig, storage: Arc<dyn Storage>) -> Result<()> {
    prepare(&config)?;
    let listener = TcpListener::bind(&config.login.address).await?;
    let process = Arc::new(ProcessContext::new(config, storage).connect_central());
    serve_login(listener, process, ctrl_c_shutdown()).await
}

pub async fn run_world(config: NetworkConfig, storage: Arc<dyn Storage>) -> Result<()> {
    prepare(&config)?;
    let world_id = config.world.world_id;
    let channel_id = config.world.channel_id;
    let entry = config.topology.channel(world_id, channel_id).ok_or_else(|| {
        ProtocolError::ConfigError(format!(
            "World {world_id} channel {channel_id} is not in the topology"
        ))
    })?;

    let client_listener = TcpListener::bind(("0.0.0.0", entry.port)).await?;
    let interop_listener = TcpListener::bind(("0.0.0.0", entry.interop_port)).await?;
    let process = Arc::new(ProcessContext::new(config, storage).connect_central());
    serve_world(client_listener, interop_listener, process, ctrl_c_shutdown()).await
}

pub async fn run_central(config: NetworkConfig, storage: Arc<dyn Storage>) -> Result<()> {
    prepare(&config)?;
    let listener = TcpListener::bind(config.central.address()).await?;
    let process = Arc::new(ProcessContext::new(config, storage));
    serve_central(listener, process, ctrl_c_shutdown()).await
}

/// Validate `config` and install its logger. A logger installed earlier by
/// the embedding binary is kept.
fn prepare(config: &NetworkConfig) -> Result<()> {
    config.validate_strict()?;
    if let Err(e) = init_logging(&config.logging) {
        warn!(error = %e, "Keeping existing logger");
    }
    Ok(())
}

fn joined(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| ProtocolError::Custom(format!("Server task failed: {e}")))?
}


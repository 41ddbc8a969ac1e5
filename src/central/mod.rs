//! # Central Broker
//!
//! Central owns the topology view every login front-end asks about, relays
//! user-count queries to the channel that can answer them, persists secondary
//! passwords and keeps the login directory.
//!
//! ```text
//! login ──MigrateClient──────▶ central (topology lookup)
//! login ──ChannelUserLimit───▶ central ──ChannelUserLimit──▶ channel
//! login ──ClientInitializeSPW▶ central (storage)
//! login ──ClientAuth─────────▶ central (directory)
//! ```

mod handlers;

pub use handlers::{channel_user_limit, client_auth, client_initialize_spw, migrate_client};

use crate::config::RpcConfig;
use crate::error::{constants, ProtocolError, Result};
use crate::interop::channel::RpcChannel;
use crate::interop::message::{
    ChannelUserLimit, ClientAuth, ClientInitializeSpw, Interoperation, MigrateClient,
};
use crate::interop::server::{typed, InteropRouter};
use crate::process::ProcessContext;
use crate::registry::ChannelEntry;
use crate::utils::metrics::Metrics;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Central → channel interoperability channels, one per (world, channel),
/// opened on first use. Calls on them wait `rpc.relay_timeout`, which stays
/// below the login side's own call timeout.
pub struct WorldLinks {
    channels: RwLock<HashMap<(u8, u8), Arc<RpcChannel>>>,
    rpc: RpcConfig,
    max_frame_size: usize,
    metrics: Arc<Metrics>,
}

fn poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::LockPoisoned(constants::ERR_WORLD_LINKS_LOCK)
}

impl WorldLinks {
    pub fn new(process: &ProcessContext) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            rpc: RpcConfig {
                call_timeout: process.config.rpc.relay_timeout,
                ..process.config.rpc.clone()
            },
            max_frame_size: process.config.transport.max_frame_size,
            metrics: process.metrics.clone(),
        }
    }

    /// Channel to the interoperability port of `entry`.
    pub fn link(&self, entry: &ChannelEntry) -> Result<Arc<RpcChannel>> {
        let key = (entry.world_id, entry.id);
        if let Some(channel) = self.channels.read().map_err(poisoned)?.get(&key) {
            return Ok(channel.clone());
        }

        let mut channels = self.channels.write().map_err(poisoned)?;
        let channel = channels.entry(key).or_insert_with(|| {
            Arc::new(
                RpcChannel::new(entry.interop_address().to_string(), &self.rpc)
                    .with_max_frame_size(self.max_frame_size)
                    .with_metrics(self.metrics.clone()),
            )
        });
        Ok(channel.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.channels.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Interoperation table served by the central process.
pub fn interop_router(process: Arc<ProcessContext>, links: Arc<WorldLinks>) -> Result<InteropRouter> {
    let migrate = process.clone();
    let limit = process.clone();
    let spw = process.clone();
    let auth = process.clone();

    InteropRouter::new()
        .with_metrics(process.metrics.clone())
        .register(
            Interoperation::MigrateClientRequest,
            typed(move |request: MigrateClient| {
                let process = migrate.clone();
                async move { migrate_client(&process, request) }
            }),
        )?
        .register(
            Interoperation::ChannelUserLimitRequest,
            typed(move |request: ChannelUserLimit| {
                let process = limit.clone();
                let links = links.clone();
                async move { channel_user_limit(&process, &links, request).await }
            }),
        )?
        .register(
            Interoperation::ClientInitializeSPWRequest,
            typed(move |request: ClientInitializeSpw| {
                let process = spw.clone();
                async move { client_initialize_spw(&process, request) }
            }),
        )?
        .register(
            Interoperation::ClientAuthRequest,
            typed(move |request: ClientAuth| {
                let process = auth.clone();
                async move { client_auth(&process, request) }
            }),
        )
}

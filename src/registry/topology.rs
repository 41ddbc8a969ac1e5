//! World/channel topology: where every channel listens and how full it was
//! the last time somebody asked.
//!
//! The map shape is fixed at startup from configuration. Only the per-channel
//! snapshot and host address change afterwards, and only through explicit
//! calls; nothing here refreshes itself.

use crate::config::TopologyConfig;
use crate::error::{constants, ProtocolError, Result};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::RwLock;
use std::time::Instant;

/// Last recorded user count for a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub user_count: u32,
    /// `None` until the first successful refresh
    pub refreshed_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub world_id: u8,
    pub id: u8,
    /// Address handed to migrating clients
    pub host: Ipv4Addr,
    pub port: u16,
    pub interop_host: Ipv4Addr,
    pub interop_port: u16,
    pub user_limit: u32,
    pub snapshot: ChannelSnapshot,
}

impl ChannelEntry {
    pub fn client_address(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn interop_address(&self) -> SocketAddr {
        SocketAddr::from((self.interop_host, self.interop_port))
    }

    pub fn is_full(&self, user_count: u32) -> bool {
        user_count >= self.user_limit
    }
}

#[derive(Debug, Clone)]
pub struct WorldEntry {
    pub id: u8,
    pub name: String,
    pub channels: BTreeMap<u8, ChannelEntry>,
}

#[derive(Debug, Default)]
pub struct Topology {
    worlds: RwLock<BTreeMap<u8, WorldEntry>>,
}

fn poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::LockPoisoned(constants::ERR_TOPOLOGY_LOCK)
}

impl Topology {
    pub fn from_config(config: &TopologyConfig) -> Self {
        let worlds = config
            .worlds
            .iter()
            .map(|world| {
                let channels = world
                    .channels
                    .iter()
                    .map(|ch| {
                        (
                            ch.id,
                            ChannelEntry {
                                world_id: world.id,
                                id: ch.id,
                                host: ch.host,
                                port: ch.port,
                                interop_host: ch.interop_host.unwrap_or(ch.host),
                                interop_port: ch.interop_port,
                                user_limit: ch.user_limit,
                                snapshot: ChannelSnapshot::default(),
                            },
                        )
                    })
                    .collect();
                (
                    world.id,
                    WorldEntry {
                        id: world.id,
                        name: world.name.clone(),
                        channels,
                    },
                )
            })
            .collect();

        Self {
            worlds: RwLock::new(worlds),
        }
    }

    pub fn channel(&self, world_id: u8, channel_id: u8) -> Result<Option<ChannelEntry>> {
        let worlds = self.worlds.read().map_err(poisoned)?;
        Ok(worlds
            .get(&world_id)
            .and_then(|w| w.channels.get(&channel_id))
            .cloned())
    }

    pub fn contains(&self, world_id: u8, channel_id: u8) -> Result<bool> {
        Ok(self.channel(world_id, channel_id)?.is_some())
    }

    pub fn channels(&self, world_id: u8) -> Result<Vec<ChannelEntry>> {
        let worlds = self.worlds.read().map_err(poisoned)?;
        Ok(worlds
            .get(&world_id)
            .map(|w| w.channels.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Every channel of every world, in id order
    pub fn all_channels(&self) -> Result<Vec<ChannelEntry>> {
        let worlds = self.worlds.read().map_err(poisoned)?;
        Ok(worlds
            .values()
            .flat_map(|w| w.channels.values().cloned())
            .collect())
    }

    pub fn snapshot(&self, world_id: u8, channel_id: u8) -> Result<Option<ChannelSnapshot>> {
        Ok(self.channel(world_id, channel_id)?.map(|c| c.snapshot))
    }

    /// Store a freshly obtained user count. Returns false for unknown channels.
    pub fn record_user_count(&self, world_id: u8, channel_id: u8, user_count: u32) -> Result<bool> {
        let mut worlds = self.worlds.write().map_err(poisoned)?;
        match worlds
            .get_mut(&world_id)
            .and_then(|w| w.channels.get_mut(&channel_id))
        {
            Some(channel) => {
                channel.snapshot = ChannelSnapshot {
                    user_count,
                    refreshed_at: Some(Instant::now()),
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Point a channel at a new host. Returns false for unknown channels.
    pub fn set_host(&self, world_id: u8, channel_id: u8, host: Ipv4Addr) -> Result<bool> {
        let mut worlds = self.worlds.write().map_err(poisoned)?;
        match worlds
            .get_mut(&world_id)
            .and_then(|w| w.channels.get_mut(&channel_id))
        {
            Some(channel) => {
                channel.host = host;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_from_default_config() {
        let topology = Topology::from_config(&TopologyConfig::default());
        let channel = topology.channel(0, 1).unwrap().unwrap();
        assert_eq!(channel.world_id, 0);
        assert_eq!(channel.snapshot.refreshed_at, None);
        assert!(topology.channel(0, 9).unwrap().is_none());
        assert!(topology.channel(3, 0).unwrap().is_none());
        assert_eq!(topology.all_channels().unwrap().len(), 2);
    }

    #[test]
    fn snapshot_refresh() {
        let topology = Topology::from_config(&TopologyConfig::default());
        assert!(topology.record_user_count(0, 0, 7).unwrap());
        assert!(!topology.record_user_count(0, 9, 7).unwrap());

        let snap = topology.snapshot(0, 0).unwrap().unwrap();
        assert_eq!(snap.user_count, 7);
        assert!(snap.refreshed_at.is_some());
    }

    #[test]
    fn host_update() {
        let topology = Topology::from_config(&TopologyConfig::default());
        let host = Ipv4Addr::new(10, 0, 0, 9);
        assert!(topology.set_host(0, 1, host).unwrap());
        assert_eq!(topology.channel(0, 1).unwrap().unwrap().host, host);
    }
}

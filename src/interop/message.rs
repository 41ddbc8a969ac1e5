//! Interoperation kinds and their payload shapes.
//!
//! Request body: `[kind u8][fields...]`. Reply body: fields only. All
//! integers little-endian, strings `u16`-length-prefixed.

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::session::{ClientSession, LoginStatus};
use crate::storage::AccountId;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Interoperation {
    ClientInitializeSPWRequest = 0,
    MigrateClientRequest = 1,
    ChannelUserLimitRequest = 2,
    ClientAuthRequest = 3,
}

impl TryFrom<u8> for Interoperation {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Interoperation::ClientInitializeSPWRequest),
            1 => Ok(Interoperation::MigrateClientRequest),
            2 => Ok(Interoperation::ChannelUserLimitRequest),
            3 => Ok(Interoperation::ClientAuthRequest),
            other => Err(ProtocolError::UnknownInteroperation(other)),
        }
    }
}

impl fmt::Display for Interoperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A typed interoperation request and the reply it expects.
pub trait InteropRequest: Sized {
    const KIND: Interoperation;
    type Response: Sized;

    fn encode(&self, packet: &mut Packet);

    fn decode(packet: &mut Packet) -> Result<Self>;

    fn encode_response(response: &Self::Response, packet: &mut Packet);

    fn decode_response(packet: &mut Packet) -> Result<Self::Response>;

    /// Full request body including the kind tag
    fn to_packet(&self) -> Packet {
        let mut packet = Packet::with_capacity(16);
        packet.write(Self::KIND as u8);
        self.encode(&mut packet);
        packet
    }

    fn response_packet(response: &Self::Response) -> Packet {
        let mut packet = Packet::with_capacity(8);
        Self::encode_response(response, &mut packet);
        packet
    }
}

/// Store the secondary password an account chose at character selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInitializeSpw {
    pub username: String,
    pub secondary_password: String,
}

impl InteropRequest for ClientInitializeSpw {
    const KIND: Interoperation = Interoperation::ClientInitializeSPWRequest;
    type Response = bool;

    fn encode(&self, packet: &mut Packet) {
        packet
            .write_string(&self.username)
            .write_string(&self.secondary_password);
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            username: packet.read_string()?,
            secondary_password: packet.read_string()?,
        })
    }

    fn encode_response(response: &bool, packet: &mut Packet) {
        packet.write_bool(*response);
    }

    fn decode_response(packet: &mut Packet) -> Result<bool> {
        packet.read_bool()
    }
}

/// Ask central where a channel can currently be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrateClient {
    pub world_id: u8,
    pub channel_id: u8,
}

/// `None` when the channel is unavailable
pub type MigrateClientResponse = Option<(Ipv4Addr, u16)>;

impl InteropRequest for MigrateClient {
    const KIND: Interoperation = Interoperation::MigrateClientRequest;
    type Response = MigrateClientResponse;

    fn encode(&self, packet: &mut Packet) {
        packet.write(self.world_id).write(self.channel_id);
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            world_id: packet.read()?,
            channel_id: packet.read()?,
        })
    }

    fn encode_response(response: &MigrateClientResponse, packet: &mut Packet) {
        match response {
            Some((address, port)) => {
                packet.write_bool(true).write_ipv4(*address).write(*port);
            }
            None => {
                packet.write_bool(false);
            }
        }
    }

    fn decode_response(packet: &mut Packet) -> Result<MigrateClientResponse> {
        if !packet.read_bool()? {
            return Ok(None);
        }
        Ok(Some((packet.read_ipv4()?, packet.read::<u16>()?)))
    }
}

/// Ask for the live user count of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelUserLimit {
    pub world_id: u8,
    pub channel_id: u8,
}

/// `None` when the count could not be obtained
pub type ChannelUserLimitResponse = Option<u32>;

impl InteropRequest for ChannelUserLimit {
    const KIND: Interoperation = Interoperation::ChannelUserLimitRequest;
    type Response = ChannelUserLimitResponse;

    fn encode(&self, packet: &mut Packet) {
        packet.write(self.world_id).write(self.channel_id);
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            world_id: packet.read()?,
            channel_id: packet.read()?,
        })
    }

    fn encode_response(response: &ChannelUserLimitResponse, packet: &mut Packet) {
        match response {
            Some(count) => {
                packet.write_bool(true).write(*count);
            }
            None => {
                packet.write_bool(false);
            }
        }
    }

    fn decode_response(packet: &mut Packet) -> Result<ChannelUserLimitResponse> {
        if !packet.read_bool()? {
            return Ok(None);
        }
        Ok(Some(packet.read::<u32>()?))
    }
}

/// Report a login front-end client's state to the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAuth {
    pub username: String,
    pub account_id: AccountId,
    pub login_status: LoginStatus,
    pub world_id: u8,
    pub channel_id: u8,
    pub remote_ip: Ipv4Addr,
}

impl ClientAuth {
    /// Directory update describing `session`; `None` before an account is bound.
    pub fn for_session(session: &ClientSession, login_status: LoginStatus) -> Option<Self> {
        let account = session.account.as_ref()?;
        Some(Self {
            username: account.username.clone(),
            account_id: account.id,
            login_status,
            world_id: session.world_id.unwrap_or_default(),
            channel_id: session.channel_id.unwrap_or_default(),
            remote_ip: session.remote_ipv4(),
        })
    }
}

impl InteropRequest for ClientAuth {
    const KIND: Interoperation = Interoperation::ClientAuthRequest;
    type Response = bool;

    fn encode(&self, packet: &mut Packet) {
        packet
            .write_string(&self.username)
            .write(self.account_id)
            .write(self.login_status as u8)
            .write(self.world_id)
            .write(self.channel_id)
            .write_ipv4(self.remote_ip);
    }

    fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            username: packet.read_string()?,
            account_id: packet.read()?,
            login_status: LoginStatus::try_from(packet.read::<u8>()?)?,
            world_id: packet.read()?,
            channel_id: packet.read()?,
            remote_ip: packet.read_ipv4()?,
        })
    }

    fn encode_response(response: &bool, packet: &mut Packet) {
        packet.write_bool(*response);
    }

    fn decode_response(packet: &mut Packet) -> Result<bool> {
        packet.read_bool()
    }
}

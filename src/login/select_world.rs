use super::packets::select_world_result;
use crate::core::packet::Packet;
use crate::error::Result;
use crate::protocol::event::{EventContext, PacketEvent, Validation};
use crate::protocol::session::Stage;
use crate::storage::CharacterRow;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use tracing::{debug, trace};

/// Marker byte clients send ahead of the world selection
const SELECT_WORLD_MARKER: u8 = 2;

/// Pick a world and channel and receive the character roster for it.
#[derive(Debug, Default)]
pub struct SelectWorld {
    world_id: u8,
    channel_id: u8,
    characters: Vec<CharacterRow>,
}

impl SelectWorld {
    pub fn create() -> Box<dyn PacketEvent> {
        Box::new(Self::default())
    }
}

#[async_trait]
impl PacketEvent for SelectWorld {
    fn validate(&mut self, packet: &mut Packet, ctx: &EventContext<'_>) -> Result<Validation> {
        let marker: u8 = packet.read()?;
        self.world_id = packet.read()?;
        self.channel_id = packet.read()?;
        let local_address: Ipv4Addr = packet.read_ipv4()?;

        if marker != SELECT_WORLD_MARKER {
            debug!(connection = ctx.session.id, marker, "Unexpected world selection marker");
        }
        trace!(connection = ctx.session.id, %local_address, "Client local address");

        if !matches!(
            ctx.session.stage,
            Stage::AuthenticatedAccount | Stage::CharacterListed
        ) {
            return Ok(Validation::Drop);
        }
        let Some(account_id) = ctx.session.account_id() else {
            return Ok(Validation::Drop);
        };

        let process = ctx.process;
        if !process.topology.contains(self.world_id, self.channel_id)? {
            debug!(
                connection = ctx.session.id,
                world = self.world_id,
                channel = self.channel_id,
                "Selected unknown world or channel"
            );
            return Ok(Validation::Drop);
        }

        self.characters = process.storage.characters(account_id, self.world_id)?;
        Ok(Validation::Accept)
    }

    async fn apply(&mut self, ctx: &mut EventContext<'_>) -> Result<()> {
        let ranking = ctx.process.config.login.ranking_enabled;
        let session = &mut *ctx.session;

        session.world_id = Some(self.world_id);
        session.channel_id = Some(self.channel_id);
        session.characters = std::mem::take(&mut self.characters);
        session.advance(Stage::CharacterListed)?;

        debug!(
            connection = session.id,
            world = self.world_id,
            channel = self.channel_id,
            characters = session.characters.len(),
            "World selected"
        );

        let reply = select_world_result(&session.characters, &session.secondary_password, ranking);
        ctx.write(reply);
        Ok(())
    }
}

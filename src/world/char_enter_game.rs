use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::interop::message::ClientAuth;
use crate::protocol::event::{EventContext, PacketEvent, Validation};
use crate::protocol::opcode::SendOp;
use crate::protocol::session::{AccountSession, LoginStatus, Stage};
use crate::registry::{FieldState, UserEntry};
use crate::storage::{AccountRow, CharacterId, CharacterRow};
use async_trait::async_trait;
use std::net::IpAddr;
use tracing::{info, warn};

/// A migrated client claims a character on this channel.
///
/// Nothing the login front-end decided is trusted here: the character and its
/// account are reloaded, and the account's last login address must be the
/// address this connection comes from.
#[derive(Debug, Default)]
pub struct CharEnterGame {
    character_id: CharacterId,
    character: Option<CharacterRow>,
    account: Option<AccountRow>,
}

impl CharEnterGame {
    pub fn create() -> Box<dyn PacketEvent> {
        Box::new(Self::default())
    }
}

fn same_host(a: IpAddr, b: IpAddr) -> bool {
    a.to_canonical() == b.to_canonical()
}

#[async_trait]
impl PacketEvent for CharEnterGame {
    fn validate(&mut self, packet: &mut Packet, ctx: &EventContext<'_>) -> Result<Validation> {
        self.character_id = packet.read()?;

        let session = &*ctx.session;
        if session.character_id.is_some() || session.stage != Stage::Connected {
            return Ok(Validation::Drop);
        }

        let process = ctx.process;
        let character = process
            .storage
            .character(self.character_id)?
            .ok_or_else(|| ProtocolError::NotFound(format!("Character {}", self.character_id)))?;
        let account = process
            .storage
            .account(character.account_id)?
            .ok_or_else(|| ProtocolError::NotFound(format!("Account {}", character.account_id)))?;

        let remote = session.remote_ip();
        match account.last_known_ip {
            Some(known) if same_host(known, remote) => {}
            known => {
                warn!(
                    account = account.id,
                    character = character.id,
                    known = ?known,
                    %remote,
                    "Account address does not match connection"
                );
                return Err(ProtocolError::TrustViolation(format!(
                    "{}: account {} from {remote}",
                    constants::ERR_SESSION_HIJACK,
                    account.id
                )));
            }
        }

        if character.world_id != process.config.world.world_id {
            return Err(ProtocolError::TrustViolation(format!(
                "{}: character {} is in world {}",
                constants::ERR_FOREIGN_CHARACTER,
                character.id,
                character.world_id
            )));
        }

        if process.sessions.contains_user(character.id)? {
            return Err(ProtocolError::AlreadyRegistered(format!(
                "Character {}",
                character.id
            )));
        }
        if let Some(owner) = process.sessions.account_connection(account.id)? {
            if owner != session.id {
                return Err(ProtocolError::AlreadyRegistered(format!(
                    "Account {} on connection {owner}",
                    account.id
                )));
            }
        }

        self.character = Some(character);
        self.account = Some(account);
        Ok(Validation::Accept)
    }

    async fn apply(&mut self, ctx: &mut EventContext<'_>) -> Result<()> {
        let (Some(character), Some(account)) = (self.character.take(), self.account.take()) else {
            return Err(ProtocolError::Custom("Character entry applied without validation".into()));
        };
        let process = ctx.process;
        let world = &process.config.world;
        let field = FieldState {
            field_id: character.field_id,
            portal: character.portal,
        };

        process.sessions.admit(UserEntry {
            character_id: character.id,
            account_id: account.id,
            connection_id: ctx.session.id,
            world_id: world.world_id,
            channel_id: world.channel_id,
            name: character.name.clone(),
            field,
        })?;

        let session = &mut *ctx.session;
        session.account = Some(AccountSession {
            id: account.id,
            username: account.username.clone(),
        });
        session.world_id = Some(world.world_id);
        session.channel_id = Some(world.channel_id);
        session.character_id = Some(character.id);
        session.advance(Stage::MigrationGranted)?;
        session.login_status = LoginStatus::InGame;
        process.metrics.migration_granted();

        info!(
            connection = session.id,
            character = character.id,
            name = %character.name,
            field = field.field_id,
            "Character entered the channel"
        );

        if let Some(update) = ClientAuth::for_session(session, LoginStatus::InGame) {
            process.report_client(update).await;
        }

        ctx.write(set_field(world.channel_id, &character));
        Ok(())
    }
}

/// First frame a character receives on a channel.
pub fn set_field(channel_id: u8, character: &CharacterRow) -> Packet {
    let mut packet = Packet::with_opcode(SendOp::SetField.code());
    packet
        .write(channel_id)
        .write(character.id)
        .write_string(&character.name)
        .write(character.level)
        .write(character.job)
        .write(character.field_id)
        .write(character.portal);
    packet
}

//! Character selection and the migration request that follows it.
//!
//! Three opcodes share one event: a plain selection (secondary password
//! disabled), a selection proven with the secondary password, and a selection
//! that registers the secondary password first. Once validated, apply asks
//! central for the channel's user count and its address and either hands the
//! client a migration ticket or refuses with a coded failure.

use super::packets::{
    broadcast_notice, select_character_failure, select_character_success, LoginFailure,
    MigrationTicket, SERVER_UNAVAILABLE_NOTICE,
};
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::interop::message::{ChannelUserLimit, ClientAuth, ClientInitializeSpw, MigrateClient};
use crate::process::ProcessContext;
use crate::protocol::event::{EventContext, PacketEvent, Validation};
use crate::protocol::session::{ClientSession, LoginStatus, SecondaryPassword, Stage};
use crate::storage::CharacterId;
use async_trait::async_trait;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Plain,
    WithSecondaryPassword,
    InitSecondaryPassword,
}

enum Negotiation {
    Granted(MigrationTicket),
    Refused(LoginFailure),
}

#[derive(Debug)]
pub struct SelectCharacter {
    mode: SelectMode,
    character_id: CharacterId,
    secondary_password: String,
}

impl SelectCharacter {
    pub fn new(mode: SelectMode) -> Self {
        Self {
            mode,
            character_id: 0,
            secondary_password: String::new(),
        }
    }

    pub fn plain() -> Box<dyn PacketEvent> {
        Box::new(Self::new(SelectMode::Plain))
    }

    pub fn with_secondary_password() -> Box<dyn PacketEvent> {
        Box::new(Self::new(SelectMode::WithSecondaryPassword))
    }

    pub fn init_secondary_password() -> Box<dyn PacketEvent> {
        Box::new(Self::new(SelectMode::InitSecondaryPassword))
    }

    async fn negotiate(
        &self,
        process: &ProcessContext,
        username: &str,
        world_id: u8,
        channel_id: u8,
    ) -> Result<Negotiation> {
        let Ok(central) = process.central() else {
            warn!("No central configured, refusing migration");
            return Ok(Negotiation::Refused(LoginFailure::ServerUnavailable));
        };

        if self.mode == SelectMode::InitSecondaryPassword {
            let request = ClientInitializeSpw {
                username: username.to_string(),
                secondary_password: self.secondary_password.clone(),
            };
            match central.request(&request).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(%username, "Central refused secondary password registration");
                    return Ok(Negotiation::Refused(LoginFailure::ServerUnavailable));
                }
                Err(e) => {
                    warn!(%username, error = %e, "Secondary password registration failed");
                    return Ok(Negotiation::Refused(LoginFailure::ServerUnavailable));
                }
            }
        }

        let Some(channel) = process.topology.channel(world_id, channel_id)? else {
            return Ok(Negotiation::Refused(LoginFailure::ServerUnavailable));
        };

        let limit = ChannelUserLimit {
            world_id,
            channel_id,
        };
        let user_count = match central.request(&limit).await {
            Ok(Some(count)) => {
                process
                    .topology
                    .record_user_count(world_id, channel_id, count)?;
                count
            }
            Ok(None) => channel.snapshot.user_count,
            Err(e) => {
                debug!(world = world_id, channel = channel_id, error = %e, "User count unavailable, using snapshot");
                channel.snapshot.user_count
            }
        };
        if channel.is_full(user_count) {
            info!(
                world = world_id,
                channel = channel_id,
                user_count,
                limit = channel.user_limit,
                "Channel is full"
            );
            return Ok(Negotiation::Refused(LoginFailure::TooManyConnections));
        }

        let migrate = MigrateClient {
            world_id,
            channel_id,
        };
        match central.request(&migrate).await {
            Ok(Some((address, port))) => Ok(Negotiation::Granted(MigrationTicket::issue(
                address,
                port,
                self.character_id,
            ))),
            Ok(None) => {
                warn!(world = world_id, channel = channel_id, "Channel unavailable for migration");
                Ok(Negotiation::Refused(LoginFailure::ServerUnavailable))
            }
            Err(e) => {
                warn!(world = world_id, channel = channel_id, error = %e, "Migration request failed");
                Ok(Negotiation::Refused(LoginFailure::ServerUnavailable))
            }
        }
    }
}

#[async_trait]
impl PacketEvent for SelectCharacter {
    fn validate(&mut self, packet: &mut Packet, ctx: &EventContext<'_>) -> Result<Validation> {
        match self.mode {
            SelectMode::Plain => {
                self.character_id = packet.read()?;
            }
            SelectMode::WithSecondaryPassword | SelectMode::InitSecondaryPassword => {
                self.secondary_password = packet.read_string()?;
                self.character_id = packet.read()?;
            }
        }

        let session = &*ctx.session;
        if session.stage != Stage::CharacterListed {
            return Ok(Validation::Drop);
        }

        match (self.mode, &session.secondary_password) {
            (SelectMode::Plain, SecondaryPassword::Disabled) => {}
            (SelectMode::Plain, _) => return Ok(Validation::Drop),
            (SelectMode::WithSecondaryPassword, SecondaryPassword::Set(_)) => {
                if !session.secondary_password.matches(&self.secondary_password) {
                    debug!(connection = session.id, "Secondary password mismatch");
                    return Ok(Validation::Deny(select_character_failure(
                        LoginFailure::WrongPassword,
                    )));
                }
            }
            (SelectMode::WithSecondaryPassword, _) => return Ok(Validation::Drop),
            (SelectMode::InitSecondaryPassword, SecondaryPassword::Unset) => {
                if self.secondary_password.is_empty() {
                    return Ok(Validation::Drop);
                }
            }
            (SelectMode::InitSecondaryPassword, _) => return Ok(Validation::Drop),
        }

        if session.owned_character(self.character_id).is_none() {
            debug!(
                connection = session.id,
                character = self.character_id,
                "Selected a character outside the roster"
            );
            return Ok(Validation::Deny(select_character_failure(
                LoginFailure::NotRegistered,
            )));
        }

        Ok(Validation::Accept)
    }

    async fn apply(&mut self, ctx: &mut EventContext<'_>) -> Result<()> {
        let process = ctx.process;
        let (Some(world_id), Some(channel_id), Some(username)) = (
            ctx.session.world_id,
            ctx.session.channel_id,
            ctx.session.username().map(str::to_string),
        ) else {
            return Err(ProtocolError::Custom("Character selected without a world".into()));
        };

        ctx.session.advance(Stage::MigrationRequested)?;

        let outcome = self
            .negotiate(process, &username, world_id, channel_id)
            .await?;

        match outcome {
            Negotiation::Granted(ticket) => {
                let session = &mut *ctx.session;
                if self.mode == SelectMode::InitSecondaryPassword {
                    session.secondary_password =
                        SecondaryPassword::Set(std::mem::take(&mut self.secondary_password));
                }
                session.login_status = LoginStatus::Migrating;
                session.advance(Stage::MigrationGranted)?;
                process.metrics.migration_granted();

                info!(
                    connection = session.id,
                    character = ticket.character_id,
                    address = %ticket.address,
                    port = ticket.port,
                    "Migration granted"
                );

                if let Some(update) = ClientAuth::for_session(session, LoginStatus::Migrating) {
                    process.report_client(update).await;
                }
                ctx.write(select_character_success(&ticket));
            }
            Negotiation::Refused(failure) => {
                ctx.session.deny();
                process.metrics.migration_denied();
                info!(
                    connection = ctx.session.id,
                    character = self.character_id,
                    ?failure,
                    "Migration denied"
                );

                ctx.write(select_character_failure(failure));
                if failure == LoginFailure::ServerUnavailable {
                    ctx.write(broadcast_notice(SERVER_UNAVAILABLE_NOTICE));
                }
                ctx.close();
            }
        }
        Ok(())
    }

    fn on_fault(&mut self, _error: &ProtocolError, session: &ClientSession) -> Option<Packet> {
        // Only a client that was mid-migration is waiting for a result
        (session.stage == Stage::MigrationRequested)
            .then(|| select_character_failure(LoginFailure::ServerUnavailable))
    }
}

//! # World / Channel Process
//!
//! A channel accepts clients that the login front-end has sent its way and
//! answers central's user-count queries for itself.

mod char_enter_game;

pub use char_enter_game::{set_field, CharEnterGame};

use crate::error::Result;
use crate::interop::message::{ChannelUserLimit, ChannelUserLimitResponse, Interoperation};
use crate::interop::server::{typed, InteropRouter};
use crate::process::ProcessContext;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::opcode::RecvOp;
use std::sync::Arc;
use tracing::debug;

/// Client events handled by a channel.
pub fn dispatcher() -> Result<Dispatcher> {
    Ok(Dispatcher::builder()
        .register(RecvOp::CharEnterGame, CharEnterGame::create)?
        .build())
}

/// Live user count for this channel; other channels are not ours to answer.
pub fn channel_user_count(
    process: &ProcessContext,
    request: ChannelUserLimit,
) -> Result<ChannelUserLimitResponse> {
    let own = &process.config.world;
    if (request.world_id, request.channel_id) != (own.world_id, own.channel_id) {
        debug!(
            world = request.world_id,
            channel = request.channel_id,
            "User count asked for another channel"
        );
        return Ok(None);
    }
    Ok(Some(process.sessions.user_count(own.world_id, own.channel_id)?))
}

/// Interoperation table served to central.
pub fn interop_router(process: Arc<ProcessContext>) -> Result<InteropRouter> {
    let metrics = process.metrics.clone();
    InteropRouter::new().with_metrics(metrics).register(
        Interoperation::ChannelUserLimitRequest,
        typed(move |request: ChannelUserLimit| {
            let process = process.clone();
            async move { channel_user_count(&process, request) }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::registry::{FieldState, UserEntry};
    use crate::storage::MemoryStorage;

    #[test]
    fn counts_only_own_channel() {
        let process = ProcessContext::new(NetworkConfig::default(), Arc::new(MemoryStorage::new()));
        for character_id in 1..=3 {
            process
                .sessions
                .register_user(UserEntry {
                    character_id,
                    account_id: character_id,
                    connection_id: u64::from(character_id),
                    world_id: 0,
                    channel_id: 0,
                    name: format!("user{character_id}"),
                    field: FieldState { field_id: 0, portal: 0 },
                })
                .unwrap();
        }

        let own = channel_user_count(&process, ChannelUserLimit { world_id: 0, channel_id: 0 });
        assert_eq!(own.unwrap(), Some(3));

        let other = channel_user_count(&process, ChannelUserLimit { world_id: 0, channel_id: 1 });
        assert_eq!(other.unwrap(), None);
    }

    #[test]
    fn dispatcher_handles_char_enter_game() {
        let dispatcher = dispatcher().unwrap();
        assert!(dispatcher.handles(RecvOp::CharEnterGame));
        assert!(!dispatcher.handles(RecvOp::CheckPassword));
    }
}

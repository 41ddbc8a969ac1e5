//! # Login Front-end
//!
//! Authenticates accounts, lists characters and negotiates the migration to a
//! channel with central.
//!
//! ```text
//! CheckPassword ─▶ SelectWorld ─▶ SelectCharacter[SPW|InitSPW]
//!                                   ├─ ClientInitializeSPW (init only)
//!                                   ├─ ChannelUserLimit
//!                                   └─ MigrateClient ─▶ ticket | coded failure
//! ```

mod check_password;
pub mod packets;
mod select_char;
mod select_world;

pub use check_password::CheckPassword;
pub use packets::{LoginFailure, MigrationTicket};
pub use select_char::{SelectCharacter, SelectMode};
pub use select_world::SelectWorld;

use crate::error::Result;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::opcode::RecvOp;

/// Client events handled by a login front-end.
pub fn dispatcher() -> Result<Dispatcher> {
    Ok(Dispatcher::builder()
        .register(RecvOp::CheckPassword, CheckPassword::create)?
        .register(RecvOp::SelectWorld, SelectWorld::create)?
        .register(RecvOp::SelectCharacter, SelectCharacter::plain)?
        .register(RecvOp::SelectCharacterSPW, SelectCharacter::with_secondary_password)?
        .register(RecvOp::SelectCharacterInitSPW, SelectCharacter::init_secondary_password)?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_login_opcodes_only() {
        let dispatcher = dispatcher().unwrap();
        for op in RecvOp::ALL {
            assert_eq!(dispatcher.handles(op), op != RecvOp::CharEnterGame, "{op}");
        }
    }
}

//! Per-connection session state.
//!
//! A [`ClientSession`] is created when a socket is accepted and dropped when
//! its connection task ends. It is only ever touched by that task, so it needs
//! no locking; anything other connections must see goes through the
//! registries instead.

use crate::error::{ProtocolError, Result};
use crate::registry::ConnectionId;
use crate::storage::{AccountId, CharacterId, CharacterRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Migration progress of one connection.
///
/// Login connections walk the whole chain. World connections jump from
/// `Connected` straight to `MigrationGranted` once the arriving character is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connected,
    AuthenticatedAccount,
    CharacterListed,
    MigrationRequested,
    MigrationGranted,
    MigrationDenied,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::MigrationGranted | Stage::MigrationDenied)
    }

    fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Connected, AuthenticatedAccount)
            | (AuthenticatedAccount, CharacterListed)
            | (CharacterListed, CharacterListed)
            | (CharacterListed, MigrationRequested)
            | (MigrationRequested, MigrationGranted)
            | (Connected, MigrationGranted) => true,
            (from, MigrationDenied) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Status reported to the central login directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginStatus {
    Offline = 0,
    LoggedIn = 1,
    Migrating = 2,
    InGame = 3,
}

impl TryFrom<u8> for LoginStatus {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LoginStatus::Offline),
            1 => Ok(LoginStatus::LoggedIn),
            2 => Ok(LoginStatus::Migrating),
            3 => Ok(LoginStatus::InGame),
            other => Err(ProtocolError::Custom(format!("Invalid login status {other}"))),
        }
    }
}

/// Secondary (PIC) password state for the logged-in account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryPassword {
    /// Feature turned off in configuration
    Disabled,
    /// Enabled, but the account has not chosen one yet
    Unset,
    Set(String),
}

impl SecondaryPassword {
    pub fn from_account(enabled: bool, stored: Option<&str>) -> Self {
        match (enabled, stored) {
            (false, _) => SecondaryPassword::Disabled,
            (true, Some(spw)) if !spw.is_empty() => SecondaryPassword::Set(spw.to_string()),
            (true, _) => SecondaryPassword::Unset,
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            SecondaryPassword::Set(spw) => spw == candidate,
            _ => false,
        }
    }

    /// Client-facing state byte: 0 disabled, 1 needs registration, 2 set
    pub fn code(&self) -> u8 {
        match self {
            SecondaryPassword::Disabled => 0,
            SecondaryPassword::Unset => 1,
            SecondaryPassword::Set(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSession {
    pub id: AccountId,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    pub id: ConnectionId,
    pub remote: SocketAddr,
    pub world_id: Option<u8>,
    pub channel_id: Option<u8>,
    pub account: Option<AccountSession>,
    /// Roster for the selected world
    pub characters: Vec<CharacterRow>,
    pub secondary_password: SecondaryPassword,
    pub login_status: LoginStatus,
    pub stage: Stage,
    /// Character played on this connection (world side)
    pub character_id: Option<CharacterId>,
}

impl ClientSession {
    pub fn new(id: ConnectionId, remote: SocketAddr) -> Self {
        Self {
            id,
            remote,
            world_id: None,
            channel_id: None,
            account: None,
            characters: Vec::new(),
            secondary_password: SecondaryPassword::Disabled,
            login_status: LoginStatus::Offline,
            stage: Stage::Connected,
            character_id: None,
        }
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.remote.ip()
    }

    /// Remote address as IPv4; IPv4-mapped IPv6 addresses are unwrapped,
    /// anything else maps to `0.0.0.0`.
    pub fn remote_ipv4(&self) -> Ipv4Addr {
        match self.remote.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account.as_ref().map(|a| a.id)
    }

    pub fn username(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.username.as_str())
    }

    /// The roster entry for `character_id`, if this account owns it
    pub fn owned_character(&self, character_id: CharacterId) -> Option<&CharacterRow> {
        self.characters.iter().find(|c| c.id == character_id)
    }

    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(ProtocolError::Custom(format!(
                "Illegal stage transition {:?} -> {:?}",
                self.stage, next
            )));
        }
        self.stage = next;
        Ok(())
    }

    /// End the current attempt. Terminal stages are left alone.
    pub fn deny(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = Stage::MigrationDenied;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClientSession {
        ClientSession::new(1, "10.0.0.5:50000".parse().unwrap())
    }

    #[test]
    fn login_path_transitions() {
        let mut s = session();
        s.advance(Stage::AuthenticatedAccount).unwrap();
        s.advance(Stage::CharacterListed).unwrap();
        s.advance(Stage::CharacterListed).unwrap();
        s.advance(Stage::MigrationRequested).unwrap();
        s.advance(Stage::MigrationGranted).unwrap();
        assert!(s.stage.is_terminal());
        assert!(s.advance(Stage::MigrationDenied).is_err());
    }

    #[test]
    fn stages_cannot_be_skipped() {
        let mut s = session();
        assert!(s.advance(Stage::CharacterListed).is_err());
        assert!(s.advance(Stage::MigrationRequested).is_err());
        assert_eq!(s.stage, Stage::Connected);
    }

    #[test]
    fn deny_keeps_terminal_state() {
        let mut s = session();
        s.deny();
        assert_eq!(s.stage, Stage::MigrationDenied);

        let mut granted = session();
        granted.advance(Stage::MigrationGranted).unwrap();
        granted.deny();
        assert_eq!(granted.stage, Stage::MigrationGranted);
    }

    #[test]
    fn secondary_password_state() {
        assert_eq!(
            SecondaryPassword::from_account(false, Some("1234")),
            SecondaryPassword::Disabled
        );
        assert_eq!(
            SecondaryPassword::from_account(true, None),
            SecondaryPassword::Unset
        );
        let set = SecondaryPassword::from_account(true, Some("1234"));
        assert!(set.matches("1234"));
        assert!(!set.matches("4321"));
        assert!(!SecondaryPassword::Unset.matches(""));
    }

    #[test]
    fn mapped_ipv6_is_unwrapped() {
        let s = ClientSession::new(1, "[::ffff:10.0.0.5]:1".parse().unwrap());
        assert_eq!(s.remote_ipv4(), Ipv4Addr::new(10, 0, 0, 5));
    }
}

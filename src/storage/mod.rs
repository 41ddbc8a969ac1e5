//! # Storage Collaborator
//!
//! Account and character rows live in an external store. This crate only
//! issues id-keyed lookups and two narrow writes (login address and secondary
//! password) through the [`Storage`] trait; [`MemoryStorage`] backs tests and
//! single-machine setups.

mod memory;

pub use memory::MemoryStorage;

use crate::error::Result;
use std::net::IpAddr;

pub type AccountId = u32;
pub type CharacterId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub id: AccountId,
    pub username: String,
    pub password: String,
    pub blocked: bool,
    /// Address of the most recent successful login
    pub last_known_ip: Option<IpAddr>,
    pub secondary_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRow {
    pub id: CharacterId,
    pub account_id: AccountId,
    pub world_id: u8,
    pub name: String,
    pub level: u8,
    pub job: u16,
    /// Persisted map the character resumes in
    pub field_id: u32,
    pub portal: u8,
}

/// Outcome of a credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid(AccountRow),
    UnknownAccount,
    WrongPassword,
    Blocked,
}

/// Lookups the network core needs from persistent storage.
pub trait Storage: Send + Sync {
    fn check_credentials(&self, username: &str, password: &str) -> Result<CredentialCheck>;

    fn account(&self, id: AccountId) -> Result<Option<AccountRow>>;

    fn account_by_name(&self, username: &str) -> Result<Option<AccountRow>>;

    fn character(&self, id: CharacterId) -> Result<Option<CharacterRow>>;

    /// Characters owned by `account_id` in `world_id`
    fn characters(&self, account_id: AccountId, world_id: u8) -> Result<Vec<CharacterRow>>;

    fn record_login_address(&self, account_id: AccountId, address: IpAddr) -> Result<()>;

    /// Returns false when no such account exists
    fn set_secondary_password(&self, username: &str, secondary_password: &str) -> Result<bool>;
}

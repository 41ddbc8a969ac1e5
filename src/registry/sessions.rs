//! Per-process session registry.
//!
//! Two maps: account id → owning connection (login side, guards against a
//! second concurrent login) and character id → [`UserEntry`] (world side,
//! populated only once a migration has been validated). Each map has its own
//! lock so writers are serialized per map while snapshot readers run
//! concurrently. Locks are never held across an `.await`.

use crate::error::{constants, ProtocolError, Result};
use crate::storage::{AccountId, CharacterId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

pub type ConnectionId = u64;

/// Where a character stands inside the world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldState {
    pub field_id: u32,
    pub portal: u8,
}

/// A character session registered in this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub character_id: CharacterId,
    pub account_id: AccountId,
    pub connection_id: ConnectionId,
    pub world_id: u8,
    pub channel_id: u8,
    pub name: String,
    pub field: FieldState,
}

/// What a [`SessionRegistry::release`] call removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Released {
    pub account: Option<AccountId>,
    pub characters: Vec<CharacterId>,
}

impl Released {
    pub fn is_empty(&self) -> bool {
        self.account.is_none() && self.characters.is_empty()
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    accounts: RwLock<HashMap<AccountId, ConnectionId>>,
    users: RwLock<HashMap<CharacterId, UserEntry>>,
    next_connection: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn read_poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::LockPoisoned(constants::ERR_REGISTRY_READ_LOCK)
}

fn write_poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::LockPoisoned(constants::ERR_REGISTRY_WRITE_LOCK)
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind `account_id` to `connection_id`. Binding the same pair twice is a no-op.
    pub fn bind_account(&self, account_id: AccountId, connection_id: ConnectionId) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(write_poisoned)?;
        match accounts.get(&account_id) {
            Some(&owner) if owner != connection_id => Err(ProtocolError::AlreadyRegistered(
                format!("account {account_id} is bound to connection {owner}"),
            )),
            _ => {
                accounts.insert(account_id, connection_id);
                Ok(())
            }
        }
    }

    pub fn account_connection(&self, account_id: AccountId) -> Result<Option<ConnectionId>> {
        Ok(self
            .accounts
            .read()
            .map_err(read_poisoned)?
            .get(&account_id)
            .copied())
    }

    pub fn is_account_online(&self, account_id: AccountId) -> Result<bool> {
        Ok(self.account_connection(account_id)?.is_some())
    }

    pub fn register_user(&self, entry: UserEntry) -> Result<()> {
        let mut users = self.users.write().map_err(write_poisoned)?;
        if users.contains_key(&entry.character_id) {
            return Err(ProtocolError::AlreadyRegistered(format!(
                "character {}",
                entry.character_id
            )));
        }
        users.insert(entry.character_id, entry);
        Ok(())
    }

    /// Register `entry` and bind its account to the entry's connection as one
    /// step. Either both are recorded or neither is.
    ///
    /// Locks are taken accounts first, then users.
    pub fn admit(&self, entry: UserEntry) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(write_poisoned)?;
        let mut users = self.users.write().map_err(write_poisoned)?;

        if let Some(&owner) = accounts.get(&entry.account_id) {
            if owner != entry.connection_id {
                return Err(ProtocolError::AlreadyRegistered(format!(
                    "account {} is bound to connection {owner}",
                    entry.account_id
                )));
            }
        }
        if users.contains_key(&entry.character_id) {
            return Err(ProtocolError::AlreadyRegistered(format!(
                "character {}",
                entry.character_id
            )));
        }

        accounts.insert(entry.account_id, entry.connection_id);
        users.insert(entry.character_id, entry);
        Ok(())
    }

    pub fn user(&self, character_id: CharacterId) -> Result<Option<UserEntry>> {
        Ok(self
            .users
            .read()
            .map_err(read_poisoned)?
            .get(&character_id)
            .cloned())
    }

    pub fn contains_user(&self, character_id: CharacterId) -> Result<bool> {
        Ok(self
            .users
            .read()
            .map_err(read_poisoned)?
            .contains_key(&character_id))
    }

    /// Live users in one channel
    pub fn user_count(&self, world_id: u8, channel_id: u8) -> Result<u32> {
        let users = self.users.read().map_err(read_poisoned)?;
        Ok(users
            .values()
            .filter(|u| u.world_id == world_id && u.channel_id == channel_id)
            .count() as u32)
    }

    pub fn users(&self) -> Result<Vec<UserEntry>> {
        Ok(self
            .users
            .read()
            .map_err(read_poisoned)?
            .values()
            .cloned()
            .collect())
    }

    /// Drop everything owned by `connection_id`.
    ///
    /// Entries bound to other connections are untouched, so calling this more
    /// than once, or after another connection took the account over, is safe.
    pub fn release(&self, connection_id: ConnectionId) -> Result<Released> {
        let mut released = Released::default();

        {
            let mut accounts = self.accounts.write().map_err(write_poisoned)?;
            let owned: Option<AccountId> = accounts
                .iter()
                .find(|(_, &owner)| owner == connection_id)
                .map(|(&account, _)| account);
            if let Some(account) = owned {
                accounts.remove(&account);
                released.account = Some(account);
            }
        }

        {
            let mut users = self.users.write().map_err(write_poisoned)?;
            users.retain(|&id, entry| {
                let keep = entry.connection_id != connection_id;
                if !keep {
                    released.characters.push(id);
                }
                keep
            });
        }

        if !released.is_empty() {
            debug!(connection = connection_id, ?released, "Released session entries");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(character_id: CharacterId, connection_id: ConnectionId) -> UserEntry {
        UserEntry {
            character_id,
            account_id: 1,
            connection_id,
            world_id: 0,
            channel_id: 1,
            name: format!("char{character_id}"),
            field: FieldState {
                field_id: 100_000_000,
                portal: 0,
            },
        }
    }

    #[test]
    fn account_binding_is_exclusive() {
        let registry = SessionRegistry::new();
        registry.bind_account(7, 1).unwrap();
        registry.bind_account(7, 1).unwrap();
        assert!(matches!(
            registry.bind_account(7, 2),
            Err(ProtocolError::AlreadyRegistered(_))
        ));
        assert_eq!(registry.account_connection(7).unwrap(), Some(1));
    }

    #[test]
    fn duplicate_character_rejected() {
        let registry = SessionRegistry::new();
        registry.register_user(entry(5, 1)).unwrap();
        assert!(registry.register_user(entry(5, 2)).is_err());
        assert_eq!(registry.user(5).unwrap().unwrap().connection_id, 1);
    }

    #[test]
    fn release_is_idempotent_and_scoped() {
        let registry = SessionRegistry::new();
        registry.bind_account(7, 1).unwrap();
        registry.register_user(entry(5, 1)).unwrap();
        registry.register_user(entry(6, 2)).unwrap();

        let first = registry.release(1).unwrap();
        assert_eq!(first.account, Some(7));
        assert_eq!(first.characters, vec![5]);

        let second = registry.release(1).unwrap();
        assert!(second.is_empty());

        // connection 2 untouched
        assert!(registry.contains_user(6).unwrap());
        assert_eq!(registry.user_count(0, 1).unwrap(), 1);
    }

    #[test]
    fn admit_records_nothing_on_conflict() {
        let registry = SessionRegistry::new();
        registry.admit(entry(5, 1)).unwrap();
        assert_eq!(registry.account_connection(1).unwrap(), Some(1));

        // same account from another connection
        assert!(matches!(
            registry.admit(entry(6, 2)),
            Err(ProtocolError::AlreadyRegistered(_))
        ));
        assert!(!registry.contains_user(6).unwrap());

        // same character again on its own connection
        assert!(registry.admit(entry(5, 1)).is_err());
        assert_eq!(registry.user_count(0, 1).unwrap(), 1);
        assert_eq!(registry.account_connection(1).unwrap(), Some(1));
    }

    #[test]
    fn connection_ids_are_unique() {
        let registry = SessionRegistry::new();
        let a = registry.next_connection_id();
        let b = registry.next_connection_id();
        assert_ne!(a, b);
    }
}

use super::{AccountId, AccountRow, CharacterId, CharacterRow, CredentialCheck, Storage};
use crate::error::{constants, ProtocolError, Result};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

/// In-process [`Storage`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    accounts: RwLock<HashMap<AccountId, AccountRow>>,
    characters: RwLock<HashMap<CharacterId, CharacterRow>>,
}

fn poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::LockPoisoned(constants::ERR_STORAGE_LOCK)
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&self, row: AccountRow) -> Result<()> {
        self.accounts.write().map_err(poisoned)?.insert(row.id, row);
        Ok(())
    }

    pub fn insert_character(&self, row: CharacterRow) -> Result<()> {
        self.characters
            .write()
            .map_err(poisoned)?
            .insert(row.id, row);
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn check_credentials(&self, username: &str, password: &str) -> Result<CredentialCheck> {
        let Some(account) = self.account_by_name(username)? else {
            return Ok(CredentialCheck::UnknownAccount);
        };
        if account.password != password {
            return Ok(CredentialCheck::WrongPassword);
        }
        if account.blocked {
            return Ok(CredentialCheck::Blocked);
        }
        Ok(CredentialCheck::Valid(account))
    }

    fn account(&self, id: AccountId) -> Result<Option<AccountRow>> {
        Ok(self.accounts.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn account_by_name(&self, username: &str) -> Result<Option<AccountRow>> {
        Ok(self
            .accounts
            .read()
            .map_err(poisoned)?
            .values()
            .find(|a| a.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    fn character(&self, id: CharacterId) -> Result<Option<CharacterRow>> {
        Ok(self.characters.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn characters(&self, account_id: AccountId, world_id: u8) -> Result<Vec<CharacterRow>> {
        let mut rows: Vec<_> = self
            .characters
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|c| c.account_id == account_id && c.world_id == world_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        Ok(rows)
    }

    fn record_login_address(&self, account_id: AccountId, address: IpAddr) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        let account = accounts
            .get_mut(&account_id)
            .ok_or_else(|| ProtocolError::NotFound(format!("account {account_id}")))?;
        account.last_known_ip = Some(address);
        Ok(())
    }

    fn set_secondary_password(&self, username: &str, secondary_password: &str) -> Result<bool> {
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        match accounts
            .values_mut()
            .find(|a| a.username.eq_ignore_ascii_case(username))
        {
            Some(account) => {
                account.secondary_password = Some(secondary_password.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

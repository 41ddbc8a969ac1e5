//! Central-side directory of every client connected to a login front-end.
//!
//! Keys are usernames compared case-insensitively. Entries are written only
//! by the `ClientAuthRequest` interoperation handler. A `Migrating` entry
//! that outlives the migration window reads as absent and is pruned on the
//! next write.

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::session::LoginStatus;
use crate::storage::AccountId;
use crate::utils::timeout::MIGRATION_WINDOW;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub username: String,
    pub account_id: AccountId,
    pub login_status: LoginStatus,
    pub world_id: u8,
    pub channel_id: u8,
    pub remote_ip: Ipv4Addr,
    pub updated_at: Instant,
}

impl DirectoryEntry {
    fn expired(&self, now: Instant, window: Duration) -> bool {
        self.login_status == LoginStatus::Migrating
            && now.saturating_duration_since(self.updated_at) > window
    }
}

#[derive(Debug)]
pub struct LoginDirectory {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
    migration_window: Duration,
}

impl Default for LoginDirectory {
    fn default() -> Self {
        Self::with_migration_window(MIGRATION_WINDOW)
    }
}

fn poisoned<T>(_: T) -> ProtocolError {
    ProtocolError::LockPoisoned(constants::ERR_DIRECTORY_LOCK)
}

fn key(username: &str) -> String {
    username.to_ascii_lowercase()
}

impl LoginDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_migration_window(migration_window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            migration_window,
        }
    }

    /// Insert or replace the entry for `entry.username`. An `Offline` status
    /// removes it. Expired migrations are dropped on the way.
    pub fn upsert(&self, entry: DirectoryEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        self.retain_live(&mut entries);
        let key = key(&entry.username);
        if entry.login_status == LoginStatus::Offline {
            entries.remove(&key);
        } else {
            entries.insert(key, entry);
        }
        Ok(())
    }

    pub fn get(&self, username: &str) -> Result<Option<DirectoryEntry>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .map_err(poisoned)?
            .get(&key(username))
            .filter(|entry| !entry.expired(now, self.migration_window))
            .cloned())
    }

    /// Drop every `Migrating` entry older than the window. Returns how many went.
    pub fn prune_expired(&self) -> Result<usize> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(self.retain_live(&mut entries))
    }

    fn retain_live(&self, entries: &mut HashMap<String, DirectoryEntry>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now, self.migration_window));
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(pruned, "Expired migrations left the login directory");
        }
        pruned
    }

    pub fn remove(&self, username: &str) -> Result<Option<DirectoryEntry>> {
        Ok(self.entries.write().map_err(poisoned)?.remove(&key(username)))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

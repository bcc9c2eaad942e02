// src/storage/memory.rs
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::models::server::{ServerAddress, ServerInfo};

/// Immutable keyed list of servers. Order is insertion order; a repeated
/// key replaces the earlier entry in place.
#[derive(Debug, Clone, Default)]
pub struct ServerSnapshot {
    entries: Vec<ServerInfo>,
    index: HashMap<String, usize>,
}

impl ServerSnapshot {
    pub fn from_list(list: Vec<ServerInfo>) -> Self {
        let mut snapshot = Self::default();
        for server in list {
            let key = server.key();
            match snapshot.index.get(&key) {
                Some(&i) => snapshot.entries[i] = server,
                None => {
                    snapshot.index.insert(key, snapshot.entries.len());
                    snapshot.entries.push(server);
                }
            }
        }
        snapshot
    }

    pub fn get(&self, key: &str) -> Option<&ServerInfo> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn servers(&self) -> &[ServerInfo] {
        &self.entries
    }

    pub fn addresses(&self) -> Vec<ServerAddress> {
        self.entries.iter().map(|s| s.address.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this snapshot with the entry at `key` rewritten, or `None` on a miss.
    fn with_entry(&self, key: &str, update: impl FnOnce(&mut ServerInfo)) -> Option<Self> {
        let &i = self.index.get(key)?;
        let mut next = self.clone();
        update(&mut next.entries[i]);
        Some(next)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    servers: Arc<ServerSnapshot>,
    local_servers: Arc<ServerSnapshot>,
    last_updated: Option<SystemTime>,
    loading: bool,
    error: Option<String>,
}

/// Canonical store of known servers.
///
/// Snapshots are swapped whole behind the lock; readers hold an `Arc` to the
/// snapshot they fetched and never see a partial list.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    state: RwLock<RegistryState>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_servers(&self, list: Vec<ServerInfo>) {
        let snapshot = Arc::new(ServerSnapshot::from_list(list));
        let mut state = self.state.write();
        state.servers = snapshot;
        state.last_updated = Some(SystemTime::now());
        state.loading = false;
        state.error = None;
    }

    pub fn set_local_servers(&self, list: Vec<ServerInfo>) {
        let snapshot = Arc::new(ServerSnapshot::from_list(list));
        let mut state = self.state.write();
        state.local_servers = snapshot;
        state.last_updated = Some(SystemTime::now());
        state.loading = false;
        state.error = None;
    }

    /// Patches `ping` on the matching entry of each snapshot. A miss is a no-op.
    pub fn update_server_ping(&self, address: &ServerAddress, ping: u64) {
        let key = address.key();
        let mut state = self.state.write();
        if let Some(next) = state.servers.with_entry(&key, |s| s.ping = Some(ping)) {
            state.servers = Arc::new(next);
        }
        if let Some(next) = state.local_servers.with_entry(&key, |s| s.ping = Some(ping)) {
            state.local_servers = Arc::new(next);
        }
    }

    /// Replaces the stored entry for `server`'s address in whichever
    /// snapshots hold it. Returns false when no snapshot knows the address.
    pub fn merge_server(&self, server: ServerInfo) -> bool {
        let key = server.key();
        let mut state = self.state.write();
        let mut merged = false;
        if let Some(next) = state.servers.with_entry(&key, |s| *s = server.clone()) {
            state.servers = Arc::new(next);
            merged = true;
        }
        if let Some(next) = state.local_servers.with_entry(&key, |s| *s = server.clone()) {
            state.local_servers = Arc::new(next);
            merged = true;
        }
        merged
    }

    pub fn servers(&self) -> Arc<ServerSnapshot> {
        self.state.read().servers.clone()
    }

    pub fn local_servers(&self) -> Arc<ServerSnapshot> {
        self.state.read().local_servers.clone()
    }

    /// Master and LAN servers together, master entries first, one per key.
    pub fn all_servers(&self) -> Vec<ServerInfo> {
        let (servers, local) = {
            let state = self.state.read();
            (state.servers.clone(), state.local_servers.clone())
        };
        let mut merged: Vec<ServerInfo> = servers.servers().to_vec();
        merged.extend(
            local
                .servers()
                .iter()
                .filter(|s| servers.get(&s.key()).is_none())
                .cloned(),
        );
        merged
    }

    pub fn last_updated(&self) -> Option<SystemTime> {
        self.state.read().last_updated
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.write().loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn set_error(&self, error: impl Into<String>) {
        let mut state = self.state.write();
        state.error = Some(error.into());
        state.loading = false;
    }

    pub fn clear_error(&self) {
        self.state.write().error = None;
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    pub fn server_count(&self) -> usize {
        self.state.read().servers.len()
    }

    /// Players across every master-listed server, derived from the snapshot.
    pub fn player_count(&self) -> usize {
        self.servers().servers().iter().map(|s| s.total_clients()).sum()
    }
}

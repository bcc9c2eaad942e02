//! Contracts for the collaborators this crate talks to but does not own.

use std::collections::HashSet;

use crate::models::server::ServerInfo;

/// Reports which base games (IWADs) are installed locally, as lowercase
/// names without extension (`"doom2"`, `"freedoom1"`).
pub trait IwadProvider: Send + Sync {
    fn available_game_ids(&self) -> HashSet<String>;
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str, flash_requested: bool);
}

pub trait ConnectSink: Send + Sync {
    fn connect(&self, server: &ServerInfo);
}

/// Fixed inventory, normalised on construction.
#[derive(Debug, Clone, Default)]
pub struct StaticIwads {
    ids: HashSet<String>,
}

impl StaticIwads {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(|id| crate::matchmaking::filter::normalize_wad_name(id.as_ref()))
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }
}

impl IwadProvider for StaticIwads {
    fn available_game_ids(&self) -> HashSet<String> {
        self.ids.clone()
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, title: &str, body: &str, flash_requested: bool) {
        if flash_requested {
            log::warn!("{}: {}", title, body);
        } else {
            log::info!("{}: {}", title, body);
        }
    }
}

// src/models/criteria.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::time::Instant;

use crate::models::server::{GameType, ServerInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickMatchCriteria {
    pub max_ping: u64,
    pub min_players: usize,
    pub max_players: usize,
    pub avoid_empty: bool,
    pub avoid_full: bool,
    /// Empty means any game type.
    pub preferred_game_types: HashSet<GameType>,
    pub monitoring_timeout_minutes: u64,
    pub auto_start_monitoring: bool,
}

impl Default for QuickMatchCriteria {
    fn default() -> Self {
        Self {
            max_ping: 100,
            min_players: 1,
            max_players: 64,
            avoid_empty: true,
            avoid_full: true,
            preferred_game_types: HashSet::new(),
            monitoring_timeout_minutes: 15,
            auto_start_monitoring: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringState {
    Idle,
    Searching,
    Found,
    NoMatch,
    Monitoring,
}

#[derive(Debug, Clone)]
pub struct MonitoringSession {
    pub state: MonitoringState,
    pub start_time: Option<Instant>,
    pub match_found: Option<ServerInfo>,
}

impl Default for MonitoringSession {
    fn default() -> Self {
        Self {
            state: MonitoringState::Idle,
            start_time: None,
            match_found: None,
        }
    }
}

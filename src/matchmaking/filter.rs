//! Candidate filtering and scoring for quick match.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::criteria::QuickMatchCriteria;
use crate::models::server::{ServerInfo, Wad};

const ENGINE_WAD_MARKER: &str = "odamex";
const UNKNOWN_PING: u64 = 999;
const PLAYER_SCORE_CAP: usize = 8;

/// Best-effort explanation for an empty candidate list. Checked in a fixed
/// order, so it names the first plausible blocker rather than a per-server cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoMatchReason {
    NoServers,
    NoPlayers,
    NoMatchingIwad,
    AllPassworded,
    PingTooHigh { max_ping: u64 },
    NoSuitableServer,
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoServers => write!(f, "No servers are available"),
            Self::NoPlayers => write!(f, "No servers have players online"),
            Self::NoMatchingIwad => write!(f, "No populated servers run a game you have installed"),
            Self::AllPassworded => write!(f, "All matching servers are password protected"),
            Self::PingTooHigh { max_ping } => {
                write!(f, "No matching servers have a ping under {}ms", max_ping)
            }
            Self::NoSuitableServer => write!(f, "No servers match your criteria"),
        }
    }
}

/// Lowercase file stem: `"/wads/DOOM2.WAD"` becomes `"doom2"`.
pub fn normalize_wad_name(name: &str) -> String {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    stem.to_ascii_lowercase()
}

/// First WAD that isn't the engine's own resource file.
pub fn primary_wad(server: &ServerInfo) -> Option<&Wad> {
    server
        .wads
        .iter()
        .find(|w| !w.name.to_ascii_lowercase().contains(ENGINE_WAD_MARKER))
}

fn has_available_iwad(server: &ServerInfo, available: &HashSet<String>) -> bool {
    primary_wad(server)
        .map(|w| available.contains(&normalize_wad_name(&w.name)))
        .unwrap_or(false)
}

fn within_ping(server: &ServerInfo, max_ping: u64) -> bool {
    server.ping.map_or(true, |p| p <= max_ping)
}

pub fn is_candidate(
    server: &ServerInfo,
    criteria: &QuickMatchCriteria,
    available: &HashSet<String>,
) -> bool {
    let total = server.total_clients();
    let active = server.active_players();

    server.responded
        && !server.address.ip.is_empty()
        && server.address.port != 0
        && within_ping(server, criteria.max_ping)
        && total < server.max_clients as usize
        && !(criteria.avoid_empty && total == 0)
        && !(criteria.avoid_full && active >= server.max_players as usize)
        && active >= criteria.min_players
        && active <= criteria.max_players
        && (criteria.preferred_game_types.is_empty()
            || criteria.preferred_game_types.contains(&server.game_type))
        && has_available_iwad(server, available)
        && !server.has_password()
}

pub fn score(server: &ServerInfo) -> f64 {
    let players = server.active_players().min(PLAYER_SCORE_CAP) as f64;
    let ping = server.ping.unwrap_or(UNKNOWN_PING) as f64;
    players * 10.0 - ping / 10.0
}

/// Highest-scoring candidate; ties go to the earlier server in `servers`.
pub fn find_best_match(
    servers: &[ServerInfo],
    criteria: &QuickMatchCriteria,
    available: &HashSet<String>,
) -> Result<ServerInfo, NoMatchReason> {
    let mut best: Option<(&ServerInfo, f64)> = None;
    for server in servers.iter().filter(|s| is_candidate(s, criteria, available)) {
        let candidate = score(server);
        match best {
            Some((_, top)) if candidate <= top => {}
            _ => best = Some((server, candidate)),
        }
    }

    match best {
        Some((server, _)) => Ok(server.clone()),
        None => Err(diagnose(servers, criteria, available)),
    }
}

fn diagnose(
    servers: &[ServerInfo],
    criteria: &QuickMatchCriteria,
    available: &HashSet<String>,
) -> NoMatchReason {
    let listed: Vec<&ServerInfo> = servers.iter().filter(|s| s.responded).collect();
    if listed.is_empty() {
        return NoMatchReason::NoServers;
    }

    let populated: Vec<&ServerInfo> = listed.into_iter().filter(|s| s.total_clients() > 0).collect();
    if populated.is_empty() {
        return NoMatchReason::NoPlayers;
    }

    let playable: Vec<&ServerInfo> = populated
        .into_iter()
        .filter(|s| has_available_iwad(s, available))
        .collect();
    if playable.is_empty() {
        return NoMatchReason::NoMatchingIwad;
    }

    let open: Vec<&ServerInfo> = playable.into_iter().filter(|s| !s.has_password()).collect();
    if open.is_empty() {
        return NoMatchReason::AllPassworded;
    }

    if !open.iter().any(|s| within_ping(s, criteria.max_ping)) {
        return NoMatchReason::PingTooHigh { max_ping: criteria.max_ping };
    }

    NoMatchReason::NoSuitableServer
}

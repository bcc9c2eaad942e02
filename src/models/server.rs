// src/models/server.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub ip: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Registry identity key, `"ip:port"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameType {
    Cooperative,
    Deathmatch,
    TeamDeathmatch,
    CaptureTheFlag,
    Horde,
    Unknown(u8),
}

impl GameType {
    pub fn from_wire(value: u32) -> Self {
        match value {
            0 => Self::Cooperative,
            1 => Self::Deathmatch,
            2 => Self::TeamDeathmatch,
            3 => Self::CaptureTheFlag,
            4 => Self::Horde,
            other => Self::Unknown(other.min(u8::MAX as u32) as u8),
        }
    }

    /// Team games carry the team block and a per-player team byte on the wire.
    pub fn is_team_based(self) -> bool {
        matches!(self, Self::TeamDeathmatch | Self::CaptureTheFlag)
    }
}

impl Default for GameType {
    fn default() -> Self {
        Self::Cooperative
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cooperative => write!(f, "Cooperative"),
            Self::Deathmatch => write!(f, "Deathmatch"),
            Self::TeamDeathmatch => write!(f, "Team Deathmatch"),
            Self::CaptureTheFlag => write!(f, "Capture the Flag"),
            Self::Horde => write!(f, "Horde"),
            Self::Unknown(n) => write!(f, "Unknown ({})", n),
        }
    }
}

/// Wire tag for a cvar payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CvarKind {
    None,
    Bool,
    Byte,
    Word,
    Int,
    Float,
    String,
}

impl CvarKind {
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Bool),
            2 => Some(Self::Byte),
            3 => Some(Self::Word),
            4 => Some(Self::Int),
            5 => Some(Self::Float),
            6 => Some(Self::String),
            _ => None,
        }
    }

    pub fn wire_tag(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum CvarValue {
    None,
    Bool(bool),
    Byte(u8),
    Word(u16),
    Int(u32),
    Float(f64),
    String(String),
}

impl CvarValue {
    pub fn kind(&self) -> CvarKind {
        match self {
            Self::None => CvarKind::None,
            Self::Bool(_) => CvarKind::Bool,
            Self::Byte(_) => CvarKind::Byte,
            Self::Word(_) => CvarKind::Word,
            Self::Int(_) => CvarKind::Int,
            Self::Float(_) => CvarKind::Float,
            Self::String(_) => CvarKind::String,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Bool(b) => Some(u32::from(*b)),
            Self::Byte(v) => Some(u32::from(*v)),
            Self::Word(v) => Some(u32::from(*v)),
            Self::Int(v) => Some(*v),
            Self::Float(v) if *v >= 0.0 => Some(*v as u32),
            Self::Float(_) => None,
            Self::String(s) => {
                let s = s.trim();
                s.parse::<u32>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u32))
            }
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v as f32),
            Self::String(s) => s.trim().parse::<f32>().ok(),
            other => other.as_u32().map(|v| v as f32),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cvar {
    pub name: String,
    pub value: CvarValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub color: u32,
    pub score: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub color: u32,
    pub kills: u16,
    pub deaths: u16,
    pub frags: u16,
    pub ping: u16,
    pub time: u16,
    pub team: u8,
    pub spectator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wad {
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub address: ServerAddress,
    pub name: Option<String>,
    pub current_map: Option<String>,
    pub game_type: GameType,
    pub version_major: u32,
    pub version_minor: u32,
    pub version_patch: u32,
    pub version_protocol: u32,
    pub version_real_protocol: u32,
    pub version_string: String,
    pub processing_time: u32,
    pub max_clients: u16,
    pub max_players: u16,
    pub score_limit: Option<u32>,
    pub time_limit: Option<f32>,
    pub time_left: Option<u16>,
    pub lives: Option<u32>,
    pub sides: Option<u32>,
    pub password_hash: String,
    pub patches: Vec<String>,
    pub cvars: Vec<Cvar>,
    pub teams: Vec<Team>,
    pub wads: Vec<Wad>,
    pub players: Vec<Player>,
    pub ping: Option<u64>,
    pub responded: bool,
}

impl ServerInfo {
    /// Placeholder for an address that produced no usable response.
    pub fn unresponsive(address: ServerAddress) -> Self {
        Self {
            address,
            name: None,
            current_map: None,
            game_type: GameType::default(),
            version_major: 0,
            version_minor: 0,
            version_patch: 0,
            version_protocol: 0,
            version_real_protocol: 0,
            version_string: String::new(),
            processing_time: 0,
            max_clients: 0,
            max_players: 0,
            score_limit: None,
            time_limit: None,
            time_left: None,
            lives: None,
            sides: None,
            password_hash: String::new(),
            patches: Vec::new(),
            cvars: Vec::new(),
            teams: Vec::new(),
            wads: Vec::new(),
            players: Vec::new(),
            ping: None,
            responded: false,
        }
    }

    pub fn key(&self) -> String {
        self.address.key()
    }

    /// Name for user-facing messages, falling back to the address.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.address.key(),
        }
    }

    /// Everyone connected, spectators included.
    pub fn total_clients(&self) -> usize {
        self.players.len()
    }

    pub fn active_players(&self) -> usize {
        self.players.iter().filter(|p| !p.spectator).count()
    }

    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    pub fn cvar(&self, name: &str) -> Option<&CvarValue> {
        self.cvars
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| &c.value)
    }

    pub fn version(&self) -> String {
        format!("{}.{}.{}", self.version_major, self.version_minor, self.version_patch)
    }
}

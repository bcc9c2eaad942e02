//! OdalPapi packet codec.
//!
//! Challenges are single little-endian `u32`s. Master replies are a flat list
//! of IPv4 records; game-server replies are a bit-packed header followed by a
//! sequence of fields whose presence depends on earlier fields (time limit,
//! game type).

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::models::server::{
    Cvar, CvarKind, CvarValue, GameType, Player, ServerAddress, ServerInfo, Team, Wad,
};
use crate::protocol::reader::PacketReader;
use crate::utils::QueryError;

pub const MASTER_CHALLENGE: u32 = 777_123;
pub const SERVER_CHALLENGE: u32 = 0xAD01_1002;
pub const SERVER_VERSION_CHALLENGE: u32 = 0xAD01_1001;
pub const PING_CHALLENGE: u32 = 1;

const TAG_ID: u32 = 0xAD0;
const QR_ID_RESPONSE: u32 = 2;
const APPLICATION_SERVER: u32 = 3;
const PACKET_TYPE_REJECTED: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Master,
    Server,
    ServerVersion,
    Ping,
}

impl ChallengeKind {
    pub fn token(self) -> u32 {
        match self {
            Self::Master => MASTER_CHALLENGE,
            Self::Server => SERVER_CHALLENGE,
            Self::ServerVersion => SERVER_VERSION_CHALLENGE,
            Self::Ping => PING_CHALLENGE,
        }
    }
}

pub fn encode_challenge(kind: ChallengeKind) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, kind.token());
    buf
}

/// Packs a version triple the way servers report it: `major*256 + minor*10 + patch`.
pub const fn make_version(major: u32, minor: u32, patch: u32) -> u32 {
    major * 256 + minor * 10 + patch
}

/// Inverse of [`make_version`].
pub fn split_version(version: u32) -> (u32, u32, u32) {
    let low = version % 256;
    (version / 256, low / 10, low % 10)
}

/// Fields packed into the first word of a game-server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub tag_id: u32,
    pub application: u32,
    pub qr_id: u32,
    pub packet_type: u32,
}

impl ResponseHeader {
    pub fn unpack(raw: u32) -> Self {
        Self {
            tag_id: (raw >> 20) & 0xFFF,
            application: (raw >> 16) & 0xF,
            qr_id: (raw >> 12) & 0xF,
            packet_type: raw & 0xFFFF_0FFF,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.tag_id == TAG_ID
            && self.qr_id == QR_ID_RESPONSE
            && self.application == APPLICATION_SERVER
            && self.packet_type != PACKET_TYPE_REJECTED
    }
}

/// Decodes a master-server list. The declared count is informational; the
/// record list runs until the buffer is exhausted.
pub fn decode_master_response(buf: &[u8]) -> Result<Vec<ServerAddress>, QueryError> {
    let mut reader = PacketReader::new(buf);
    let _token = reader.read_u32()?;
    let declared = reader.read_u16()?;

    let mut servers = Vec::with_capacity(declared as usize);
    while reader.remaining() >= 4 {
        let octets = [
            reader.read_u8()?,
            reader.read_u8()?,
            reader.read_u8()?,
            reader.read_u8()?,
        ];
        if reader.remaining() < 2 {
            debug!("Dropping trailing partial master record at offset {}", reader.position());
            break;
        }
        let port = reader.read_u16()?;
        let ip = format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);
        servers.push(ServerAddress::new(ip, port));
    }

    if servers.len() != declared as usize {
        debug!(
            "Master declared {} servers but sent {}",
            declared,
            servers.len()
        );
    }
    Ok(servers)
}

/// Decodes a game-server reply. Never fails: anything unusable comes back
/// as `responded == false`.
pub fn decode_game_server_response(
    buf: &[u8],
    address: &ServerAddress,
    client_version: u32,
) -> ServerInfo {
    match try_decode_game_server_response(buf, address, client_version) {
        Ok(server) => server,
        Err(e) => {
            debug!("Rejected response from {}: {}", address, e);
            ServerInfo::unresponsive(address.clone())
        }
    }
}

/// Decodes a game-server reply, keeping the failure classification.
pub fn try_decode_game_server_response(
    buf: &[u8],
    address: &ServerAddress,
    client_version: u32,
) -> Result<ServerInfo, QueryError> {
    let mut reader = PacketReader::new(buf);
    let mut server = ServerInfo::unresponsive(address.clone());

    let header = ResponseHeader::unpack(reader.read_u32()?);
    if !header.is_valid() {
        return Err(QueryError::MalformedResponse(format!(
            "bad header tag={:#x} app={} qr={} type={:#x}",
            header.tag_id, header.application, header.qr_id, header.packet_type
        )));
    }

    let server_version = reader.read_u32()?;
    server.version_protocol = reader.read_u32()?;
    if server_version == 0 {
        return Err(QueryError::UnsupportedVersion {
            server_version: "0.0.0".to_string(),
            remove_server: false,
        });
    }
    let (major, minor, patch) = split_version(server_version);
    let (client_major, client_minor, _) = split_version(client_version);
    if (major, minor) < (client_major, client_minor) {
        return Err(QueryError::UnsupportedVersion {
            server_version: format!("{}.{}.{}", major, minor, patch),
            remove_server: true,
        });
    }
    server.version_major = major;
    server.version_minor = minor;
    server.version_patch = patch;

    server.processing_time = reader.read_u32()?;
    server.version_real_protocol = reader.read_u32()?;
    server.version_string = reader.read_string();

    read_cvars(&mut reader, &mut server)?;

    server.password_hash = reader.read_hex()?;
    server.current_map = Some(reader.read_string());

    if server.time_limit.map_or(false, |limit| limit > 0.0) {
        server.time_left = Some(reader.read_u16()?);
    }

    let team_game = server.game_type.is_team_based();
    if team_game {
        let count = reader.read_u8()?;
        for _ in 0..count {
            let name = reader.read_string();
            let color = reader.read_u32()?;
            let score = reader.read_u16()?;
            server.teams.push(Team { name, color, score });
        }
    }

    let patch_count = reader.read_u8()?;
    for _ in 0..patch_count {
        server.patches.push(reader.read_string());
    }

    let wad_count = reader.read_u8()?;
    for _ in 0..wad_count {
        let name = reader.read_string();
        let hash = reader.read_hex()?;
        server.wads.push(Wad { name, hash });
    }

    let player_count = reader.read_u8()?;
    for _ in 0..player_count {
        let name = reader.read_string();
        let color = reader.read_u32()?;
        let team = if team_game { reader.read_u8()? } else { 0 };
        let ping = reader.read_u16()?;
        let time = reader.read_u16()?;
        let spectator = reader.read_u8()? > 0;
        let frags = reader.read_u16()?;
        let kills = reader.read_u16()?;
        let deaths = reader.read_u16()?;
        server.players.push(Player {
            name,
            color,
            kills,
            deaths,
            frags,
            ping,
            time,
            team,
            spectator,
        });
    }

    server.responded = true;
    Ok(server)
}

fn read_cvars(reader: &mut PacketReader<'_>, server: &mut ServerInfo) -> Result<(), QueryError> {
    let count = reader.read_u8()?;
    for _ in 0..count {
        let name = reader.read_string();
        let tag = reader.read_u8()?;
        let kind = CvarKind::from_wire(tag).ok_or_else(|| {
            QueryError::MalformedResponse(format!("unknown cvar type {} for {}", tag, name))
        })?;
        let value = match kind {
            CvarKind::None => CvarValue::None,
            CvarKind::Bool => CvarValue::Bool(true),
            CvarKind::Byte => CvarValue::Byte(reader.read_u8()?),
            CvarKind::Word => CvarValue::Word(reader.read_u16()?),
            CvarKind::Int => CvarValue::Int(reader.read_u32()?),
            CvarKind::Float => {
                let text = reader.read_string();
                CvarValue::Float(text.trim().parse().unwrap_or(0.0))
            }
            CvarKind::String => CvarValue::String(reader.read_string()),
        };
        apply_known_cvar(server, &name, &value);
        server.cvars.push(Cvar { name, value });
    }
    Ok(())
}

fn apply_known_cvar(server: &mut ServerInfo, name: &str, value: &CvarValue) {
    match name {
        "sv_hostname" => {
            server.name = Some(match value {
                CvarValue::String(s) => s.clone(),
                other => other.as_u32().map(|v| v.to_string()).unwrap_or_default(),
            })
        }
        "sv_maxplayers" => {
            if let Some(v) = value.as_u32() {
                server.max_players = v.min(u16::MAX as u32) as u16;
            }
        }
        "sv_maxclients" => {
            if let Some(v) = value.as_u32() {
                server.max_clients = v.min(u16::MAX as u32) as u16;
            }
        }
        "sv_gametype" => {
            if let Some(v) = value.as_u32() {
                server.game_type = GameType::from_wire(v);
            }
        }
        "sv_scorelimit" => server.score_limit = value.as_u32(),
        "sv_timelimit" => server.time_limit = value.as_f32(),
        "g_lives" => server.lives = value.as_u32(),
        "g_sides" => server.sides = value.as_u32(),
        _ => {}
    }
}

// src/utils.rs
use std::io;
use std::net::{IpAddr, SocketAddr};

use log::debug;
use thiserror::Error;
use tokio::net::lookup_host;

use crate::models::server::ServerAddress;
use crate::protocol::reader::ReadError;

/// Classified failure of a single query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no response within the time budget")]
    Timeout,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unsupported server version {server_version}")]
    UnsupportedVersion {
        server_version: String,
        remove_server: bool,
    },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("nothing listening at {0}")]
    NotFound(String),
    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    /// True when the address should be dropped from the registry entirely.
    pub fn remove_server(&self) -> bool {
        matches!(self, Self::UnsupportedVersion { remove_server: true, .. })
    }

    /// Maps a socket error, treating a refused port as "nothing there".
    pub fn from_socket(err: io::Error, target: SocketAddr) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::NotFound(target.to_string()),
            _ => Self::Transport(err),
        }
    }
}

impl From<ReadError> for QueryError {
    fn from(err: ReadError) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// The one error a refresh cycle surfaces to its caller.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no master server answered: {0}")]
    MasterUnavailable(String),
    #[error("refresh superseded by a newer cycle")]
    Superseded,
}

/// Parses `"ip:port"` (or `"host:port"`) into its two halves.
pub fn parse_address(value: &str) -> Option<ServerAddress> {
    let (host, port) = value.trim().rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok()?;
    Some(ServerAddress::new(host, port))
}

/// Resolves an address to an IPv4 socket address.
pub async fn resolve_address(address: &ServerAddress) -> Result<SocketAddr, QueryError> {
    if let Ok(ip) = address.ip.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(_) => Ok(SocketAddr::new(ip, address.port)),
            IpAddr::V6(_) => Err(QueryError::Transport(io::Error::new(
                io::ErrorKind::Unsupported,
                "IPv6 addresses are not supported",
            ))),
        };
    }

    let resolved = lookup_host((address.ip.as_str(), address.port)).await?;
    for candidate in resolved {
        if candidate.is_ipv4() {
            debug!("Resolved {} to {}", address, candidate);
            return Ok(candidate);
        }
    }
    Err(QueryError::NotFound(address.key()))
}

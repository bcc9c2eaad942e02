//! UDP query transport.
//!
//! Each exchange owns one socket for its whole lifetime. The socket is
//! dropped, and so closed, exactly once when the exchange future finishes,
//! whichever of response, error, timeout or cancellation came first.
//! Datagrams arriving after that have nowhere to land.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::RangeInclusive;
use std::time::Duration;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::time::{timeout, timeout_at, Instant};

use crate::config::ClientConfig;
use crate::models::server::{ServerAddress, ServerInfo};
use crate::net::cancel::CancelToken;
use crate::protocol::codec::{
    decode_game_server_response, decode_master_response, encode_challenge,
    try_decode_game_server_response, ChallengeKind,
};
use crate::utils::{resolve_address, QueryError};

const MAX_DATAGRAM: usize = 65_507;

/// Outcome of a game-server query whose transport exchange succeeded.
///
/// `failure` is set when the reply could not be decoded; `server.responded`
/// is false in that case.
#[derive(Debug)]
pub struct GameServerResponse {
    pub server: ServerInfo,
    pub pong_ms: u64,
    pub failure: Option<QueryError>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryClient {
    config: ClientConfig,
}

impl DiscoveryClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn query_master_server(
        &self,
        address: &ServerAddress,
        cancel: &CancelToken,
    ) -> Result<Vec<ServerAddress>, QueryError> {
        let (buf, _) = self
            .exchange(address, ChallengeKind::Master, self.config.master_timeout, cancel)
            .await?;
        let servers = decode_master_response(&buf)?;
        debug!("Master {} listed {} servers", address, servers.len());
        Ok(servers)
    }

    /// Queries one game server. `single` selects the single-query ping
    /// divisor instead of the batch one.
    pub async fn query_game_server(
        &self,
        address: &ServerAddress,
        single: bool,
        cancel: &CancelToken,
    ) -> Result<GameServerResponse, QueryError> {
        let (buf, elapsed) = self
            .exchange(address, ChallengeKind::Server, self.config.query_timeout, cancel)
            .await?;

        let divisor = if single {
            self.config.single_ping_divisor
        } else {
            self.config.batch_ping_divisor
        };
        let pong_ms = elapsed.as_millis() as u64 / u64::from(divisor.max(1));

        match try_decode_game_server_response(&buf, address, self.config.client_version) {
            Ok(mut server) => {
                server.ping = Some(pong_ms);
                Ok(GameServerResponse { server, pong_ms, failure: None })
            }
            Err(e) => {
                debug!("Undecodable reply from {}: {}", address, e);
                Ok(GameServerResponse {
                    server: ServerInfo::unresponsive(address.clone()),
                    pong_ms,
                    failure: Some(e),
                })
            }
        }
    }

    /// Raw round-trip time in milliseconds; the reply payload is ignored.
    pub async fn ping_game_server(
        &self,
        address: &ServerAddress,
        cancel: &CancelToken,
    ) -> Result<u64, QueryError> {
        let (_, elapsed) = self
            .exchange(address, ChallengeKind::Ping, self.config.ping_timeout, cancel)
            .await?;
        Ok(elapsed.as_millis() as u64)
    }

    /// Broadcasts a server challenge to every port in `ports` and collects
    /// replies until `wait` runs out. Only decodable servers are returned,
    /// one per address, in arrival order.
    pub async fn discover_lan(
        &self,
        ports: RangeInclusive<u16>,
        wait: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<ServerInfo>, QueryError> {
        let targets: Vec<SocketAddr> = ports
            .map(|port| SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)))
            .collect();
        self.discover_on(&targets, wait, cancel).await
    }

    /// Same as [`discover_lan`](Self::discover_lan) but sends the challenge
    /// to explicit targets. A later reply from an address replaces the
    /// earlier one.
    pub async fn discover_on(
        &self,
        targets: &[SocketAddr],
        wait: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<ServerInfo>, QueryError> {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        let challenge = encode_challenge(ChallengeKind::Server);
        let mut sent_any = false;
        let mut last_error = None;
        for target in targets {
            match socket.send_to(&challenge, *target).await {
                Ok(_) => sent_any = true,
                Err(e) => {
                    debug!("LAN challenge to {} failed: {}", target, e);
                    last_error = Some(e);
                }
            }
        }
        if !sent_any {
            return Err(last_error
                .map(QueryError::Transport)
                .unwrap_or_else(|| QueryError::NotFound("no LAN targets".to_string())));
        }

        let sent = Instant::now();
        let deadline = sent + wait;
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let mut found: Vec<ServerInfo> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        loop {
            let received = tokio::select! {
                res = timeout_at(deadline, socket.recv_from(&mut buffer)) => res,
                _ = cancel.cancelled() => return Err(QueryError::Cancelled),
            };
            let (len, from) = match received {
                Err(_) => break,
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!("LAN receive failed, keeping {} replies: {}", found.len(), e);
                    break;
                }
            };

            let address = ServerAddress::new(from.ip().to_string(), from.port());
            let mut server =
                decode_game_server_response(&buffer[..len], &address, self.config.client_version);
            if !server.responded {
                continue;
            }
            server.ping = Some(sent.elapsed().as_millis() as u64);
            match seen.get(&server.key()) {
                Some(&index) => found[index] = server,
                None => {
                    seen.insert(server.key(), found.len());
                    found.push(server);
                }
            }
        }

        debug!("LAN discovery found {} servers", found.len());
        Ok(found)
    }

    /// Sends one challenge and waits for the first reply from the target.
    async fn exchange(
        &self,
        address: &ServerAddress,
        kind: ChallengeKind,
        budget: Duration,
        cancel: &CancelToken,
    ) -> Result<(Vec<u8>, Duration), QueryError> {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let peer = resolve_address(address).await?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect(peer)
            .await
            .map_err(|e| QueryError::from_socket(e, peer))?;
        socket
            .send(&encode_challenge(kind))
            .await
            .map_err(|e| QueryError::from_socket(e, peer))?;
        let sent = Instant::now();

        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let len = tokio::select! {
            res = timeout(budget, socket.recv(&mut buffer)) => match res {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(QueryError::from_socket(e, peer)),
                Err(_) => return Err(QueryError::Timeout),
            },
            _ = cancel.cancelled() => return Err(QueryError::Cancelled),
        };
        let elapsed = sent.elapsed();

        if len == 0 {
            debug!("Empty datagram from {}", peer);
        }
        buffer.truncate(len);
        Ok((buffer, elapsed))
    }
}

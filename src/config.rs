use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::net::scheduler::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
use crate::protocol::codec::make_version;

#[derive(Debug, Clone)]
pub struct Config {
    // Master directory
    pub master_servers: Vec<String>,
    pub master_timeout_secs: u64,

    // Game server queries
    pub query_timeout_secs: u64,
    pub ping_timeout_secs: u64,
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub batch_ping_divisor: u32,
    pub single_ping_divisor: u32,
    pub client_version: u32,

    // LAN broadcast
    pub lan_ports: RangeInclusive<u16>,
    pub lan_timeout_ms: u64,

    // Quick match
    pub monitor_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_servers: vec![
                "master1.odamex.net:15000".to_string(),
                "master2.odamex.net:15000".to_string(),
            ],
            master_timeout_secs: 10,
            query_timeout_secs: 10,
            ping_timeout_secs: 5,
            concurrency_limit: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_ping_divisor: 2,
            single_ping_divisor: 1,
            client_version: make_version(10, 4, 0),
            lan_ports: 10666..=10676,
            lan_timeout_ms: 1500,
            monitor_interval_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            master_servers: env::var("ODALPAPI_MASTERS")
                .ok()
                .map(|v| parse_list(&v))
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.master_servers),

            master_timeout_secs: env::var("ODALPAPI_MASTER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.master_timeout_secs),

            query_timeout_secs: env::var("ODALPAPI_QUERY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.query_timeout_secs),

            ping_timeout_secs: env::var("ODALPAPI_PING_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ping_timeout_secs),

            concurrency_limit: env::var("ODALPAPI_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.concurrency_limit),

            batch_size: env::var("ODALPAPI_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),

            batch_ping_divisor: env::var("ODALPAPI_BATCH_PING_DIVISOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.batch_ping_divisor),

            single_ping_divisor: env::var("ODALPAPI_SINGLE_PING_DIVISOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.single_ping_divisor),

            client_version: env::var("ODALPAPI_CLIENT_VERSION")
                .ok()
                .and_then(|v| parse_version(&v))
                .unwrap_or(defaults.client_version),

            lan_ports: env::var("ODALPAPI_LAN_PORTS")
                .ok()
                .and_then(|v| parse_port_range(&v))
                .unwrap_or(defaults.lan_ports),

            lan_timeout_ms: env::var("ODALPAPI_LAN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lan_timeout_ms),

            monitor_interval_secs: env::var("ODALPAPI_MONITOR_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.monitor_interval_secs),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            master_timeout: Duration::from_secs(self.master_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            batch_ping_divisor: self.batch_ping_divisor.max(1),
            single_ping_divisor: self.single_ping_divisor.max(1),
            client_version: self.client_version,
        }
    }

    pub fn lan_timeout(&self) -> Duration {
        Duration::from_millis(self.lan_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

/// Settings a single `DiscoveryClient` needs for its exchanges.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub master_timeout: Duration,
    pub query_timeout: Duration,
    pub ping_timeout: Duration,
    pub batch_ping_divisor: u32,
    pub single_ping_divisor: u32,
    pub client_version: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Config::default().client_config()
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts either a packed integer (`2600`) or dotted form (`10.4.0`).
fn parse_version(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Ok(packed) = value.parse::<u32>() {
        return Some(packed);
    }
    let mut parts = value.split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some(make_version(major, minor, patch))
}

fn parse_port_range(value: &str) -> Option<RangeInclusive<u16>> {
    let (start, end) = match value.split_once('-') {
        Some((s, e)) => (s.trim().parse().ok()?, e.trim().parse().ok()?),
        None => {
            let port = value.trim().parse().ok()?;
            (port, port)
        }
    };
    (start <= end).then(|| start..=end)
}

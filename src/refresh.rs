//! Refresh cycle: master list, fan-out, registry, activity.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::Config;
use crate::external::NotificationSink;
use crate::models::server::{ServerAddress, ServerInfo};
use crate::net::cancel::CancelToken;
use crate::net::discovery::DiscoveryClient;
use crate::net::scheduler::FanOutScheduler;
use crate::storage::activity::{ActivityDetector, ActivityReport};
use crate::storage::memory::ServerRegistry;
use crate::utils::{parse_address, QueryError, RefreshError};

#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub listed: usize,
    pub responded: usize,
    pub removed: usize,
    pub failed: usize,
    pub activity: ActivityReport,
}

pub struct Browser {
    config: Config,
    scheduler: FanOutScheduler,
    registry: Arc<ServerRegistry>,
    activity: Mutex<ActivityDetector>,
    notifier: Arc<dyn NotificationSink>,
    current: Mutex<Option<CancelToken>>,
}

impl Browser {
    pub fn new(
        config: Config,
        registry: Arc<ServerRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let client = DiscoveryClient::new(config.client_config());
        let scheduler = FanOutScheduler::new(client, config.concurrency_limit, config.batch_size);
        Self {
            config,
            scheduler,
            registry,
            activity: Mutex::new(ActivityDetector::new()),
            notifier,
            current: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &DiscoveryClient {
        self.scheduler.client()
    }

    /// Cancels the in-flight refresh, if any.
    pub fn cancel_refresh(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    fn begin_cycle(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            debug!("Superseding previous refresh");
            previous.cancel();
        }
        token
    }

    fn end_cycle(&self, token: &CancelToken) {
        let mut current = self.current.lock();
        let newer = match current.as_ref() {
            Some(t) if t.same_as(token) => {
                *current = None;
                false
            }
            Some(_) => true,
            None => false,
        };
        // A newer cycle owns the loading flag; otherwise nobody will clear it.
        if token.is_cancelled() && !newer {
            self.registry.set_loading(false);
        }
    }

    /// Asks every configured master in turn and merges their lists. Fails
    /// only if no master answered.
    pub async fn fetch_master_list(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<ServerAddress>, RefreshError> {
        let mut merged = Vec::new();
        let mut seen = HashSet::new();
        let mut failures = Vec::new();
        let mut answered = false;

        for master in &self.config.master_servers {
            let Some(address) = parse_address(master) else {
                warn!("Ignoring malformed master address {:?}", master);
                failures.push(format!("{}: malformed address", master));
                continue;
            };
            match self.client().query_master_server(&address, cancel).await {
                Ok(list) => {
                    answered = true;
                    for server in list {
                        if seen.insert(server.key()) {
                            merged.push(server);
                        }
                    }
                }
                Err(QueryError::Cancelled) => return Err(RefreshError::Superseded),
                Err(e) => {
                    warn!("Master {} failed: {}", address, e);
                    failures.push(format!("{}: {}", address, e));
                }
            }
        }

        if !answered {
            if failures.is_empty() {
                failures.push("no master servers configured".to_string());
            }
            return Err(RefreshError::MasterUnavailable(failures.join("; ")));
        }
        Ok(merged)
    }

    /// Runs one full refresh. Starting another refresh, or calling
    /// [`cancel_refresh`](Self::cancel_refresh), abandons this one.
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        let cancel = self.begin_cycle();
        let result = self.run_cycle(&cancel).await;
        self.end_cycle(&cancel);
        result
    }

    async fn run_cycle(&self, cancel: &CancelToken) -> Result<RefreshSummary, RefreshError> {
        self.registry.clear_error();
        self.registry.set_loading(true);

        let addresses = match self.fetch_master_list(cancel).await {
            Ok(addresses) => addresses,
            Err(e) => {
                if !cancel.is_cancelled() {
                    error!("Refresh failed: {}", e);
                    self.registry.set_error(e.to_string());
                }
                return Err(e);
            }
        };
        info!("Querying {} servers", addresses.len());

        let registry = self.registry.clone();
        let progress_token = cancel.clone();
        let mut on_batch = move |servers: &[ServerInfo]| {
            if progress_token.is_cancelled() {
                return;
            }
            registry.set_servers(servers.to_vec());
            registry.set_loading(true);
        };
        let results = self
            .scheduler
            .query_all_detailed(&addresses, cancel, Some(&mut on_batch))
            .await;

        if cancel.is_cancelled() {
            return Err(RefreshError::Superseded);
        }

        let mut summary = RefreshSummary {
            listed: addresses.len(),
            ..Default::default()
        };
        let mut servers = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(server) if server.responded => servers.push(server),
                Ok(_) => summary.failed += 1,
                Err(e) if e.remove_server() => summary.removed += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary.responded = servers.len();

        summary.activity = self.activity.lock().detect(&servers);
        self.registry.set_servers(servers);

        if !summary.activity.messages.is_empty() {
            self.notifier.notify(
                "Server activity",
                &summary.activity.messages.join("\n"),
                false,
            );
        }
        info!(
            "Refresh done: {} listed, {} responded, {} removed, {} failed",
            summary.listed, summary.responded, summary.removed, summary.failed
        );
        Ok(summary)
    }

    /// Re-queries one server and merges the fresh record into the registry.
    pub async fn refresh_server(&self, address: &ServerAddress) -> Result<ServerInfo, QueryError> {
        let cancel = CancelToken::new();
        let response = self.client().query_game_server(address, true, &cancel).await?;
        if let Some(e) = response.failure {
            return Err(e);
        }
        self.registry.merge_server(response.server.clone());
        Ok(response.server)
    }

    /// Broadcasts on the LAN and replaces the local snapshot with what answered.
    pub async fn refresh_lan(&self) -> Result<usize, QueryError> {
        let cancel = CancelToken::new();
        let servers = self
            .client()
            .discover_lan(self.config.lan_ports.clone(), self.config.lan_timeout(), &cancel)
            .await?;
        Ok(self.store_local(servers))
    }

    /// Like [`refresh_lan`](Self::refresh_lan) for hosts known up front.
    pub async fn refresh_lan_targets(&self, targets: &[SocketAddr]) -> Result<usize, QueryError> {
        let cancel = CancelToken::new();
        let servers = self
            .client()
            .discover_on(targets, self.config.lan_timeout(), &cancel)
            .await?;
        Ok(self.store_local(servers))
    }

    fn store_local(&self, servers: Vec<ServerInfo>) -> usize {
        let count = servers.len();
        self.registry.set_local_servers(servers);
        count
    }

    /// Pings every known server and patches the results into the registry.
    /// Returns how many pings came back.
    pub async fn refresh_pings(&self) -> usize {
        let mut seen = HashSet::new();
        let addresses: Vec<ServerAddress> = self
            .registry
            .servers()
            .addresses()
            .into_iter()
            .chain(self.registry.local_servers().addresses())
            .filter(|a| seen.insert(a.key()))
            .collect();

        let cancel = CancelToken::new();
        let pings = self.scheduler.ping_all(&addresses, &cancel).await;
        let mut updated = 0;
        for (address, ping) in addresses.iter().zip(pings) {
            if let Some(ms) = ping {
                self.registry.update_server_ping(address, ms);
                updated += 1;
            }
        }
        debug!("Ping refresh: {}/{} answered", updated, addresses.len());
        updated
    }
}

//! Quick-match state machine.
//!
//! `idle -> searching -> found | no-match`, then optionally
//! `no-match -> monitoring -> found | idle`. Everything is synchronous except
//! the monitoring tick, which runs as a spawned task against the live registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::external::{ConnectSink, IwadProvider, NotificationSink};
use crate::matchmaking::filter::{find_best_match, NoMatchReason};
use crate::models::criteria::{MonitoringSession, MonitoringState, QuickMatchCriteria};
use crate::models::server::ServerInfo;
use crate::storage::memory::ServerRegistry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct EngineState {
    session: MonitoringSession,
    last_reason: Option<NoMatchReason>,
    // Bumped on every start/stop so a stale monitor task can't write.
    epoch: u64,
}

#[derive(Clone)]
struct Shared {
    registry: Arc<ServerRegistry>,
    iwads: Arc<dyn IwadProvider>,
    notifier: Arc<dyn NotificationSink>,
    state: Arc<Mutex<EngineState>>,
}

impl Shared {
    fn search(&self, criteria: &QuickMatchCriteria) -> Result<ServerInfo, NoMatchReason> {
        let available: HashSet<String> = self.iwads.available_game_ids();
        find_best_match(&self.registry.all_servers(), criteria, &available)
    }
}

pub struct MatchmakingEngine {
    shared: Shared,
    criteria: RwLock<QuickMatchCriteria>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl MatchmakingEngine {
    pub fn new(
        registry: Arc<ServerRegistry>,
        iwads: Arc<dyn IwadProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            shared: Shared {
                registry,
                iwads,
                notifier,
                state: Arc::new(Mutex::new(EngineState::default())),
            },
            criteria: RwLock::new(QuickMatchCriteria::default()),
            monitor: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn set_criteria(&self, criteria: QuickMatchCriteria) {
        *self.criteria.write() = criteria;
    }

    pub fn criteria(&self) -> QuickMatchCriteria {
        self.criteria.read().clone()
    }

    pub fn session(&self) -> MonitoringSession {
        self.shared.state.lock().session.clone()
    }

    pub fn state(&self) -> MonitoringState {
        self.shared.state.lock().session.state
    }

    pub fn last_reason(&self) -> Option<NoMatchReason> {
        self.shared.state.lock().last_reason.clone()
    }

    /// One-shot evaluation of the live registry; does not touch the session.
    pub fn find_best_match(&self) -> Result<ServerInfo, NoMatchReason> {
        self.shared.search(&self.criteria.read())
    }

    /// Searches once. On no match, starts monitoring when the criteria ask for it.
    pub fn quick_match(&self) -> Result<ServerInfo, NoMatchReason> {
        self.stop_monitoring();
        self.shared.state.lock().session.state = MonitoringState::Searching;

        let criteria = self.criteria();
        let outcome = self.shared.search(&criteria);
        {
            let mut state = self.shared.state.lock();
            match &outcome {
                Ok(server) => {
                    info!("Quick match picked {}", server.display_name());
                    state.session.state = MonitoringState::Found;
                    state.session.match_found = Some(server.clone());
                    state.last_reason = None;
                }
                Err(reason) => {
                    info!("Quick match found nothing: {}", reason);
                    state.session.state = MonitoringState::NoMatch;
                    state.session.match_found = None;
                    state.last_reason = Some(reason.clone());
                }
            }
        }

        if outcome.is_err() && criteria.auto_start_monitoring {
            self.start_monitoring();
        }
        outcome
    }

    /// Polls the registry every interval until a match appears or the
    /// criteria's timeout runs out. Must be called inside a tokio runtime.
    pub fn start_monitoring(&self) {
        let criteria = self.criteria();
        let started = Instant::now();
        let epoch = {
            let mut state = self.shared.state.lock();
            state.epoch += 1;
            state.session.state = MonitoringState::Monitoring;
            state.session.start_time = Some(started);
            state.session.match_found = None;
            state.epoch
        };

        let shared = self.shared.clone();
        let interval = self.poll_interval;
        let handle = tokio::spawn(monitor_loop(shared, criteria, started, interval, epoch));
        if let Some(previous) = self.monitor.lock().replace(handle) {
            previous.abort();
        }
        info!("Monitoring for a match");
    }

    /// Idempotent. Clears the timer, any found match and the monitoring flag.
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
        let mut state = self.shared.state.lock();
        state.epoch += 1;
        state.session.match_found = None;
        state.session.start_time = None;
        if state.session.state == MonitoringState::Monitoring {
            state.session.state = MonitoringState::Idle;
        }
    }

    /// Hands the found server to `sink` and returns to idle.
    pub fn accept_match(&self, sink: &dyn ConnectSink) -> Option<ServerInfo> {
        let server = {
            let mut state = self.shared.state.lock();
            let server = state.session.match_found.take()?;
            state.session.state = MonitoringState::Idle;
            state.session.start_time = None;
            server
        };
        sink.connect(&server);
        Some(server)
    }

    pub fn reset(&self) {
        self.stop_monitoring();
        let mut state = self.shared.state.lock();
        state.session = MonitoringSession::default();
        state.last_reason = None;
    }
}

impl Drop for MatchmakingEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
    }
}

async fn monitor_loop(
    shared: Shared,
    criteria: QuickMatchCriteria,
    started: Instant,
    interval: Duration,
    epoch: u64,
) {
    let limit = Duration::from_secs(criteria.monitoring_timeout_minutes.saturating_mul(60));
    let mut ticker = interval_at(started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = sleep_until(started + limit);
    tokio::pin!(deadline);

    loop {
        let expired = tokio::select! {
            _ = ticker.tick() => false,
            _ = &mut deadline => true,
        };
        let outcome = shared.search(&criteria);

        let mut state = shared.state.lock();
        if state.epoch != epoch {
            return;
        }
        match outcome {
            Ok(server) => {
                let body = format!("{} ({} players)", server.display_name(), server.active_players());
                state.session.state = MonitoringState::Found;
                state.session.match_found = Some(server);
                state.last_reason = None;
                drop(state);
                info!("Monitoring found a match: {}", body);
                shared.notifier.notify("Match found", &body, true);
                return;
            }
            Err(reason) => {
                debug!("Monitoring tick: {}", reason);
                state.last_reason = Some(reason);
            }
        }

        if expired || started.elapsed() >= limit {
            state.session.state = MonitoringState::Idle;
            state.session.match_found = None;
            state.session.start_time = None;
            drop(state);
            info!("Monitoring timed out after {} minutes", criteria.monitoring_timeout_minutes);
            shared
                .notifier
                .notify("Quick Match", "No match found, monitoring stopped", false);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::StaticIwads;
    use crate::models::server::{GameType, Player, ServerAddress, Wad};

    #[derive(Default)]
    struct Recorder {
        notes: Mutex<Vec<(String, String, bool)>>,
        connected: Mutex<Vec<String>>,
    }

    impl NotificationSink for Recorder {
        fn notify(&self, title: &str, body: &str, flash_requested: bool) {
            self.notes.lock().push((title.to_string(), body.to_string(), flash_requested));
        }
    }

    impl ConnectSink for Recorder {
        fn connect(&self, server: &ServerInfo) {
            self.connected.lock().push(server.key());
        }
    }

    fn playable(port: u16) -> ServerInfo {
        let mut s = ServerInfo::unresponsive(ServerAddress::new("10.0.0.2", port));
        s.responded = true;
        s.name = Some("Arena".into());
        s.game_type = GameType::Deathmatch;
        s.max_players = 8;
        s.max_clients = 10;
        s.ping = Some(40);
        s.wads = vec![Wad { name: "doom2.wad".into(), hash: String::new() }];
        s.players = (0..3)
            .map(|i| Player {
                name: format!("p{}", i),
                color: 0,
                kills: 0,
                deaths: 0,
                frags: 0,
                ping: 40,
                time: 10,
                team: 0,
                spectator: false,
            })
            .collect();
        s
    }

    fn engine() -> (MatchmakingEngine, Arc<ServerRegistry>, Arc<Recorder>) {
        let registry = Arc::new(ServerRegistry::new());
        let recorder = Arc::new(Recorder::default());
        let engine = MatchmakingEngine::new(
            registry.clone(),
            Arc::new(StaticIwads::new(["DOOM2.WAD"])),
            recorder.clone(),
        );
        (engine, registry, recorder)
    }

    #[tokio::test]
    async fn quick_match_finds_immediately() {
        let (engine, registry, recorder) = engine();
        registry.set_servers(vec![playable(1)]);
        let found = engine.quick_match().unwrap();
        assert_eq!(found.address.port, 1);
        assert_eq!(engine.state(), MonitoringState::Found);

        let accepted = engine.accept_match(recorder.as_ref()).unwrap();
        assert_eq!(accepted.address.port, 1);
        assert_eq!(*recorder.connected.lock(), vec!["10.0.0.2:1".to_string()]);
        assert_eq!(engine.state(), MonitoringState::Idle);
        assert!(engine.accept_match(recorder.as_ref()).is_none());
    }

    #[tokio::test]
    async fn no_match_stays_put_without_auto_monitoring() {
        let (engine, _registry, _) = engine();
        assert_eq!(engine.quick_match(), Err(NoMatchReason::NoServers));
        assert_eq!(engine.state(), MonitoringState::NoMatch);
        assert_eq!(engine.last_reason(), Some(NoMatchReason::NoServers));
    }

    #[tokio::test(start_paused = true)]
    async fn no_match_auto_starts_monitoring() {
        let (engine, _registry, _) = engine();
        engine.set_criteria(QuickMatchCriteria {
            auto_start_monitoring: true,
            ..Default::default()
        });
        assert!(engine.quick_match().is_err());
        assert_eq!(engine.state(), MonitoringState::Monitoring);
        assert!(engine.session().start_time.is_some());
        engine.stop_monitoring();
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_times_out_to_idle() {
        let (engine, _registry, recorder) = engine();
        engine.start_monitoring();
        assert_eq!(engine.state(), MonitoringState::Monitoring);

        tokio::time::sleep(Duration::from_secs(31 * 60)).await;

        let session = engine.session();
        assert_eq!(session.state, MonitoringState::Idle);
        assert!(session.match_found.is_none());
        let notes = recorder.notes.lock();
        assert_eq!(notes.len(), 1);
        assert!(!notes[0].2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_before_a_slow_first_poll() {
        let registry = Arc::new(ServerRegistry::new());
        let recorder = Arc::new(Recorder::default());
        let engine = MatchmakingEngine::new(
            registry,
            Arc::new(StaticIwads::new(["doom2"])),
            recorder.clone(),
        )
        .with_poll_interval(Duration::from_secs(3600));
        engine.set_criteria(QuickMatchCriteria {
            monitoring_timeout_minutes: 1,
            ..Default::default()
        });
        engine.start_monitoring();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(engine.state(), MonitoringState::Idle);
        let notes = recorder.notes.lock();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "Quick Match");
    }

    #[tokio::test(start_paused = true)]
    async fn monitoring_picks_up_new_server() {
        let (engine, registry, recorder) = engine();
        engine.start_monitoring();

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(engine.state(), MonitoringState::Monitoring);

        registry.set_servers(vec![playable(7)]);
        tokio::time::sleep(Duration::from_secs(31)).await;

        let session = engine.session();
        assert_eq!(session.state, MonitoringState::Found);
        assert_eq!(session.match_found.unwrap().address.port, 7);
        let notes = recorder.notes.lock();
        assert_eq!(notes[0].0, "Match found");
        assert!(notes[0].2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_monitoring_is_idempotent() {
        let (engine, registry, _) = engine();
        engine.start_monitoring();
        engine.stop_monitoring();
        engine.stop_monitoring();
        assert_eq!(engine.state(), MonitoringState::Idle);

        registry.set_servers(vec![playable(1)]);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(engine.state(), MonitoringState::Idle);
        assert!(engine.session().match_found.is_none());
    }
}

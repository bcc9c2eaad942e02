// src/main.rs
use std::sync::Arc;

use env_logger::Env;
use log::{error, info, warn};

use odalpapi::external::{ConnectSink, LogNotifier, StaticIwads};
use odalpapi::matchmaking::engine::MatchmakingEngine;
use odalpapi::{Browser, Config, ServerInfo, ServerRegistry};

/// Prints the command line a launcher would run.
struct PrintConnect;

impl ConnectSink for PrintConnect {
    fn connect(&self, server: &ServerInfo) {
        println!("odamex -connect {}", server.key());
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();
    let iwads = StaticIwads::new(
        std::env::var("ODALPAPI_IWADS")
            .unwrap_or_else(|_| "doom2,freedoom2".to_string())
            .split(','),
    );

    let registry = Arc::new(ServerRegistry::new());
    let notifier = Arc::new(LogNotifier);
    let browser = Browser::new(config.clone(), registry.clone(), notifier.clone());

    match browser.refresh().await {
        Ok(summary) => info!(
            "{} of {} servers responded",
            summary.responded, summary.listed
        ),
        Err(e) => {
            error!("Refresh failed: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    }

    match browser.refresh_lan().await {
        Ok(count) => info!("{} LAN servers", count),
        Err(e) => warn!("LAN discovery failed: {}", e),
    }

    let servers = registry.all_servers();
    let json = serde_json::to_string_pretty(&servers)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    println!("{}", json);

    let engine = MatchmakingEngine::new(registry, Arc::new(iwads), notifier)
        .with_poll_interval(config.monitor_interval());
    match engine.quick_match() {
        Ok(_) => {
            engine.accept_match(&PrintConnect);
        }
        Err(reason) => info!("Quick match: {}", reason),
    }

    Ok(())
}

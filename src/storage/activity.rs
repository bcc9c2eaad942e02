use std::collections::HashMap;

use crate::models::server::ServerInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityReport {
    pub messages: Vec<String>,
    /// Set when a known server's player count moved; new servers alone don't count.
    pub activity_detected: bool,
}

/// Diffs player counts between refresh cycles.
#[derive(Debug, Default)]
pub struct ActivityDetector {
    previous: HashMap<String, usize>,
}

impl ActivityDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(&mut self, servers: &[ServerInfo]) -> ActivityReport {
        let mut report = ActivityReport::default();

        for server in servers {
            let key = server.key();
            let count = server.total_clients();
            let name = server.display_name();

            match self.previous.get(&key) {
                None if count > 0 => {
                    report
                        .messages
                        .push(format!("New server: {} ({} players)", name, count));
                }
                None => {}
                Some(&before) if before != count => {
                    report.activity_detected = true;
                    let message = if count > before {
                        format!("{}: {} player(s) joined", name, count - before)
                    } else {
                        format!("{}: {} player(s) left", name, before - count)
                    };
                    report.messages.push(message);
                }
                Some(_) => {}
            }
            self.previous.insert(key, count);
        }

        report
    }

    pub fn known_servers(&self) -> usize {
        self.previous.len()
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

//! # OdalPapi browser core
//!
//! Discovery and live status of Odamex game servers over the OdalPapi UDP
//! protocol, plus a client-side quick-match heuristic.
//!
//! ```text
//! protocol/   codec + bounded reader, no I/O
//! net/        one-socket-per-query transport, bounded fan-out, cancellation
//! storage/    copy-on-write server registry, activity diffing
//! matchmaking/ candidate filter/score, monitoring state machine
//! refresh     master list -> fan-out -> registry -> activity
//! ```

pub mod config;
pub mod external;
pub mod matchmaking;
pub mod models;
pub mod net;
pub mod protocol;
pub mod refresh;
pub mod storage;
pub mod utils;

pub use config::{ClientConfig, Config};
pub use models::criteria::{MonitoringSession, MonitoringState, QuickMatchCriteria};
pub use models::server::{GameType, ServerAddress, ServerInfo};
pub use net::cancel::CancelToken;
pub use net::discovery::DiscoveryClient;
pub use net::scheduler::FanOutScheduler;
pub use refresh::Browser;
pub use storage::memory::ServerRegistry;
pub use utils::{QueryError, RefreshError};

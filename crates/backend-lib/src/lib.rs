// ============================
// relay-backend-lib/src/lib.rs
// ============================
//! Core functionality for the community relay server: membership, message
//! fan-out and live polls.

pub mod config;
pub mod error;
pub mod metrics;
pub mod polls;
pub mod presence;
pub mod registry;
pub mod relay_actor;
pub mod rooms;
pub mod router;
pub mod tally;
pub mod ws_router;

use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, Settings};
use crate::relay_actor::{spawn_relay_actor, RelayHandle};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the relay actor
    pub relay: RelayHandle,
    /// Loaded settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Spawn the relay actor. Must be called from within a tokio runtime.
    pub fn new(settings: Settings) -> Self {
        let relay = spawn_relay_actor(settings.fanout);
        Self {
            relay,
            settings: Arc::new(settings),
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match settings.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

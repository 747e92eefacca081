//! Tracing setup for hosts embedding the sync core
//!
//! The library itself only emits `tracing` events; binaries and test
//! harnesses call [`init`] once to get them on stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, SyncError};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "cryb_sync_core=info";

/// Install a global subscriber. `json` switches to structured JSON lines.
///
/// Fails if a global subscriber is already set.
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| SyncError::Config(format!("tracing init failed: {}", e)))
}

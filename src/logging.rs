//=============================================
// solvra_intercept/logging.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tracing setup for interception hosts
// Objective: Install one fmt subscriber per process, honouring RUST_LOG and
//            falling back to a configured filter
//=============================================

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

static INIT: OnceLock<()> = OnceLock::new();

/// Initialise tracing. `fallback` is used when `RUST_LOG` is unset or invalid.
/// Later calls are ignored.
pub fn init(fallback: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        // A host may already have installed its own subscriber.
        let _ = SubscriberBuilder::default()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    });
    tracing::debug!(filter = fallback, "tracing initialised");
}

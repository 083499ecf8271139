//! Installs the `tracing-subscriber` `fmt` layer the daemon runs under, configurable via
//! `RUST_LOG` (default `info`), matching the teacher's `common/src/tracing.rs` convention.

use tracing_subscriber::EnvFilter;

pub fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

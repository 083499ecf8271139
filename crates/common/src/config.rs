//! Daemon configuration. Built by layering (lowest to highest precedence) compiled-in
//! defaults, an optional YAML file, environment variables (`LOOM_*`), and CLI flags — the
//! `figment` layering style the teacher uses for its own daemon configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Address the WebSocket listener binds to.
    pub listen_addr: String,

    /// Directory the `fjall` repository keyspaces live under.
    pub db_path: PathBuf,

    /// Gas budget handed to a verb invoked directly via `execute` (spec.md §4.4).
    pub default_gas: u64,

    /// Gas budget handed to a verb invoked by the scheduler (spec.md §4.6).
    pub scheduler_gas: u64,

    /// The `min(remaining, cap)` used for event-broadcast sub-calls (spec.md §9).
    pub event_subcall_gas_cap: u64,

    /// How often the scheduler drains due entries (spec.md §4.6 "every 100 ms").
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Maximum native recursion depth for `evaluate` (SPEC_FULL.md §4.4).
    pub max_stack_depth: usize,

    /// Size of each connection's bounded outbound queue (spec.md §5 "Backpressure").
    pub outbound_queue_capacity: usize,

    /// Optional JSON world-seed file loaded at startup if the repository is empty
    /// (SPEC_FULL.md §3 "Seed/bootstrap data").
    pub world_seed_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:8787".to_string(),
            db_path: PathBuf::from("./loom-data"),
            default_gas: 100_000,
            scheduler_gas: 50_000,
            event_subcall_gas_cap: 500,
            tick_interval: Duration::from_millis(100),
            max_stack_depth: 512,
            outbound_queue_capacity: 256,
            world_seed_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.default_gas > 0);
        assert_eq!(cfg.tick_interval, Duration::from_millis(100));
    }
}

//! The loom daemon binary: wires the repository, capability store, opcode registry, interpreter,
//! scheduler, and dispatcher behind a WebSocket listener (SPEC_FULL.md §6).
//!
//! Grounded on the teacher's `crates/daemon/src/main.rs` startup sequence (config, tracing,
//! open the database, run import/seed, start serving) — the zmq RPC server, connection
//! registry, and worker-process machinery that version wires together are dropped, since
//! loom's dispatcher lives in-process rather than behind a separate RPC boundary.

mod args;
mod seed;
mod ws;

use crate::args::Args;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use color_eyre::eyre::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use loom_capability::CapabilityStore;
use loom_common::Config;
use loom_dispatcher::Dispatcher;
use loom_interpreter::{register_core_opcodes, OpcodeRegistry, SchedulerHandle};
use loom_repository::fjall_backend::FjallRepository;
use loom_repository::Repository;
use loom_scheduler::Scheduler;
use std::sync::Arc;
use tracing::info;

fn load_config(args: &Args) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = &args.config_file {
        figment = figment.merge(Yaml::file(path));
    }
    let mut config: Config = figment
        .merge(Env::prefixed("LOOM_"))
        .extract()
        .context("failed to build daemon configuration")?;

    if let Some(listen_addr) = &args.listen_addr {
        config.listen_addr = listen_addr.clone();
    }
    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(world_seed_path) = &args.world_seed_path {
        config.world_seed_path = Some(world_seed_path.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    loom_common::tracing_setup::install_tracing();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(listen_addr = %config.listen_addr, db_path = ?config.db_path, "starting loom daemon");

    let repository: Arc<dyn Repository> = Arc::new(
        FjallRepository::open(&config.db_path)
            .with_context(|| format!("opening repository at {}", config.db_path.display()))?,
    );
    let capabilities = Arc::new(CapabilityStore::new(repository.clone()));

    let mut registry = OpcodeRegistry::new();
    register_core_opcodes(&mut registry);
    loom_stdlib::install_all(&mut registry);
    let registry = Arc::new(registry);

    let fresh_world = seed::ensure_genesis(repository.as_ref(), &capabilities)?;
    if fresh_world {
        if let Some(world_seed_path) = &config.world_seed_path {
            seed::load_world_seed(repository.as_ref(), world_seed_path)?;
        }
    }

    let scheduler = Scheduler::new(
        repository.clone(),
        capabilities.clone(),
        registry.clone(),
        config.scheduler_gas as i64,
        config.max_stack_depth,
    );
    tokio::spawn(scheduler.clone().run(config.tick_interval));

    let dispatcher = Dispatcher::new(
        repository.clone(),
        capabilities.clone(),
        registry.clone(),
        Some(scheduler as Arc<dyn SchedulerHandle>),
        config.default_gas as i64,
        config.max_stack_depth,
        config.outbound_queue_capacity,
    );

    let state = ws::AppState {
        dispatcher,
        repository,
    };

    let app = Router::new().route("/ws", get(ws::upgrade)).with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");
    axum::serve(listener, app)
        .await
        .context("WebSocket server terminated")?;
    Ok(())
}

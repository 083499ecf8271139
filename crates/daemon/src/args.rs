//! CLI flags, layered over [`loom_common::Config`] by `figment` in `main.rs` (the teacher's
//! `crates/daemon/src/args.rs` `clap::Parser` + config-file + env layering style, pared down to
//! loom's much smaller configuration surface).

use clap::builder::ValueHint;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loom-daemon", about = "The loom virtual-world daemon")]
pub struct Args {
    #[arg(
        short,
        long,
        value_name = "config",
        help = "Path to a YAML configuration file layered under environment variables and these flags",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "listen-addr",
        help = "Address the WebSocket listener binds to, e.g. 127.0.0.1:8787"
    )]
    pub listen_addr: Option<String>,

    #[arg(
        short,
        long,
        value_name = "db-path",
        help = "Directory the repository's fjall keyspaces live under",
        value_hint = ValueHint::DirPath
    )]
    pub db_path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "world-seed",
        help = "JSON worlddump file loaded once, the first time the repository is empty",
        value_hint = ValueHint::FilePath
    )]
    pub world_seed_path: Option<PathBuf>,
}

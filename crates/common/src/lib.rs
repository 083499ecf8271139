pub mod config;
pub mod tracing_setup;
pub mod wire;

pub use config::Config;

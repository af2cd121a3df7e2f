pub mod backtest;
pub mod calibration;
pub mod config;
pub mod dixon_coles;
pub mod domain;
pub mod elo;
pub mod error;
pub mod estimator;
pub mod evaluator;
pub mod history;
pub mod league_params;
pub mod optimizer;
pub mod prediction;
pub mod rankings;
pub mod score_model;
pub mod synthetic;

pub use error::{ModelError, ModelResult};

/// Installs the `tracing` fmt subscriber for the binaries, honouring `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

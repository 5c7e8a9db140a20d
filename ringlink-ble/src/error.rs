//! Errors raised while setting up the radio or the tool

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
    #[error("must run inside a tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

//! Ringlink BLE
//!
//! Runs the ring session engine over a real Bluetooth adapter via btleplug.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ringlink_ble::driver;
//! use ringlink_session::SessionConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = driver::open(SessionConfig::default(), Arc::new(())).await?;
//!     link.engine.start_connect_flow();
//!     tokio::signal::ctrl_c().await?;
//!     link.engine.stop_and_disconnect(true);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod driver;
mod error;
pub mod retry;
pub mod transport;

pub use config::{Config, ConfigError};
pub use error::BleError;

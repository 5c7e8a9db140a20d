//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ringlink_proto::ble::{self, EndpointDirectory, TargetIdentity};

use crate::StopTiming;

/// Tunables for one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Address of the peripheral to connect to (compared case-insensitively)
    pub target_address: String,
    /// Advertised name that also identifies the target
    pub target_name: String,
    /// Sent once notifications are enabled; `None` to send nothing
    pub start_command: Option<String>,
    /// Pause after each stop-sequence frame
    pub stop_step_delay_ms: u64,
    /// Pause after the reboot frame
    pub reboot_settle_ms: u64,
    /// How long to wait for the last stop frame to drain before forcing the disconnect
    pub stop_drain_grace_ms: u64,
    /// Minimum gap between two scan log lines for the same address
    pub scan_log_throttle_ms: u64,
}

impl SessionConfig {
    pub fn directory(&self) -> EndpointDirectory {
        EndpointDirectory::with_target(TargetIdentity::new(
            &self.target_address,
            &self.target_name,
        ))
    }

    pub fn stop_timing(&self) -> StopTiming {
        StopTiming {
            step: Duration::from_millis(self.stop_step_delay_ms),
            reboot_settle: Duration::from_millis(self.reboot_settle_ms),
            drain_grace: Duration::from_millis(self.stop_drain_grace_ms),
        }
    }

    pub fn scan_log_throttle(&self) -> Duration {
        Duration::from_millis(self.scan_log_throttle_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_address: ble::TARGET_ADDRESS.to_string(),
            target_name: ble::TARGET_NAME.to_string(),
            start_command: Some(ble::commands::START_RAW.to_string()),
            stop_step_delay_ms: 200,
            reboot_settle_ms: 650,
            stop_drain_grace_ms: 1000,
            scan_log_throttle_ms: 1500,
        }
    }
}

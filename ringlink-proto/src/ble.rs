//! BLE endpoint directory for the ring
//!
//! Identity of the target peripheral, the candidate characteristics used for
//! notifications and for commands (in priority order), and the command
//! constants. Everything here is fixed at build time.

use uuid::Uuid;

/// Bluetooth address of the target ring
pub const TARGET_ADDRESS: &str = "30:35:47:33:DA:00";

/// Advertised name of the target ring
pub const TARGET_NAME: &str = "R02_DA00";

/// Client Characteristic Configuration Descriptor (notify/indicate enable)
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Nordic UART TX (notify)
pub const UART_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Nordic UART RX (write)
pub const UART_RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Vendor notify characteristic
pub const VENDOR_NOTIFY_UUID: Uuid = Uuid::from_u128(0xde5bf729_d711_4e47_af26_65e3012a5dc7);

/// Vendor write characteristic
pub const VENDOR_WRITE_UUID: Uuid = Uuid::from_u128(0xde5bf72a_d711_4e47_af26_65e3012a5dc7);

pub const FEA1_UUID: Uuid = Uuid::from_u128(0x0000fea1_0000_1000_8000_00805f9b34fb);

/// Notifies and also accepts writes on some firmware
pub const FEA2_UUID: Uuid = Uuid::from_u128(0x0000fea2_0000_1000_8000_00805f9b34fb);

/// Notification candidates, highest priority first
pub const NOTIFY_UUIDS: [Uuid; 4] = [UART_TX_UUID, VENDOR_NOTIFY_UUID, FEA1_UUID, FEA2_UUID];

/// Command-write candidates, highest priority first
pub const COMMAND_UUIDS: [Uuid; 3] = [UART_RX_UUID, VENDOR_WRITE_UUID, FEA2_UUID];

/// Command hex literals
pub mod commands {
    /// Start raw sensor streaming
    pub const START_RAW: &str = "A10404";

    /// Stop raw sensor streaming
    pub const STOP_RAW: &str = "A102";

    /// Stop camera feedback (LEDs)
    pub const STOP_CAMERA: &str = "0206";

    /// Reboot - drops the link, framed as `08 00..00 08`
    pub const REBOOT: &str = "08";
}

/// Identity a discovered peripheral is matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIdentity {
    pub address: String,
    pub name: String,
}

impl TargetIdentity {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    /// Address matches case-insensitively, name matches exactly
    pub fn matches(&self, address: &str, name: &str) -> bool {
        address.eq_ignore_ascii_case(&self.address) || (!name.is_empty() && name == self.name)
    }
}

impl Default for TargetIdentity {
    fn default() -> Self {
        Self::new(TARGET_ADDRESS, TARGET_NAME)
    }
}

/// The full directory consumed by the session engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDirectory {
    pub target: TargetIdentity,
    pub notify: Vec<Uuid>,
    pub command: Vec<Uuid>,
}

impl EndpointDirectory {
    pub fn with_target(target: TargetIdentity) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }
}

impl Default for EndpointDirectory {
    fn default() -> Self {
        Self {
            target: TargetIdentity::default(),
            notify: NOTIFY_UUIDS.to_vec(),
            command: COMMAND_UUIDS.to_vec(),
        }
    }
}

//! The link the engine drives, and the channel model it sees

use std::fmt;

use uuid::Uuid;

use crate::TransportError;

/// Declared capabilities of a channel (GATT characteristic properties)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelProps {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl ChannelProps {
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }

    /// Notify wins over indicate when both are offered
    pub fn notify_mode(&self) -> Option<NotifyMode> {
        match (self.notify, self.indicate) {
            (true, _) => Some(NotifyMode::Notify),
            (false, true) => Some(NotifyMode::Indicate),
            (false, false) => None,
        }
    }
}

impl fmt::Display for ChannelProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            (self.read, "READ"),
            (self.write, "WRITE"),
            (self.write_without_response, "WRITE_NR"),
            (self.notify, "NOTIFY"),
            (self.indicate, "INDICATE"),
        ];
        let mut first = true;
        for (set, name) in parts {
            if !set {
                continue;
            }
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// A channel found on the connected peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub uuid: Uuid,
    pub props: ChannelProps,
}

impl Channel {
    pub fn new(uuid: Uuid, props: ChannelProps) -> Self {
        Self { uuid, props }
    }
}

/// Value written to the CCCD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    Notify,
    Indicate,
}

impl NotifyMode {
    /// CCCD enable value, little endian
    pub fn descriptor_value(&self) -> [u8; 2] {
        match self {
            NotifyMode::Notify => [0x01, 0x00],
            NotifyMode::Indicate => [0x02, 0x00],
        }
    }
}

impl fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyMode::Notify => f.write_str("NOTIFY"),
            NotifyMode::Indicate => f.write_str("INDICATE"),
        }
    }
}

/// Acknowledged or unacknowledged characteristic write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::WithResponse => f.write_str("WITH_RESPONSE"),
            WriteKind::WithoutResponse => f.write_str("NO_RESPONSE"),
        }
    }
}

/// A BLE link that accepts one request at a time.
///
/// Every method only *starts* an operation and must not block. `Ok(())`
/// means the request was accepted; its completion is reported exactly once
/// as a [`crate::LinkEvent`] handed to [`crate::Engine::handle_event`].
/// An `Err` means nothing was started and no completion will follow.
///
/// `stop_scan`, `disconnect` and `close` are fire-and-forget.
pub trait Transport: Send + 'static {
    fn start_scan(&mut self) -> Result<(), TransportError>;

    fn stop_scan(&mut self);

    /// Open a link to a peripheral previously reported as found.
    /// Completes with `Connected` or `Disconnected`.
    ///
    /// Every link-level event of this link (`Connected`, `Disconnected`,
    /// `ServicesDiscovered`) carries `attempt`, so the engine can drop events
    /// from a link it has already torn down.
    fn connect(&mut self, address: &str, attempt: u64) -> Result<(), TransportError>;

    /// Completes with `ServicesDiscovered`.
    fn discover_services(&mut self) -> Result<(), TransportError>;

    /// Write the CCCD of `channel`. Completes with `DescriptorWritten`.
    fn enable_notifications(&mut self, channel: Uuid, mode: NotifyMode)
    -> Result<(), TransportError>;

    /// Completes with `CharacteristicWritten`.
    fn write(&mut self, channel: Uuid, payload: &[u8], kind: WriteKind)
    -> Result<(), TransportError>;

    /// Completes with `RssiRead`.
    fn read_rssi(&mut self) -> Result<(), TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Release the link handle
    fn close(&mut self) -> Result<(), TransportError>;
}

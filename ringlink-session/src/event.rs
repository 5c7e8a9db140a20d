//! Events flowing into the engine and notices flowing out of it

use std::fmt;

use uuid::Uuid;

use crate::Channel;

/// Completion and push events reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The requested link is up
    Connected { attempt: u64 },
    /// The link went away (requested or not)
    Disconnected {
        attempt: u64,
        reason: Option<String>,
    },
    ServicesDiscovered {
        attempt: u64,
        result: Result<Vec<Channel>, String>,
    },
    DescriptorWritten { channel: Uuid, ok: bool },
    CharacteristicWritten { channel: Uuid, ok: bool },
    /// Notification or indication payload
    Notification { channel: Uuid, value: Vec<u8> },
    RssiRead(Result<i16, String>),
    ScanFailed(String),
}

/// States reported to the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    Subscribing,
    Streaming,
    Disconnecting,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Scanning => "Scanning",
            SessionState::Connecting => "Connecting",
            SessionState::DiscoveringServices => "Discovering services",
            SessionState::Subscribing => "Subscribing",
            SessionState::Streaming => "Streaming",
            SessionState::Disconnecting => "Disconnecting",
            SessionState::Disconnected => "Disconnected",
        }
    }

    /// No link and nothing in progress
    pub fn is_down(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer of everything the engine reports.
///
/// Called after the engine's lock is released, so implementations may call
/// back into the [`crate::Engine`].
pub trait SessionObserver: Send + Sync + 'static {
    fn on_log(&self, _line: &str) {}

    fn on_state(&self, _state: SessionState) {}

    /// Raw notification payload, uninterpreted
    fn on_bytes(&self, _channel: Uuid, _payload: &[u8]) {}

    fn on_signal_strength(&self, _dbm: i16) {}
}

/// Observer that discards everything
impl SessionObserver for () {}

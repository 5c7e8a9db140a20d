//! Error taxonomy for the session engine

use uuid::Uuid;

use ringlink_proto::FrameError;

/// Why a transport request could not be started
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no active link")]
    NoLink,
    #[error("another request is in flight")]
    Busy,
    #[error("channel {0} not found")]
    ChannelNotFound(Uuid),
    #[error("channel {0} is not writable")]
    NotWritable(Uuid),
    #[error("unknown peripheral {0}")]
    UnknownPeripheral(String),
    #[error("no scanner available")]
    ScanUnavailable,
    #[error("{0}")]
    Backend(String),
}

/// Session-level failures.
///
/// Only [`SessionError::InvalidCommand`] is ever returned to a caller; the
/// rest are absorbed by the engine and show up in log lines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("scan unavailable: {0}")]
    ScanUnavailable(String),
    #[error("link lost: {0}")]
    LinkLost(String),
    #[error("service discovery failed: {0}")]
    ServiceDiscoveryFailed(String),
    #[error("channel not found: {0}")]
    ChannelNotFound(Uuid),
    #[error("write not accepted on {channel}: {reason}")]
    WriteNotAccepted { channel: Uuid, reason: String },
    #[error(transparent)]
    InvalidCommand(#[from] FrameError),
}

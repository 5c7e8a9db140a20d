//! Ringlink Session - the peripheral session engine
//!
//! Drives one link to the ring from scan to teardown: matches the target
//! during a scan, connects, enables notifications one descriptor write at a
//! time, serializes command frames, and runs the stop sequence.
//!
//! The engine never blocks. Every request goes to a [`Transport`] which only
//! *starts* the operation; the outcome comes back later as a [`LinkEvent`]
//! passed to [`Engine::handle_event`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ringlink_session::{Engine, SessionConfig};
//!
//! let engine = Engine::new(transport, SessionConfig::default(), Arc::new(observer));
//! engine.start_connect_flow();
//! // feed transport completions and discoveries:
//! //   engine.on_peripheral_found(addr, name, rssi)
//! //   engine.handle_event(event)
//! engine.stop_and_disconnect(true);
//! ```

mod command;
mod config;
mod engine;
mod error;
mod event;
mod outbox;
mod scan;
mod slot;
mod stop;
mod subscribe;
mod transport;

#[cfg(test)]
mod fake;

pub use command::CommandDisposition;
pub use config::SessionConfig;
pub use engine::{Engine, Phase, SessionSnapshot};
pub use error::{SessionError, TransportError};
pub use event::{LinkEvent, SessionObserver, SessionState};
pub use scan::ScanTrigger;
pub use slot::InFlight;
pub use stop::StopTiming;
pub use transport::{Channel, ChannelProps, NotifyMode, Transport, WriteKind};

pub use ringlink_proto::ble::{EndpointDirectory, TargetIdentity};
pub use ringlink_proto::{Frame, FrameError};

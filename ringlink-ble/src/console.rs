//! Observer that forwards engine output to the tool's main loop

use std::time::{Duration, Instant};

use data_encoding::HEXUPPER;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use ringlink_session::{SessionObserver, SessionState};

/// Bytes shown per packet in the RX line
const RX_PREVIEW: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    State(SessionState),
    Bytes { channel: Uuid, payload: Vec<u8> },
    SignalStrength(i16),
}

/// Log lines already go to `tracing`; everything else is forwarded.
pub struct ChannelObserver {
    tx: UnboundedSender<UiEvent>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_state(&self, state: SessionState) {
        self.forward(UiEvent::State(state));
    }

    fn on_bytes(&self, channel: Uuid, payload: &[u8]) {
        self.forward(UiEvent::Bytes {
            channel,
            payload: payload.to_vec(),
        });
    }

    fn on_signal_strength(&self, dbm: i16) {
        self.forward(UiEvent::SignalStrength(dbm));
    }
}

/// `RX len=<n> hex=<first bytes>`
pub fn rx_line(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(RX_PREVIEW)];
    format!("RX len={} hex={}", payload.len(), HEXUPPER.encode(shown))
}

/// Notifications per second, sampled about once a second
#[derive(Debug)]
pub struct PacketRate {
    count: u64,
    since: Instant,
}

impl PacketRate {
    pub fn new(now: Instant) -> Self {
        Self { count: 0, since: now }
    }

    pub fn record(&mut self) {
        self.count += 1;
    }

    /// Rate over the window ending at `now`, once at least a second has passed
    pub fn sample(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.since);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        let rate = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.since = now;
        Some(rate)
    }
}

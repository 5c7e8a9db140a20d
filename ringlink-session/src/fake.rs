//! In-memory transport and observer used by the engine tests

use std::collections::HashSet;
use std::sync::Mutex;

use uuid::Uuid;

use crate::{NotifyMode, SessionObserver, SessionState, Transport, TransportError, WriteKind};

/// An accepted transport request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartScan,
    StopScan,
    Connect(String),
    DiscoverServices,
    EnableNotifications(Uuid, NotifyMode),
    Write {
        channel: Uuid,
        payload: Vec<u8>,
        kind: WriteKind,
    },
    ReadRssi,
    Disconnect,
    Close,
}

/// Records every accepted request; completions are fed back by the test.
#[derive(Debug, Default)]
pub struct FakeTransport {
    pub requests: Vec<Request>,
    pub refuse_writes: HashSet<Uuid>,
    pub refuse_descriptors: HashSet<Uuid>,
    pub scan_unavailable: bool,
    /// Tag of the latest connect request
    pub attempt: u64,
}

impl FakeTransport {
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>, WriteKind)> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::Write {
                    channel,
                    payload,
                    kind,
                } => Some((*channel, payload.clone(), *kind)),
                _ => None,
            })
            .collect()
    }

    pub fn descriptors(&self) -> Vec<Uuid> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::EnableNotifications(channel, _) => Some(*channel),
                _ => None,
            })
            .collect()
    }

    pub fn descriptor_modes(&self) -> Vec<(Uuid, NotifyMode)> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::EnableNotifications(channel, mode) => Some((*channel, *mode)),
                _ => None,
            })
            .collect()
    }
}

impl Transport for FakeTransport {
    fn start_scan(&mut self) -> Result<(), TransportError> {
        if self.scan_unavailable {
            return Err(TransportError::ScanUnavailable);
        }
        self.requests.push(Request::StartScan);
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.requests.push(Request::StopScan);
    }

    fn connect(&mut self, address: &str, attempt: u64) -> Result<(), TransportError> {
        self.attempt = attempt;
        self.requests.push(Request::Connect(address.to_string()));
        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), TransportError> {
        self.requests.push(Request::DiscoverServices);
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        channel: Uuid,
        mode: NotifyMode,
    ) -> Result<(), TransportError> {
        if self.refuse_descriptors.contains(&channel) {
            return Err(TransportError::Backend("descriptor write refused".to_string()));
        }
        self.requests.push(Request::EnableNotifications(channel, mode));
        Ok(())
    }

    fn write(&mut self, channel: Uuid, payload: &[u8], kind: WriteKind) -> Result<(), TransportError> {
        if self.refuse_writes.contains(&channel) {
            return Err(TransportError::Backend("write refused".to_string()));
        }
        self.requests.push(Request::Write {
            channel,
            payload: payload.to_vec(),
            kind,
        });
        Ok(())
    }

    fn read_rssi(&mut self) -> Result<(), TransportError> {
        self.requests.push(Request::ReadRssi);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.requests.push(Request::Disconnect);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.requests.push(Request::Close);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    logs: Mutex<Vec<String>>,
    states: Mutex<Vec<SessionState>>,
    bytes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    rssi: Mutex<Vec<i16>>,
}

impl RecordingObserver {
    pub fn logged(&self, needle: &str) -> bool {
        self.logs.lock().unwrap().iter().any(|l| l.contains(needle))
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap().clone()
    }

    pub fn last_state(&self) -> Option<SessionState> {
        self.states.lock().unwrap().last().copied()
    }

    pub fn bytes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.bytes.lock().unwrap().clone()
    }

    pub fn rssi(&self) -> Vec<i16> {
        self.rssi.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_log(&self, line: &str) {
        self.logs.lock().unwrap().push(line.to_string());
    }

    fn on_state(&self, state: SessionState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_bytes(&self, channel: Uuid, payload: &[u8]) {
        self.bytes.lock().unwrap().push((channel, payload.to_vec()));
    }

    fn on_signal_strength(&self, dbm: i16) {
        self.rssi.lock().unwrap().push(dbm);
    }
}

//! Work collected under the engine lock and delivered after it is released

use uuid::Uuid;

use crate::SessionState;
use crate::stop::StopRun;

#[derive(Debug)]
pub(crate) enum Notice {
    Log(String),
    State(SessionState),
    Bytes { channel: Uuid, value: Vec<u8> },
    SignalStrength(i16),
}

#[derive(Debug)]
pub(crate) enum Effect {
    LaunchStop(StopRun),
}

#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub notices: Vec<Notice>,
    pub effects: Vec<Effect>,
}

impl Outbox {
    pub fn log(&mut self, line: impl Into<String>) {
        self.notices.push(Notice::Log(line.into()));
    }

    pub fn state(&mut self, state: SessionState) {
        self.notices.push(Notice::State(state));
    }

    pub fn bytes(&mut self, channel: Uuid, value: Vec<u8>) {
        self.notices.push(Notice::Bytes { channel, value });
    }

    pub fn signal_strength(&mut self, dbm: i16) {
        self.notices.push(Notice::SignalStrength(dbm));
    }

    pub fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }
}

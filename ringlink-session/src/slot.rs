//! The single in-flight request slot shared by both queues

use uuid::Uuid;

use crate::TransportError;

/// The one request outstanding on the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlight {
    Descriptor(Uuid),
    Write(Uuid),
}

/// Holds at most one [`InFlight`]; a request can only be started while empty.
#[derive(Debug, Default)]
pub(crate) struct Slot(Option<InFlight>);

impl Slot {
    pub fn current(&self) -> Option<InFlight> {
        self.0
    }

    pub fn is_busy(&self) -> bool {
        self.0.is_some()
    }

    /// Run `start` and occupy the slot if it accepted the request
    pub fn issue<F>(&mut self, op: InFlight, start: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Result<(), TransportError>,
    {
        if self.0.is_some() {
            return Err(TransportError::Busy);
        }
        start()?;
        self.0 = Some(op);
        Ok(())
    }

    /// Free the slot if it holds a descriptor write
    pub fn complete_descriptor(&mut self) -> bool {
        match self.0 {
            Some(InFlight::Descriptor(_)) => {
                self.0 = None;
                true
            }
            _ => false,
        }
    }

    /// Free the slot if it holds a characteristic write
    pub fn complete_write(&mut self) -> bool {
        match self.0 {
            Some(InFlight::Write(_)) => {
                self.0 = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

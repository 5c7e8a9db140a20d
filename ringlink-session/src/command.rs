//! Command queue: one framed write outstanding at a time

use std::collections::VecDeque;

use uuid::Uuid;

use ringlink_proto::Frame;

use crate::outbox::Outbox;
use crate::slot::{InFlight, Slot};
use crate::{Channel, SessionError, Transport, WriteKind};

/// What happened to a command handed to [`crate::Engine::write_command`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDisposition {
    /// Appended to the command queue
    Queued,
    /// Held in the pending slot until subscriptions complete
    Deferred,
    /// Dropped: no link
    NoLink,
    /// Dropped: the stop sequence owns the link
    Stopping,
}

/// Result of one [`CommandQueue::kick`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kick {
    /// The slot holds another request
    Busy,
    /// A write is in flight
    Started,
    /// Queue is empty
    Idle,
    /// Queue is empty and a disconnect was requested once it drained
    Drained,
}

#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    queue: VecDeque<Frame>,
    disconnect_when_drained: bool,
}

impl CommandQueue {
    pub fn enqueue(&mut self, frame: Frame) {
        self.queue.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn disconnect_when_drained(&self) -> bool {
        self.disconnect_when_drained
    }

    pub fn request_disconnect_when_drained(&mut self) {
        self.disconnect_when_drained = true;
    }

    /// Start the next write unless one is outstanding.
    ///
    /// A frame no candidate channel accepts is dropped and the next one is
    /// tried, so the queue never stalls on an unwritable peripheral.
    pub fn kick<T: Transport>(
        &mut self,
        transport: &mut T,
        channels: &[Channel],
        candidates: &[Uuid],
        slot: &mut Slot,
        out: &mut Outbox,
    ) -> Kick {
        if slot.is_busy() {
            return Kick::Busy;
        }

        while let Some(frame) = self.queue.pop_front() {
            if write_frame(transport, channels, candidates, slot, &frame, out) {
                return Kick::Started;
            }
            out.log(format!(
                "cmd not sent: no command channel accepted hex={}",
                frame.to_hex()
            ));
        }

        if self.disconnect_when_drained {
            Kick::Drained
        } else {
            Kick::Idle
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.disconnect_when_drained = false;
    }
}

/// Unacknowledged when the channel allows it; reboot is always acknowledged.
fn write_kind(channel: &Channel, frame: &Frame) -> WriteKind {
    if !frame.is_reboot() && channel.props.write_without_response {
        WriteKind::WithoutResponse
    } else {
        WriteKind::WithResponse
    }
}

fn write_frame<T: Transport>(
    transport: &mut T,
    channels: &[Channel],
    candidates: &[Uuid],
    slot: &mut Slot,
    frame: &Frame,
    out: &mut Outbox,
) -> bool {
    for uuid in candidates {
        let Some(channel) = channels.iter().find(|c| c.uuid == *uuid) else {
            continue;
        };
        if !channel.props.is_writable() {
            continue;
        }

        let kind = write_kind(channel, frame);
        let started = slot.issue(InFlight::Write(channel.uuid), || {
            transport.write(channel.uuid, frame.as_bytes(), kind)
        });
        out.log(format!(
            "cmd write try uuid={} ok={} writeType={kind} hex={}",
            channel.uuid,
            started.is_ok(),
            frame.to_hex()
        ));
        match started {
            Ok(()) => return true,
            Err(e) => out.log(
                SessionError::WriteNotAccepted {
                    channel: channel.uuid,
                    reason: e.to_string(),
                }
                .to_string(),
            ),
        }
    }
    false
}

//! Subscription queue: enables notifications one descriptor write at a time

use std::collections::VecDeque;

use uuid::Uuid;

use crate::outbox::Outbox;
use crate::slot::{InFlight, Slot};
use crate::{Channel, SessionError, Transport};

/// Result of one [`SubscriptionQueue::advance`] step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Not subscribing
    Idle,
    /// The slot holds another request; try again on its completion
    Busy,
    /// A descriptor write is in flight
    Issued,
    /// Every channel has been handled and the in-progress flag is now clear
    Completed,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionQueue {
    queue: VecDeque<Channel>,
    in_progress: bool,
}

impl SubscriptionQueue {
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Queue every candidate present on the peripheral, in candidate order
    pub fn begin(&mut self, candidates: &[Uuid], discovered: &[Channel], out: &mut Outbox) {
        self.queue.clear();
        for uuid in candidates {
            match discovered.iter().find(|c| c.uuid == *uuid) {
                Some(channel) => self.queue.push_back(*channel),
                None => out.log(format!("{}; skipping", SessionError::ChannelNotFound(*uuid))),
            }
        }
        self.in_progress = true;
    }

    /// Issue the next descriptor write, skipping channels that cannot take one
    pub fn advance<T: Transport>(
        &mut self,
        transport: &mut T,
        slot: &mut Slot,
        out: &mut Outbox,
    ) -> Advance {
        if !self.in_progress {
            return Advance::Idle;
        }
        if slot.is_busy() {
            return Advance::Busy;
        }

        while let Some(channel) = self.queue.pop_front() {
            let Some(mode) = channel.props.notify_mode() else {
                out.log(format!(
                    "skip subscribe uuid={} props=[{}]: no notify/indicate",
                    channel.uuid, channel.props
                ));
                continue;
            };

            let started = slot.issue(InFlight::Descriptor(channel.uuid), || {
                transport.enable_notifications(channel.uuid, mode)
            });
            match started {
                Ok(()) => {
                    out.log(format!("subscribe uuid={} mode={mode}", channel.uuid));
                    return Advance::Issued;
                }
                Err(e) => {
                    out.log(format!(
                        "subscribe uuid={} failed to start: {e}; skipping",
                        channel.uuid
                    ));
                }
            }
        }

        self.in_progress = false;
        Advance::Completed
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.in_progress = false;
    }
}

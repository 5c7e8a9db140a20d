//! btleplug implementation of the session transport
//!
//! Each request is started on the runtime and returns at once; the outcome
//! is sent back as a [`LinkEvent`] on the channel handed to
//! [`BtleplugTransport::new`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CharPropFlags, Characteristic, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ringlink_session::{
    Channel, ChannelProps, LinkEvent, NotifyMode, Transport, TransportError, WriteKind,
};

use crate::BleError;

struct Book<P> {
    by_address: HashMap<String, P>,
    /// Linked peripheral and the connect attempt it belongs to
    active: Option<(PeripheralId, u64)>,
}

/// Peripherals seen during the current scan, by address, plus the one
/// currently linked
pub struct PeripheralRegistry<P = Peripheral>(Arc<Mutex<Book<P>>>);

impl<P> Clone for PeripheralRegistry<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> Default for PeripheralRegistry<P> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Book {
            by_address: HashMap::new(),
            active: None,
        })))
    }
}

impl<P: Clone> PeripheralRegistry<P> {
    pub fn insert(&self, address: String, peripheral: P) {
        self.book().by_address.insert(address, peripheral);
    }

    /// Forget everything seen by earlier scans
    pub fn clear_seen(&self) {
        self.book().by_address.clear();
    }

    pub fn len(&self) -> usize {
        self.book().by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, address: &str) -> Option<P> {
        let book = self.book();
        book.by_address
            .get(address)
            .or_else(|| {
                book.by_address
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(address))
                    .map(|(_, p)| p)
            })
            .cloned()
    }

    /// Connect attempt of the linked peripheral, if `id` is the one linked
    pub fn active_attempt(&self, id: &PeripheralId) -> Option<u64> {
        match &self.book().active {
            Some((active, attempt)) if active == id => Some(*attempt),
            _ => None,
        }
    }

    fn set_active(&self, active: Option<(PeripheralId, u64)>) {
        self.book().active = active;
    }

    fn book(&self) -> MutexGuard<'_, Book<P>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ActiveLink {
    peripheral: Peripheral,
    attempt: u64,
    token: CancellationToken,
}

pub struct BtleplugTransport {
    adapter: Adapter,
    registry: PeripheralRegistry,
    events: UnboundedSender<LinkEvent>,
    runtime: Handle,
    link: Option<ActiveLink>,
}

impl BtleplugTransport {
    /// Must be called from inside a tokio runtime
    pub fn new(
        adapter: Adapter,
        registry: PeripheralRegistry,
        events: UnboundedSender<LinkEvent>,
    ) -> Result<Self, BleError> {
        Ok(Self {
            adapter,
            registry,
            events,
            runtime: Handle::try_current()?,
            link: None,
        })
    }

    fn active(&self) -> Result<&ActiveLink, TransportError> {
        self.link.as_ref().ok_or(TransportError::NoLink)
    }

    fn peripheral(&self) -> Result<&Peripheral, TransportError> {
        self.active().map(|link| &link.peripheral)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::ChannelNotFound(uuid))
    }
}

fn send(events: &UnboundedSender<LinkEvent>, event: LinkEvent) {
    if events.send(event).is_err() {
        tracing::debug!("link event receiver gone");
    }
}

pub fn channel_props(flags: CharPropFlags) -> ChannelProps {
    ChannelProps {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

pub fn write_type(kind: WriteKind) -> WriteType {
    match kind {
        WriteKind::WithResponse => WriteType::WithResponse,
        WriteKind::WithoutResponse => WriteType::WithoutResponse,
    }
}

impl Transport for BtleplugTransport {
    fn start_scan(&mut self) -> Result<(), TransportError> {
        self.registry.clear_seen();
        let adapter = self.adapter.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                send(&events, LinkEvent::ScanFailed(e.to_string()));
            }
        });
        Ok(())
    }

    fn stop_scan(&mut self) {
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                tracing::debug!(error = %e, "stop scan");
            }
        });
    }

    fn connect(&mut self, address: &str, attempt: u64) -> Result<(), TransportError> {
        let peripheral = self
            .registry
            .get(address)
            .ok_or_else(|| TransportError::UnknownPeripheral(address.to_string()))?;
        let token = CancellationToken::new();
        self.registry.set_active(Some((peripheral.id(), attempt)));
        self.link = Some(ActiveLink {
            peripheral: peripheral.clone(),
            attempt,
            token: token.clone(),
        });

        let events = self.events.clone();
        self.runtime.spawn(async move {
            if let Err(e) = peripheral.connect().await {
                send(&events, LinkEvent::Disconnected {
                    attempt,
                    reason: Some(e.to_string()),
                });
                return;
            }

            let mut notifications = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "no notification stream");
                    send(&events, LinkEvent::Connected { attempt });
                    return;
                }
            };
            send(&events, LinkEvent::Connected { attempt });

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = notifications.next() => match next {
                        Some(n) => send(&events, LinkEvent::Notification {
                            channel: n.uuid,
                            value: n.value,
                        }),
                        None => break,
                    },
                }
            }
            tracing::debug!("notification stream closed");
        });
        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), TransportError> {
        let link = self.active()?;
        let peripheral = link.peripheral.clone();
        let attempt = link.attempt;
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = match peripheral.discover_services().await {
                Ok(()) => Ok(peripheral
                    .characteristics()
                    .into_iter()
                    .map(|c| Channel::new(c.uuid, channel_props(c.properties)))
                    .collect()),
                Err(e) => Err(e.to_string()),
            };
            send(&events, LinkEvent::ServicesDiscovered { attempt, result });
        });
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        channel: Uuid,
        mode: NotifyMode,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(channel)?;
        if channel_props(characteristic.properties).notify_mode().is_none() {
            return Err(TransportError::Backend(format!(
                "{channel} supports neither notify nor indicate"
            )));
        }
        let peripheral = self.peripheral()?.clone();
        let events = self.events.clone();
        tracing::debug!(%channel, %mode, cccd = ?mode.descriptor_value(), "subscribe");
        // The platform writes the CCCD itself, picking notify over indicate
        self.runtime.spawn(async move {
            let result = peripheral.subscribe(&characteristic).await;
            if let Err(e) = &result {
                tracing::warn!(%channel, error = %e, "subscribe failed");
            }
            send(&events, LinkEvent::DescriptorWritten {
                channel,
                ok: result.is_ok(),
            });
        });
        Ok(())
    }

    fn write(&mut self, channel: Uuid, payload: &[u8], kind: WriteKind) -> Result<(), TransportError> {
        let characteristic = self.characteristic(channel)?;
        if !channel_props(characteristic.properties).is_writable() {
            return Err(TransportError::NotWritable(channel));
        }
        let peripheral = self.peripheral()?.clone();
        let events = self.events.clone();
        let payload = payload.to_vec();
        self.runtime.spawn(async move {
            let result = peripheral
                .write(&characteristic, &payload, write_type(kind))
                .await;
            if let Err(e) = &result {
                tracing::warn!(%channel, error = %e, "write failed");
            }
            send(&events, LinkEvent::CharacteristicWritten {
                channel,
                ok: result.is_ok(),
            });
        });
        Ok(())
    }

    fn read_rssi(&mut self) -> Result<(), TransportError> {
        let peripheral = self.peripheral()?.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let result = match peripheral.properties().await {
                Ok(Some(props)) => props.rssi.ok_or_else(|| "no RSSI reported".to_string()),
                Ok(None) => Err("no properties".to_string()),
                Err(e) => Err(e.to_string()),
            };
            send(&events, LinkEvent::RssiRead(result));
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NoLink)?;
        link.token.cancel();
        let peripheral = link.peripheral.clone();
        self.runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                tracing::debug!(error = %e, "disconnect");
            }
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let link = self.link.take().ok_or(TransportError::NoLink)?;
        link.token.cancel();
        self.registry.set_active(None);
        Ok(())
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.token.cancel();
        }
    }
}

//! Wires a btleplug adapter to a session engine

use std::sync::Arc;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager};
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use ringlink_session::{Engine, LinkEvent, SessionConfig, SessionObserver};

use crate::BleError;
use crate::transport::{BtleplugTransport, PeripheralRegistry};

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NoAdapter)
}

/// A running engine and the tasks feeding it. Dropping it stops the tasks.
pub struct Link {
    pub engine: Engine<BtleplugTransport>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Build an engine on the default adapter and start feeding it events.
///
/// The engine is idle; call [`Engine::start_connect_flow`] to begin.
pub async fn open(
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
) -> Result<Link, BleError> {
    let adapter = get_adapter().await?;
    let (tx, rx) = mpsc::unbounded_channel();
    let registry = PeripheralRegistry::default();

    // Subscribe before any scan starts so no discovery is missed
    let adapter_events = adapter.events().await?;

    let transport = BtleplugTransport::new(adapter.clone(), registry.clone(), tx)?;
    let engine = Engine::new(transport, config, observer);

    let tasks = vec![
        tokio::spawn(watch_adapter(
            adapter,
            adapter_events,
            registry,
            engine.clone(),
        )),
        tokio::spawn(pump_link_events(rx, engine.clone())),
    ];
    Ok(Link { engine, tasks })
}

type AdapterEvents = std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>;

async fn watch_adapter(
    adapter: Adapter,
    mut events: AdapterEvents,
    registry: PeripheralRegistry,
    engine: Engine<BtleplugTransport>,
) {
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(props)) = peripheral.properties().await else {
                    continue;
                };
                let address = peripheral.address().to_string();
                registry.insert(address.clone(), peripheral);
                engine.on_peripheral_found(&address, props.local_name.as_deref(), props.rssi);
            }
            CentralEvent::DeviceDisconnected(id) => {
                if let Some(attempt) = registry.active_attempt(&id) {
                    engine.handle_event(LinkEvent::Disconnected {
                        attempt,
                        reason: Some("peripheral disconnected".to_string()),
                    });
                }
            }
            _ => {}
        }
    }
    tracing::debug!("adapter event stream ended");
}

async fn pump_link_events(mut rx: UnboundedReceiver<LinkEvent>, engine: Engine<BtleplugTransport>) {
    while let Some(event) = rx.recv().await {
        engine.handle_event(event);
    }
}

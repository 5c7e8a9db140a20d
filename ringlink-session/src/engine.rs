//! Session state machine
//!
//! All state lives in one [`Core`] behind one lock. Every entry point locks,
//! mutates, starts at most the transport requests the current step needs,
//! and collects what the observer should hear in an [`Outbox`]. The outbox
//! is delivered after the lock is released.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ringlink_proto::Frame;
use ringlink_proto::ble::EndpointDirectory;

use crate::command::{CommandQueue, Kick};
use crate::outbox::{Effect, Notice, Outbox};
use crate::scan::ScanTrigger;
use crate::slot::{InFlight, Slot};
use crate::stop::{self, StopRun, StopTiming};
use crate::subscribe::{Advance, SubscriptionQueue};
use crate::{
    Channel, CommandDisposition, LinkEvent, SessionConfig, SessionError, SessionObserver,
    SessionState, Transport,
};

/// Lifecycle position of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Subscribing,
    Ready,
    Stopping,
    Disconnecting,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::Connecting => "connecting",
            Phase::Discovering => "discovering",
            Phase::Subscribing => "subscribing",
            Phase::Ready => "ready",
            Phase::Stopping => "stopping",
            Phase::Disconnecting => "disconnecting",
        }
    }

    /// Phases in which the command queue may start writes
    fn drives_commands(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Stopping | Phase::Disconnecting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the engine's mutable state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub linked: bool,
    pub subscribing: bool,
    pub subscription_queue: usize,
    pub command_queue: usize,
    pub in_flight: Option<InFlight>,
    pub pending_command: Option<Frame>,
    pub stop_requested: bool,
    pub stop_active: bool,
    pub disconnect_when_drained: bool,
    pub rssi_in_flight: bool,
}

impl SessionSnapshot {
    /// No link, nothing queued, nothing in flight
    pub fn is_clean(&self) -> bool {
        !self.linked
            && !self.subscribing
            && self.subscription_queue == 0
            && self.command_queue == 0
            && self.in_flight.is_none()
            && self.pending_command.is_none()
            && !self.stop_requested
            && !self.stop_active
            && !self.disconnect_when_drained
            && !self.rssi_in_flight
    }
}

#[derive(Debug)]
struct ActiveStop {
    id: u64,
    token: CancellationToken,
}

struct Core<T> {
    transport: T,
    directory: EndpointDirectory,
    start_command: Option<String>,
    timing: StopTiming,
    scan: ScanTrigger,

    phase: Phase,
    /// Tag of the newest connect request; link events carrying another are stale
    attempt: u64,
    connecting_to: Option<String>,
    /// Address of the live link
    link: Option<String>,
    channels: Vec<Channel>,
    slot: Slot,
    subscriptions: SubscriptionQueue,
    commands: CommandQueue,
    /// Sent once subscriptions complete; last write wins
    pending: Option<Frame>,
    /// Deferred stop, carrying its `send_reboot` flag
    stop_request: Option<bool>,
    stop: Option<ActiveStop>,
    next_stop_id: u64,
    rssi_in_flight: bool,
}

/// Handle to one peripheral session. Clones share the same session.
pub struct Engine<T> {
    core: Arc<Mutex<Core<T>>>,
    observer: Arc<dyn SessionObserver>,
}

impl<T> Clone for Engine<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T, config: SessionConfig, observer: Arc<dyn SessionObserver>) -> Self {
        let core = Core {
            transport,
            directory: config.directory(),
            start_command: config.start_command.clone(),
            timing: config.stop_timing(),
            scan: ScanTrigger::new(config.scan_log_throttle()),
            phase: Phase::Idle,
            attempt: 0,
            connecting_to: None,
            link: None,
            channels: Vec::new(),
            slot: Slot::default(),
            subscriptions: SubscriptionQueue::default(),
            commands: CommandQueue::default(),
            pending: None,
            stop_request: None,
            stop: None,
            next_stop_id: 0,
            rssi_in_flight: false,
        };
        Self {
            core: Arc::new(Mutex::new(core)),
            observer,
        }
    }

    /// Reset whatever is going on and scan for the target again.
    ///
    /// This is the only reconnect entry point and is safe to call repeatedly.
    pub fn start_connect_flow(&self) {
        self.apply(|core, out| {
            core.reset("Starting connect flow.", out);
            core.start_scan(out);
        });
    }

    pub fn start_scan(&self) {
        self.apply(|core, out| core.start_scan(out));
    }

    /// Tear the session down from any state
    pub fn disconnect(&self) {
        self.apply(|core, out| core.reset("Disconnect requested.", out));
    }

    /// Encode `hex` and send it, or hold it until subscriptions complete.
    ///
    /// Only a malformed command is an error; a command that cannot be sent
    /// right now is dropped and reported through the returned disposition.
    pub fn write_command(&self, hex: &str) -> Result<CommandDisposition, SessionError> {
        let frame = ringlink_proto::encode(hex)?;
        Ok(self.apply(|core, out| core.submit(frame, out)))
    }

    /// Send the stop frames, optionally reboot the ring, then disconnect.
    pub fn stop_and_disconnect(&self, send_reboot: bool) {
        self.apply(|core, out| core.request_stop(send_reboot, out));
    }

    /// Start an RSSI read.
    ///
    /// `true` if a read is now outstanding, including one already in flight;
    /// `false` with no link or when the transport refuses the request.
    pub fn read_signal_strength(&self) -> bool {
        self.apply(|core, out| core.read_signal_strength(out))
    }

    /// Discovery callback from the scanner
    pub fn on_peripheral_found(&self, address: &str, name: Option<&str>, rssi: Option<i16>) {
        self.apply(|core, out| core.peripheral_found(address, name, rssi, out));
    }

    /// Completion or push event from the transport
    pub fn handle_event(&self, event: LinkEvent) {
        self.apply(|core, out| core.handle_event(event, out));
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    #[cfg(test)]
    pub(crate) fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock().transport)
    }

    /// Queue one stop frame; `false` once the stop run is no longer current
    pub(crate) fn submit_stop_step(&self, id: u64, hex: &str) -> bool {
        self.apply(|core, out| core.stop_step(id, hex, out))
    }

    pub(crate) fn conclude_stop(&self, id: u64) {
        self.apply(|core, out| core.conclude_stop(id, out));
    }

    pub(crate) fn finish_stop(&self, id: u64, reason: &str) {
        self.apply(|core, out| {
            if core.is_active_stop(id) {
                core.reset(reason, out);
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Core<T>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply<R>(&self, f: impl FnOnce(&mut Core<T>, &mut Outbox) -> R) -> R {
        let mut out = Outbox::default();
        let result = {
            let mut core = self.lock();
            f(&mut *core, &mut out)
        };
        self.dispatch(out);
        result
    }

    fn dispatch(&self, out: Outbox) {
        for notice in out.notices {
            match notice {
                Notice::Log(line) => {
                    tracing::info!("{line}");
                    self.observer.on_log(&line);
                }
                Notice::State(state) => {
                    tracing::debug!(%state, "session state");
                    self.observer.on_state(state);
                }
                Notice::Bytes { channel, value } => {
                    tracing::trace!(%channel, len = value.len(), "notification");
                    self.observer.on_bytes(channel, &value);
                }
                Notice::SignalStrength(dbm) => self.observer.on_signal_strength(dbm),
            }
        }

        for effect in out.effects {
            match effect {
                Effect::LaunchStop(run) => self.launch_stop(run),
            }
        }
    }

    fn launch_stop(&self, run: StopRun) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(stop::run(self.clone(), run));
            }
            Err(_) => {
                self.finish_stop(run.id, "No async runtime for the stop sequence; disconnecting.")
            }
        }
    }
}

impl<T: Transport> Core<T> {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            linked: self.link.is_some(),
            subscribing: self.subscriptions.is_in_progress(),
            subscription_queue: self.subscriptions.len(),
            command_queue: self.commands.len(),
            in_flight: self.slot.current(),
            pending_command: self.pending,
            stop_requested: self.stop_request.is_some(),
            stop_active: self.stop.is_some(),
            disconnect_when_drained: self.commands.disconnect_when_drained(),
            rssi_in_flight: self.rssi_in_flight,
        }
    }

    /// Universal reset: safe from every phase, with or without a link.
    fn reset(&mut self, reason: &str, out: &mut Outbox) {
        out.log(reason);

        if self.phase == Phase::Scanning {
            self.transport.stop_scan();
        }
        if let Err(e) = self.transport.disconnect() {
            tracing::debug!(error = %e, "disconnect during reset");
        }
        if let Err(e) = self.transport.close() {
            tracing::debug!(error = %e, "close during reset");
        }

        if let Some(stop) = self.stop.take() {
            stop.token.cancel();
        }
        self.connecting_to = None;
        self.link = None;
        self.channels.clear();
        self.slot.clear();
        self.subscriptions.clear();
        self.commands.clear();
        self.pending = None;
        self.stop_request = None;
        self.rssi_in_flight = false;
        self.phase = Phase::Idle;

        out.log("Disconnected.");
        out.state(SessionState::Disconnected);
    }

    fn start_scan(&mut self, out: &mut Outbox) {
        match self.phase {
            Phase::Idle => {}
            Phase::Scanning => {
                out.log("Already scanning.");
                out.state(SessionState::Scanning);
                return;
            }
            other => {
                out.log(format!("Cannot scan while {other}."));
                return;
            }
        }

        if let Err(e) = self.transport.start_scan() {
            out.log(SessionError::ScanUnavailable(e.to_string()).to_string());
            out.state(SessionState::Disconnected);
            return;
        }

        self.scan.begin(Instant::now());
        self.phase = Phase::Scanning;
        out.log(format!(
            "Scanning for {} ({})...",
            self.directory.target.name, self.directory.target.address
        ));
        out.state(SessionState::Scanning);
    }

    fn peripheral_found(
        &mut self,
        address: &str,
        name: Option<&str>,
        rssi: Option<i16>,
        out: &mut Outbox,
    ) {
        if self.phase != Phase::Scanning {
            return;
        }
        if let Some(line) = self.scan.observe(address, name, rssi, Instant::now()) {
            out.log(line);
        }
        if !self.directory.target.matches(address, name.unwrap_or_default()) {
            return;
        }

        out.log(format!("Target found: {address}"));
        self.transport.stop_scan();
        out.log(format!("Scan stopped. unique={}", self.scan.unique_seen()));

        self.attempt += 1;
        self.phase = Phase::Connecting;
        self.connecting_to = Some(address.to_string());
        out.state(SessionState::Connecting);

        if let Err(e) = self.transport.connect(address, self.attempt) {
            self.reset(&SessionError::LinkLost(e.to_string()).to_string(), out);
        }
    }

    fn handle_event(&mut self, event: LinkEvent, out: &mut Outbox) {
        match event {
            LinkEvent::Connected { attempt } => self.on_connected(attempt, out),
            LinkEvent::Disconnected { attempt, reason } => {
                self.on_disconnected(attempt, reason, out)
            }
            LinkEvent::ServicesDiscovered { attempt, result } => {
                self.on_services_discovered(attempt, result, out)
            }
            LinkEvent::DescriptorWritten { channel, ok } => {
                self.on_descriptor_written(channel, ok, out)
            }
            LinkEvent::CharacteristicWritten { channel, ok } => {
                self.on_characteristic_written(channel, ok, out)
            }
            LinkEvent::Notification { channel, value } => {
                if self.link.is_some() {
                    out.bytes(channel, value);
                }
            }
            LinkEvent::RssiRead(result) => self.on_rssi(result, out),
            LinkEvent::ScanFailed(reason) => {
                if self.phase == Phase::Scanning {
                    self.reset(&SessionError::ScanUnavailable(reason).to_string(), out);
                }
            }
        }
    }

    fn on_connected(&mut self, attempt: u64, out: &mut Outbox) {
        if attempt != self.attempt || self.phase != Phase::Connecting {
            tracing::debug!(attempt, phase = %self.phase, "stale connect completion ignored");
            return;
        }
        self.link = self.connecting_to.take();
        self.phase = Phase::Discovering;
        out.log("Connected. Discovering services...");
        out.state(SessionState::DiscoveringServices);

        if let Err(e) = self.transport.discover_services() {
            self.reset(&SessionError::ServiceDiscoveryFailed(e.to_string()).to_string(), out);
        }
    }

    fn on_disconnected(&mut self, attempt: u64, reason: Option<String>, out: &mut Outbox) {
        if attempt != self.attempt {
            tracing::debug!(attempt, current = self.attempt, "disconnect of an old link ignored");
            return;
        }
        if self.link.is_none() && self.phase != Phase::Connecting {
            tracing::debug!(phase = %self.phase, "disconnect without a link ignored");
            return;
        }
        let reason = reason.unwrap_or_else(|| "peer closed the link".to_string());
        match self.phase {
            Phase::Stopping | Phase::Disconnecting => {
                self.reset(&format!("Link closed: {reason}"), out)
            }
            _ => self.reset(&SessionError::LinkLost(reason).to_string(), out),
        }
    }

    fn on_services_discovered(
        &mut self,
        attempt: u64,
        result: Result<Vec<Channel>, String>,
        out: &mut Outbox,
    ) {
        if attempt != self.attempt || self.phase != Phase::Discovering {
            tracing::debug!(attempt, phase = %self.phase, "stale service discovery ignored");
            return;
        }
        let channels = match result {
            Ok(channels) => channels,
            Err(e) => {
                // Not retried here; the session ends idle
                self.reset(&SessionError::ServiceDiscoveryFailed(e).to_string(), out);
                out.state(SessionState::Idle);
                return;
            }
        };

        out.log(format!("Services discovered: {} characteristics", channels.len()));
        for channel in &channels {
            out.log(format!("char uuid={} props=[{}]", channel.uuid, channel.props));
        }
        self.channels = channels;

        if let Some(hex) = &self.start_command {
            match ringlink_proto::encode(hex) {
                Ok(frame) => self.pending = Some(frame),
                Err(e) => out.log(format!("start command not sent: {e}")),
            }
        }

        self.phase = Phase::Subscribing;
        out.state(SessionState::Subscribing);
        self.subscriptions
            .begin(&self.directory.notify, &self.channels, out);
        self.advance_subscriptions(out);
    }

    fn on_descriptor_written(&mut self, channel: Uuid, ok: bool, out: &mut Outbox) {
        if self.link.is_none() || !self.slot.complete_descriptor() {
            tracing::debug!(%channel, "stale descriptor completion ignored");
            return;
        }
        out.log(format!("cccd write uuid={channel} ok={ok}"));
        self.advance_subscriptions(out);
    }

    fn on_characteristic_written(&mut self, channel: Uuid, ok: bool, out: &mut Outbox) {
        if self.link.is_none() || !self.slot.complete_write() {
            tracing::debug!(%channel, "stale write completion ignored");
            return;
        }
        if !ok {
            out.log(format!("cmd write failed uuid={channel}"));
        }
        self.kick_commands(out);
    }

    fn on_rssi(&mut self, result: Result<i16, String>, out: &mut Outbox) {
        if !self.rssi_in_flight {
            return;
        }
        self.rssi_in_flight = false;
        match result {
            Ok(dbm) => out.signal_strength(dbm),
            Err(e) => out.log(format!("RSSI read failed: {e}")),
        }
    }

    fn advance_subscriptions(&mut self, out: &mut Outbox) {
        let step = self
            .subscriptions
            .advance(&mut self.transport, &mut self.slot, out);
        if step == Advance::Completed {
            self.on_subscribed(out);
        }
    }

    fn on_subscribed(&mut self, out: &mut Outbox) {
        self.phase = Phase::Ready;
        out.log("Notifications enabled.");

        match self.pending.take() {
            Some(frame) => {
                out.log(format!("Sending pending command: {}", frame.to_hex()));
                self.commands.enqueue(frame);
                if self.kick_commands(out) == Some(Kick::Started) {
                    out.state(SessionState::Streaming);
                } else {
                    out.log(format!(
                        "Pending command {} not sent; not streaming.",
                        frame.to_hex()
                    ));
                }
            }
            None => {
                out.state(SessionState::Streaming);
                self.kick_commands(out);
            }
        }

        if let Some(send_reboot) = self.stop_request.take() {
            out.log("Running deferred stop.");
            self.begin_stop(send_reboot, out);
        }
    }

    /// `None` when the session may not write right now
    fn kick_commands(&mut self, out: &mut Outbox) -> Option<Kick> {
        if self.link.is_none() || !self.phase.drives_commands() {
            return None;
        }
        let kick = self.commands.kick(
            &mut self.transport,
            &self.channels,
            &self.directory.command,
            &mut self.slot,
            out,
        );
        if kick == Kick::Drained {
            self.reset("Stop sequence drained.", out);
        }
        Some(kick)
    }

    fn submit(&mut self, frame: Frame, out: &mut Outbox) -> CommandDisposition {
        if matches!(self.phase, Phase::Stopping | Phase::Disconnecting) {
            out.log(format!("Stopping; command dropped: {}", frame.to_hex()));
            return CommandDisposition::Stopping;
        }
        if self.subscriptions.is_in_progress() {
            out.log(format!(
                "Command deferred until notify enable completes: {}",
                frame.to_hex()
            ));
            self.pending = Some(frame);
            return CommandDisposition::Deferred;
        }
        if self.link.is_none() {
            out.log(format!("Not connected; command dropped: {}", frame.to_hex()));
            return CommandDisposition::NoLink;
        }

        self.commands.enqueue(frame);
        self.kick_commands(out);
        CommandDisposition::Queued
    }

    fn read_signal_strength(&mut self, out: &mut Outbox) -> bool {
        if self.link.is_none() {
            return false;
        }
        if self.rssi_in_flight {
            out.log("RSSI read already in progress.");
            return true;
        }
        match self.transport.read_rssi() {
            Ok(()) => {
                self.rssi_in_flight = true;
                true
            }
            Err(e) => {
                out.log(format!("RSSI read not started: {e}"));
                false
            }
        }
    }

    fn request_stop(&mut self, send_reboot: bool, out: &mut Outbox) {
        if matches!(self.phase, Phase::Stopping | Phase::Disconnecting) {
            out.log("Stop already in progress.");
            return;
        }
        if self.link.is_none() {
            self.reset("Stop requested without a link.", out);
            return;
        }
        if self.phase == Phase::Discovering || self.subscriptions.is_in_progress() {
            self.stop_request = Some(send_reboot);
            out.log("Stop requested while subscribing; deferred.");
            return;
        }
        self.begin_stop(send_reboot, out);
    }

    fn begin_stop(&mut self, send_reboot: bool, out: &mut Outbox) {
        self.next_stop_id += 1;
        let id = self.next_stop_id;
        let token = CancellationToken::new();
        self.stop = Some(ActiveStop {
            id,
            token: token.clone(),
        });
        self.phase = Phase::Stopping;
        out.log(format!("Stopping stream (reboot={send_reboot})."));
        out.state(SessionState::Disconnecting);
        out.effect(Effect::LaunchStop(StopRun {
            id,
            send_reboot,
            token,
            timing: self.timing,
        }));
    }

    fn is_active_stop(&self, id: u64) -> bool {
        self.stop.as_ref().is_some_and(|stop| stop.id == id)
    }

    fn stop_step(&mut self, id: u64, hex: &str, out: &mut Outbox) -> bool {
        if !self.is_active_stop(id) {
            return false;
        }
        match ringlink_proto::encode(hex) {
            Ok(frame) => {
                out.log(format!("stop step {}", frame.to_hex()));
                self.commands.enqueue(frame);
                self.kick_commands(out);
            }
            Err(e) => out.log(format!("stop step {hex} not sent: {e}")),
        }
        true
    }

    fn conclude_stop(&mut self, id: u64, out: &mut Outbox) {
        if !self.is_active_stop(id) {
            return;
        }
        self.phase = Phase::Disconnecting;
        self.commands.request_disconnect_when_drained();
        out.log("Stop sequence sent; disconnecting.");
        self.kick_commands(out);
    }
}

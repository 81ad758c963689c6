use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::ready;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::codec::measurement::{decode, encode_config, HeartRateReading};
use crate::device::constants::{HEART_RATE_MEASUREMENT_CHARACTERISTIC, HEART_RATE_SERVICE};
use crate::device::radio::Radio;
use crate::device::types::{
    DeviceHandle, DisconnectReason, RadioEvent, RadioOperation, ServiceInfo, SessionEvent, SessionState,
};
use crate::error::SessionError;

/// Characteristics picked out of the heart rate service after discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SelectedCharacteristics {
    measurement: Uuid,
    config: Option<Uuid>,
}

fn select_characteristics(services: &[ServiceInfo]) -> Option<SelectedCharacteristics> {
    let service = services.iter().find(|service| service.uuid == HEART_RATE_SERVICE)?;

    let measurement = service
        .characteristics
        .iter()
        .find(|characteristic| characteristic.uuid == HEART_RATE_MEASUREMENT_CHARACTERISTIC)?
        .uuid;

    let config = service
        .characteristics
        .iter()
        .find(|characteristic| characteristic.properties.write)
        .map(|characteristic| characteristic.uuid);

    Some(SelectedCharacteristics { measurement, config })
}

pub fn only_readings<S>(events: S) -> impl Stream<Item = HeartRateReading>
where
    S: Stream<Item = SessionEvent>,
{
    events.filter_map(|event| ready(match event {
        SessionEvent::Reading(reading) => Some(reading),
        _ => None,
    }))
}

pub fn only_states<S>(events: S) -> impl Stream<Item = SessionState>
where
    S: Stream<Item = SessionEvent>,
{
    events.filter_map(|event| ready(match event {
        SessionEvent::StateChange(state) => Some(state),
        _ => None,
    }))
}

/// The lifecycle of one connection to one heart rate sensor.
///
/// Commands (`connect`, `send_config`, `disconnect`) and radio events
/// (`handle_event`) are the only things that move the state, and both take
/// `&mut self`, so whoever owns the session is its single writer. Once the
/// session is `Disconnected` it stays there; connecting again takes a new
/// session.
pub struct Session<R: Radio> {
    radio: R,
    state: SessionState,
    device: Option<DeviceHandle>,
    characteristics: Option<SelectedCharacteristics>,
    // reason reported once the radio acknowledges the disconnect
    pending_reason: DisconnectReason,
    // a link release issued on the way to `Disconnected` whose acknowledgement is still out
    owes_release: bool,
    listeners: Vec<UnboundedSender<SessionEvent>>,
}

impl<R: Radio> Session<R> {
    pub fn new(radio: R) -> Self {
        Session {
            radio,
            state: SessionState::Idle,
            device: None,
            characteristics: None,
            pending_reason: DisconnectReason::UserRequested,
            owes_release: false,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    /// True when the session ended without waiting for the radio to confirm
    /// the link release, and that confirmation has not arrived yet. Whoever
    /// replaces the session must keep it away from the next one.
    pub fn owes_release(&self) -> bool {
        self.owes_release
    }

    /// Events are delivered until the session reaches `Disconnected` (that
    /// state change included) or is dropped; then the stream ends.
    pub fn add_listener(&mut self, listener: UnboundedSender<SessionEvent>) {
        if self.state.is_terminal() {
            return;
        }
        self.listeners.push(listener);
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.add_listener(tx);
        rx
    }

    pub fn readings(&mut self) -> impl Stream<Item = HeartRateReading> {
        only_readings(self.subscribe())
    }

    pub fn states(&mut self) -> impl Stream<Item = SessionState> {
        only_states(self.subscribe())
    }

    pub fn connect(&mut self, device: DeviceHandle) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }

        info!("Connecting to {}", device);
        let identifier = device.identifier.clone();
        self.device = Some(device);
        self.transition(SessionState::Connecting);

        if let Err(err) = self.radio.connect(&identifier) {
            warn!("Could not issue connect to {}: {:?}", identifier, err);
            self.transition(SessionState::Disconnected(DisconnectReason::ConnectFailed));
        }

        Ok(())
    }

    pub fn send_config(&mut self, text: &str) -> Result<(), SessionError> {
        if self.state != SessionState::Streaming {
            return Err(SessionError::NotConnected);
        }

        let config_char = self
            .characteristics
            .and_then(|characteristics| characteristics.config)
            .ok_or(SessionError::NoWritableCharacteristic)?;

        let payload = encode_config(text);
        info!("Writing {} bytes of configuration to {}", payload.len(), config_char);

        if let Err(err) = self.radio.write_characteristic(config_char, payload) {
            warn!("Could not issue configuration write: {:?}", err);
            return Err(SessionError::WriteFailed(err.to_string()));
        }

        Ok(())
    }

    pub fn disconnect(&mut self) {
        match self.state {
            SessionState::Idle => debug!("Disconnect requested while idle, nothing to do"),
            SessionState::Disconnecting | SessionState::Disconnected(_) => {
                debug!("Disconnect requested while already {}", self.state)
            },
            SessionState::Connecting
            | SessionState::Discovering
            | SessionState::Subscribing
            | SessionState::Streaming => {
                self.pending_reason = DisconnectReason::UserRequested;
                self.transition(SessionState::Disconnecting);

                if let Err(err) = self.radio.disconnect() {
                    // no acknowledgement will come for a disconnect that was never issued
                    warn!("Could not issue disconnect: {:?}", err);
                    self.transition(SessionState::Disconnected(DisconnectReason::UserRequested));
                }
            },
        }
    }

    /// Apply one radio event. Events that make no sense in the current state
    /// (late acknowledgements of cancelled operations, anything after the end)
    /// are dropped.
    pub fn handle_event(&mut self, event: RadioEvent) {
        match (self.state, event) {
            (SessionState::Connecting, RadioEvent::Connected) => {
                info!("Connected; Discovering services...");
                self.transition(SessionState::Discovering);

                if let Err(err) = self.radio.discover_services() {
                    warn!("Could not issue service discovery: {:?}", err);
                    self.fail(DisconnectReason::DiscoveryFailed);
                }
            },
            (SessionState::Connecting, RadioEvent::Error { operation: RadioOperation::Connect, message }) => {
                warn!("Connecting to peripheral failed: {}", message);
                self.transition(SessionState::Disconnected(DisconnectReason::ConnectFailed));
            },

            (SessionState::Discovering, RadioEvent::ServicesFound(services)) => {
                match select_characteristics(&services) {
                    Some(characteristics) => {
                        if characteristics.config.is_none() {
                            info!("Heart rate service has no writable characteristic; configuration is unavailable");
                        }
                        info!("Subscribing to characteristic {}", characteristics.measurement);
                        self.characteristics = Some(characteristics);
                        self.transition(SessionState::Subscribing);

                        if let Err(err) = self.radio.set_notify(characteristics.measurement, true) {
                            warn!("Could not issue notification subscription: {:?}", err);
                            self.fail(DisconnectReason::SubscribeFailed);
                        }
                    },
                    None => {
                        warn!("Heart rate service or measurement characteristic not found ({} services)", services.len());
                        self.fail(DisconnectReason::ServiceNotFound);
                    },
                }
            },
            (SessionState::Discovering, RadioEvent::Error { operation: RadioOperation::DiscoverServices, message }) => {
                warn!("Discovering services failed: {}", message);
                self.fail(DisconnectReason::DiscoveryFailed);
            },

            (SessionState::Subscribing, RadioEvent::NotifyEnabled) => {
                info!("Notifications enabled");
                self.transition(SessionState::Streaming);
            },
            (SessionState::Subscribing, RadioEvent::Error { operation: RadioOperation::SetNotify, message }) => {
                warn!("Enabling notifications failed: {}", message);
                self.fail(DisconnectReason::SubscribeFailed);
            },

            (SessionState::Streaming, RadioEvent::CharacteristicChanged { uuid, value }) => {
                if uuid != HEART_RATE_MEASUREMENT_CHARACTERISTIC {
                    debug!("Ignoring notification from {}", uuid);
                    return;
                }

                match decode(&value) {
                    Ok(reading) => {
                        debug!("Heart rate: {} bpm", reading.bpm);
                        self.emit(SessionEvent::Reading(reading));
                    },
                    Err(err) => warn!("Ignoring malformed heart rate measurement {:02x?}: {}", value, err),
                }
            },
            (SessionState::Streaming, RadioEvent::Error { operation: RadioOperation::Write, message }) => {
                warn!("Configuration write failed: {}", message);
                self.emit(SessionEvent::WriteFailed(message));
            },

            (SessionState::Disconnecting, RadioEvent::Disconnected) => {
                self.transition(SessionState::Disconnected(self.pending_reason));
            },
            (SessionState::Disconnecting, RadioEvent::Error { operation: RadioOperation::Disconnect, message }) => {
                warn!("Disconnecting reported an error, considering the link closed: {}", message);
                self.transition(SessionState::Disconnected(self.pending_reason));
            },

            (
                SessionState::Connecting
                | SessionState::Discovering
                | SessionState::Subscribing
                | SessionState::Streaming,
                RadioEvent::Disconnected,
            ) => {
                warn!("Connection lost");
                self.pending_reason = DisconnectReason::LinkLost;
                self.transition(SessionState::Disconnecting);
                self.release();
                self.transition(SessionState::Disconnected(DisconnectReason::LinkLost));
            },

            (
                SessionState::Disconnected(_),
                RadioEvent::Disconnected | RadioEvent::Error { operation: RadioOperation::Disconnect, .. },
            ) if self.owes_release => {
                debug!("Link release acknowledged");
                self.owes_release = false;
            },

            (state, event) => {
                debug!("Ignoring {:?} in state {}", event, state);
            },
        }
    }

    // a lifecycle failure after the link came up: release the link, no acknowledgement is awaited
    fn fail(&mut self, reason: DisconnectReason) {
        self.release();
        self.transition(SessionState::Disconnected(reason));
    }

    fn release(&mut self) {
        match self.radio.disconnect() {
            Ok(()) => self.owes_release = true,
            Err(err) => debug!("Nothing to release: {:?}", err),
        }
    }

    fn transition(&mut self, next: SessionState) {
        info!("Session state {} -> {}", self.state, next);
        self.state = next;
        self.emit(SessionEvent::StateChange(next));

        if next.is_terminal() {
            self.characteristics = None;
            self.listeners.clear();
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.listeners.retain(|listener| listener.unbounded_send(event.clone()).is_ok());
    }
}

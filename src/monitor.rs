use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::codec::measurement::HeartRateReading;
use crate::device::radio::Radio;
use crate::device::scan::{ScanController, ScanStream};
use crate::device::session::{only_readings, only_states, Session};
use crate::device::types::{DeviceHandle, RadioEvent, RadioOperation, SessionEvent, SessionState};
use crate::error::SessionError;

enum MonitorCommand {
    Connect(DeviceHandle, oneshot::Sender<Result<(), SessionError>>),
    SendConfig(String, oneshot::Sender<Result<(), SessionError>>),
    Disconnect(oneshot::Sender<()>),
    State(oneshot::Sender<SessionState>),
    Subscribe(UnboundedSender<SessionEvent>),
}

/// Scan, pick a device, stream its heart rate, send it configuration.
///
/// Scanning runs on the [`ScanController`]; everything about the connection
/// goes through one driver task that owns the current [`Session`] and applies
/// commands and radio events to it one at a time.
pub struct HeartRateMonitor<R: Radio> {
    scan: ScanController<R>,
    scan_duration: Duration,
    commands: UnboundedSender<MonitorCommand>,
    cancel: CancellationToken,
}

impl<R: Radio> HeartRateMonitor<R> {
    /// Spawn the driver task. `radio_events` must be the event stream belonging to `radio`.
    pub fn new<E>(radio: R, radio_events: E, scan_duration: Duration) -> (Self, JoinHandle<()>)
    where
        E: Stream<Item = RadioEvent> + Send + Unpin + 'static,
    {
        let scan = ScanController::new(radio.clone());
        let (commands, command_receiver) = unbounded();
        let cancel = CancellationToken::new();

        let handle = spawn(drive(radio, scan.clone(), radio_events, command_receiver, cancel.clone()));

        let monitor = HeartRateMonitor {
            scan,
            scan_duration,
            commands,
            cancel,
        };
        (monitor, handle)
    }

    pub fn start_scan(&self) -> ScanStream {
        self.scan.start(self.scan_duration)
    }

    pub fn stop_scan(&self) {
        self.scan.stop();
    }

    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.scan.devices()
    }

    /// Connect to the device at `index` in the list of the last scan.
    pub async fn connect(&self, index: usize) -> Result<(), SessionError> {
        let device = self.scan.device(index).ok_or(SessionError::NoSuchDevice(index))?;
        self.connect_device(device).await
    }

    pub async fn connect_device(&self, device: DeviceHandle) -> Result<(), SessionError> {
        self.request(|tx| MonitorCommand::Connect(device, tx)).await?
    }

    pub async fn send_config(&self, text: &str) -> Result<(), SessionError> {
        let text = text.to_string();
        self.request(|tx| MonitorCommand::SendConfig(text, tx)).await?
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(MonitorCommand::Disconnect).await
    }

    pub async fn state(&self) -> Result<SessionState, SessionError> {
        self.request(MonitorCommand::State).await
    }

    /// Session events of this and every later connection, until the monitor stops.
    pub fn events(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = unbounded();
        if self.commands.unbounded_send(MonitorCommand::Subscribe(tx)).is_err() {
            warn!("Subscribing to a stopped monitor");
        }
        rx
    }

    pub fn readings(&self) -> impl Stream<Item = HeartRateReading> {
        only_readings(self.events())
    }

    pub fn states(&self) -> impl Stream<Item = SessionState> {
        only_states(self.events())
    }

    /// Disconnect, stop scanning and end the driver task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands.unbounded_send(make(tx)).map_err(|_| SessionError::MonitorStopped)?;
        rx.await.map_err(|_| SessionError::MonitorStopped)
    }
}

async fn drive<R, E>(
    radio: R,
    scan: ScanController<R>,
    mut radio_events: E,
    mut commands: UnboundedReceiver<MonitorCommand>,
    cancel: CancellationToken,
) where
    R: Radio,
    E: Stream<Item = RadioEvent> + Unpin,
{
    let mut listeners: Vec<UnboundedSender<SessionEvent>> = Vec::new();
    let mut session = Session::new(radio.clone());
    // link releases of replaced sessions that the radio has not acknowledged yet
    let mut owed_releases = 0usize;

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            event = radio_events.next() => match event {
                Some(RadioEvent::DeviceDiscovered(device)) => scan.observe(device),
                Some(RadioEvent::Error { operation: RadioOperation::Scan, message }) => {
                    warn!("Scanning failed: {}", message);
                    scan.stop();
                },
                Some(event @ (RadioEvent::Disconnected | RadioEvent::Error { operation: RadioOperation::Disconnect, .. }))
                    if owed_releases > 0 =>
                {
                    debug!("Release of a previous session acknowledged: {:?}", event);
                    owed_releases -= 1;
                },
                Some(event) => session.handle_event(event),
                None => {
                    info!("Radio event stream ended");
                    break 'mainloop;
                },
            },
            command = commands.next() => match command {
                Some(MonitorCommand::Connect(device, tx)) => {
                    if session.state().is_terminal() {
                        if session.owes_release() {
                            owed_releases += 1;
                        }
                        session = Session::new(radio.clone());
                        listeners.retain(|listener| !listener.is_closed());
                        for listener in &listeners {
                            session.add_listener(listener.clone());
                        }
                    }
                    let _ = tx.send(session.connect(device));
                },
                Some(MonitorCommand::SendConfig(text, tx)) => {
                    let _ = tx.send(session.send_config(&text));
                },
                Some(MonitorCommand::Disconnect(tx)) => {
                    session.disconnect();
                    let _ = tx.send(());
                },
                Some(MonitorCommand::State(tx)) => {
                    let _ = tx.send(session.state());
                },
                Some(MonitorCommand::Subscribe(listener)) => {
                    session.add_listener(listener.clone());
                    listeners.push(listener);
                },
                None => {
                    break 'mainloop;
                },
            },
        }
    }

    info!("Stopping heart rate monitor");
    session.disconnect();
    scan.stop();
}

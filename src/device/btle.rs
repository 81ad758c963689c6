use std::sync::{Arc, Mutex};
use std::future::Future;
use btleplug::api::{Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{
    CLIENT_CHARACTERISTIC_CONFIGURATION, CONNECT_DEADLINE, DISCOVERY_DEADLINE, ENABLE_NOTIFICATION_VALUE,
    WRITE_DEADLINE,
};
use crate::device::radio::Radio;
use crate::device::types::{
    CharacteristicInfo, CharacteristicProperties, DeviceHandle, RadioEvent, RadioOperation, ServiceInfo,
};
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSettings {
    pub connect_deadline: Duration,
    pub discovery_deadline: Duration,
    pub write_deadline: Duration,
    pub write_with_response: bool,
}

impl Default for RadioSettings {
    fn default() -> Self {
        RadioSettings {
            connect_deadline: Duration::from_millis(CONNECT_DEADLINE),
            discovery_deadline: Duration::from_millis(DISCOVERY_DEADLINE),
            write_deadline: Duration::from_millis(WRITE_DEADLINE),
            write_with_response: true,
        }
    }
}

#[derive(Debug)]
struct Connection {
    identifier: String,
    // None until the link is up
    peripheral: Option<Peripheral>,
    cancel: CancellationToken,
}

struct BtleRadioInner {
    adapter: Adapter,
    runtime: Handle,
    settings: RadioSettings,
    events: UnboundedSender<RadioEvent>,
    scan_cancel: Mutex<Option<CancellationToken>>,
    connection: Mutex<Option<Connection>>,
    // the last link release, awaited before the next connect
    release: Mutex<Option<JoinHandle<()>>>,
}

/// [`Radio`] backed by the platform bluetooth stack through btleplug.
#[derive(Clone)]
pub struct BtleRadio {
    inner: Arc<BtleRadioInner>,
}

async fn first_adapter() -> Result<Adapter, DeviceError> {
    let manager = Manager::new().await?;
    let adapter = manager.adapters().await?.into_iter().next().ok_or(DeviceError::NoAdapter)?;
    info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
    Ok(adapter)
}

async fn find_peripheral(adapter: &Adapter, identifier: &str) -> Result<Peripheral, DeviceError> {
    adapter
        .peripherals()
        .await?
        .into_iter()
        .find(|peripheral| peripheral.id().to_string() == identifier)
        .ok_or_else(|| DeviceError::UnknownDevice(identifier.to_string()))
}

async fn device_handle(adapter: &Adapter, id: &btleplug::platform::PeripheralId) -> Result<DeviceHandle, DeviceError> {
    let peripheral = adapter.peripheral(id).await?;
    let display_name = peripheral.properties().await?.and_then(|properties| properties.local_name);
    Ok(DeviceHandle::new(peripheral.id().to_string(), display_name))
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic, DeviceError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|characteristic| characteristic.uuid == uuid)
        .ok_or(DeviceError::MissingCharacteristic)
}

fn characteristic_info(characteristic: &Characteristic) -> CharacteristicInfo {
    let flags = characteristic.properties;
    CharacteristicInfo {
        uuid: characteristic.uuid,
        properties: CharacteristicProperties {
            read: flags.contains(CharPropFlags::READ),
            write: flags.contains(CharPropFlags::WRITE),
            write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            notify: flags.contains(CharPropFlags::NOTIFY),
        },
    }
}

fn service_infos(peripheral: &Peripheral) -> Vec<ServiceInfo> {
    peripheral
        .services()
        .iter()
        .map(|service| ServiceInfo {
            uuid: service.uuid,
            characteristics: service.characteristics.iter().map(characteristic_info).collect(),
        })
        .collect()
}

async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, DeviceError>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    match timeout(deadline, fut).await {
        Err(_) => Err(DeviceError::Timeout(deadline.as_millis() as u64)),
        Ok(result) => Ok(result?),
    }
}

impl BtleRadio {
    /// Open the first bluetooth adapter. Radio events arrive on the returned receiver.
    pub async fn open(settings: RadioSettings) -> Result<(Self, UnboundedReceiver<RadioEvent>), DeviceError> {
        let adapter = first_adapter().await?;
        let (events, rx) = unbounded();

        let inner = BtleRadioInner {
            adapter,
            runtime: Handle::current(),
            settings,
            events,
            scan_cancel: Mutex::new(None),
            connection: Mutex::new(None),
            release: Mutex::new(None),
        };

        Ok((BtleRadio { inner: Arc::new(inner) }, rx))
    }

    fn emit(&self, event: RadioEvent) {
        if self.inner.events.unbounded_send(event).is_err() {
            debug!("Radio event receiver is gone");
        }
    }

    fn emit_error(&self, operation: RadioOperation, err: DeviceError) {
        self.emit(RadioEvent::Error { operation, message: err.to_string() });
    }

    fn connected_peripheral(&self) -> Result<(Peripheral, CancellationToken), DeviceError> {
        let connection = self.inner.connection.lock().expect("Failed to lock BtleRadio connection");
        match connection.as_ref() {
            Some(Connection { peripheral: Some(peripheral), cancel, .. }) => Ok((peripheral.clone(), cancel.clone())),
            _ => Err(DeviceError::NotConnected),
        }
    }

    // reports an unsolicited link loss of `peripheral` until `cancel` fires
    async fn watch_disconnect(self, peripheral: Peripheral, cancel: CancellationToken) {
        let mut events = match self.inner.adapter.events().await {
            Ok(events) => events,
            Err(err) => {
                warn!("Could not subscribe to adapter events: {:?}", err);
                return;
            },
        };
        let peripheral_id = peripheral.id();

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                event = events.next() => match event {
                    Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                        info!("Peripheral {:?} disconnected", id);
                        self.emit(RadioEvent::Disconnected);
                        break 'mainloop;
                    },
                    Some(_) => {},
                    None => break 'mainloop,
                },
            }
        }
    }

    async fn forward_notifications(self, peripheral: Peripheral, characteristic: Characteristic, cancel: CancellationToken) {
        let mut notifications = match peripheral.notifications().await {
            Ok(notifications) => notifications,
            Err(err) => {
                self.emit_error(RadioOperation::SetNotify, err.into());
                return;
            },
        };

        debug!(
            "Enabling notifications on {} (writes {:02x?} to descriptor {})",
            characteristic.uuid, ENABLE_NOTIFICATION_VALUE, CLIENT_CHARACTERISTIC_CONFIGURATION,
        );
        if let Err(err) = peripheral.subscribe(&characteristic).await {
            self.emit_error(RadioOperation::SetNotify, err.into());
            return;
        }
        self.emit(RadioEvent::NotifyEnabled);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                notification = notifications.next() => match notification {
                    Some(data) => self.emit(RadioEvent::CharacteristicChanged { uuid: data.uuid, value: data.value }),
                    None => break 'mainloop,
                },
            }
        }

        debug!("Notification stream of {} stopped", characteristic.uuid);
    }
}

impl Radio for BtleRadio {
    fn scan_start(&self) -> Result<(), DeviceError> {
        let cancel = CancellationToken::new();
        {
            let mut scan_cancel = self.inner.scan_cancel.lock().expect("Failed to lock BtleRadio scan");
            if let Some(previous) = scan_cancel.replace(cancel.clone()) {
                previous.cancel();
            }
        }

        let radio = self.clone();
        self.inner.runtime.spawn(async move {
            let adapter = &radio.inner.adapter;
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(err) => return radio.emit_error(RadioOperation::Scan, err.into()),
            };

            info!("Scanning...");
            if let Err(err) = adapter.start_scan(ScanFilter::default()).await {
                return radio.emit_error(RadioOperation::Scan, err.into());
            }

            'mainloop: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                            match device_handle(adapter, &id).await {
                                Ok(handle) => radio.emit(RadioEvent::DeviceDiscovered(handle)),
                                Err(err) => warn!("Could not query peripheral for properties: {:?}", err),
                            }
                        },
                        Some(_) => {},
                        None => break 'mainloop,
                    },
                }
            }
        });

        Ok(())
    }

    fn scan_stop(&self) -> Result<(), DeviceError> {
        if let Some(cancel) = self.inner.scan_cancel.lock().expect("Failed to lock BtleRadio scan").take() {
            cancel.cancel();
        }

        let radio = self.clone();
        self.inner.runtime.spawn(async move {
            if let Err(err) = radio.inner.adapter.stop_scan().await {
                warn!("Failed to stop scanning: {:?}", err);
            }
        });

        Ok(())
    }

    fn connect(&self, identifier: &str) -> Result<(), DeviceError> {
        let cancel = CancellationToken::new();
        {
            let mut connection = self.inner.connection.lock().expect("Failed to lock BtleRadio connection");
            if let Some(previous) = connection.replace(Connection {
                identifier: identifier.to_string(),
                peripheral: None,
                cancel: cancel.clone(),
            }) {
                previous.cancel.cancel();
            }
        }

        let release = self.inner.release.lock().expect("Failed to lock BtleRadio release").take();

        let radio = self.clone();
        let identifier = identifier.to_string();
        self.inner.runtime.spawn(async move {
            if let Some(release) = release {
                if let Err(err) = release.await {
                    warn!("Releasing the previous link failed: {:?}", err);
                }
            }

            let deadline = radio.inner.settings.connect_deadline;
            let attempt = async {
                let peripheral = find_peripheral(&radio.inner.adapter, &identifier).await?;
                info!("Connecting to peripheral {}...", identifier);
                with_deadline(deadline, peripheral.connect()).await?;
                Ok::<Peripheral, DeviceError>(peripheral)
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = attempt => result,
            };

            match result {
                Ok(peripheral) => {
                    {
                        let mut connection = radio.inner.connection.lock().expect("Failed to lock BtleRadio connection");
                        match connection.as_mut() {
                            Some(connection) if !connection.cancel.is_cancelled() => {
                                connection.peripheral = Some(peripheral.clone());
                            },
                            _ => return,
                        }
                    }

                    radio.inner.runtime.spawn(radio.clone().watch_disconnect(peripheral, cancel.child_token()));
                    radio.emit(RadioEvent::Connected);
                },
                Err(err) => {
                    warn!("Connecting to peripheral failed: {:?}", err);
                    radio.emit_error(RadioOperation::Connect, err);
                },
            }
        });

        Ok(())
    }

    fn disconnect(&self) -> Result<(), DeviceError> {
        let connection = self
            .inner
            .connection
            .lock()
            .expect("Failed to lock BtleRadio connection")
            .take()
            .ok_or(DeviceError::NotConnected)?;
        connection.cancel.cancel();

        let radio = self.clone();
        let release = self.inner.runtime.spawn(async move {
            // a connect that was cancelled halfway may still have brought the link up
            let peripheral = match connection.peripheral {
                Some(peripheral) => Some(peripheral),
                None => find_peripheral(&radio.inner.adapter, &connection.identifier).await.ok(),
            };

            if let Some(peripheral) = peripheral {
                if peripheral.is_connected().await.unwrap_or(true) {
                    if let Err(err) = peripheral.disconnect().await {
                        return radio.emit_error(RadioOperation::Disconnect, err.into());
                    }
                }
            }

            info!("Disconnected from {}", connection.identifier);
            radio.emit(RadioEvent::Disconnected);
        });
        *self.inner.release.lock().expect("Failed to lock BtleRadio release") = Some(release);

        Ok(())
    }

    fn discover_services(&self) -> Result<(), DeviceError> {
        let (peripheral, cancel) = self.connected_peripheral()?;

        let radio = self.clone();
        self.inner.runtime.spawn(async move {
            let deadline = radio.inner.settings.discovery_deadline;
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = with_deadline(deadline, peripheral.discover_services()) => result,
            };

            match result {
                Ok(()) => radio.emit(RadioEvent::ServicesFound(service_infos(&peripheral))),
                Err(err) => radio.emit_error(RadioOperation::DiscoverServices, err),
            }
        });

        Ok(())
    }

    fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<(), DeviceError> {
        let (peripheral, cancel) = self.connected_peripheral()?;
        let characteristic = find_characteristic(&peripheral, characteristic)?;

        let radio = self.clone();
        if enabled {
            self.inner.runtime.spawn(radio.forward_notifications(peripheral, characteristic, cancel.child_token()));
        } else {
            self.inner.runtime.spawn(async move {
                if let Err(err) = peripheral.unsubscribe(&characteristic).await {
                    radio.emit_error(RadioOperation::SetNotify, err.into());
                }
            });
        }

        Ok(())
    }

    fn write_characteristic(&self, characteristic: Uuid, bytes: Vec<u8>) -> Result<(), DeviceError> {
        let (peripheral, _) = self.connected_peripheral()?;
        let characteristic = find_characteristic(&peripheral, characteristic)?;
        let settings = self.inner.settings;
        let write_type = if settings.write_with_response { WriteType::WithResponse } else { WriteType::WithoutResponse };

        let radio = self.clone();
        self.inner.runtime.spawn(async move {
            let fut = peripheral.write(&characteristic, &bytes, write_type);
            if let Err(err) = with_deadline(settings.write_deadline, fut).await {
                warn!("Failed to send to characteristic {}: {:?}", characteristic.uuid, err);
                radio.emit_error(RadioOperation::Write, err);
            }
        });

        Ok(())
    }
}

use std::sync::{Arc, Mutex, Weak};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::device::radio::Radio;
use crate::device::registry::DeviceRegistry;
use crate::device::types::{DeviceHandle, ScanEvent};

/// Newly found devices of one scan pass, ending with [`ScanEvent::Complete`].
pub type ScanStream = UnboundedReceiver<ScanEvent>;

struct ActiveScan {
    // cancels the cutoff timer
    cancel: CancellationToken,
    subscribers: Vec<UnboundedSender<ScanEvent>>,
}

impl ActiveScan {
    fn send(&mut self, event: ScanEvent) {
        self.subscribers.retain(|subscriber| subscriber.unbounded_send(event.clone()).is_ok());
    }
}

struct ScanControllerInner<R: Radio> {
    radio: R,
    registry: DeviceRegistry,
    active: Option<ActiveScan>,
}

impl<R: Radio> Drop for ScanControllerInner<R> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

/// Runs bounded scan passes and owns the registry of what they found.
#[derive(Clone)]
pub struct ScanController<R: Radio> {
    inner: Arc<Mutex<ScanControllerInner<R>>>,
}

impl<R: Radio> ScanController<R> {
    pub fn new(radio: R) -> Self {
        let inner = ScanControllerInner {
            radio,
            registry: DeviceRegistry::new(),
            active: None,
        };
        ScanController { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Start a scan pass that stops by itself after `duration`.
    ///
    /// While a pass is running no second one is started; the returned stream
    /// joins the running pass and first replays the devices it already found.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, duration: Duration) -> ScanStream {
        let (tx, rx) = unbounded();
        let mut inner = self.inner.lock().expect("Failed to lock ScanController inner");

        if inner.active.is_some() {
            debug!("Scan already running, joining it");
            for device in inner.registry.list() {
                let _ = tx.unbounded_send(ScanEvent::Found(device));
            }
            if let Some(active) = inner.active.as_mut() {
                active.subscribers.push(tx);
            }
            return rx;
        }

        inner.registry.reset();

        if let Err(err) = inner.radio.scan_start() {
            warn!("Scanning failed {:?}", err);
            let _ = tx.unbounded_send(ScanEvent::Complete);
            return rx;
        }

        info!("Scanning for {:?}...", duration);
        let cancel = CancellationToken::new();
        inner.active = Some(ActiveScan {
            cancel: cancel.clone(),
            subscribers: vec![tx],
        });
        drop(inner);

        let controller = Arc::downgrade(&self.inner);
        spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {},
                _ = sleep(duration) => {
                    if let Some(inner) = Weak::upgrade(&controller) {
                        ScanController { inner }.stop();
                    }
                },
            }
        });

        rx
    }

    /// Stop the running pass, if any. The radio is told to stop once per pass.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("Failed to lock ScanController inner");

        let Some(mut active) = inner.active.take() else {
            debug!("No scan running");
            return;
        };

        active.cancel.cancel();
        if let Err(err) = inner.radio.scan_stop() {
            warn!("Failed to stop scanning: {:?}", err);
        }

        info!("Scan complete, {} device(s) found", inner.registry.len());
        active.send(ScanEvent::Complete);
    }

    /// Feed one radio discovery into the registry; only new devices are forwarded.
    pub fn observe(&self, device: DeviceHandle) {
        let mut inner = self.inner.lock().expect("Failed to lock ScanController inner");
        let inner = &mut *inner;

        let Some(active) = inner.active.as_mut() else {
            debug!("Ignoring discovery of {} outside a scan", device.identifier);
            return;
        };

        if inner.registry.observe(device.clone()) {
            info!("Found {}", device);
            active.send(ScanEvent::Found(device));
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().expect("Failed to lock ScanController inner").active.is_some()
    }

    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.inner.lock().expect("Failed to lock ScanController inner").registry.list()
    }

    pub fn device(&self, index: usize) -> Option<DeviceHandle> {
        self.inner.lock().expect("Failed to lock ScanController inner").registry.get(index).cloned()
    }
}

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::device::radio::Radio;
use crate::device::types::RadioOperation;
use crate::error::DeviceError;

/// A radio call as recorded by [`FakeRadio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    ScanStart,
    ScanStop,
    Connect(String),
    Disconnect,
    DiscoverServices,
    SetNotify(Uuid, bool),
    Write(Uuid, Vec<u8>),
}

#[derive(Debug, Default)]
struct FakeRadioInner {
    calls: Vec<RadioCall>,
    failing: HashSet<RadioOperation>,
}

/// Radio without hardware behind it. Every command is recorded and succeeds,
/// unless it was told to fail with [`FakeRadio::fail`]. Events are injected by
/// whoever drives the state machine.
#[derive(Debug, Clone, Default)]
pub struct FakeRadio {
    inner: Arc<Mutex<FakeRadioInner>>,
}

impl FakeRadio {
    pub fn new() -> Self {
        FakeRadio::default()
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.inner.lock().expect("Failed to lock FakeRadio inner").calls.clone()
    }

    pub fn count(&self, call: &RadioCall) -> usize {
        self.calls().iter().filter(|recorded| *recorded == call).count()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RadioCall::Write(_, bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    /// Make every later command of this kind return an error without being recorded.
    pub fn fail(&self, operation: RadioOperation) {
        self.inner.lock().expect("Failed to lock FakeRadio inner").failing.insert(operation);
    }

    fn record(&self, operation: RadioOperation, call: RadioCall) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().expect("Failed to lock FakeRadio inner");
        if inner.failing.contains(&operation) {
            return Err(DeviceError::NotConnected);
        }
        inner.calls.push(call);
        Ok(())
    }
}

impl Radio for FakeRadio {
    fn scan_start(&self) -> Result<(), DeviceError> {
        self.record(RadioOperation::Scan, RadioCall::ScanStart)
    }

    fn scan_stop(&self) -> Result<(), DeviceError> {
        self.record(RadioOperation::Scan, RadioCall::ScanStop)
    }

    fn connect(&self, identifier: &str) -> Result<(), DeviceError> {
        self.record(RadioOperation::Connect, RadioCall::Connect(identifier.to_string()))
    }

    fn disconnect(&self) -> Result<(), DeviceError> {
        self.record(RadioOperation::Disconnect, RadioCall::Disconnect)
    }

    fn discover_services(&self) -> Result<(), DeviceError> {
        self.record(RadioOperation::DiscoverServices, RadioCall::DiscoverServices)
    }

    fn set_notify(&self, characteristic: Uuid, enabled: bool) -> Result<(), DeviceError> {
        self.record(RadioOperation::SetNotify, RadioCall::SetNotify(characteristic, enabled))
    }

    fn write_characteristic(&self, characteristic: Uuid, bytes: Vec<u8>) -> Result<(), DeviceError> {
        self.record(RadioOperation::Write, RadioCall::Write(characteristic, bytes))
    }
}
